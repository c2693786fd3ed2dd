use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("unknown pipeline '{0}'")]
    UnknownPipeline(String),
    #[error("input error: {0}")]
    Input(String),
}
