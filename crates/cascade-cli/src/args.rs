//! Command-line surface, grounded on `fluent-cli`'s `clap`-based front-end
//! but expressed with `clap::Parser`'s derive macro (the style
//! `cascade-cli`'s dependency table already opts into) rather than a
//! builder-style construction.

use cascade_core::types::{Provider, QualityLevel};
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "cascade-cli", version, about = "Runs bundled AI operation pipelines")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one of the bundled example pipelines to completion.
    Run(RunArgs),
    /// Print a pipeline's validated step structure (levels) without running it.
    Describe(DescribeArgs),
    /// Load and validate a pipeline engine config file without executing anything.
    Validate(ValidateArgs),
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Name of a bundled pipeline (see `cascade-cli describe` for the list).
    #[arg(long)]
    pub pipeline: String,

    /// Path to a JSON file providing the pipeline's input payload.
    #[arg(long)]
    pub input: String,

    /// Path to a YAML/JSON `PipelineEngineConfig` document. Falls back to
    /// an empty configuration (no model menus, no credit prices) if omitted.
    #[arg(long)]
    pub config: Option<String>,

    #[arg(long, value_enum, default_value_t = CliQuality::Standard)]
    pub quality: CliQuality,

    /// Provider(s) to avoid for this run; repeatable.
    #[arg(long = "avoid-provider", value_enum)]
    pub avoid_provider: Vec<CliProvider>,
}

#[derive(Parser, Debug)]
pub struct DescribeArgs {
    #[arg(long)]
    pub pipeline: String,
}

#[derive(Parser, Debug)]
pub struct ValidateArgs {
    #[arg(long)]
    pub config: String,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum CliQuality {
    Fast,
    Standard,
    Expert,
}

impl From<CliQuality> for QualityLevel {
    fn from(q: CliQuality) -> Self {
        match q {
            CliQuality::Fast => QualityLevel::Fast,
            CliQuality::Standard => QualityLevel::Standard,
            CliQuality::Expert => QualityLevel::Expert,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum CliProvider {
    Anthropic,
    Openai,
    Google,
    Mistral,
}

impl From<CliProvider> for Provider {
    fn from(p: CliProvider) -> Self {
        match p {
            CliProvider::Anthropic => Provider::Anthropic,
            CliProvider::Openai => Provider::OpenAi,
            CliProvider::Google => Provider::Google,
            CliProvider::Mistral => Provider::Mistral,
        }
    }
}
