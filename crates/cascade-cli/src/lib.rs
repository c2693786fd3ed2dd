//! `cascade-cli`: a thin `clap`-derived front-end over `cascade-engine`,
//! grounded on `fluent-cli`'s binary role (parse args, wire up an engine,
//! report through `anyhow::Result` at the top) — trimmed to the three
//! subcommands the bundled example pipelines need: `run`, `describe`,
//! `validate`.

pub mod args;
pub mod commands;
pub mod error;

use anyhow::Result;
use clap::Parser;

use args::{Cli, Command};

/// Parses arguments, initializes logging, and dispatches to the matching
/// subcommand handler. Every handler reports through `anyhow::Result`,
/// same as `fluent-cli::cli::run`.
pub async fn run() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => commands::run::run(args).await,
        Command::Describe(args) => commands::describe::run(args).await,
        Command::Validate(args) => commands::validate::run(args).await,
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();
}
