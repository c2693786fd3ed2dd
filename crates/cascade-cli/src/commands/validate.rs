use std::collections::HashMap;

use anyhow::{Context, Result};
use cascade_core::config::load_engine_config;

use crate::args::ValidateArgs;

/// Loads a `PipelineEngineConfig` document and reports whether it parsed
/// cleanly, without executing anything.
pub async fn run(args: ValidateArgs) -> Result<()> {
    let document = tokio::fs::read_to_string(&args.config)
        .await
        .with_context(|| format!("failed to read config file '{}'", args.config))?;

    match load_engine_config(&document, &HashMap::new()) {
        Ok(config) => {
            println!(
                "config '{}' is valid: {} operation(s) configured, usd_per_credit={}",
                args.config,
                config.operations.len(),
                config.usd_per_credit
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("config '{}' is invalid: {e}", args.config);
            std::process::exit(1);
        }
    }
}
