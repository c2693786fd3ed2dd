use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use cascade_core::config::{load_engine_config, PipelineEngineConfig};
use cascade_core::types::ExecutionContext;
use cascade_engine::{execute_pipeline, Dag, ProgressCallback};
use cascade_providers::ProviderRegistry;
use cascade_storage::InMemoryStorageSink;
use tracing::info;

use crate::args::RunArgs;
use crate::error::CliError;

pub async fn run(args: RunArgs) -> Result<()> {
    let engine_config = match &args.config {
        Some(path) => {
            let document = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read config file '{path}'"))?;
            load_engine_config(&document, &HashMap::new())
                .with_context(|| format!("failed to load config file '{path}'"))?
        }
        None => PipelineEngineConfig::default(),
    };

    let input_document = tokio::fs::read_to_string(&args.input)
        .await
        .with_context(|| format!("failed to read input file '{}'", args.input))?;
    let input: serde_json::Value = serde_json::from_str(&input_document)
        .map_err(|e| CliError::Input(format!("input file is not valid JSON: {e}")))?;

    let pipeline = cascade_pipelines::build_pipeline(&args.pipeline)
        .map_err(|_| CliError::UnknownPipeline(args.pipeline.clone()))?;
    let dag = Dag::build(pipeline).map_err(|e| CliError::Config(e.to_string()))?;

    let providers = ProviderRegistry::global(super::credentials_from_env());
    let registry = cascade_pipelines::build_registry(&engine_config, providers);

    let avoid_providers = args.avoid_provider.into_iter().map(Into::into).collect();
    let context = ExecutionContext::new(args.quality.into()).avoiding(avoid_providers);
    let request_id = context.request_id;

    let on_update: ProgressCallback = Arc::new(|update| {
        println!(
            "[{:>3}%] {} -> {:?}",
            update.progress_percent,
            update.last_changed_step,
            update.states.get(&update.last_changed_step)
        );
    });

    info!(%request_id, pipeline = %args.pipeline, "starting pipeline run");
    let sink = Arc::new(InMemoryStorageSink::new());
    let report = execute_pipeline(&dag, &registry, input, context, Some(on_update), Some(sink)).await;

    println!("{}", serde_json::to_string_pretty(&report.results)?);
    if report.summary.has_partial_failure {
        eprintln!(
            "pipeline completed with partial failure: {} failed, {} skipped, {} succeeded of {}",
            report.summary.failed_steps, report.summary.skipped_steps, report.summary.successful_steps, report.summary.total
        );
        std::process::exit(1);
    }
    Ok(())
}
