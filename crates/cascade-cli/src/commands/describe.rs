use anyhow::Result;

use crate::args::DescribeArgs;
use crate::error::CliError;
use cascade_engine::Dag;

/// Prints the pipeline's validated step structure (levels), mirroring the
/// "node editor" contract's `getPipelineStructure()` without the editor.
pub async fn run(args: DescribeArgs) -> Result<()> {
    let pipeline = cascade_pipelines::build_pipeline(&args.pipeline)
        .map_err(|_| CliError::UnknownPipeline(args.pipeline.clone()))?;
    let dag = Dag::build(pipeline).map_err(|e| CliError::Config(e.to_string()))?;

    println!("pipeline: {}", args.pipeline);
    for (level_index, level) in dag.levels().iter().enumerate() {
        println!("level {level_index}:");
        for step_id in level {
            let step = dag.step(step_id).expect("level must only list known steps");
            let deps = if step.dependencies.is_empty() {
                "(none)".to_string()
            } else {
                step.dependencies.join(", ")
            };
            println!("  - {step_id} [{}] depends_on: {deps}", step.operation_id);
        }
    }
    Ok(())
}
