//! Wires the operations in [`crate::operations`] into an
//! [`OperationRegistry`] and the three bundled example pipelines'
//! [`Pipeline`] definitions, the way `cascade-cli run --pipeline <name>`
//! expects to find them.
//!
//! Grounded on `fluent-cli`'s `pipeline_builder` (assembling a named,
//! reusable pipeline from a fixed catalogue of steps) and
//! `pipeline/model.rs` (a `Pipeline` as a flat, named step list) —
//! generalized here to the new `Dag`/`Operation` types instead of
//! `fluent-cli`'s `Node`/`Edge`/`FluentAdapter` model.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use cascade_core::config::PipelineEngineConfig;
use cascade_core::types::{Pipeline, PipelineStep, StepResult};
use cascade_engine::{AiOperation, AiOperationConfig, Operation, OperationRegistry, SimpleOperation};
use cascade_providers::ProviderRegistry;

use crate::operations::{
    consistency::ConsistencyCheckHooks, entities::EntityExtractionHooks,
    narrative::NarrativeDraftHooks, outline::OutlineHooks, render_image::RenderImageHooks,
    scene_prompt::ScenePromptHooks, terminology::TerminologyCheckHooks,
    translate::TranslateTextHooks,
};

/// Names accepted by `cascade-cli run --pipeline <name>` / `describe`.
pub const PIPELINE_NAMES: &[&str] = &["narrative_bible", "translation_review", "illustrated_scene"];

fn ai_operation_config(engine_config: &PipelineEngineConfig, operation_id: &str) -> AiOperationConfig {
    AiOperationConfig {
        ai_config: engine_config.operations.get(operation_id).cloned().unwrap_or_default(),
        credits: engine_config.credit_prices.get(operation_id).cloned().unwrap_or_default(),
        usd_per_credit: engine_config.usd_per_credit,
    }
}

/// Builds an [`OperationRegistry`] containing every operation the bundled
/// example pipelines reference, configured from `engine_config`'s model
/// menus and credit prices.
pub fn build_registry(engine_config: &PipelineEngineConfig, providers: &'static ProviderRegistry) -> OperationRegistry {
    let mut registry = OperationRegistry::new();

    let ai: Vec<Arc<dyn Operation>> = vec![
        Arc::new(AiOperation::new(
            OutlineHooks,
            ai_operation_config(engine_config, "generate_outline"),
            providers,
        )),
        Arc::new(AiOperation::new(
            EntityExtractionHooks,
            ai_operation_config(engine_config, "extract_entities"),
            providers,
        )),
        Arc::new(AiOperation::new(
            NarrativeDraftHooks,
            ai_operation_config(engine_config, "generate_narrative"),
            providers,
        )),
        Arc::new(AiOperation::new(
            TranslateTextHooks,
            ai_operation_config(engine_config, "translate_text"),
            providers,
        )),
        Arc::new(AiOperation::new(
            ScenePromptHooks,
            ai_operation_config(engine_config, "generate_scene_prompt"),
            providers,
        )),
    ];
    for op in ai {
        registry.register(op);
    }

    registry.register(Arc::new(SimpleOperation(ConsistencyCheckHooks)));
    registry.register(Arc::new(SimpleOperation(TerminologyCheckHooks)));
    registry.register(Arc::new(SimpleOperation(RenderImageHooks)));

    registry
}

/// Builds the named example pipeline's unvalidated step list. Callers
/// pass the result through `cascade_engine::Dag::build` before execution.
pub fn build_pipeline(name: &str) -> Result<Pipeline> {
    match name {
        "narrative_bible" => Ok(narrative_bible_pipeline()),
        "translation_review" => Ok(translation_review_pipeline()),
        "illustrated_scene" => Ok(illustrated_scene_pipeline()),
        other => Err(anyhow!(
            "unknown pipeline '{other}'; known pipelines: {}",
            PIPELINE_NAMES.join(", ")
        )),
    }
}

fn completed_output(results: &std::collections::HashMap<String, StepResult>, step_id: &str) -> serde_json::Value {
    match results.get(step_id) {
        Some(StepResult::Completed { output, .. }) => output.clone(),
        _ => serde_json::Value::Null,
    }
}

fn narrative_bible_pipeline() -> Pipeline {
    let outline = PipelineStep::new("outline", "generate_outline");
    let entities = PipelineStep::new("entities", "extract_entities")
        .depends_on(["outline"])
        .with_map_input(|results| completed_output(results, "outline"));
    let narrative = PipelineStep::new("narrative", "generate_narrative")
        .depends_on(["outline", "entities"])
        .with_map_input(|results| {
            serde_json::json!({
                "outline": completed_output(results, "outline"),
                "entities": completed_output(results, "entities"),
            })
        });
    let consistency_check = PipelineStep::new("consistency_check", "check_consistency")
        .depends_on(["narrative"])
        .with_map_input(|results| completed_output(results, "narrative"));

    Pipeline::new("narrative_bible", vec![outline, entities, narrative, consistency_check])
}

fn translation_review_pipeline() -> Pipeline {
    let translate = PipelineStep::new("translate", "translate_text");
    let terminology_check = PipelineStep::new("terminology_check", "check_terminology")
        .depends_on(["translate"])
        .with_map_input(|results| completed_output(results, "translate"));

    Pipeline::new("translation_review", vec![translate, terminology_check])
}

fn illustrated_scene_pipeline() -> Pipeline {
    let scene_prompt = PipelineStep::new("scene_prompt", "generate_scene_prompt");
    let render = PipelineStep::new("render", "render_image")
        .depends_on(["scene_prompt"])
        .with_map_input(|results| completed_output(results, "scene_prompt"));

    Pipeline::new("illustrated_scene", vec![scene_prompt, render])
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_engine::Dag;

    #[test]
    fn every_bundled_pipeline_name_builds_a_valid_dag() {
        for name in PIPELINE_NAMES {
            let pipeline = build_pipeline(name).unwrap();
            Dag::build(pipeline).unwrap_or_else(|e| panic!("pipeline '{name}' failed to validate: {e}"));
        }
    }

    #[test]
    fn unknown_pipeline_name_errors() {
        assert!(build_pipeline("does_not_exist").is_err());
    }

    #[test]
    fn registry_contains_every_operation_every_pipeline_references() {
        let engine_config = PipelineEngineConfig::default();
        let providers = ProviderRegistry::global(Default::default());
        let registry = build_registry(&engine_config, providers);
        for name in PIPELINE_NAMES {
            let pipeline = build_pipeline(name).unwrap();
            for step in &pipeline.steps {
                assert!(
                    registry.contains(&step.operation_id),
                    "pipeline '{name}' references unregistered operation '{}'",
                    step.operation_id
                );
            }
        }
    }
}
