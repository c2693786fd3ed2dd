//! Model selection: picks the `ModelConfig` an operation should dispatch to
//! for the current request, applying single-level fallback and nothing
//! more.
//!
//! Grounded on the engine-name-to-constructor dispatch in
//! `cascade-providers::ProviderRegistry` (match on a vendor enum), turned
//! into a pure function over an operation's declared model menu instead of
//! a side-effecting registry lookup.

use cascade_core::error::ConfigurationError;
use cascade_core::types::{ExecutionContext, ModelConfig, OperationAIConfig};
use tracing::warn;

/// Outcome of a selection: the config to dispatch with, and whether it was
/// reached via the fallback path (useful for logging/telemetry, never
/// consulted for further chaining — fallback is single-level only).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionPath {
    Primary,
    Fallback,
    /// Both the primary and its fallback are on the caller's avoid list;
    /// the primary is used anyway and a warning is logged. The engine
    /// degrades gracefully rather than blocking the pipeline.
    DegradedToPrimary,
}

#[derive(Debug, Clone)]
pub struct Selection<'a> {
    pub model: &'a ModelConfig,
    pub path: SelectionPath,
}

/// Implements §4.3 exactly: look up the primary config for the request's
/// quality level; if the caller wants to avoid that provider, try the
/// operation's declared fallback for the same tier; if the fallback is
/// itself avoided, fall back to the primary and log a warning rather than
/// failing the step.
pub fn select_model<'a>(
    operation_id: &str,
    ai_config: &'a OperationAIConfig,
    context: &ExecutionContext,
) -> Result<Selection<'a>, ConfigurationError> {
    let primary = ai_config
        .models
        .get(&context.quality)
        .ok_or_else(|| ConfigurationError::NoModelForQuality {
            operation: operation_id.to_string(),
            quality: context.quality.to_string(),
        })?;

    if !context.avoid_providers.contains(&primary.provider) {
        return Ok(Selection {
            model: primary,
            path: SelectionPath::Primary,
        });
    }

    if let Some(fallback) = ai_config.fallback_models.get(&context.quality) {
        if !context.avoid_providers.contains(&fallback.provider) {
            return Ok(Selection {
                model: fallback,
                path: SelectionPath::Fallback,
            });
        }
    }

    warn!(
        operation_id,
        provider = %primary.provider,
        "both primary and fallback providers are on the caller's avoid list; using primary anyway"
    );
    Ok(Selection {
        model: primary,
        path: SelectionPath::DegradedToPrimary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_core::types::{Provider, QualityLevel};
    use std::collections::HashMap;

    fn model(provider: Provider) -> ModelConfig {
        ModelConfig {
            provider,
            model: "test-model".to_string(),
            temperature: 0.7,
            top_p: None,
            input_cost_per_million: 1.0,
            output_cost_per_million: 2.0,
            supports_json_mode: false,
            max_output_tokens: None,
            timeout_ms: None,
            system_prompt_suffix: None,
        }
    }

    fn ctx(quality: QualityLevel, avoid: Vec<Provider>) -> ExecutionContext {
        ExecutionContext::new(quality).avoiding(avoid)
    }

    #[test]
    fn returns_primary_when_not_avoided() {
        let mut models = HashMap::new();
        models.insert(QualityLevel::Standard, model(Provider::OpenAi));
        let config = OperationAIConfig {
            models,
            ..Default::default()
        };
        let selection = select_model("op", &config, &ctx(QualityLevel::Standard, vec![])).unwrap();
        assert_eq!(selection.path, SelectionPath::Primary);
        assert_eq!(selection.model.provider, Provider::OpenAi);
    }

    #[test]
    fn falls_back_when_primary_avoided() {
        let mut models = HashMap::new();
        models.insert(QualityLevel::Standard, model(Provider::OpenAi));
        let mut fallback_models = HashMap::new();
        fallback_models.insert(QualityLevel::Standard, model(Provider::Anthropic));
        let config = OperationAIConfig {
            models,
            fallback_models,
            ..Default::default()
        };
        let selection = select_model(
            "op",
            &config,
            &ctx(QualityLevel::Standard, vec![Provider::OpenAi]),
        )
        .unwrap();
        assert_eq!(selection.path, SelectionPath::Fallback);
        assert_eq!(selection.model.provider, Provider::Anthropic);
    }

    #[test]
    fn degrades_to_primary_when_both_avoided() {
        let mut models = HashMap::new();
        models.insert(QualityLevel::Standard, model(Provider::OpenAi));
        let mut fallback_models = HashMap::new();
        fallback_models.insert(QualityLevel::Standard, model(Provider::Anthropic));
        let config = OperationAIConfig {
            models,
            fallback_models,
            ..Default::default()
        };
        let selection = select_model(
            "op",
            &config,
            &ctx(
                QualityLevel::Standard,
                vec![Provider::OpenAi, Provider::Anthropic],
            ),
        )
        .unwrap();
        assert_eq!(selection.path, SelectionPath::DegradedToPrimary);
        assert_eq!(selection.model.provider, Provider::OpenAi);
    }

    #[test]
    fn missing_quality_tier_is_a_configuration_error() {
        let config = OperationAIConfig::default();
        let err = select_model("op", &config, &ctx(QualityLevel::Fast, vec![])).unwrap_err();
        assert!(matches!(err, ConfigurationError::NoModelForQuality { .. }));
    }
}
