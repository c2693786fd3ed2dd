//! Non-AI check that a translation didn't drop any of the caller's
//! required terminology (product names, etc. that must survive
//! translation untouched). Second step of `translation_review`.

use async_trait::async_trait;
use cascade_core::error::EngineError;
use cascade_core::types::ExecutionContext;
use cascade_engine::{CostEstimate, OperationKind, SimpleOperationHooks};
use serde_json::{json, Value};

pub struct TerminologyCheckHooks;

#[async_trait]
impl SimpleOperationHooks for TerminologyCheckHooks {
    fn id(&self) -> &str {
        "check_terminology"
    }

    fn name(&self) -> &str {
        "Check Terminology Preservation"
    }

    fn kind(&self) -> OperationKind {
        OperationKind::Validation
    }

    fn validate(&self, input: &Value) -> Vec<String> {
        let mut errors = Vec::new();
        if input.get("translated_text").and_then(Value::as_str).is_none() {
            errors.push("input.translated_text must be a string".to_string());
        }
        errors
    }

    async fn run(&self, input: Value, _context: &ExecutionContext) -> Result<Value, EngineError> {
        let translated = input.get("translated_text").and_then(Value::as_str).unwrap_or_default();
        let required_terms: Vec<String> = input
            .get("required_terms")
            .and_then(Value::as_array)
            .map(|terms| {
                terms
                    .iter()
                    .filter_map(|t| t.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        let missing: Vec<String> = required_terms
            .into_iter()
            .filter(|term| !translated.contains(term.as_str()))
            .collect();

        Ok(json!({
            "passed": missing.is_empty(),
            "missing_terms": missing,
        }))
    }
}
