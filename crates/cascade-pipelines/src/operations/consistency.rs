//! Non-AI validation step: flags narrative drafts that came back
//! suspiciously short. Demonstrates a `SimpleOperationHooks` (no prompt
//! assembly, no provider dispatch) sitting downstream of AI steps in the
//! `narrative_bible` example pipeline.

use async_trait::async_trait;
use cascade_core::error::EngineError;
use cascade_core::types::ExecutionContext;
use cascade_engine::{CostEstimate, OperationKind, SimpleOperationHooks};
use serde_json::{json, Value};

const MIN_WORD_COUNT: u64 = 50;

pub struct ConsistencyCheckHooks;

#[async_trait]
impl SimpleOperationHooks for ConsistencyCheckHooks {
    fn id(&self) -> &str {
        "check_consistency"
    }

    fn name(&self) -> &str {
        "Check Narrative Consistency"
    }

    fn kind(&self) -> OperationKind {
        OperationKind::Validation
    }

    fn validate(&self, input: &Value) -> Vec<String> {
        let mut errors = Vec::new();
        if input.get("act_one_text").and_then(Value::as_str).is_none() {
            errors.push("input.act_one_text must be a string".to_string());
        }
        errors
    }

    async fn run(&self, input: Value, _context: &ExecutionContext) -> Result<Value, EngineError> {
        let word_count = input.get("word_count").and_then(Value::as_u64).unwrap_or(0);
        let passed = word_count >= MIN_WORD_COUNT;
        Ok(json!({
            "passed": passed,
            "word_count": word_count,
            "minimum_required": MIN_WORD_COUNT,
        }))
    }
}
