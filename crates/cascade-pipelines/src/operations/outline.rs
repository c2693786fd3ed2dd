//! Generates a high-level story outline from a one-paragraph premise.
//! First step of the `narrative_bible` example pipeline.

use cascade_core::types::ExecutionContext;
use cascade_engine::AiOperationHooks;
use serde_json::{json, Value};

pub struct OutlineHooks;

impl AiOperationHooks for OutlineHooks {
    fn id(&self) -> &str {
        "generate_outline"
    }

    fn name(&self) -> &str {
        "Generate Story Outline"
    }

    fn validate_additional(&self, input: &Value) -> Vec<String> {
        let mut errors = Vec::new();
        if input.get("premise").and_then(Value::as_str).is_none() {
            errors.push("input.premise must be a non-empty string".to_string());
        }
        errors
    }

    fn system_prompt(&self, _context: &ExecutionContext) -> String {
        "You are a story editor. Produce a structured outline for the \
         premise you're given. Respond with JSON only."
            .to_string()
    }

    fn user_prompt(&self, input: &Value, _context: &ExecutionContext) -> String {
        let premise = input.get("premise").and_then(Value::as_str).unwrap_or_default();
        format!(
            "Premise: {premise}\n\n\
             Return a JSON object with keys \"title\", \"acts\" (array of act \
             summaries), and \"themes\" (array of strings)."
        )
    }

    fn required_fields(&self) -> Vec<&'static str> {
        vec!["title", "acts", "themes"]
    }

    fn fallback_skeleton(&self) -> Value {
        json!({"title": null, "acts": [], "themes": []})
    }
}
