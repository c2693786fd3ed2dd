//! Drafts narrative prose for the outline's first act, given both the
//! outline and the entity catalogue as input. Third step of the
//! `narrative_bible` example pipeline — demonstrates a step with two
//! dependencies merged by `map_input`.

use cascade_core::types::ExecutionContext;
use cascade_engine::AiOperationHooks;
use serde_json::{json, Value};

pub struct NarrativeDraftHooks;

impl AiOperationHooks for NarrativeDraftHooks {
    fn id(&self) -> &str {
        "generate_narrative"
    }

    fn name(&self) -> &str {
        "Draft Narrative Text"
    }

    fn validate_additional(&self, input: &Value) -> Vec<String> {
        let mut errors = Vec::new();
        if input.get("outline").is_none() {
            errors.push("input.outline is required".to_string());
        }
        if input.get("entities").is_none() {
            errors.push("input.entities is required".to_string());
        }
        errors
    }

    fn system_prompt(&self, _context: &ExecutionContext) -> String {
        "You are a novelist drafting the opening act of a story, staying \
         consistent with the supplied outline and entity catalogue. \
         Respond with JSON only."
            .to_string()
    }

    fn user_prompt(&self, input: &Value, _context: &ExecutionContext) -> String {
        format!(
            "Outline:\n{}\n\nEntities:\n{}\n\n\
             Return a JSON object with keys \"act_one_text\" (string prose) \
             and \"word_count\" (integer).",
            input.get("outline").cloned().unwrap_or(Value::Null),
            input.get("entities").cloned().unwrap_or(Value::Null),
        )
    }

    fn required_fields(&self) -> Vec<&'static str> {
        vec!["act_one_text", "word_count"]
    }

    fn fallback_skeleton(&self) -> Value {
        json!({"act_one_text": "", "word_count": 0})
    }
}
