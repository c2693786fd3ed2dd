//! Extracts named characters/locations/objects from an outline. Second
//! step of the `narrative_bible` example pipeline; depends on
//! [`super::outline::OutlineHooks`]'s output via `map_input`.

use cascade_core::types::ExecutionContext;
use cascade_engine::AiOperationHooks;
use serde_json::{json, Value};

pub struct EntityExtractionHooks;

impl AiOperationHooks for EntityExtractionHooks {
    fn id(&self) -> &str {
        "extract_entities"
    }

    fn name(&self) -> &str {
        "Extract Story Entities"
    }

    fn validate_additional(&self, input: &Value) -> Vec<String> {
        let mut errors = Vec::new();
        if input.get("title").is_none() && input.get("acts").is_none() {
            errors.push("input must be an outline containing title/acts".to_string());
        }
        errors
    }

    fn system_prompt(&self, _context: &ExecutionContext) -> String {
        "You catalogue recurring characters, locations, and objects in a \
         story outline. Respond with JSON only."
            .to_string()
    }

    fn user_prompt(&self, input: &Value, _context: &ExecutionContext) -> String {
        format!(
            "Outline:\n{}\n\n\
             Return a JSON object with keys \"characters\", \"locations\", \
             and \"objects\", each an array of {{\"name\", \"description\"}}.",
            input
        )
    }

    fn required_fields(&self) -> Vec<&'static str> {
        vec!["characters", "locations", "objects"]
    }

    fn fallback_skeleton(&self) -> Value {
        json!({"characters": [], "locations": [], "objects": []})
    }
}
