//! Translates a text passage into a target language. First step of the
//! `translation_review` example pipeline.

use cascade_core::types::ExecutionContext;
use cascade_engine::AiOperationHooks;
use serde_json::{json, Value};

pub struct TranslateTextHooks;

impl AiOperationHooks for TranslateTextHooks {
    fn id(&self) -> &str {
        "translate_text"
    }

    fn name(&self) -> &str {
        "Translate Text"
    }

    fn validate_additional(&self, input: &Value) -> Vec<String> {
        let mut errors = Vec::new();
        if input.get("text").and_then(Value::as_str).is_none() {
            errors.push("input.text must be a non-empty string".to_string());
        }
        if input.get("target_language").and_then(Value::as_str).is_none() {
            errors.push("input.target_language must be a string".to_string());
        }
        errors
    }

    fn system_prompt(&self, _context: &ExecutionContext) -> String {
        "You are a professional translator. Preserve meaning, tone, and \
         any proper nouns verbatim. Respond with JSON only."
            .to_string()
    }

    fn user_prompt(&self, input: &Value, _context: &ExecutionContext) -> String {
        let text = input.get("text").and_then(Value::as_str).unwrap_or_default();
        let target = input
            .get("target_language")
            .and_then(Value::as_str)
            .unwrap_or("English");
        format!(
            "Translate the following text into {target}:\n\n{text}\n\n\
             Return a JSON object with keys \"translated_text\" and \
             \"source_language_guess\"."
        )
    }

    fn required_fields(&self) -> Vec<&'static str> {
        vec!["translated_text"]
    }

    fn fallback_skeleton(&self) -> Value {
        json!({"translated_text": "", "source_language_guess": null})
    }
}
