//! Turns a scene description into an image-generation prompt tuned for
//! the downstream rendering API. First step of the `illustrated_scene`
//! example pipeline.

use cascade_core::types::ExecutionContext;
use cascade_engine::AiOperationHooks;
use serde_json::{json, Value};

pub struct ScenePromptHooks;

impl AiOperationHooks for ScenePromptHooks {
    fn id(&self) -> &str {
        "generate_scene_prompt"
    }

    fn name(&self) -> &str {
        "Generate Scene Prompt"
    }

    fn validate_additional(&self, input: &Value) -> Vec<String> {
        let mut errors = Vec::new();
        if input.get("scene_description").and_then(Value::as_str).is_none() {
            errors.push("input.scene_description must be a non-empty string".to_string());
        }
        errors
    }

    fn system_prompt(&self, _context: &ExecutionContext) -> String {
        "You write concise, vivid image-generation prompts from scene \
         descriptions. Respond with JSON only."
            .to_string()
    }

    fn user_prompt(&self, input: &Value, _context: &ExecutionContext) -> String {
        let scene = input
            .get("scene_description")
            .and_then(Value::as_str)
            .unwrap_or_default();
        format!(
            "Scene: {scene}\n\n\
             Return a JSON object with keys \"image_prompt\" (string) and \
             \"style\" (one of \"photoreal\", \"illustration\", \"painterly\")."
        )
    }

    fn required_fields(&self) -> Vec<&'static str> {
        vec!["image_prompt", "style"]
    }

    fn fallback_skeleton(&self) -> Value {
        json!({"image_prompt": "", "style": "illustration"})
    }
}
