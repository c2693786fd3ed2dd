//! External-API step: hands an image prompt to a rendering vendor. No
//! concrete vendor client is wired in here — this is the integration seam
//! a deployment fills in with a real HTTP client (grounded on
//! `fluent-engines`'s per-vendor image request builders, e.g. its DALL-E
//! and Leonardo request types, which followed the same shape: prompt in,
//! fixed per-call cost, vendor-assigned asset id out). Second step of the
//! `illustrated_scene` example pipeline.

use async_trait::async_trait;
use cascade_core::error::EngineError;
use cascade_core::types::{ExecutionContext, QualityLevel};
use cascade_engine::{CostEstimate, OperationKind, SimpleOperationHooks};
use serde_json::{json, Value};
use uuid::Uuid;

/// Per-call price charged by the simulated rendering vendor, tier-indexed
/// the same way `ModelConfig`'s per-tier menu and `OperationCreditConfig`
/// are — a fast/draft render costs less than an expert-tier one, same as
/// an AI operation's fixed schedule varies by quality.
fn render_price(quality: QualityLevel) -> (f64, u64) {
    match quality {
        QualityLevel::Fast => (0.01, 2),
        QualityLevel::Standard => (0.04, 8),
        QualityLevel::Expert => (0.09, 16),
    }
}

pub struct RenderImageHooks;

#[async_trait]
impl SimpleOperationHooks for RenderImageHooks {
    fn id(&self) -> &str {
        "render_image"
    }

    fn name(&self) -> &str {
        "Render Image"
    }

    fn kind(&self) -> OperationKind {
        OperationKind::ExternalApi
    }

    fn validate(&self, input: &Value) -> Vec<String> {
        let mut errors = Vec::new();
        if input.get("image_prompt").and_then(Value::as_str).is_none() {
            errors.push("input.image_prompt must be a non-empty string".to_string());
        }
        errors
    }

    async fn run(&self, input: Value, _context: &ExecutionContext) -> Result<Value, EngineError> {
        let prompt = input.get("image_prompt").and_then(Value::as_str).unwrap_or_default();
        // A real deployment replaces this with a vendor HTTP call; the
        // shape of the returned value (an opaque asset id plus the prompt
        // that produced it) is what downstream steps depend on.
        Ok(json!({
            "asset_id": Uuid::new_v4().to_string(),
            "prompt_used": prompt,
        }))
    }

    fn cost(&self, _input: &Value, context: &ExecutionContext) -> CostEstimate {
        let (real_cost_usd, credits) = render_price(context.quality);
        CostEstimate { real_cost_usd, credits }
    }
}
