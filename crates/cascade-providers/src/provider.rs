//! The vendor-neutral interface every AI provider adapter implements, and
//! the token usage/result shape the operation kernel consumes.
//!
//! Grounded on `fluent_core::traits::Engine`
//! and its per-vendor `execute()` implementations, narrowed to exactly the
//! one call the engine needs: turn a system/user prompt pair into
//! generated text plus the tokens it cost.

use async_trait::async_trait;
use cascade_core::types::ModelConfig;

/// Raw token usage reported by the vendor, before cost/credit accounting.
#[derive(Debug, Clone, Copy, Default)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub content: String,
    pub usage: Usage,
}

/// One vendor behind the provider abstraction. Implementors place exactly
/// one HTTP call per invocation; retry, timeout, and cost accounting are
/// the scheduler's job, not the adapter's.
#[async_trait]
pub trait Provider: Send + Sync {
    fn kind(&self) -> cascade_core::types::Provider;

    /// Whether this adapter can honor `ModelConfig::supports_json_mode`
    /// by setting the vendor's native JSON response mode, as opposed to
    /// only being able to ask for JSON via a system-prompt instruction.
    fn has_native_json_mode(&self) -> bool {
        false
    }

    async fn generate(
        &self,
        model: &ModelConfig,
        system_prompt: &str,
        user_prompt: &str,
    ) -> anyhow::Result<GenerationResult>;
}

/// Appends an instruction asking the model to respond with JSON only, for
/// vendors/models that have no native JSON mode. Kept as a free function
/// since every non-native-JSON adapter needs the identical wording.
pub fn with_json_instruction(system_prompt: &str) -> String {
    format!(
        "{system_prompt}\n\nRespond with a single JSON object and no other text, markdown fences, or commentary."
    )
}
