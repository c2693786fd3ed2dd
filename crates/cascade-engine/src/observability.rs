//! The two optional sinks an engine run can report through: a storage
//! adapter that records step lifecycle events for audit/billing
//! reconciliation, and a progress callback that receives the full
//! [`PipelineStateUpdate`] on every transition.
//!
//! Grounded on `fluent-storage`'s persistence-sink/event-bus split (a
//! persistence sink plus a separate broadcast channel for UI consumers) —
//! generalized from one storage backend to a trait so the scheduler never
//! depends on a concrete database.

use async_trait::async_trait;
use cascade_core::types::{ModelConfig, PipelineStateUpdate, StepId};
use serde_json::Value;
use std::sync::Arc;

/// Receives step lifecycle events as the scheduler runs a pipeline.
/// Every method has a no-op default so an implementor only overrides the
/// hooks it cares about. None of these may propagate an error back into
/// the engine: implementations are expected to log and swallow their own
/// failures (a write to a down time-series store must never fail a step).
#[async_trait]
pub trait StorageSink: Send + Sync {
    async fn on_step_start(
        &self,
        _step_id: &StepId,
        _system_prompt: &str,
        _user_prompt: &str,
        _model: Option<&ModelConfig>,
    ) {
    }

    async fn on_step_validation(&self, _step_id: &StepId, _duration_ms: u64, _errors: &[String]) {}

    #[allow(clippy::too_many_arguments)]
    async fn on_provider_call(
        &self,
        _step_id: &StepId,
        _duration_ms: u64,
        _input_tokens: u64,
        _output_tokens: u64,
        _cost_usd: f64,
        _credits: u64,
        _raw_response: &str,
    ) {
    }

    async fn on_suspicious_content(&self, _step_id: &StepId, _reasons: &[String]) {}

    async fn on_step_complete(&self, _step_id: &StepId, _output: &Value) {}

    async fn on_step_failed(&self, _step_id: &StepId, _error: &str, _retries_used: u32) {}
}

/// A sink that does nothing, used when the caller doesn't want auditing.
pub struct NullStorageSink;

#[async_trait]
impl StorageSink for NullStorageSink {}

/// Callback invoked synchronously, in order, every time the scheduler
/// transitions a step's state — before it dispatches any further steps, so
/// observers see strictly monotonic progress.
pub type ProgressCallback = Arc<dyn Fn(PipelineStateUpdate) + Send + Sync>;
