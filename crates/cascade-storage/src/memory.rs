//! An in-process storage sink. Keeps every event it receives in memory,
//! in arrival order, for tests and `cascade-cli`'s `--dry-run` inspection
//! where standing up SQLite is unnecessary overhead.

use std::sync::Mutex;

use async_trait::async_trait;
use cascade_core::types::{ModelConfig, StepId};
use cascade_engine::StorageSink;
use serde_json::Value;

#[derive(Debug, Clone)]
pub enum StoredEvent {
    StepStart {
        step_id: StepId,
        system_prompt: String,
        user_prompt: String,
        model: Option<String>,
    },
    Validation {
        step_id: StepId,
        duration_ms: u64,
        errors: Vec<String>,
    },
    ProviderCall {
        step_id: StepId,
        duration_ms: u64,
        input_tokens: u64,
        output_tokens: u64,
        cost_usd: f64,
        credits: u64,
    },
    SuspiciousContent {
        step_id: StepId,
        reasons: Vec<String>,
    },
    StepComplete {
        step_id: StepId,
        output: Value,
    },
    StepFailed {
        step_id: StepId,
        error: String,
        retries_used: u32,
    },
}

#[derive(Default)]
pub struct InMemoryStorageSink {
    events: Mutex<Vec<StoredEvent>>,
}

impl InMemoryStorageSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every event recorded so far, in arrival order.
    pub fn events(&self) -> Vec<StoredEvent> {
        self.events.lock().expect("storage sink mutex poisoned").clone()
    }

    fn push(&self, event: StoredEvent) {
        self.events.lock().expect("storage sink mutex poisoned").push(event);
    }
}

#[async_trait]
impl StorageSink for InMemoryStorageSink {
    async fn on_step_start(
        &self,
        step_id: &StepId,
        system_prompt: &str,
        user_prompt: &str,
        model: Option<&ModelConfig>,
    ) {
        self.push(StoredEvent::StepStart {
            step_id: step_id.clone(),
            system_prompt: system_prompt.to_string(),
            user_prompt: user_prompt.to_string(),
            model: model.map(|m| m.model.clone()),
        });
    }

    async fn on_step_validation(&self, step_id: &StepId, duration_ms: u64, errors: &[String]) {
        self.push(StoredEvent::Validation {
            step_id: step_id.clone(),
            duration_ms,
            errors: errors.to_vec(),
        });
    }

    async fn on_provider_call(
        &self,
        step_id: &StepId,
        duration_ms: u64,
        input_tokens: u64,
        output_tokens: u64,
        cost_usd: f64,
        credits: u64,
        _raw_response: &str,
    ) {
        self.push(StoredEvent::ProviderCall {
            step_id: step_id.clone(),
            duration_ms,
            input_tokens,
            output_tokens,
            cost_usd,
            credits,
        });
    }

    async fn on_suspicious_content(&self, step_id: &StepId, reasons: &[String]) {
        self.push(StoredEvent::SuspiciousContent {
            step_id: step_id.clone(),
            reasons: reasons.to_vec(),
        });
    }

    async fn on_step_complete(&self, step_id: &StepId, output: &Value) {
        self.push(StoredEvent::StepComplete {
            step_id: step_id.clone(),
            output: output.clone(),
        });
    }

    async fn on_step_failed(&self, step_id: &StepId, error: &str, retries_used: u32) {
        self.push(StoredEvent::StepFailed {
            step_id: step_id.clone(),
            error: error.to_string(),
            retries_used,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn records_events_in_arrival_order() {
        let sink = InMemoryStorageSink::new();
        sink.on_step_validation(&"a".to_string(), 1, &[]).await;
        sink.on_step_complete(&"a".to_string(), &json!({"ok": true})).await;

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], StoredEvent::Validation { .. }));
        assert!(matches!(events[1], StoredEvent::StepComplete { .. }));
    }
}
