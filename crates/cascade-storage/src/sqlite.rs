//! SQLite-backed storage sink. Persists step lifecycle events keyed by
//! `(request_id, step_id)`, matching the storage adapter contract's note
//! that implementations "typically persist to a time-series store keyed
//! by (requestId, stepId)".
//!
//! Grounded on `crates/fluent-storage`'s Neo4j adapter for the "one
//! connection, one append-only write per event, errors logged not
//! propagated" shape; `rusqlite`/`tokio-rusqlite` were already in the
//! workspace's dependency table.

use async_trait::async_trait;
use cascade_core::types::{ModelConfig, StepId};
use cascade_engine::StorageSink;
use chrono::Utc;
use serde_json::Value;
use tokio_rusqlite::Connection;
use tracing::error;

pub struct SqliteStorageSink {
    conn: Connection,
    request_id: String,
}

impl SqliteStorageSink {
    /// Opens (creating if needed) a SQLite database at `path` and ensures
    /// the `step_events` table exists. Events recorded through this sink
    /// are all tagged with `request_id`.
    pub async fn open(path: &str, request_id: impl Into<String>) -> anyhow::Result<Self> {
        let conn = Connection::open(path).await?;
        conn.call(|conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS step_events (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    request_id TEXT NOT NULL,
                    step_id TEXT NOT NULL,
                    event_type TEXT NOT NULL,
                    payload TEXT NOT NULL,
                    recorded_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_step_events_request_step
                    ON step_events(request_id, step_id);",
            )?;
            Ok(())
        })
        .await?;
        Ok(Self {
            conn,
            request_id: request_id.into(),
        })
    }

    async fn record(&self, step_id: &str, event_type: &'static str, payload: Value) {
        let request_id = self.request_id.clone();
        let step_id = step_id.to_string();
        let recorded_at = Utc::now().to_rfc3339();
        let result = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO step_events (request_id, step_id, event_type, payload, recorded_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![request_id, step_id, event_type, payload.to_string(), recorded_at],
                )?;
                Ok(())
            })
            .await;
        if let Err(e) = result {
            error!(error = %e, event_type, "storage sink failed to persist step event");
        }
    }
}

#[async_trait]
impl StorageSink for SqliteStorageSink {
    async fn on_step_start(
        &self,
        step_id: &StepId,
        system_prompt: &str,
        user_prompt: &str,
        model: Option<&ModelConfig>,
    ) {
        self.record(
            step_id,
            "step_start",
            serde_json::json!({
                "system_prompt": system_prompt,
                "user_prompt": user_prompt,
                "model": model.map(|m| &m.model),
                "provider": model.map(|m| m.provider.to_string()),
            }),
        )
        .await;
    }

    async fn on_step_validation(&self, step_id: &StepId, duration_ms: u64, errors: &[String]) {
        self.record(
            step_id,
            "validation",
            serde_json::json!({ "duration_ms": duration_ms, "errors": errors }),
        )
        .await;
    }

    async fn on_provider_call(
        &self,
        step_id: &StepId,
        duration_ms: u64,
        input_tokens: u64,
        output_tokens: u64,
        cost_usd: f64,
        credits: u64,
        raw_response: &str,
    ) {
        self.record(
            step_id,
            "provider_call",
            serde_json::json!({
                "duration_ms": duration_ms,
                "input_tokens": input_tokens,
                "output_tokens": output_tokens,
                "cost_usd": cost_usd,
                "credits": credits,
                "raw_response": raw_response,
            }),
        )
        .await;
    }

    async fn on_suspicious_content(&self, step_id: &StepId, reasons: &[String]) {
        self.record(step_id, "suspicious_content", serde_json::json!({ "reasons": reasons }))
            .await;
    }

    async fn on_step_complete(&self, step_id: &StepId, output: &Value) {
        self.record(step_id, "step_complete", serde_json::json!({ "output": output }))
            .await;
    }

    async fn on_step_failed(&self, step_id: &StepId, error: &str, retries_used: u32) {
        self.record(
            step_id,
            "step_failed",
            serde_json::json!({ "error": error, "retries_used": retries_used }),
        )
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn persists_and_is_queryable_by_request_and_step() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("events.sqlite3");
        let sink = SqliteStorageSink::open(db_path.to_str().unwrap(), "req-1").await.unwrap();

        sink.on_step_complete(&"step-a".to_string(), &serde_json::json!({"ok": true}))
            .await;

        let count: i64 = sink
            .conn
            .call(|conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM step_events WHERE request_id = ?1 AND step_id = ?2",
                    rusqlite::params!["req-1", "step-a"],
                    |row| row.get(0),
                )
                .map_err(Into::into)
            })
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
