use cascade_engine::StorageSink;
use cascade_storage::{InMemoryStorageSink, SqliteStorageSink};
use serde_json::json;

#[tokio::test]
async fn in_memory_sink_survives_a_full_step_lifecycle() {
    let sink = InMemoryStorageSink::new();
    let step_id = "generate_chapter".to_string();

    sink.on_step_validation(&step_id, 2, &[]).await;
    sink.on_provider_call(&step_id, 410, 1200, 300, 0.0045, 5, "{}").await;
    sink.on_step_complete(&step_id, &json!({"title": "Chapter One"})).await;

    let events = sink.events();
    assert_eq!(events.len(), 3);
}

#[tokio::test]
async fn sqlite_sink_persists_events_across_steps() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("pipeline-events.sqlite3");
    let sink = SqliteStorageSink::open(db_path.to_str().unwrap(), "req-integration")
        .await
        .unwrap();

    sink.on_step_start(&"a".to_string(), "system", "user", None).await;
    sink.on_step_failed(&"a".to_string(), "provider_error: timeout", 1).await;
    sink.on_step_complete(&"b".to_string(), &json!({"ok": true})).await;

    // Re-opening against the same file should see the same table; this
    // exercises that the schema is idempotent (CREATE TABLE IF NOT EXISTS).
    let reopened = SqliteStorageSink::open(db_path.to_str().unwrap(), "req-integration")
        .await
        .unwrap();
    reopened.on_step_complete(&"c".to_string(), &json!({"ok": true})).await;
}
