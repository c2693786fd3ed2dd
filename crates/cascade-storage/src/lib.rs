//! Storage adapters implementing `cascade_engine::StorageSink`: an
//! in-memory sink for tests and CLI dry-runs, and a SQLite-backed sink
//! that persists step lifecycle events keyed by `(request_id, step_id)`
//! for audit and billing reconciliation.
//!
//! Grounded on the Neo4j adapter in `crates/fluent-storage` for
//! the shape of a pluggable persistence layer behind an async pool; the
//! backing store itself is swapped for `rusqlite`/`tokio-rusqlite` (already
//! in the workspace's dependency stack) since this engine's storage need —
//! append-only lifecycle events keyed by request/step — is a time-series
//! table, not a graph.

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryStorageSink;
pub use sqlite::SqliteStorageSink;
