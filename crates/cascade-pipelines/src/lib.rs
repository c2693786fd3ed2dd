//! Bundled example pipeline definitions: a small catalogue of named,
//! ready-to-run pipelines built from concrete `Operation` implementations,
//! the way `cascade-cli run --pipeline <name>` expects to find them.
//!
//! Grounded on `fluent-cli::pipeline_builder` (assembling a
//! named pipeline from a fixed catalogue) and `fluent-sdk::pipeline::model`
//! (pipelines as a reusable, nameable unit), reworked onto the new
//! `Dag`/`Operation`/`OperationRegistry` types.

pub mod catalog;
pub mod operations;

pub use catalog::{build_pipeline, build_registry, PIPELINE_NAMES};
