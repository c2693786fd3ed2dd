//! The AI Operation Pipeline Engine: DAG validation, the operation kernel,
//! model selection, the streaming scheduler, JSON repair, and the
//! observability sinks the scheduler reports through.
//!
//! Grounded on the `fluent-pipeline`/`fluent-engines` split (a generic DAG
//! executor plus per-vendor `Engine` adapters sharing a lifecycle),
//! generalized into a single `Operation` trait with an AI-specific shared
//! envelope, a scheduler that understands cascade-skip and conditional
//! gating, and cost/credit accounting threaded through every step.

pub mod dag;
pub mod observability;
pub mod operation;
pub mod registry;
pub mod repair;
pub mod scheduler;
pub mod selector;
pub mod tokenizer;

pub use dag::Dag;
pub use observability::{NullStorageSink, ProgressCallback, StorageSink};
pub use operation::{
    AiOperation, AiOperationConfig, AiOperationHooks, CostEstimate, Operation, OperationExecCtx,
    OperationKind, OperationOutcome, SimpleOperation, SimpleOperationHooks,
};
pub use registry::OperationRegistry;
pub use scheduler::{execute_pipeline, ExecutionReport, ExecutionSummary};
pub use selector::{select_model, Selection, SelectionPath};
