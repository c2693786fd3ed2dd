//! Error taxonomy for the pipeline engine.
//!
//! Grounded on `fluent_core::error::FluentError`'s hand-rolled
//! enum-of-enums, but expressed with `thiserror` so pipeline authors and
//! CLI callers can match on variants instead of parsing `Display` output.

use thiserror::Error;

use crate::types::StepId;

/// Top-level error surfaced by `cascade-engine`. Every variant here maps
/// 1:1 onto a failure mode named in the engine's error handling design.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The pipeline's shape itself is invalid: duplicate ids, a dependency
    /// naming a step that doesn't exist, or a cycle.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// A step's resolved input failed schema or shape checks before
    /// dispatch.
    #[error("validation error in step {step}: {message}")]
    Validation { step: StepId, message: String },

    /// The sanitizer flagged the assembled prompt as likely prompt
    /// injection or otherwise unsafe to send upstream.
    #[error("suspicious content in step {step}: {reason}")]
    SuspiciousContent { step: StepId, reason: String },

    /// The selected provider adapter returned an error (HTTP failure,
    /// vendor-side error payload, malformed response envelope).
    #[error("provider error in step {step}: {source}")]
    Provider {
        step: StepId,
        #[source]
        source: anyhow::Error,
    },

    /// The operation's timeout elapsed before the provider responded.
    #[error("step {step} timed out after {elapsed_ms}ms")]
    Timeout { step: StepId, elapsed_ms: u64 },

    /// The provider's response could not be turned into the shape the
    /// operation expected, even after JSON repair.
    #[error("failed to parse output of step {step}: {message}")]
    Parse { step: StepId, message: String },

    /// The run's `CancellationToken` fired mid-flight.
    #[error("pipeline run {request_id} was cancelled")]
    Cancelled { request_id: uuid::Uuid },

    /// Catch-all for invariants the engine itself is responsible for
    /// upholding; seeing this means a bug in the engine, not bad input.
    #[error("internal engine error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Whether this failure is eligible for retry under a step's
    /// [`crate::types::RetryPolicy`]. Only provider and timeout failures
    /// are retried by default — everything else is assumed to fail the
    /// same way on a second attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Provider { .. } | EngineError::Timeout { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Configuration(_) => "configuration_error",
            EngineError::Validation { .. } => "validation_error",
            EngineError::SuspiciousContent { .. } => "suspicious_content_error",
            EngineError::Provider { .. } => "provider_error",
            EngineError::Timeout { .. } => "timeout_error",
            EngineError::Parse { .. } => "parse_error",
            EngineError::Cancelled { .. } => "cancelled_error",
            EngineError::Internal(_) => "internal_error",
        }
    }
}

/// Errors raised while constructing or validating a [`crate::types::Pipeline`].
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("duplicate step id: {0}")]
    DuplicateStepId(String),

    #[error("step {step} declares dependency on unknown step {dependency}")]
    UnknownDependency { step: StepId, dependency: StepId },

    #[error("cycle detected: {}", .0.join(" -> "))]
    CycleDetected(Vec<StepId>),

    #[error("pipeline has no steps")]
    EmptyPipeline,

    #[error("operation {0} is not registered")]
    UnknownOperation(String),

    #[error("no model configured for operation {operation} at quality {quality}")]
    NoModelForQuality { operation: String, quality: String },
}

#[derive(Debug, Error)]
pub enum RepairError {
    #[error("no JSON object could be recovered from the response: {0}")]
    Unrecoverable(String),
}

#[derive(Debug, Error)]
pub enum StorageSinkError {
    #[error("storage sink unavailable: {0}")]
    Unavailable(#[from] anyhow::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;
