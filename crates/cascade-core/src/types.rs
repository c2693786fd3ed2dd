//! Core data model shared by every crate in the workspace: the types that
//! describe a pipeline's shape, the execution context handed to an
//! operation, and the results/state the scheduler produces as it runs.
//!
//! # Examples
//!
//! ```
//! use cascade_core::types::{QualityLevel, Provider};
//!
//! let level = QualityLevel::Standard;
//! assert_eq!(level.to_string(), "standard");
//! assert_eq!(Provider::OpenAi.to_string(), "openai");
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub type StepId = String;

/// How much the caller is willing to spend, in rough trade against latency
/// and capability. Selects a row out of an [`OperationAIConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityLevel {
    Fast,
    Standard,
    Expert,
}

impl fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QualityLevel::Fast => "fast",
            QualityLevel::Standard => "standard",
            QualityLevel::Expert => "expert",
        };
        write!(f, "{s}")
    }
}

/// A vendor behind the [`Provider`](crate::types::Provider) abstraction.
/// Closed enumeration: adding a vendor is a workspace-wide change (new
/// adapter crate, new pricing row), not something pipeline authors extend
/// at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Anthropic,
    OpenAi,
    Google,
    Mistral,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Provider::Anthropic => "anthropic",
            Provider::OpenAi => "openai",
            Provider::Google => "google",
            Provider::Mistral => "mistral",
        };
        write!(f, "{s}")
    }
}

/// Everything a provider adapter needs to place one `generate()` call:
/// which vendor, which model, its pricing, and its JSON-mode capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub provider: Provider,
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default)]
    pub top_p: Option<f64>,
    /// USD per 1,000,000 input tokens.
    pub input_cost_per_million: f64,
    /// USD per 1,000,000 output tokens.
    pub output_cost_per_million: f64,
    pub supports_json_mode: bool,
    pub max_output_tokens: Option<u32>,
    /// Per-call timeout enforced by the scheduler around the provider
    /// dispatch. `None` means the provider's own HTTP client timeout
    /// applies and the engine does not additionally bound the call.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Appended verbatim to the assembled system prompt, e.g. a
    /// house-style instruction that only applies at this quality tier.
    #[serde(default)]
    pub system_prompt_suffix: Option<String>,
}

fn default_temperature() -> f64 {
    0.7
}

/// Per-operation model menu: one [`ModelConfig`] per [`QualityLevel`], the
/// fallback menu consulted when the user's preferences forbid the primary
/// tier's provider, and whether this operation demands a model capable of
/// structured (JSON) output regardless of what the caller asked for.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OperationAIConfig {
    pub models: HashMap<QualityLevel, ModelConfig>,
    #[serde(default)]
    pub fallback_models: HashMap<QualityLevel, ModelConfig>,
    #[serde(default)]
    pub disallowed_providers: Vec<Provider>,
    #[serde(default)]
    pub requires_structured_output: bool,
}

/// Per-request knobs threaded through every operation in a pipeline run.
/// Immutable for the lifetime of one `execute()` call; the scheduler hands
/// the same instance (behind a reference) to every step.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub request_id: Uuid,
    pub user_id: Option<String>,
    pub project_id: Option<String>,
    pub quality: QualityLevel,
    pub avoid_providers: Vec<Provider>,
    pub max_cost_per_request_usd: Option<f64>,
    pub priority: Option<i32>,
    pub shared_data: HashMap<String, Value>,
    pub cancellation: CancellationToken,
    pub started_at: DateTime<Utc>,
}

impl ExecutionContext {
    pub fn new(quality: QualityLevel) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            user_id: None,
            project_id: None,
            quality,
            avoid_providers: Vec::new(),
            max_cost_per_request_usd: None,
            priority: None,
            shared_data: HashMap::new(),
            cancellation: CancellationToken::new(),
            started_at: Utc::now(),
        }
    }

    pub fn avoiding(mut self, providers: Vec<Provider>) -> Self {
        self.avoid_providers = providers;
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_max_cost(mut self, max_cost_usd: f64) -> Self {
        self.max_cost_per_request_usd = Some(max_cost_usd);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// Retry policy attached to a single step. `retryable_kinds` narrows which
/// [`crate::error::EngineError`] variants are eligible; everything else
/// fails the step on first attempt regardless of `max_attempts`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff_ms: 500,
            backoff_multiplier: 2.0,
        }
    }
}

type InputMapper = dyn Fn(&HashMap<StepId, StepResult>) -> serde_json::Value + Send + Sync;
type ConditionFn = dyn Fn(&HashMap<StepId, StepResult>) -> bool + Send + Sync;

/// One node in a [`Pipeline`]. Identity is `id`; wiring is purely the
/// `dependencies` list, there is no separate edge type — the DAG is derived
/// from these lists at validation time.
#[derive(Clone)]
pub struct PipelineStep {
    pub id: StepId,
    pub operation_id: String,
    pub dependencies: Vec<StepId>,
    pub quality: Option<QualityLevel>,
    pub custom_prompt: Option<String>,
    pub retry: RetryPolicy,
    pub timeout_ms: Option<u64>,
    /// Derives this step's input from the results of steps it depends on.
    /// Absent means "pass the pipeline's original input through unchanged".
    pub map_input: Option<Arc<InputMapper>>,
    /// Gates execution: when present and it evaluates to `false` once all
    /// dependencies have settled, the step is skipped rather than run.
    pub condition: Option<Arc<ConditionFn>>,
}

impl fmt::Debug for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineStep")
            .field("id", &self.id)
            .field("operation_id", &self.operation_id)
            .field("dependencies", &self.dependencies)
            .field("quality", &self.quality)
            .field("has_map_input", &self.map_input.is_some())
            .field("has_condition", &self.condition.is_some())
            .finish()
    }
}

impl PipelineStep {
    pub fn new(id: impl Into<String>, operation_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            operation_id: operation_id.into(),
            dependencies: Vec::new(),
            quality: None,
            custom_prompt: None,
            retry: RetryPolicy::default(),
            timeout_ms: None,
            map_input: None,
            condition: None,
        }
    }

    pub fn depends_on(mut self, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.dependencies = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_map_input(
        mut self,
        f: impl Fn(&HashMap<StepId, StepResult>) -> serde_json::Value + Send + Sync + 'static,
    ) -> Self {
        self.map_input = Some(Arc::new(f));
        self
    }

    pub fn with_condition(
        mut self,
        f: impl Fn(&HashMap<StepId, StepResult>) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.condition = Some(Arc::new(f));
        self
    }
}

/// An unvalidated, flat list of steps. `cascade_engine::dag::Dag::build`
/// turns this into a validated, cycle-free structure with computed levels.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    pub id: String,
    pub steps: Vec<PipelineStep>,
}

impl Pipeline {
    pub fn new(id: impl Into<String>, steps: Vec<PipelineStep>) -> Self {
        Self { id: id.into(), steps }
    }
}

/// Terminal outcome of one step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum StepResult {
    Completed {
        output: serde_json::Value,
        cost_usd: f64,
        credits: u64,
        margin_percent: f64,
    },
    Failed {
        error_kind: String,
        message: String,
        retries_used: u32,
    },
    Skipped {
        reason: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        failed_dependencies: Option<Vec<StepId>>,
    },
}

impl StepResult {
    pub fn is_terminal_failure(&self) -> bool {
        matches!(self, StepResult::Failed { .. } | StepResult::Skipped { .. })
    }
}

/// Scheduler-tracked lifecycle state for a step, independent of its final
/// [`StepResult`] (a step reaches `Completed`/`Failed`/`Skipped` state but
/// carries the richer result payload separately in the results map).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepState {
    Pending,
    Ready,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl StepState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StepState::Completed | StepState::Failed | StepState::Skipped
        )
    }
}

/// One progress event emitted as the scheduler advances. Consecutive
/// updates for the same run differ in exactly one step's state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStateUpdate {
    pub request_id: Uuid,
    pub progress_percent: u8,
    pub last_changed_step: StepId,
    pub states: HashMap<StepId, StepState>,
    pub emitted_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_level_display_matches_serde_rename() {
        assert_eq!(QualityLevel::Fast.to_string(), "fast");
        assert_eq!(QualityLevel::Expert.to_string(), "expert");
    }

    #[test]
    fn step_state_terminal_classification() {
        assert!(!StepState::Pending.is_terminal());
        assert!(!StepState::Ready.is_terminal());
        assert!(!StepState::Running.is_terminal());
        assert!(StepState::Completed.is_terminal());
        assert!(StepState::Failed.is_terminal());
        assert!(StepState::Skipped.is_terminal());
    }

    #[test]
    fn pipeline_step_builder_sets_dependencies() {
        let step = PipelineStep::new("b", "generate_text").depends_on(["a"]);
        assert_eq!(step.dependencies, vec!["a".to_string()]);
    }
}
