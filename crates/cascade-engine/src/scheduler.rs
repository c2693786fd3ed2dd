//! The streaming pipeline engine: topological execution with concurrency
//! for ready steps, conditional gating, input mapping, cascade-skip on
//! upstream failure, per-step retry, and a progress callback stream.
//!
//! Grounded on `fluent_pipeline::Pipeline::run` (a single generic DAG
//! executor walking `Node`/`Edge` with a `TransferData` accumulator) —
//! the control-flow shape (drive a frontier, fan out ready work, merge
//! results back in) carries over; the node/edge model is replaced with
//! the flat step-list-plus-dependencies shape [`crate::dag::Dag`]
//! validates, and retry/cascade-skip/conditional gating are new
//! behaviour `fluent_pipeline`'s executor didn't have.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use cascade_core::types::{
    ExecutionContext, PipelineStateUpdate, PipelineStep, StepId, StepResult, StepState,
};
use chrono::Utc;
use serde_json::Value;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::dag::Dag;
use crate::observability::{NullStorageSink, ProgressCallback, StorageSink};
use crate::operation::{Operation, OperationExecCtx, OperationOutcome};
use crate::registry::OperationRegistry;

#[derive(Debug, Clone, Default)]
pub struct ExecutionSummary {
    pub successful_steps: usize,
    pub failed_steps: usize,
    pub skipped_steps: usize,
    pub total: usize,
    pub has_partial_failure: bool,
}

#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub results: HashMap<StepId, StepResult>,
    pub summary: ExecutionSummary,
}

/// Runs `dag` to completion against `registry`, starting from
/// `pipeline_input` under `context`. Returns once every step has reached a
/// terminal state — the contract never rejects a partial failure, it
/// reports one in `summary.has_partial_failure` instead.
pub async fn execute_pipeline(
    dag: &Dag,
    registry: &OperationRegistry,
    pipeline_input: Value,
    context: ExecutionContext,
    on_update: Option<ProgressCallback>,
    sink: Option<Arc<dyn StorageSink>>,
) -> ExecutionReport {
    let sink = sink.unwrap_or_else(|| Arc::new(NullStorageSink));
    let total = dag.steps().len();
    let mut states: HashMap<StepId, StepState> =
        dag.steps().iter().map(|s| (s.id.clone(), StepState::Pending)).collect();
    let mut results: HashMap<StepId, StepResult> = HashMap::with_capacity(total);
    let mut join_set: JoinSet<StepOutcome> = JoinSet::new();
    let mut in_flight: HashSet<StepId> = HashSet::new();

    loop {
        if context.is_cancelled() {
            // Pending/Ready steps never started; skip them outright. Running
            // steps are left alone here — their tasks observe the same
            // cancellation token and settle into `Failed{Cancelled}` on their
            // own, drained below, rather than being force-marked while still
            // in flight.
            cancel_remaining(dag, &mut states, &mut results, &on_update, &context, total);
            while let Some(joined) = join_set.join_next().await {
                match joined {
                    Ok(outcome) => {
                        let step_id = outcome.step_id.clone();
                        in_flight.remove(&step_id);
                        apply_outcome(outcome, &mut states, &mut results, &sink).await;
                        emit(&on_update, &context, &states, &step_id, total);
                    }
                    Err(join_error) => {
                        error!(%join_error, "pipeline step task panicked during cancellation drain");
                    }
                }
            }
            break;
        }

        let ready: Vec<StepId> = dag
            .steps()
            .iter()
            .filter(|s| states[&s.id] == StepState::Pending)
            .filter(|s| s.dependencies.iter().all(|d| states[d].is_terminal()))
            .map(|s| s.id.clone())
            .collect();

        if ready.is_empty() && in_flight.is_empty() {
            break;
        }

        for step_id in ready {
            let step = dag.step(&step_id).expect("ready step must exist in dag").clone();

            if let Some(failed_deps) = cascading_failures(&step, &results) {
                states.insert(step_id.clone(), StepState::Skipped);
                results.insert(
                    step_id.clone(),
                    StepResult::Skipped {
                        reason: "failed_dependency".to_string(),
                        failed_dependencies: Some(failed_deps),
                    },
                );
                emit(&on_update, &context, &states, &step_id, total);
                continue;
            }

            if let Some(condition) = &step.condition {
                if !condition(&results) {
                    states.insert(step_id.clone(), StepState::Skipped);
                    results.insert(
                        step_id.clone(),
                        StepResult::Skipped {
                            reason: "condition_false".to_string(),
                            failed_dependencies: None,
                        },
                    );
                    emit(&on_update, &context, &states, &step_id, total);
                    continue;
                }
            }

            let Some(operation) = registry.get(&step.operation_id) else {
                states.insert(step_id.clone(), StepState::Failed);
                results.insert(
                    step_id.clone(),
                    StepResult::Failed {
                        error_kind: "configuration_error".to_string(),
                        message: format!("operation '{}' is not registered", step.operation_id),
                        retries_used: 0,
                    },
                );
                emit(&on_update, &context, &states, &step_id, total);
                continue;
            };

            let operation_input = match &step.map_input {
                Some(mapper) => mapper(&results),
                None => pipeline_input.clone(),
            };

            let mut step_context = context.clone();
            if let Some(quality) = step.quality {
                step_context.quality = quality;
            }

            states.insert(step_id.clone(), StepState::Running);
            emit(&on_update, &context, &states, &step_id, total);
            in_flight.insert(step_id.clone());

            let sink = sink.clone();
            join_set.spawn(async move {
                run_step_with_retry(operation, operation_input, step, step_context, sink).await
            });
        }

        match join_set.join_next().await {
            Some(Ok(outcome)) => {
                let step_id = outcome.step_id.clone();
                in_flight.remove(&step_id);
                apply_outcome(outcome, &mut states, &mut results, &sink).await;
                emit(&on_update, &context, &states, &step_id, total);
            }
            Some(Err(join_error)) => {
                error!(%join_error, "pipeline step task panicked");
            }
            None => {
                if in_flight.is_empty() {
                    break;
                }
            }
        }
    }

    let summary = summarize(&results, total);
    ExecutionReport { results, summary }
}

struct StepOutcome {
    step_id: StepId,
    result: Result<OperationOutcome, cascade_core::error::EngineError>,
    retries_used: u32,
}

/// Returns the subset of `step`'s dependencies that ended non-Completed,
/// or `None` if every dependency completed successfully.
fn cascading_failures(step: &PipelineStep, results: &HashMap<StepId, StepResult>) -> Option<Vec<StepId>> {
    let failed: Vec<StepId> = step
        .dependencies
        .iter()
        .filter(|dep| !matches!(results.get(*dep), Some(StepResult::Completed { .. })))
        .cloned()
        .collect();
    if failed.is_empty() {
        None
    } else {
        Some(failed)
    }
}

async fn run_step_with_retry(
    operation: Arc<dyn Operation>,
    input: Value,
    step: PipelineStep,
    context: ExecutionContext,
    sink: Arc<dyn StorageSink>,
) -> StepOutcome {
    let mut attempt: u32 = 0;
    loop {
        if context.is_cancelled() {
            return StepOutcome {
                step_id: step.id.clone(),
                result: Err(cascade_core::error::EngineError::Cancelled {
                    request_id: context.request_id,
                }),
                retries_used: attempt,
            };
        }

        let exec_ctx = OperationExecCtx {
            step_id: &step.id,
            context: &context,
            custom_prompt: step.custom_prompt.as_deref(),
            sink: sink.as_ref(),
        };
        let effective_timeout_ms = operation.timeout_ms(&context).or(step.timeout_ms);
        let call = operation.execute(input.clone(), exec_ctx);
        let dispatch = async {
            match effective_timeout_ms {
                Some(ms) => match tokio::time::timeout(Duration::from_millis(ms), call).await {
                    Ok(r) => r,
                    Err(_) => Err(cascade_core::error::EngineError::Timeout {
                        step: step.id.clone(),
                        elapsed_ms: ms,
                    }),
                },
                None => call.await,
            }
        };
        let result = tokio::select! {
            biased;
            _ = context.cancellation.cancelled() => Err(cascade_core::error::EngineError::Cancelled {
                request_id: context.request_id,
            }),
            r = dispatch => r,
        };

        match result {
            Ok(outcome) => {
                return StepOutcome {
                    step_id: step.id.clone(),
                    result: Ok(outcome),
                    retries_used: attempt,
                }
            }
            Err(e) => {
                let retries_remaining = attempt + 1 < step.retry.max_attempts;
                if e.is_retryable() && retries_remaining {
                    let backoff_ms = (step.retry.initial_backoff_ms as f64
                        * step.retry.backoff_multiplier.powi(attempt as i32))
                        as u64;
                    warn!(step = %step.id, attempt, backoff_ms, error = %e, "retrying step after provider/timeout failure");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    attempt += 1;
                    continue;
                }
                return StepOutcome {
                    step_id: step.id.clone(),
                    result: Err(e),
                    retries_used: attempt,
                };
            }
        }
    }
}

async fn apply_outcome(
    outcome: StepOutcome,
    states: &mut HashMap<StepId, StepState>,
    results: &mut HashMap<StepId, StepResult>,
    sink: &Arc<dyn StorageSink>,
) {
    match outcome.result {
        Ok(o) => {
            states.insert(outcome.step_id.clone(), StepState::Completed);
            results.insert(
                outcome.step_id,
                StepResult::Completed {
                    output: o.output,
                    cost_usd: o.real_cost_usd,
                    credits: o.credits_charged,
                    margin_percent: o.margin_percent,
                },
            );
        }
        Err(e) => {
            sink.on_step_failed(&outcome.step_id, &e.to_string(), outcome.retries_used).await;
            states.insert(outcome.step_id.clone(), StepState::Failed);
            results.insert(
                outcome.step_id,
                StepResult::Failed {
                    error_kind: e.kind().to_string(),
                    message: e.to_string(),
                    retries_used: outcome.retries_used,
                },
            );
        }
    }
}

/// Marks every step that never started (`Pending`/`Ready`) as
/// `Skipped{reason: "cancelled"}`. Steps already `Running` are deliberately
/// left untouched — their tasks are still in flight against the same
/// cancellation token and are awaited to settle by the caller rather than
/// being overwritten here.
fn cancel_remaining(
    dag: &Dag,
    states: &mut HashMap<StepId, StepState>,
    results: &mut HashMap<StepId, StepResult>,
    on_update: &Option<ProgressCallback>,
    context: &ExecutionContext,
    total: usize,
) {
    for step in dag.steps() {
        let state = states.get(&step.id).copied().unwrap_or(StepState::Pending);
        if state == StepState::Running || state.is_terminal() {
            continue;
        }
        states.insert(step.id.clone(), StepState::Skipped);
        results.insert(
            step.id.clone(),
            StepResult::Skipped {
                reason: "cancelled".to_string(),
                failed_dependencies: None,
            },
        );
        emit(on_update, context, states, &step.id, total);
    }
}

fn emit(
    on_update: &Option<ProgressCallback>,
    context: &ExecutionContext,
    states: &HashMap<StepId, StepState>,
    last_changed_step: &str,
    total: usize,
) {
    let Some(callback) = on_update else { return };
    let terminal_count = states.values().filter(|s| s.is_terminal()).count();
    let progress_percent = if total == 0 {
        100
    } else {
        ((terminal_count as f64 / total as f64) * 100.0).round() as u8
    };
    let update = PipelineStateUpdate {
        request_id: context.request_id,
        progress_percent,
        last_changed_step: last_changed_step.to_string(),
        states: states.clone(),
        emitted_at: Utc::now(),
    };
    callback(update);
}

fn summarize(results: &HashMap<StepId, StepResult>, total: usize) -> ExecutionSummary {
    let mut summary = ExecutionSummary {
        total,
        ..Default::default()
    };
    for result in results.values() {
        match result {
            StepResult::Completed { .. } => summary.successful_steps += 1,
            StepResult::Failed { .. } => {
                summary.failed_steps += 1;
                summary.has_partial_failure = true;
            }
            StepResult::Skipped { .. } => summary.skipped_steps += 1,
        }
    }
    info!(
        successful = summary.successful_steps,
        failed = summary.failed_steps,
        skipped = summary.skipped_steps,
        total,
        "pipeline execution finished"
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{CostEstimate, OperationKind};
    use async_trait::async_trait;
    use cascade_core::types::{Pipeline, QualityLevel, RetryPolicy};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct NoopOp {
        id: String,
        output: Value,
    }

    #[async_trait]
    impl Operation for NoopOp {
        fn id(&self) -> &str {
            &self.id
        }
        fn name(&self) -> &str {
            &self.id
        }
        fn kind(&self) -> OperationKind {
            OperationKind::Validation
        }
        fn validate(&self, _input: &Value) -> Vec<String> {
            Vec::new()
        }
        async fn execute(
            &self,
            _input: Value,
            ctx: OperationExecCtx<'_>,
        ) -> Result<OperationOutcome, cascade_core::error::EngineError> {
            ctx.sink.on_step_complete(ctx.step_id, &self.output).await;
            Ok(OperationOutcome {
                output: self.output.clone(),
                real_cost_usd: 0.0,
                credits_charged: 0,
                margin_percent: 0.0,
            })
        }
        fn estimate_cost(&self, _input: &Value, _context: &ExecutionContext) -> CostEstimate {
            CostEstimate::default()
        }
    }

    struct AlwaysFailOp {
        id: String,
        attempts: AtomicU32,
    }

    #[async_trait]
    impl Operation for AlwaysFailOp {
        fn id(&self) -> &str {
            &self.id
        }
        fn name(&self) -> &str {
            &self.id
        }
        fn kind(&self) -> OperationKind {
            OperationKind::Ai
        }
        fn validate(&self, _input: &Value) -> Vec<String> {
            Vec::new()
        }
        async fn execute(
            &self,
            _input: Value,
            ctx: OperationExecCtx<'_>,
        ) -> Result<OperationOutcome, cascade_core::error::EngineError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(cascade_core::error::EngineError::Provider {
                step: ctx.step_id.clone(),
                source: anyhow::anyhow!("simulated provider outage"),
            })
        }
        fn estimate_cost(&self, _input: &Value, _context: &ExecutionContext) -> CostEstimate {
            CostEstimate::default()
        }
    }

    fn context() -> ExecutionContext {
        ExecutionContext::new(QualityLevel::Standard)
    }

    #[tokio::test]
    async fn linear_chain_completes_every_step() {
        let pipeline = Pipeline::new(
            "p",
            vec![
                PipelineStep::new("a", "noop_a"),
                PipelineStep::new("b", "noop_b").depends_on(["a"]),
                PipelineStep::new("c", "noop_c").depends_on(["b"]),
            ],
        );
        let dag = Dag::build(pipeline).unwrap();
        let mut registry = OperationRegistry::new();
        for id in ["a", "b", "c"] {
            registry.register(Arc::new(NoopOp {
                id: format!("noop_{id}"),
                output: json!({"ok": true}),
            }));
        }
        let report = execute_pipeline(&dag, &registry, json!({}), context(), None, None).await;
        assert_eq!(report.summary.successful_steps, 3);
        assert_eq!(report.summary.total, 3);
        assert!(!report.summary.has_partial_failure);
        for id in ["a", "b", "c"] {
            assert!(matches!(report.results[id], StepResult::Completed { .. }));
        }
    }

    #[tokio::test]
    async fn cascade_skip_propagates_through_dependents() {
        let pipeline = Pipeline::new(
            "p",
            vec![
                PipelineStep::new("a", "noop_a"),
                PipelineStep::new("b", "fail_b").depends_on(["a"]),
                PipelineStep::new("c", "noop_c").depends_on(["b"]),
            ],
        );
        let dag = Dag::build(pipeline).unwrap();
        let mut registry = OperationRegistry::new();
        registry.register(Arc::new(NoopOp {
            id: "noop_a".to_string(),
            output: json!({}),
        }));
        registry.register(Arc::new(AlwaysFailOp {
            id: "fail_b".to_string(),
            attempts: AtomicU32::new(0),
        }));
        registry.register(Arc::new(NoopOp {
            id: "noop_c".to_string(),
            output: json!({}),
        }));

        let report = execute_pipeline(&dag, &registry, json!({}), context(), None, None).await;
        assert!(matches!(report.results["a"], StepResult::Completed { .. }));
        assert!(matches!(report.results["b"], StepResult::Failed { .. }));
        match &report.results["c"] {
            StepResult::Skipped {
                reason,
                failed_dependencies,
            } => {
                assert_eq!(reason, "failed_dependency");
                assert_eq!(failed_dependencies.as_deref(), Some(&["b".to_string()][..]));
            }
            other => panic!("expected Skipped, got {other:?}"),
        }
        assert!(report.summary.has_partial_failure);
        assert_eq!(
            (
                report.summary.successful_steps,
                report.summary.failed_steps,
                report.summary.skipped_steps
            ),
            (1, 1, 1)
        );
    }

    #[tokio::test]
    async fn conditional_gate_skips_when_false() {
        let pipeline = Pipeline::new(
            "p",
            vec![
                PipelineStep::new("a", "noop_a"),
                PipelineStep::new("b", "noop_b")
                    .depends_on(["a"])
                    .with_condition(|results| match results.get("a") {
                        Some(StepResult::Completed { output, .. }) => {
                            output["should_run_b"].as_bool().unwrap_or(false)
                        }
                        _ => false,
                    }),
                PipelineStep::new("c", "noop_c").depends_on(["a"]),
            ],
        );
        let dag = Dag::build(pipeline).unwrap();
        let mut registry = OperationRegistry::new();
        registry.register(Arc::new(NoopOp {
            id: "noop_a".to_string(),
            output: json!({"should_run_b": false}),
        }));
        registry.register(Arc::new(NoopOp {
            id: "noop_b".to_string(),
            output: json!({}),
        }));
        registry.register(Arc::new(NoopOp {
            id: "noop_c".to_string(),
            output: json!({}),
        }));

        let report = execute_pipeline(&dag, &registry, json!({}), context(), None, None).await;
        assert!(matches!(report.results["a"], StepResult::Completed { .. }));
        assert!(matches!(report.results["c"], StepResult::Completed { .. }));
        match &report.results["b"] {
            StepResult::Skipped { reason, .. } => assert_eq!(reason, "condition_false"),
            other => panic!("expected Skipped, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn map_input_threads_dependency_output_forward() {
        let pipeline = Pipeline::new(
            "p",
            vec![
                PipelineStep::new("a", "noop_a"),
                PipelineStep::new("b", "noop_b")
                    .depends_on(["a"])
                    .with_map_input(|results| match results.get("a") {
                        Some(StepResult::Completed { output, .. }) => output.clone(),
                        _ => json!(null),
                    }),
            ],
        );
        let dag = Dag::build(pipeline).unwrap();
        let mut registry = OperationRegistry::new();
        registry.register(Arc::new(NoopOp {
            id: "noop_a".to_string(),
            output: json!({"from": "a"}),
        }));
        registry.register(Arc::new(NoopOp {
            id: "noop_b".to_string(),
            output: json!({"from": "b"}),
        }));
        let report = execute_pipeline(&dag, &registry, json!({"from": "pipeline"}), context(), None, None).await;
        assert!(matches!(report.results["b"], StepResult::Completed { .. }));
    }

    #[tokio::test]
    async fn retries_exhaust_before_failing_terminally() {
        let mut step = PipelineStep::new("a", "fail_a");
        step.retry = RetryPolicy {
            max_attempts: 3,
            initial_backoff_ms: 1,
            backoff_multiplier: 1.0,
        };
        let pipeline = Pipeline::new("p", vec![step]);
        let dag = Dag::build(pipeline).unwrap();
        let mut registry = OperationRegistry::new();
        registry.register(Arc::new(AlwaysFailOp {
            id: "fail_a".to_string(),
            attempts: AtomicU32::new(0),
        }));
        let report = execute_pipeline(&dag, &registry, json!({}), context(), None, None).await;
        match &report.results["a"] {
            StepResult::Failed { retries_used, .. } => assert_eq!(*retries_used, 2),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    struct SlowOp {
        id: String,
        sleep_ms: u64,
    }

    #[async_trait]
    impl Operation for SlowOp {
        fn id(&self) -> &str {
            &self.id
        }
        fn name(&self) -> &str {
            &self.id
        }
        fn kind(&self) -> OperationKind {
            OperationKind::Validation
        }
        fn validate(&self, _input: &Value) -> Vec<String> {
            Vec::new()
        }
        async fn execute(
            &self,
            _input: Value,
            _ctx: OperationExecCtx<'_>,
        ) -> Result<OperationOutcome, cascade_core::error::EngineError> {
            tokio::time::sleep(Duration::from_millis(self.sleep_ms)).await;
            Ok(OperationOutcome {
                output: json!({}),
                real_cost_usd: 0.0,
                credits_charged: 0,
                margin_percent: 0.0,
            })
        }
        fn estimate_cost(&self, _input: &Value, _context: &ExecutionContext) -> CostEstimate {
            CostEstimate::default()
        }
    }

    #[tokio::test]
    async fn cancellation_settles_in_flight_step_and_skips_pending_ones() {
        let pipeline = Pipeline::new(
            "p",
            vec![
                PipelineStep::new("a", "slow_a"),
                PipelineStep::new("c", "noop_c").depends_on(["a"]),
            ],
        );
        let dag = Dag::build(pipeline).unwrap();
        let mut registry = OperationRegistry::new();
        registry.register(Arc::new(SlowOp {
            id: "slow_a".to_string(),
            sleep_ms: 200,
        }));
        registry.register(Arc::new(NoopOp {
            id: "noop_c".to_string(),
            output: json!({}),
        }));

        let ctx = context();
        let token = ctx.cancellation.clone();
        let handle = tokio::spawn(async move { execute_pipeline(&dag, &registry, json!({}), ctx, None, None).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();

        let report = handle.await.unwrap();
        match &report.results["a"] {
            StepResult::Failed { error_kind, .. } => assert_eq!(error_kind, "cancelled_error"),
            other => panic!("expected Failed(Cancelled), got {other:?}"),
        }
        match &report.results["c"] {
            StepResult::Skipped { reason, .. } => assert_eq!(reason, "cancelled"),
            other => panic!("expected Skipped, got {other:?}"),
        }
        // every step reached a terminal state, none left Pending/Running
        assert_eq!(report.summary.total, 2);
    }

    #[tokio::test]
    async fn unregistered_operation_fails_the_step() {
        let pipeline = Pipeline::new("p", vec![PipelineStep::new("a", "missing_op")]);
        let dag = Dag::build(pipeline).unwrap();
        let registry = OperationRegistry::new();
        let report = execute_pipeline(&dag, &registry, json!({}), context(), None, None).await;
        assert!(matches!(report.results["a"], StepResult::Failed { .. }));
    }

    #[tokio::test]
    async fn progress_reaches_100_percent_on_completion() {
        let pipeline = Pipeline::new(
            "p",
            vec![PipelineStep::new("a", "noop_a"), PipelineStep::new("b", "noop_b")],
        );
        let dag = Dag::build(pipeline).unwrap();
        let mut registry = OperationRegistry::new();
        for id in ["a", "b"] {
            registry.register(Arc::new(NoopOp {
                id: format!("noop_{id}"),
                output: json!({}),
            }));
        }
        let updates = Arc::new(std::sync::Mutex::new(Vec::new()));
        let updates_clone = updates.clone();
        let callback: ProgressCallback = Arc::new(move |update| {
            updates_clone.lock().unwrap().push(update.progress_percent);
        });
        let report = execute_pipeline(&dag, &registry, json!({}), context(), Some(callback), None).await;
        assert_eq!(report.summary.successful_steps, 2);
        let seen = updates.lock().unwrap();
        assert_eq!(*seen.last().unwrap(), 100);
        let mut sorted = seen.clone();
        sorted.sort();
        assert_eq!(*seen, sorted, "progress must be monotonically non-decreasing");
    }
}
