//! The operation kernel: the shared envelope every step's unit of work
//! runs inside, plus the trait pipeline authors implement to plug in a new
//! kind of step.
//!
//! Grounded on the per-vendor `Engine` implementations in `fluent-engines`
//! sharing an `execute()` envelope, generalized into one `Operation` trait
//! plus a shared "envelope" struct (here, [`AiOperation`]) carrying the
//! lifecycle, parameterized over a small vtable of hooks
//! (`AiOperationHooks`) instead of inheritance.

use std::time::Instant;

use async_trait::async_trait;
use cascade_core::cost_calculator::{margin_percent, OperationCreditConfig};
use cascade_core::error::EngineError;
use cascade_core::input_validator::InputValidator;
use cascade_core::types::{ExecutionContext, ModelConfig, OperationAIConfig, StepId};
use cascade_providers::ProviderRegistry;
use serde_json::Value;
use tracing::{debug, info};

use crate::observability::StorageSink;
use crate::repair;
use crate::selector::select_model;
use crate::tokenizer::estimate_tokens;

/// The four operation flavours a step can be. AI operations run the full
/// envelope (validate → sanitize → dispatch → parse → cost); the others
/// skip the prompt/provider/parse steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Ai,
    Database,
    Validation,
    ExternalApi,
}

/// Estimated cost for an operation's input, without actually running it —
/// used by callers that want to budget a pipeline before execution.
#[derive(Debug, Clone, Copy, Default)]
pub struct CostEstimate {
    pub real_cost_usd: f64,
    pub credits: u64,
}

/// What a successful `execute()` produces: the parsed/validated output
/// plus the cost and credit figures every operation attaches to its
/// result.
#[derive(Debug, Clone)]
pub struct OperationOutcome {
    pub output: Value,
    pub real_cost_usd: f64,
    pub credits_charged: u64,
    pub margin_percent: f64,
}

/// Everything an operation needs at dispatch time beyond its resolved
/// input: identity of the step it's running as (for sink events), the
/// request-wide execution context, an optional custom-instruction
/// fragment from the step definition, and the storage sink to report
/// lifecycle events to.
pub struct OperationExecCtx<'a> {
    pub step_id: &'a StepId,
    pub context: &'a ExecutionContext,
    pub custom_prompt: Option<&'a str>,
    pub sink: &'a dyn StorageSink,
}

/// The uniform surface every step's operation exposes to the scheduler.
/// `validate`/`execute`/`estimate_cost` mirror §4.2 exactly; `timeout_ms`
/// lets the scheduler wrap dispatch without needing to know whether the
/// operation is AI-backed.
#[async_trait]
pub trait Operation: Send + Sync {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
    fn kind(&self) -> OperationKind;

    /// Structural/shape checks on `input`. Returns every violation found —
    /// the kernel aggregates these into one `ValidationError` rather than
    /// failing on the first, so a caller with several bad fields gets the
    /// whole list in one round trip.
    fn validate(&self, input: &Value) -> Vec<String>;

    async fn execute(&self, input: Value, ctx: OperationExecCtx<'_>) -> Result<OperationOutcome, EngineError>;

    fn estimate_cost(&self, input: &Value, context: &ExecutionContext) -> CostEstimate;

    /// Per-call timeout to enforce around `execute`, if any. AI operations
    /// resolve this from the tier's `ModelConfig::timeout_ms`; other kinds
    /// default to no timeout.
    fn timeout_ms(&self, _context: &ExecutionContext) -> Option<u64> {
        None
    }
}

/// The vtable an AI operation author fills in; [`AiOperation`] wraps this
/// with the shared validate → sanitize → dispatch → parse → cost envelope
/// so no two operations hand-roll that sequence.
pub trait AiOperationHooks: Send + Sync {
    fn id(&self) -> &str;
    fn name(&self) -> &str;

    /// Operation-specific checks beyond the generic payload/injection
    /// screen every AI operation gets for free. Return messages for any
    /// violation found.
    fn validate_additional(&self, _input: &Value) -> Vec<String> {
        Vec::new()
    }

    /// A structural schema for `input`, if this operation declares one.
    /// When present, the kernel runs it through `jsonschema` ahead of
    /// `validate_additional` so shape errors ("missing field", "wrong
    /// type") come back as the same aggregated violation list rather than
    /// each operation hand-rolling its own field checks.
    fn json_schema(&self) -> Option<schemars::schema::RootSchema> {
        None
    }

    fn system_prompt(&self, context: &ExecutionContext) -> String;
    fn user_prompt(&self, input: &Value, context: &ExecutionContext) -> String;

    /// Top-level fields the parsed JSON output must contain. Used to
    /// decide whether a repaired-but-incomplete parse needs the fallback
    /// skeleton merged in.
    fn required_fields(&self) -> Vec<&'static str> {
        Vec::new()
    }

    /// Skeleton merged in when the response is unparseable, or parseable
    /// but missing required fields, so callers downstream always see the
    /// expected shape.
    fn fallback_skeleton(&self) -> Value {
        Value::Object(Default::default())
    }

    /// Whether this operation's output must be JSON (vs. free text).
    /// When true, the provider's JSON-mode support is requested via
    /// `ModelConfig::supports_json_mode` and the kernel runs the parse
    /// step; when false, output is returned as `{"text": "..."}`.
    fn expects_json(&self) -> bool {
        true
    }
}

/// Per-operation configuration an [`AiOperation`] was built with: its
/// model menu (for the selector) and its credit price row (for the
/// billing step). Constructed once from the engine's config when a
/// pipeline's operation registry is assembled.
#[derive(Debug, Clone)]
pub struct AiOperationConfig {
    pub ai_config: OperationAIConfig,
    pub credits: OperationCreditConfig,
    pub usd_per_credit: f64,
}

/// The shared AI operation envelope. Implements §4.2 steps 1–9 once;
/// concrete operations provide only [`AiOperationHooks`] plus the config
/// every instance needs (model menu, credit pricing, provider registry).
pub struct AiOperation<H: AiOperationHooks> {
    hooks: H,
    config: AiOperationConfig,
    providers: &'static ProviderRegistry,
}

impl<H: AiOperationHooks> AiOperation<H> {
    pub fn new(hooks: H, config: AiOperationConfig, providers: &'static ProviderRegistry) -> Self {
        Self {
            hooks,
            config,
            providers,
        }
    }
}

#[async_trait]
impl<H: AiOperationHooks + Send + Sync> Operation for AiOperation<H> {
    fn id(&self) -> &str {
        self.hooks.id()
    }

    fn name(&self) -> &str {
        self.hooks.name()
    }

    fn kind(&self) -> OperationKind {
        OperationKind::Ai
    }

    fn validate(&self, input: &Value) -> Vec<String> {
        let mut errors = Vec::new();
        if !input.is_object() {
            errors.push("input must be a JSON object".to_string());
        }
        if let Some(schema) = self.hooks.json_schema() {
            errors.extend(validate_against_schema(&schema, input));
        }
        errors.extend(self.hooks.validate_additional(input));
        errors
    }

    fn timeout_ms(&self, context: &ExecutionContext) -> Option<u64> {
        select_model(self.hooks.id(), &self.config.ai_config, context)
            .ok()
            .and_then(|s| s.model.timeout_ms)
    }

    async fn execute(&self, input: Value, ctx: OperationExecCtx<'_>) -> Result<OperationOutcome, EngineError> {
        // 1. validation & sanitization
        let validation_started = Instant::now();
        let errors = self.validate(&input);
        let validation_duration_ms = validation_started.elapsed().as_millis() as u64;
        ctx.sink
            .on_step_validation(ctx.step_id, validation_duration_ms, &errors)
            .await;
        if !errors.is_empty() {
            return Err(EngineError::Validation {
                step: ctx.step_id.clone(),
                message: errors.join("; "),
            });
        }

        // 2. prompt assembly
        let mut system_prompt = self.hooks.system_prompt(ctx.context);
        let mut user_prompt = self.hooks.user_prompt(&input, ctx.context);
        if let Some(custom) = ctx.custom_prompt.filter(|c| !c.is_empty()) {
            user_prompt.push_str(&format!("\n\n<custom_instructions>{custom}</custom_instructions>"));
        }

        // 3. prompt sanitization
        if let Err(e) = InputValidator::check_for_injection_patterns(&user_prompt) {
            let reasons = vec![e.to_string()];
            ctx.sink.on_suspicious_content(ctx.step_id, &reasons).await;
            return Err(EngineError::SuspiciousContent {
                step: ctx.step_id.clone(),
                reason: reasons.join("; "),
            });
        }

        // 4. provider selection
        let selection = select_model(self.hooks.id(), &self.config.ai_config, ctx.context)
            .map_err(EngineError::Configuration)?;
        let model = selection.model.clone();
        if let Some(suffix) = &model.system_prompt_suffix {
            system_prompt.push_str("\n\n");
            system_prompt.push_str(suffix);
        }

        ctx.sink
            .on_step_start(ctx.step_id, &system_prompt, &user_prompt, Some(&model))
            .await;

        // 5. provider dispatch
        let provider = self
            .providers
            .get(model.provider)
            .await
            .map_err(|e| EngineError::Provider {
                step: ctx.step_id.clone(),
                source: e,
            })?;

        let dispatch_started = Instant::now();
        let generation = provider
            .generate(&model, &system_prompt, &user_prompt)
            .await
            .map_err(|e| EngineError::Provider {
                step: ctx.step_id.clone(),
                source: e,
            })?;
        let dispatch_duration_ms = dispatch_started.elapsed().as_millis() as u64;

        let input_tokens = if generation.usage.input_tokens > 0 {
            generation.usage.input_tokens
        } else {
            estimate_tokens(&system_prompt) + estimate_tokens(&user_prompt)
        };
        let output_tokens = if generation.usage.output_tokens > 0 {
            generation.usage.output_tokens
        } else {
            estimate_tokens(&generation.content)
        };

        // 6. cost attribution
        let real_cost_usd = (input_tokens as f64) * model.input_cost_per_million / 1_000_000.0
            + (output_tokens as f64) * model.output_cost_per_million / 1_000_000.0;
        let credits = self
            .config
            .credits
            .by_quality
            .get(&ctx.context.quality)
            .copied()
            .or(self.config.credits.default)
            .unwrap_or(0);
        let margin = margin_percent(credits, self.config.usd_per_credit, real_cost_usd);

        ctx.sink
            .on_provider_call(
                ctx.step_id,
                dispatch_duration_ms,
                input_tokens,
                output_tokens,
                real_cost_usd,
                credits,
                &generation.content,
            )
            .await;

        // 7. response cleanup + 8. parsing
        let output = if self.hooks.expects_json() {
            let cleaned = strip_fence(&generation.content);
            match serde_json::from_str::<Value>(&cleaned) {
                Ok(value) => merge_required_fields(value, &self.hooks),
                Err(_) => {
                    let skeleton = self.hooks.fallback_skeleton();
                    match repair::repair_and_parse(&cleaned, Some(&skeleton)) {
                        Ok(outcome) => {
                            debug!(step = %ctx.step_id, actions = ?outcome.actions, "repaired malformed JSON response");
                            merge_required_fields(outcome.value, &self.hooks)
                        }
                        Err(failure) => {
                            return Err(EngineError::Parse {
                                step: ctx.step_id.clone(),
                                message: format!(
                                    "unparseable even after repair ({}): raw response: {}",
                                    failure.original_error, generation.content
                                ),
                            });
                        }
                    }
                }
            }
        } else {
            Value::String(generation.content.clone())
        };

        info!(
            step = %ctx.step_id,
            operation = self.hooks.id(),
            cost_usd = real_cost_usd,
            credits,
            "AI operation completed"
        );

        // 9. emit
        ctx.sink.on_step_complete(ctx.step_id, &output).await;
        Ok(OperationOutcome {
            output,
            real_cost_usd,
            credits_charged: credits,
            margin_percent: margin,
        })
    }

    fn estimate_cost(&self, input: &Value, context: &ExecutionContext) -> CostEstimate {
        let selection = match select_model(self.hooks.id(), &self.config.ai_config, context) {
            Ok(s) => s,
            Err(_) => return CostEstimate::default(),
        };
        let approx_input = estimate_tokens(&self.hooks.user_prompt(input, context))
            + estimate_tokens(&self.hooks.system_prompt(context));
        let approx_output = selection.model.max_output_tokens.unwrap_or(512) as u64;
        let real_cost_usd = (approx_input as f64) * selection.model.input_cost_per_million / 1_000_000.0
            + (approx_output as f64) * selection.model.output_cost_per_million / 1_000_000.0;
        let credits = self
            .config
            .credits
            .by_quality
            .get(&context.quality)
            .copied()
            .or(self.config.credits.default)
            .unwrap_or(0);
        CostEstimate { real_cost_usd, credits }
    }
}

/// Compiles `schema` and runs it against `input`, returning one message per
/// violation `jsonschema` reports. A schema that itself fails to compile
/// (a hook author's mistake) is reported the same way rather than panicking.
fn validate_against_schema(schema: &schemars::schema::RootSchema, input: &Value) -> Vec<String> {
    let schema_value = match serde_json::to_value(schema) {
        Ok(v) => v,
        Err(e) => return vec![format!("invalid JSON schema: {e}")],
    };
    let compiled = match jsonschema::JSONSchema::compile(&schema_value) {
        Ok(c) => c,
        Err(e) => return vec![format!("invalid JSON schema: {e}")],
    };
    match compiled.validate(input) {
        Ok(()) => Vec::new(),
        Err(errors) => errors.map(|e| e.to_string()).collect(),
    }
}

fn merge_required_fields<H: AiOperationHooks + ?Sized>(mut value: Value, hooks: &H) -> Value {
    let required = hooks.required_fields();
    if required.is_empty() {
        return value;
    }
    let missing_any = match value.as_object() {
        Some(map) => required.iter().any(|field| !map.contains_key(*field)),
        None => true,
    };
    if !missing_any {
        return value;
    }
    let skeleton = hooks.fallback_skeleton();
    if let (Value::Object(ref mut map), Value::Object(skeleton_map)) = (&mut value, skeleton) {
        for (key, val) in skeleton_map {
            map.entry(key).or_insert(val);
        }
        return value;
    }
    if value.is_object() {
        value
    } else {
        hooks.fallback_skeleton()
    }
}

/// Strips a leading/trailing ```` ```json ```` or ```` ``` ```` fence. The
/// kernel runs this before attempting a direct `serde_json::from_str`, so
/// well-formed fenced responses never hit the repair pass at all.
fn strip_fence(content: &str) -> String {
    let trimmed = content.trim();
    if let Some(rest) = trimmed.strip_prefix("```json") {
        rest.strip_suffix("```").unwrap_or(rest).trim().to_string()
    } else if let Some(rest) = trimmed.strip_prefix("```") {
        rest.strip_suffix("```").unwrap_or(rest).trim().to_string()
    } else {
        trimmed.to_string()
    }
}

/// Non-AI operation kinds (database writes, pure validation, external
/// APIs with a fixed cost schedule) implement this narrower trait and get
/// wrapped the same way via a blanket [`Operation`] impl on
/// [`SimpleOperation`] — there is no prompt assembly, provider dispatch,
/// or JSON repair to share for these, just validate/run/cost.
#[async_trait]
pub trait SimpleOperationHooks: Send + Sync {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
    fn kind(&self) -> OperationKind;

    fn validate(&self, _input: &Value) -> Vec<String> {
        Vec::new()
    }

    async fn run(&self, input: Value, context: &ExecutionContext) -> Result<Value, EngineError>;

    fn cost(&self, _input: &Value, _context: &ExecutionContext) -> CostEstimate {
        CostEstimate::default()
    }
}

pub struct SimpleOperation<H: SimpleOperationHooks>(pub H);

#[async_trait]
impl<H: SimpleOperationHooks> Operation for SimpleOperation<H> {
    fn id(&self) -> &str {
        self.0.id()
    }

    fn name(&self) -> &str {
        self.0.name()
    }

    fn kind(&self) -> OperationKind {
        self.0.kind()
    }

    fn validate(&self, input: &Value) -> Vec<String> {
        self.0.validate(input)
    }

    async fn execute(&self, input: Value, ctx: OperationExecCtx<'_>) -> Result<OperationOutcome, EngineError> {
        let errors = self.validate(&input);
        ctx.sink.on_step_validation(ctx.step_id, 0, &errors).await;
        if !errors.is_empty() {
            return Err(EngineError::Validation {
                step: ctx.step_id.clone(),
                message: errors.join("; "),
            });
        }
        let estimate = self.0.cost(&input, ctx.context);
        let output = self.0.run(input, ctx.context).await?;
        ctx.sink.on_step_complete(ctx.step_id, &output).await;
        Ok(OperationOutcome {
            output,
            real_cost_usd: estimate.real_cost_usd,
            credits_charged: estimate.credits,
            margin_percent: margin_percent(estimate.credits, 0.0, estimate.real_cost_usd),
        })
    }

    fn estimate_cost(&self, input: &Value, context: &ExecutionContext) -> CostEstimate {
        self.0.cost(input, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::NullStorageSink;
    use cascade_core::types::{Provider, QualityLevel};
    use serde_json::json;
    use std::collections::HashMap;

    struct EchoHooks;

    impl AiOperationHooks for EchoHooks {
        fn id(&self) -> &str {
            "echo"
        }
        fn name(&self) -> &str {
            "Echo"
        }
        fn system_prompt(&self, _context: &ExecutionContext) -> String {
            "You repeat back JSON.".to_string()
        }
        fn user_prompt(&self, input: &Value, _context: &ExecutionContext) -> String {
            input.to_string()
        }
        fn required_fields(&self) -> Vec<&'static str> {
            vec!["message"]
        }
        fn fallback_skeleton(&self) -> Value {
            json!({"message": null})
        }
    }

    fn ai_config() -> AiOperationConfig {
        let mut models = HashMap::new();
        models.insert(
            QualityLevel::Standard,
            ModelConfig {
                provider: Provider::OpenAi,
                model: "gpt-4o-mini".to_string(),
                temperature: 0.2,
                top_p: None,
                input_cost_per_million: 1.0,
                output_cost_per_million: 2.0,
                supports_json_mode: true,
                max_output_tokens: Some(256),
                timeout_ms: Some(5_000),
                system_prompt_suffix: None,
            },
        );
        AiOperationConfig {
            ai_config: OperationAIConfig {
                models,
                ..Default::default()
            },
            credits: OperationCreditConfig {
                by_quality: HashMap::new(),
                default: Some(3),
            },
            usd_per_credit: 0.1,
        }
    }

    #[tokio::test]
    async fn rejects_non_object_input() {
        let providers = ProviderRegistry::global(Default::default());
        let op = AiOperation::new(EchoHooks, ai_config(), providers);
        let context = ExecutionContext::new(QualityLevel::Standard);
        let sink = NullStorageSink;
        let step_id = "s1".to_string();
        let ctx = OperationExecCtx {
            step_id: &step_id,
            context: &context,
            custom_prompt: None,
            sink: &sink,
        };
        let err = op.execute(Value::String("not an object".into()), ctx).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }));
    }

    use schemars::JsonSchema;
    use serde::Deserialize;

    #[derive(Deserialize, JsonSchema)]
    struct SchemaCheckedInput {
        #[allow(dead_code)]
        title: String,
    }

    struct SchemaHooks;

    impl AiOperationHooks for SchemaHooks {
        fn id(&self) -> &str {
            "schema-checked"
        }
        fn name(&self) -> &str {
            "Schema Checked"
        }
        fn json_schema(&self) -> Option<schemars::schema::RootSchema> {
            Some(schemars::schema_for!(SchemaCheckedInput))
        }
        fn system_prompt(&self, _context: &ExecutionContext) -> String {
            String::new()
        }
        fn user_prompt(&self, _input: &Value, _context: &ExecutionContext) -> String {
            String::new()
        }
    }

    #[test]
    fn declared_schema_rejects_input_missing_required_field() {
        let providers = ProviderRegistry::global(Default::default());
        let op = AiOperation::new(SchemaHooks, ai_config(), providers);
        let errors = op.validate(&json!({"unrelated": 1}));
        assert!(!errors.is_empty(), "expected a violation for the missing `title` field");
    }

    #[test]
    fn declared_schema_accepts_matching_input() {
        let providers = ProviderRegistry::global(Default::default());
        let op = AiOperation::new(SchemaHooks, ai_config(), providers);
        let errors = op.validate(&json!({"title": "hello"}));
        assert!(errors.is_empty(), "unexpected violations: {errors:?}");
    }

    #[test]
    fn merge_required_fields_fills_missing_keys() {
        let hooks = EchoHooks;
        let merged = merge_required_fields(json!({"other": 1}), &hooks);
        assert_eq!(merged["message"], Value::Null);
        assert_eq!(merged["other"], 1);
    }

    #[test]
    fn strip_fence_removes_json_markdown_wrapper() {
        assert_eq!(strip_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_fence("{\"a\":1}"), "{\"a\":1}");
    }
}
