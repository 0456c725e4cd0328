//! Reasoner Gateway: wraps a pluggable `ReasonerProvider` with prompt
//! optimization, schema/semantic validation, and a single structured repair
//! attempt. The provider itself is a thin transport (HTTP call to whatever
//! model endpoint is configured); all policy lives here.

use crate::classify::{classify_reasoner_failure, ReasonerFailureCategory};
use crate::error::{EngineError, EngineResult};
use crate::events::{EngineEvents, ReasonerPhase};
use crate::metrics::{self, ReasonerPhaseLabel};
use crate::model::{
    EndpointExecutionResult, ExecutionPlan, JobContext, PhaseCounters, ScheduleDecision, TokenUsage,
};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Default)]
pub struct ProviderUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub reasoning_tokens: Option<u64>,
    pub cached_input_tokens: Option<u64>,
}

impl From<ProviderUsage> for TokenUsage {
    fn from(u: ProviderUsage) -> Self {
        TokenUsage {
            input_tokens: u.input_tokens,
            output_tokens: u.output_tokens,
            reasoning_tokens: u.reasoning_tokens.unwrap_or(0),
            cached_input_tokens: u.cached_input_tokens.unwrap_or(0),
            total_tokens: u.total_tokens,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub value: Value,
    pub usage: Option<ProviderUsage>,
}

/// Transport to the reasoning model. Concrete implementations (HTTP, or a
/// test double) live outside this crate; this trait only fixes the shape of
/// a single structured-output call.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait ReasonerProvider: Send + Sync {
    async fn invoke(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        schema: &Value,
    ) -> EngineResult<ProviderResponse>;
}

#[derive(Debug, Clone)]
pub struct PromptOptimizationConfig {
    pub enabled: bool,
    pub max_messages: usize,
    pub min_recent_messages: usize,
    pub max_endpoint_usage_entries: usize,
}

impl Default for PromptOptimizationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_messages: 20,
            min_recent_messages: 5,
            max_endpoint_usage_entries: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReasonerGatewayConfig {
    pub temperature: f64,
    pub validate_semantics: bool,
    pub semantic_strict: bool,
    pub repair_malformed_responses: bool,
    pub max_repair_attempts: u32,
    pub prompt_optimization: PromptOptimizationConfig,
}

impl Default for ReasonerGatewayConfig {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            validate_semantics: true,
            semantic_strict: true,
            repair_malformed_responses: true,
            max_repair_attempts: 1,
            prompt_optimization: PromptOptimizationConfig::default(),
        }
    }
}

/// Trims a job context's transient history before it is serialized into the
/// reasoner's user prompt. Lossless with respect to schema: it only drops
/// entries, never rewrites them.
fn optimize_context(context: &JobContext, cfg: &PromptOptimizationConfig) -> JobContext {
    if !cfg.enabled {
        return context.clone();
    }
    let mut optimized = context.clone();
    let keep_from = optimized
        .recent_messages
        .len()
        .saturating_sub(cfg.max_messages.max(cfg.min_recent_messages));
    optimized.recent_messages = optimized.recent_messages.split_off(keep_from);
    if optimized.recent_endpoint_usage.len() > cfg.max_endpoint_usage_entries {
        let keep_from = optimized.recent_endpoint_usage.len() - cfg.max_endpoint_usage_entries;
        optimized.recent_endpoint_usage = optimized.recent_endpoint_usage.split_off(keep_from);
    }
    optimized
}

/// Cumulative counters since the gateway was constructed, read by
/// `EngineLifecycle` once per cycle to populate `EngineState.stats`.
#[derive(Debug, Clone, Default)]
pub struct ReasonerStats {
    pub calls: u64,
    pub tokens: TokenUsage,
    pub plan_phase: PhaseCounters,
    pub schedule_phase: PhaseCounters,
}

pub struct ReasonerGateway {
    provider: Arc<dyn ReasonerProvider>,
    config: ReasonerGatewayConfig,
    events: Arc<dyn EngineEvents>,
    calls: AtomicU64,
    tokens: Mutex<TokenUsage>,
    plan_phase: Mutex<PhaseCounters>,
    schedule_phase: Mutex<PhaseCounters>,
}

impl ReasonerGateway {
    pub fn new(
        provider: Arc<dyn ReasonerProvider>,
        config: ReasonerGatewayConfig,
        events: Arc<dyn EngineEvents>,
    ) -> Self {
        Self {
            provider,
            config,
            events,
            calls: AtomicU64::new(0),
            tokens: Mutex::new(TokenUsage::default()),
            plan_phase: Mutex::new(PhaseCounters::default()),
            schedule_phase: Mutex::new(PhaseCounters::default()),
        }
    }

    /// Snapshot of this gateway's lifetime counters.
    pub fn stats_snapshot(&self) -> ReasonerStats {
        ReasonerStats {
            calls: self.calls.load(Ordering::Relaxed),
            tokens: self.tokens.lock().expect("reasoner stats mutex poisoned").clone(),
            plan_phase: self.plan_phase.lock().expect("reasoner stats mutex poisoned").clone(),
            schedule_phase: self
                .schedule_phase
                .lock()
                .expect("reasoner stats mutex poisoned")
                .clone(),
        }
    }

    fn phase_counters(&self, phase: ReasonerPhase) -> &Mutex<PhaseCounters> {
        match phase {
            ReasonerPhase::Plan => &self.plan_phase,
            ReasonerPhase::Schedule => &self.schedule_phase,
        }
    }

    pub async fn plan(&self, context: &JobContext) -> EngineResult<(ExecutionPlan, TokenUsage)> {
        let optimized = optimize_context(context, &self.config.prompt_optimization);
        let schema = plan_schema();
        let system_prompt = "Produce a JSON execution plan for the given job context.";
        let user_prompt = serde_json::to_string(&optimized.job)
            .map_err(|e| EngineError::Internal(e.to_string()))?;

        self.call_with_repair(
            ReasonerPhase::Plan,
            system_prompt,
            &user_prompt,
            &schema,
            |value| self.validate_plan(value),
        )
        .await
    }

    pub async fn schedule(
        &self,
        context: &JobContext,
        results: &[EndpointExecutionResult],
    ) -> EngineResult<(ScheduleDecision, TokenUsage)> {
        let optimized = optimize_context(context, &self.config.prompt_optimization);
        let schema = schedule_schema();
        let system_prompt = "Produce the next run time and reasoning for this job.";
        let payload = serde_json::json!({ "job": optimized.job, "results": results });
        let user_prompt =
            serde_json::to_string(&payload).map_err(|e| EngineError::Internal(e.to_string()))?;

        self.call_with_repair(
            ReasonerPhase::Schedule,
            system_prompt,
            &user_prompt,
            &schema,
            |value| self.validate_schedule(value),
        )
        .await
    }

    async fn call_with_repair<T, F>(
        &self,
        phase: ReasonerPhase,
        system_prompt: &str,
        user_prompt: &str,
        schema: &Value,
        validate: F,
    ) -> EngineResult<(T, TokenUsage)>
    where
        F: Fn(&Value) -> Result<T, String>,
    {
        let phase_name = match phase {
            ReasonerPhase::Plan => "plan",
            ReasonerPhase::Schedule => "schedule",
        };
        let phase_label = match phase {
            ReasonerPhase::Plan => ReasonerPhaseLabel::Plan,
            ReasonerPhase::Schedule => ReasonerPhaseLabel::Schedule,
        };

        self.calls.fetch_add(1, Ordering::Relaxed);
        metrics::record_reasoner_call(phase_label);
        let first = self.provider.invoke(system_prompt, user_prompt, schema).await?;
        let mut usage = first.usage.clone().map(TokenUsage::from).unwrap_or_default();
        record_usage_metrics(&usage);
        self.tokens
            .lock()
            .expect("reasoner stats mutex poisoned")
            .accumulate(&usage);

        match validate(&first.value) {
            Ok(value) => return Ok((value, usage)),
            Err(message) => {
                let category = classify_reasoner_failure(&message);
                self.events
                    .on_reasoner_malformed(phase, category_str(category), false);
                metrics::record_reasoner_malformed(phase_label, false);

                if !self.config.repair_malformed_responses || !category.is_repairable() {
                    // Terminal: no repair attempted, so this is the final outcome.
                    self.phase_counters(phase)
                        .lock()
                        .expect("reasoner stats mutex poisoned")
                        .malformed_responses += 1;
                    return Err(EngineError::MalformedReasonerResponse {
                        phase: phase_name,
                        category: category_str(category).to_string(),
                        attempts: 1,
                        repaired: false,
                    });
                }

                let repair_prompt = format!(
                    "{system_prompt}\nThe previous response was malformed because: {message}. \
                     Produce a corrected object that strictly matches the schema."
                );
                self.calls.fetch_add(1, Ordering::Relaxed);
                metrics::record_reasoner_call(phase_label);
                self.phase_counters(phase)
                    .lock()
                    .expect("reasoner stats mutex poisoned")
                    .repair_attempts += 1;
                let repaired = self
                    .provider
                    .invoke(&repair_prompt, user_prompt, schema)
                    .await?;
                if let Some(u) = repaired.usage.clone() {
                    let delta = TokenUsage::from(u);
                    record_usage_metrics(&delta);
                    self.tokens
                        .lock()
                        .expect("reasoner stats mutex poisoned")
                        .accumulate(&delta);
                    usage.accumulate(&delta);
                }

                match validate(&repaired.value) {
                    Ok(value) => {
                        self.events
                            .on_reasoner_malformed(phase, category_str(category), true);
                        metrics::record_reasoner_malformed(phase_label, true);
                        self.phase_counters(phase)
                            .lock()
                            .expect("reasoner stats mutex poisoned")
                            .repair_successes += 1;
                        Ok((value, usage))
                    }
                    Err(final_message) => {
                        let final_category = classify_reasoner_failure(&final_message);
                        self.events
                            .on_reasoner_malformed(phase, category_str(final_category), false);
                        metrics::record_reasoner_malformed(phase_label, false);
                        let mut counters = self
                            .phase_counters(phase)
                            .lock()
                            .expect("reasoner stats mutex poisoned");
                        counters.repair_failures += 1;
                        // Terminal: repair was attempted and still failed.
                        counters.malformed_responses += 1;
                        drop(counters);
                        Err(EngineError::MalformedReasonerResponse {
                            phase: phase_name,
                            category: category_str(final_category).to_string(),
                            attempts: 2,
                            repaired: false,
                        })
                    }
                }
            }
        }
    }

    fn validate_plan(&self, value: &Value) -> Result<ExecutionPlan, String> {
        let plan: ExecutionPlan =
            serde_json::from_value(value.clone()).map_err(|e| format!("schema parse error: {e}"))?;
        if !(0.0..=1.0).contains(&plan.confidence) {
            return Err("semantic violation: confidence out of range".to_string());
        }
        if self.config.validate_semantics {
            plan.validate().map_err(|e| format!("semantic violation: {e}"))?;
        }
        Ok(plan)
    }

    fn validate_schedule(&self, value: &Value) -> Result<ScheduleDecision, String> {
        let mut decision: ScheduleDecision =
            serde_json::from_value(value.clone()).map_err(|e| format!("schema parse error: {e}"))?;

        let mut violations = Vec::new();
        if decision.next_run_at <= chrono::Utc::now() {
            violations.push("nextRunAt must be in the future");
        }
        if !(0.0..=1.0).contains(&decision.confidence) {
            violations.push("confidence out of range");
        }

        if violations.is_empty() {
            return Ok(decision);
        }

        if self.config.semantic_strict {
            return Err(format!("semantic violation: {}", violations.join(", ")));
        }

        // Non-strict semantics: salvage rather than fail the whole phase.
        // Clamp the offending fields to valid defaults and record what
        // happened in `reasoning` instead of propagating the error.
        if decision.next_run_at <= chrono::Utc::now() {
            decision.next_run_at = chrono::Utc::now() + chrono::Duration::minutes(5);
        }
        decision.confidence = decision.confidence.clamp(0.0, 1.0);
        decision.reasoning = format!(
            "{} [salvaged: {}]",
            decision.reasoning,
            violations.join(", ")
        );
        Ok(decision)
    }
}

fn record_usage_metrics(usage: &TokenUsage) {
    metrics::record_tokens("input", usage.input_tokens);
    metrics::record_tokens("output", usage.output_tokens);
    metrics::record_tokens("reasoning", usage.reasoning_tokens);
    metrics::record_tokens("cached_input", usage.cached_input_tokens);
}

fn category_str(category: ReasonerFailureCategory) -> &'static str {
    match category {
        ReasonerFailureCategory::SemanticViolation => "semantic_violation",
        ReasonerFailureCategory::InvalidEnumValue => "invalid_enum_value",
        ReasonerFailureCategory::StructuralInconsistency => "structural_inconsistency",
        ReasonerFailureCategory::SchemaParseError => "schema_parse_error",
        ReasonerFailureCategory::EmptyResponse => "empty_response",
        ReasonerFailureCategory::Unknown => "unknown",
    }
}

/// Structured-output schema handed to the reasoner provider. Hand-written
/// rather than derived: the wire types carry `chrono`/`uuid` fields that the
/// provider only ever sees as strings, so a derived schema would not match
/// the JSON contract any better than a literal one.
fn plan_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "required": ["endpointsToCall", "executionStrategy", "reasoning", "confidence"],
        "properties": {
            "endpointsToCall": { "type": "array" },
            "executionStrategy": { "enum": ["sequential", "parallel", "mixed"] },
            "concurrencyLimit": { "type": "integer" },
            "preliminaryNextRunAt": { "type": "string" },
            "reasoning": { "type": "string" },
            "confidence": { "type": "number", "minimum": 0, "maximum": 1 }
        }
    })
}

fn schedule_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "required": ["nextRunAt", "reasoning", "confidence"],
        "properties": {
            "nextRunAt": { "type": "string" },
            "reasoning": { "type": "string" },
            "confidence": { "type": "number", "minimum": 0, "maximum": 1 },
            "recommendedActions": { "type": "array" }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullEvents;
    use crate::model::{ExecutionStrategy, JobStatus, SystemEnvironment};
    use mockall::predicate::*;

    fn context() -> JobContext {
        use crate::model::{ExecutionContext, Job, TokenUsage};
        JobContext {
            job: Job {
                id: uuid::Uuid::new_v4(),
                definition: "do the thing".into(),
                status: JobStatus::Active,
                locked: false,
                lock_expires_at: None,
                next_run_at: None,
                tokens: TokenUsage::default(),
                owner_id: uuid::Uuid::new_v4(),
                default_headers: std::collections::HashMap::new(),
                escalation_level: crate::model::EscalationLevel::None,
                disabled_endpoint_ids: vec![],
                created_at: chrono::Utc::now(),
                updated_at: chrono::Utc::now(),
            },
            endpoints: vec![],
            recent_messages: vec![],
            recent_endpoint_usage: vec![],
            execution: ExecutionContext {
                current_time: chrono::Utc::now(),
                system_environment: SystemEnvironment::Test,
                resource_constraints: None,
                cancellation: None,
            },
        }
    }

    #[tokio::test]
    async fn valid_plan_passes_through_without_repair() {
        let mut provider = MockReasonerProvider::new();
        provider.expect_invoke().times(1).returning(|_, _, _| {
            Ok(ProviderResponse {
                value: serde_json::json!({
                    "endpointsToCall": [],
                    "executionStrategy": "sequential",
                    "reasoning": "nothing to call",
                    "confidence": 0.9
                }),
                usage: None,
            })
        });

        let gateway = ReasonerGateway::new(
            Arc::new(provider),
            ReasonerGatewayConfig::default(),
            Arc::new(NullEvents),
        );
        let (plan, _) = gateway.plan(&context()).await.unwrap();
        assert_eq!(plan.execution_strategy, ExecutionStrategy::Sequential);
    }

    #[tokio::test]
    async fn malformed_plan_is_repaired_on_second_call() {
        let mut provider = MockReasonerProvider::new();
        provider
            .expect_invoke()
            .times(1)
            .returning(|_, _, _| {
                Ok(ProviderResponse {
                    value: serde_json::json!({
                        "endpointsToCall": [],
                        "executionStrategy": "sequential",
                        "reasoning": "bad",
                        "confidence": 5.0
                    }),
                    usage: None,
                })
            });
        provider.expect_invoke().times(1).returning(|_, _, _| {
            Ok(ProviderResponse {
                value: serde_json::json!({
                    "endpointsToCall": [],
                    "executionStrategy": "sequential",
                    "reasoning": "fixed",
                    "confidence": 0.5
                }),
                usage: None,
            })
        });

        let gateway = ReasonerGateway::new(
            Arc::new(provider),
            ReasonerGatewayConfig::default(),
            Arc::new(NullEvents),
        );
        let (plan, _) = gateway.plan(&context()).await.unwrap();
        assert_eq!(plan.reasoning, "fixed");
    }

    #[tokio::test]
    async fn non_strict_semantics_salvages_a_past_next_run_at() {
        let mut provider = MockReasonerProvider::new();
        provider.expect_invoke().times(1).returning(|_, _, _| {
            Ok(ProviderResponse {
                value: serde_json::json!({
                    "nextRunAt": (chrono::Utc::now() - chrono::Duration::hours(1)).to_rfc3339(),
                    "reasoning": "run it again",
                    "confidence": 0.8
                }),
                usage: None,
            })
        });

        let gateway = ReasonerGateway::new(
            Arc::new(provider),
            ReasonerGatewayConfig {
                semantic_strict: false,
                ..ReasonerGatewayConfig::default()
            },
            Arc::new(NullEvents),
        );
        let (decision, _) = gateway.schedule(&context(), &[]).await.unwrap();
        assert!(decision.next_run_at > chrono::Utc::now());
        assert!(decision.reasoning.contains("salvaged"));
    }

    #[tokio::test]
    async fn strict_semantics_rejects_a_past_next_run_at() {
        let mut provider = MockReasonerProvider::new();
        provider.expect_invoke().times(2).returning(|_, _, _| {
            Ok(ProviderResponse {
                value: serde_json::json!({
                    "nextRunAt": (chrono::Utc::now() - chrono::Duration::hours(1)).to_rfc3339(),
                    "reasoning": "run it again",
                    "confidence": 0.8
                }),
                usage: None,
            })
        });

        let gateway = ReasonerGateway::new(
            Arc::new(provider),
            ReasonerGatewayConfig::default(),
            Arc::new(NullEvents),
        );
        let result = gateway.schedule(&context(), &[]).await;
        assert!(result.is_err());
    }
}
