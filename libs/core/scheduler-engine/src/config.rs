//! Engine configuration, covering the `aiAgent.*`, `execution.*`,
//! `metrics.*`, and `scheduler.*` keys. Builder-style: `with_*` methods
//! layered on top of a `Default` impl.

use crate::circuit::CircuitBreakerConfig;
use crate::escalation::EscalationThresholds;
use crate::executor::ExecutorConfig;
use crate::reasoner::{PromptOptimizationConfig, ReasonerGatewayConfig};
use core_config::{env_or_default, FromEnv};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub max_batch_size: usize,
    pub processing_interval_ms: u64,
    pub auto_unlock_stale_jobs: bool,
    pub stale_lock_threshold_ms: i64,
    pub job_processing_concurrency: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 50,
            processing_interval_ms: 5_000,
            auto_unlock_stale_jobs: true,
            stale_lock_threshold_ms: 120_000,
            job_processing_concurrency: 8,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetricsSettings {
    pub enabled: bool,
    pub sampling_rate: f64,
    pub track_token_usage: bool,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            sampling_rate: 1.0,
            track_token_usage: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AiAgentConfig {
    pub model: String,
    pub temperature: f64,
    pub max_retries: u32,
    pub validate_semantics: bool,
    pub semantic_strict: bool,
    pub repair_malformed_responses: bool,
    pub max_repair_attempts: u32,
    pub prompt_optimization: PromptOptimizationConfig,
}

impl Default for AiAgentConfig {
    fn default() -> Self {
        Self {
            model: "default".to_string(),
            temperature: 0.2,
            max_retries: 1,
            validate_semantics: true,
            semantic_strict: true,
            repair_malformed_responses: true,
            max_repair_attempts: 1,
            prompt_optimization: PromptOptimizationConfig::default(),
        }
    }
}

impl AiAgentConfig {
    pub fn as_reasoner_gateway_config(&self) -> ReasonerGatewayConfig {
        ReasonerGatewayConfig {
            temperature: self.temperature,
            validate_semantics: self.validate_semantics,
            semantic_strict: self.semantic_strict,
            repair_malformed_responses: self.repair_malformed_responses,
            max_repair_attempts: self.max_repair_attempts,
            prompt_optimization: self.prompt_optimization.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub ai_agent: AiAgentConfig,
    pub execution: ExecutorConfig,
    pub escalation: EscalationThresholds,
    pub circuit_breaker: CircuitBreakerConfig,
    pub execution_phase_timeout_ms: u64,
    pub allow_cancellation: bool,
    pub metrics: MetricsSettings,
    pub scheduler: SchedulerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ai_agent: AiAgentConfig::default(),
            execution: ExecutorConfig::default(),
            escalation: EscalationThresholds::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            execution_phase_timeout_ms: 60_000,
            allow_cancellation: true,
            metrics: MetricsSettings::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.ai_agent.model = model.into();
        self
    }

    pub fn with_job_processing_concurrency(mut self, n: usize) -> Self {
        self.scheduler.job_processing_concurrency = n;
        self
    }

    pub fn with_max_batch_size(mut self, n: usize) -> Self {
        self.scheduler.max_batch_size = n;
        self
    }

    pub fn with_processing_interval_ms(mut self, ms: u64) -> Self {
        self.scheduler.processing_interval_ms = ms;
        self
    }
}

impl FromEnv for EngineConfig {
    fn from_env() -> Result<Self, core_config::ConfigError> {
        let mut cfg = EngineConfig::default();

        cfg.ai_agent.model = env_or_default("AI_AGENT_MODEL", &cfg.ai_agent.model);
        cfg.ai_agent.temperature = env_or_default(
            "AI_AGENT_TEMPERATURE",
            &cfg.ai_agent.temperature.to_string(),
        )
        .parse()
        .unwrap_or(cfg.ai_agent.temperature);
        cfg.ai_agent.max_repair_attempts = env_or_default(
            "AI_AGENT_MAX_REPAIR_ATTEMPTS",
            &cfg.ai_agent.max_repair_attempts.to_string(),
        )
        .parse()
        .unwrap_or(cfg.ai_agent.max_repair_attempts);

        cfg.execution.max_concurrency = env_or_default(
            "EXECUTION_MAX_CONCURRENCY",
            &cfg.execution.max_concurrency.to_string(),
        )
        .parse()
        .unwrap_or(cfg.execution.max_concurrency);
        cfg.execution.default_timeout_ms = env_or_default(
            "EXECUTION_DEFAULT_TIMEOUT_MS",
            &cfg.execution.default_timeout_ms.to_string(),
        )
        .parse()
        .unwrap_or(cfg.execution.default_timeout_ms);

        cfg.scheduler.max_batch_size = env_or_default(
            "SCHEDULER_MAX_BATCH_SIZE",
            &cfg.scheduler.max_batch_size.to_string(),
        )
        .parse()
        .unwrap_or(cfg.scheduler.max_batch_size);
        cfg.scheduler.processing_interval_ms = env_or_default(
            "SCHEDULER_PROCESSING_INTERVAL_MS",
            &cfg.scheduler.processing_interval_ms.to_string(),
        )
        .parse()
        .unwrap_or(cfg.scheduler.processing_interval_ms);
        cfg.scheduler.job_processing_concurrency = env_or_default(
            "SCHEDULER_JOB_PROCESSING_CONCURRENCY",
            &cfg.scheduler.job_processing_concurrency.to_string(),
        )
        .parse()
        .unwrap_or(cfg.scheduler.job_processing_concurrency);
        cfg.scheduler.stale_lock_threshold_ms = env_or_default(
            "SCHEDULER_STALE_LOCK_THRESHOLD_MS",
            &cfg.scheduler.stale_lock_threshold_ms.to_string(),
        )
        .parse()
        .unwrap_or(cfg.scheduler.stale_lock_threshold_ms);

        cfg.metrics.enabled = env_or_default("METRICS_ENABLED", &cfg.metrics.enabled.to_string())
            .parse()
            .unwrap_or(cfg.metrics.enabled);

        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_self_consistent() {
        let cfg = EngineConfig::default();
        assert!(cfg.scheduler.job_processing_concurrency > 0);
        assert!(cfg.execution.max_concurrency >= cfg.execution.default_concurrency_limit);
    }

    #[test]
    fn builder_methods_chain() {
        let cfg = EngineConfig::default()
            .with_model("gpt-test")
            .with_job_processing_concurrency(4)
            .with_max_batch_size(10);
        assert_eq!(cfg.ai_agent.model, "gpt-test");
        assert_eq!(cfg.scheduler.job_processing_concurrency, 4);
        assert_eq!(cfg.scheduler.max_batch_size, 10);
    }
}
