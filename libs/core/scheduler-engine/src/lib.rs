//! Adaptive job scheduling engine.
//!
//! A reasoning-model-driven scheduler: each cycle fetches due jobs, locks
//! them, asks a reasoner for an execution plan, calls the planned
//! endpoints under retry/circuit-breaker protection, and asks the
//! reasoner again for the next run time.
//!
//! # Architecture
//!
//! ```text
//! DataStoreGateway (fetch due jobs, lock/unlock, persist)
//!   ↓
//! CycleOrchestrator (worker pool over due jobs)
//!   ↓ (processes jobs)
//! JobProcessor (lock -> context -> plan -> execute -> schedule -> unlock)
//!   ↓
//! ReasonerGateway (plan / schedule)      EndpointExecutor (sequential/parallel/mixed)
//!                                          ↓            ↓
//!                                    RetryPolicy   CircuitRegistry
//! ```
//!
//! # Example usage
//!
//! ```rust,ignore
//! use scheduler_engine::{EngineConfig, EngineLifecycle, CycleOrchestrator};
//!
//! let lifecycle = EngineLifecycle::new(orchestrator, config.scheduler.processing_interval_ms);
//! lifecycle.start().await?;
//! // ...
//! lifecycle.stop().await?;
//! ```

pub mod circuit;
pub mod classify;
pub mod config;
pub mod error;
pub mod escalation;
pub mod events;
pub mod executor;
pub mod health;
pub mod job_processor;
pub mod lifecycle;
pub mod metrics;
pub mod model;
pub mod orchestrator;
pub mod reasoner;
pub mod retry;
pub mod store;

pub use circuit::{Admission, CircuitBreakerConfig, CircuitRegistry, StateChange};
pub use classify::{classify_endpoint_failure, classify_reasoner_failure, FailureCategory, ReasonerFailureCategory};
pub use config::{AiAgentConfig, EngineConfig, MetricsSettings, SchedulerConfig};
pub use error::{EngineError, EngineResult, ErrorCategory};
pub use escalation::{compute as compute_escalation, EscalationInput, EscalationOutcome, EscalationThresholds};
pub use events::{EndpointCallStatus, EngineEvents, NullEvents, ReasonerPhase, TracingEvents};
pub use executor::{EndpointCaller, EndpointExecutor, ExecutorConfig, HttpCallOutcome};
pub use health::{health_router, HealthState};
pub use job_processor::{JobOutcome, JobProcessor, JobProcessorConfig};
pub use lifecycle::EngineLifecycle;
pub use orchestrator::{CycleOrchestrator, CycleOrchestratorConfig};
pub use reasoner::{
    ProviderResponse, ProviderUsage, ReasonerGateway, ReasonerGatewayConfig, ReasonerProvider,
    ReasonerStats,
};
pub use retry::{ExponentialBackoffPolicy, RetryDecision, RetryInput, RetryPolicy};
pub use store::{DataStoreGateway, JobExecutionStatusUpdate};

/// Result type alias for engine operations.
pub type EngineOperationResult<T> = Result<T, error::EngineError>;
