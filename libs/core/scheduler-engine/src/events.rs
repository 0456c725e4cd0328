//! Engine event hook. The orchestrator and executor report through a single
//! `EngineEvents` trait object rather than a fixed set of callbacks, so the
//! launcher can wire these into metrics, logs, or a websocket without the
//! engine knowing about any of them.

use crate::model::CircuitBreakerState;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointCallStatus {
    Pending,
    Running,
    Success,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasonerPhase {
    Plan,
    Schedule,
}

pub trait EngineEvents: Send + Sync {
    fn on_execution_progress(&self, _job_id: Option<Uuid>, _total: usize, _completed: usize) {}

    fn on_endpoint_progress(
        &self,
        _job_id: Uuid,
        _endpoint_id: Uuid,
        _status: EndpointCallStatus,
        _attempt: u32,
        _error: Option<&str>,
    ) {
    }

    fn on_retry_attempt(&self, _job_id: Uuid, _endpoint_id: Uuid, _attempt: u32) {}

    fn on_retry_exhausted(&self, _job_id: Uuid, _endpoint_id: Uuid, _attempts: u32) {}

    fn on_circuit_state_change(
        &self,
        _endpoint_id: Uuid,
        _from: CircuitBreakerState,
        _to: CircuitBreakerState,
    ) {
    }

    fn on_reasoner_malformed(&self, _phase: ReasonerPhase, _category: &str, _repaired: bool) {}
}

/// No-op implementation used when the caller does not want event callbacks.
pub struct NullEvents;

impl EngineEvents for NullEvents {}

/// Emits every event as a `tracing` call, surfacing state transitions
/// through logs ahead of (or alongside) metrics.
pub struct TracingEvents;

impl EngineEvents for TracingEvents {
    fn on_execution_progress(&self, job_id: Option<Uuid>, total: usize, completed: usize) {
        tracing::debug!(?job_id, total, completed, "execution progress");
    }

    fn on_endpoint_progress(
        &self,
        job_id: Uuid,
        endpoint_id: Uuid,
        status: EndpointCallStatus,
        attempt: u32,
        error: Option<&str>,
    ) {
        tracing::debug!(%job_id, %endpoint_id, ?status, attempt, error, "endpoint progress");
    }

    fn on_retry_attempt(&self, job_id: Uuid, endpoint_id: Uuid, attempt: u32) {
        tracing::info!(%job_id, %endpoint_id, attempt, "retrying endpoint call");
    }

    fn on_retry_exhausted(&self, job_id: Uuid, endpoint_id: Uuid, attempts: u32) {
        tracing::warn!(%job_id, %endpoint_id, attempts, "retries exhausted");
    }

    fn on_circuit_state_change(
        &self,
        endpoint_id: Uuid,
        from: CircuitBreakerState,
        to: CircuitBreakerState,
    ) {
        tracing::warn!(%endpoint_id, ?from, ?to, "circuit breaker state change");
    }

    fn on_reasoner_malformed(&self, phase: ReasonerPhase, category: &str, repaired: bool) {
        tracing::warn!(?phase, category, repaired, "reasoner response malformed");
    }
}
