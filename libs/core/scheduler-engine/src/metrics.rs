//! Prometheus metrics for the scheduling engine.
//!
//! ## Available metrics
//!
//! - `scheduler_jobs_processed_total` - counter of jobs processed by status
//! - `scheduler_job_processing_duration_seconds` - histogram of per-job duration
//! - `scheduler_cycle_duration_seconds` - histogram of whole-cycle duration
//! - `scheduler_endpoint_calls_total` - counter of endpoint calls by outcome
//! - `scheduler_reasoner_calls_total` - counter of reasoner calls by phase
//! - `scheduler_reasoner_malformed_total` - counter of malformed reasoner responses
//! - `scheduler_tokens_total` - counter of reasoner token usage
//! - `scheduler_circuit_state` - gauge of current circuit state per endpoint
//! - `scheduler_in_flight_jobs` - gauge of jobs currently being processed

use crate::model::CircuitBreakerState;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;
use uuid::Uuid;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub mod names {
    pub const JOBS_PROCESSED: &str = "scheduler_jobs_processed_total";
    pub const JOB_DURATION: &str = "scheduler_job_processing_duration_seconds";
    pub const CYCLE_DURATION: &str = "scheduler_cycle_duration_seconds";
    pub const ENDPOINT_CALLS: &str = "scheduler_endpoint_calls_total";
    pub const REASONER_CALLS: &str = "scheduler_reasoner_calls_total";
    pub const REASONER_MALFORMED: &str = "scheduler_reasoner_malformed_total";
    pub const TOKENS: &str = "scheduler_tokens_total";
    pub const CIRCUIT_STATE: &str = "scheduler_circuit_state";
    pub const IN_FLIGHT_JOBS: &str = "scheduler_in_flight_jobs";
}

#[derive(Debug, Clone, Copy)]
pub enum JobStatus {
    Success,
    Failed,
    Skipped,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ReasonerPhaseLabel {
    Plan,
    Schedule,
}

impl ReasonerPhaseLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::Schedule => "schedule",
        }
    }
}

/// Initializes the Prometheus exporter. Idempotent; call once at startup.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

pub fn record_job_processed(status: JobStatus) {
    counter!(names::JOBS_PROCESSED, "status" => status.as_str()).increment(1);
}

pub fn record_job_duration(duration: Duration) {
    histogram!(names::JOB_DURATION).record(duration.as_secs_f64());
}

pub fn record_cycle_duration(duration: Duration) {
    histogram!(names::CYCLE_DURATION).record(duration.as_secs_f64());
}

pub fn record_endpoint_call(success: bool) {
    counter!(names::ENDPOINT_CALLS, "outcome" => if success { "success" } else { "failure" })
        .increment(1);
}

pub fn record_reasoner_call(phase: ReasonerPhaseLabel) {
    counter!(names::REASONER_CALLS, "phase" => phase.as_str()).increment(1);
}

pub fn record_reasoner_malformed(phase: ReasonerPhaseLabel, repaired: bool) {
    counter!(
        names::REASONER_MALFORMED,
        "phase" => phase.as_str(),
        "repaired" => repaired.to_string()
    )
    .increment(1);
}

pub fn record_tokens(kind: &str, amount: u64) {
    counter!(names::TOKENS, "kind" => kind.to_string()).increment(amount);
}

pub fn set_in_flight_jobs(count: f64) {
    gauge!(names::IN_FLIGHT_JOBS).set(count);
}

/// Reflects a breaker's new state as a gauge, 0=closed/1=half-open/2=open,
/// labeled per endpoint so a dashboard can chart them side by side.
pub fn set_circuit_state(endpoint_id: Uuid, state: CircuitBreakerState) {
    let value = match state {
        CircuitBreakerState::Closed => 0.0,
        CircuitBreakerState::HalfOpen => 1.0,
        CircuitBreakerState::Open => 2.0,
    };
    gauge!(names::CIRCUIT_STATE, "endpoint_id" => endpoint_id.to_string()).set(value);
}

/// Times an operation and records it as a job-duration histogram sample on
/// drop — the timer records itself, so callers can't forget to.
pub struct MetricsTimer {
    start: std::time::Instant,
}

impl MetricsTimer {
    pub fn new() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Default for MetricsTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MetricsTimer {
    fn drop(&mut self) {
        record_job_duration(self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_status_as_str() {
        assert_eq!(JobStatus::Success.as_str(), "success");
        assert_eq!(JobStatus::Failed.as_str(), "failed");
        assert_eq!(JobStatus::Skipped.as_str(), "skipped");
    }

    #[test]
    fn metrics_timer_tracks_elapsed_time() {
        let timer = MetricsTimer::new();
        std::thread::sleep(Duration::from_millis(5));
        assert!(timer.elapsed().as_millis() >= 5);
    }
}
