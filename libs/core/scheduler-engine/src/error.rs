//! Engine-wide error type. One variant per failure domain named in the
//! error-handling taxonomy; each carries enough context for the Job
//! Processor to record a `JobError` and move on.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("data store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("job {job_id} not found")]
    JobNotFound { job_id: uuid::Uuid },

    #[error("reasoner response malformed in {phase} phase after {attempts} attempt(s): {category}")]
    MalformedReasonerResponse {
        phase: &'static str,
        category: String,
        attempts: u32,
        repaired: bool,
    },

    #[error("reasoner provider call failed: {0}")]
    ReasonerUnavailable(String),

    #[error("circular dependency among endpoints: {0:?}")]
    CircularDependency(Vec<uuid::Uuid>),

    #[error("plan failed validation: {0}")]
    InvalidPlan(String),

    #[error("circuit open for endpoint {endpoint_id}")]
    CircuitOpen { endpoint_id: uuid::Uuid },

    #[error("endpoint call aborted")]
    Aborted,

    #[error("endpoint transport error: {0}")]
    EndpointTransport(String),

    #[error("internal engine error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            EngineError::StoreUnavailable(_)
            | EngineError::ReasonerUnavailable(_)
            | EngineError::EndpointTransport(_) => ErrorCategory::Transient,
            EngineError::CircuitOpen { .. } | EngineError::Aborted => ErrorCategory::NonRetryable,
            EngineError::MalformedReasonerResponse { .. }
            | EngineError::InvalidPlan(_)
            | EngineError::CircularDependency(_)
            | EngineError::JobNotFound { .. }
            | EngineError::Internal(_) => ErrorCategory::Permanent,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Transient,
    Permanent,
    NonRetryable,
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_unavailable_is_transient() {
        assert_eq!(
            EngineError::StoreUnavailable("down".into()).category(),
            ErrorCategory::Transient
        );
    }

    #[test]
    fn circular_dependency_is_permanent() {
        assert_eq!(
            EngineError::CircularDependency(vec![]).category(),
            ErrorCategory::Permanent
        );
    }
}
