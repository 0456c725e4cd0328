use scheduler_engine::EngineError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobsError {
    #[error("http request failed: {0}")]
    Http(String),

    #[error("endpoint call timed out")]
    Timeout,

    #[error("reasoner provider returned an unexpected response: {0}")]
    ReasonerResponse(String),

    #[error("job not found: {0}")]
    NotFound(uuid::Uuid),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<JobsError> for EngineError {
    fn from(e: JobsError) -> Self {
        match e {
            JobsError::Http(msg) => EngineError::EndpointTransport(msg),
            JobsError::Timeout => EngineError::EndpointTransport("timed out".to_string()),
            JobsError::ReasonerResponse(msg) => EngineError::ReasonerUnavailable(msg),
            JobsError::NotFound(id) => EngineError::JobNotFound { job_id: id },
            JobsError::Internal(msg) => EngineError::Internal(msg),
        }
    }
}

impl From<reqwest::Error> for JobsError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            JobsError::Timeout
        } else {
            JobsError::Http(e.to_string())
        }
    }
}
