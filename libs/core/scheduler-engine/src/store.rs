//! The Data Store Gateway: a narrow, single-row-at-a-time interface over
//! whatever persistence layer backs jobs/endpoints/executions. The engine
//! depends only on this trait; concrete storage lives in the domain crate.

use crate::error::EngineResult;
use crate::model::{
    EndpointExecutionResult, EscalationLevel, ExecutionPlan, ExecutionSummary, JobContext,
    ScheduleDecision, TokenUsage,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
pub enum JobExecutionStatusUpdate {
    Running,
    Completed,
    Failed,
}

#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait DataStoreGateway: Send + Sync {
    async fn fetch_due_jobs(&self, limit: usize, now: DateTime<Utc>) -> EngineResult<Vec<Uuid>>;

    async fn lock_job(&self, job_id: Uuid, lock_expires_at: DateTime<Utc>) -> EngineResult<bool>;

    async fn unlock_job(&self, job_id: Uuid) -> EngineResult<bool>;

    async fn get_job_context(&self, job_id: Uuid) -> EngineResult<JobContext>;

    async fn record_execution_plan(&self, job_id: Uuid, plan: &ExecutionPlan) -> EngineResult<()>;

    async fn record_endpoint_results(
        &self,
        job_id: Uuid,
        results: &[EndpointExecutionResult],
    ) -> EngineResult<()>;

    async fn record_execution_summary(
        &self,
        job_id: Uuid,
        summary: &ExecutionSummary,
    ) -> EngineResult<()>;

    async fn update_job_schedule(
        &self,
        job_id: Uuid,
        decision: &ScheduleDecision,
    ) -> EngineResult<()>;

    async fn record_job_error(
        &self,
        job_id: Uuid,
        message: &str,
        code: Option<&str>,
    ) -> EngineResult<()>;

    async fn update_execution_status(
        &self,
        job_id: Uuid,
        status: JobExecutionStatusUpdate,
        error_message: Option<&str>,
    ) -> EngineResult<()>;

    async fn update_job_token_usage(&self, job_id: Uuid, delta: &TokenUsage) -> EngineResult<()>;

    async fn update_job_escalation(
        &self,
        job_id: Uuid,
        level: EscalationLevel,
        disabled_endpoint_ids: &[Uuid],
    ) -> EngineResult<()>;

    async fn is_available(&self) -> bool;
}
