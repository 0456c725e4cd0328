//! Process-local `DataStoreGateway`: a `tokio::sync::RwLock`-guarded set of
//! maps standing in for whatever durable store a deployment would plug in.
//! Good enough to drive the engine end-to-end in tests and in a
//! single-process deployment; `lock_job` enforces the same
//! stale-lock-expiry semantics a real store would.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scheduler_engine::model::{
    Endpoint, EndpointExecutionResult, EndpointUsage, EscalationLevel, ExecutionContext,
    ExecutionPlan, ExecutionSummary, Job, JobContext, JobError, JobExecution, JobExecutionStatus,
    JobStatus, Message, ScheduleDecision, SystemEnvironment, TokenUsage,
};
use scheduler_engine::{DataStoreGateway, EngineError, EngineResult, JobExecutionStatusUpdate};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Everything known about one job, grouped the way the gateway hands it
/// back out via `get_job_context`.
struct JobRecord {
    job: Job,
    endpoints: Vec<Endpoint>,
    recent_messages: Vec<Message>,
    recent_endpoint_usage: Vec<EndpointUsage>,
}

#[derive(Default)]
struct Inner {
    jobs: HashMap<Uuid, JobRecord>,
    executions: HashMap<Uuid, JobExecution>,
    endpoint_results: HashMap<Uuid, Vec<EndpointExecutionResult>>,
    errors: HashMap<Uuid, Vec<JobError>>,
}

pub struct InMemoryDataStoreGateway {
    inner: RwLock<Inner>,
    available: AtomicBool,
}

impl InMemoryDataStoreGateway {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            available: AtomicBool::new(true),
        }
    }

    /// Test/seed hook: register a job with its endpoints so it can be
    /// fetched and processed by the engine.
    pub async fn seed_job(
        &self,
        job: Job,
        endpoints: Vec<Endpoint>,
        recent_messages: Vec<Message>,
        recent_endpoint_usage: Vec<EndpointUsage>,
    ) {
        let mut inner = self.inner.write().await;
        inner.jobs.insert(
            job.id,
            JobRecord {
                job,
                endpoints,
                recent_messages,
                recent_endpoint_usage,
            },
        );
    }

    pub async fn get_job(&self, job_id: Uuid) -> Option<Job> {
        self.inner.read().await.jobs.get(&job_id).map(|r| r.job.clone())
    }

    /// Test hook: flip the backing store's reported availability.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }
}

impl Default for InMemoryDataStoreGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataStoreGateway for InMemoryDataStoreGateway {
    async fn fetch_due_jobs(&self, limit: usize, now: DateTime<Utc>) -> EngineResult<Vec<Uuid>> {
        let inner = self.inner.read().await;
        let mut due: Vec<Uuid> = inner
            .jobs
            .values()
            .filter(|r| {
                r.job.status == JobStatus::Active
                    && !r.job.locked
                    && r.job.next_run_at.map(|t| t <= now).unwrap_or(true)
            })
            .map(|r| r.job.id)
            .collect();
        due.sort();
        due.truncate(limit);
        Ok(due)
    }

    async fn lock_job(&self, job_id: Uuid, lock_expires_at: DateTime<Utc>) -> EngineResult<bool> {
        let mut inner = self.inner.write().await;
        let record = inner
            .jobs
            .get_mut(&job_id)
            .ok_or(EngineError::JobNotFound { job_id })?;

        let stale = record
            .job
            .lock_expires_at
            .map(|expires| expires <= Utc::now())
            .unwrap_or(true);

        if record.job.locked && !stale {
            return Ok(false);
        }

        record.job.locked = true;
        record.job.lock_expires_at = Some(lock_expires_at);
        Ok(true)
    }

    async fn unlock_job(&self, job_id: Uuid) -> EngineResult<bool> {
        let mut inner = self.inner.write().await;
        let record = inner
            .jobs
            .get_mut(&job_id)
            .ok_or(EngineError::JobNotFound { job_id })?;
        record.job.locked = false;
        record.job.lock_expires_at = None;
        Ok(true)
    }

    async fn get_job_context(&self, job_id: Uuid) -> EngineResult<JobContext> {
        let inner = self.inner.read().await;
        let record = inner
            .jobs
            .get(&job_id)
            .ok_or(EngineError::JobNotFound { job_id })?;
        Ok(JobContext {
            job: record.job.clone(),
            endpoints: record.endpoints.clone(),
            recent_messages: record.recent_messages.clone(),
            recent_endpoint_usage: record.recent_endpoint_usage.clone(),
            execution: ExecutionContext {
                current_time: Utc::now(),
                system_environment: SystemEnvironment::Development,
                resource_constraints: None,
                cancellation: None,
            },
        })
    }

    async fn record_execution_plan(&self, job_id: Uuid, plan: &ExecutionPlan) -> EngineResult<()> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        inner.executions.insert(
            job_id,
            JobExecution {
                plan: plan.clone(),
                confidence: plan.confidence,
                reasoning: plan.reasoning.clone(),
                strategy: plan.execution_strategy,
                status: JobExecutionStatus::Running,
                summary: None,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(())
    }

    async fn record_endpoint_results(
        &self,
        job_id: Uuid,
        results: &[EndpointExecutionResult],
    ) -> EngineResult<()> {
        let mut inner = self.inner.write().await;
        inner.endpoint_results.insert(job_id, results.to_vec());
        Ok(())
    }

    async fn record_execution_summary(
        &self,
        job_id: Uuid,
        summary: &ExecutionSummary,
    ) -> EngineResult<()> {
        let mut inner = self.inner.write().await;
        let execution = inner
            .executions
            .get_mut(&job_id)
            .ok_or(EngineError::JobNotFound { job_id })?;
        execution.summary = Some(summary.clone());
        execution.updated_at = Utc::now();
        Ok(())
    }

    async fn update_job_schedule(
        &self,
        job_id: Uuid,
        decision: &ScheduleDecision,
    ) -> EngineResult<()> {
        let mut inner = self.inner.write().await;
        let record = inner
            .jobs
            .get_mut(&job_id)
            .ok_or(EngineError::JobNotFound { job_id })?;
        record.job.next_run_at = Some(decision.next_run_at);
        record.job.updated_at = Utc::now();
        Ok(())
    }

    async fn record_job_error(
        &self,
        job_id: Uuid,
        message: &str,
        code: Option<&str>,
    ) -> EngineResult<()> {
        let mut inner = self.inner.write().await;
        inner.errors.entry(job_id).or_default().push(JobError {
            job_id,
            message: message.to_string(),
            code: code.map(str::to_string),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    async fn update_execution_status(
        &self,
        job_id: Uuid,
        status: JobExecutionStatusUpdate,
        _error_message: Option<&str>,
    ) -> EngineResult<()> {
        let mut inner = self.inner.write().await;
        let execution = inner
            .executions
            .get_mut(&job_id)
            .ok_or(EngineError::JobNotFound { job_id })?;
        execution.status = match status {
            JobExecutionStatusUpdate::Running => JobExecutionStatus::Running,
            JobExecutionStatusUpdate::Completed => JobExecutionStatus::Completed,
            JobExecutionStatusUpdate::Failed => JobExecutionStatus::Failed,
        };
        execution.updated_at = Utc::now();
        Ok(())
    }

    async fn update_job_token_usage(&self, job_id: Uuid, delta: &TokenUsage) -> EngineResult<()> {
        let mut inner = self.inner.write().await;
        let record = inner
            .jobs
            .get_mut(&job_id)
            .ok_or(EngineError::JobNotFound { job_id })?;
        record.job.tokens.accumulate(delta);
        Ok(())
    }

    async fn update_job_escalation(
        &self,
        job_id: Uuid,
        level: EscalationLevel,
        disabled_endpoint_ids: &[Uuid],
    ) -> EngineResult<()> {
        let mut inner = self.inner.write().await;
        let record = inner
            .jobs
            .get_mut(&job_id)
            .ok_or(EngineError::JobNotFound { job_id })?;
        record.job.escalation_level = level;
        record.job.disabled_endpoint_ids = disabled_endpoint_ids.to_vec();
        record.job.updated_at = Utc::now();
        Ok(())
    }

    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_job(id: Uuid) -> Job {
        let now = Utc::now();
        Job {
            id,
            definition: "poll inbox".to_string(),
            status: JobStatus::Active,
            locked: false,
            lock_expires_at: None,
            next_run_at: None,
            tokens: TokenUsage::default(),
            owner_id: Uuid::new_v4(),
            default_headers: HashMap::new(),
            escalation_level: EscalationLevel::None,
            disabled_endpoint_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn fetch_due_jobs_skips_locked_and_future() {
        let store = InMemoryDataStoreGateway::new();
        let due = sample_job(Uuid::new_v4());
        let mut locked = sample_job(Uuid::new_v4());
        locked.locked = true;
        let mut future = sample_job(Uuid::new_v4());
        future.next_run_at = Some(Utc::now() + chrono::Duration::hours(1));

        store.seed_job(due.clone(), vec![], vec![], vec![]).await;
        store.seed_job(locked, vec![], vec![], vec![]).await;
        store.seed_job(future, vec![], vec![], vec![]).await;

        let result = store.fetch_due_jobs(10, Utc::now()).await.unwrap();
        assert_eq!(result, vec![due.id]);
    }

    #[tokio::test]
    async fn lock_job_rejects_concurrent_lock_but_allows_stale() {
        let store = InMemoryDataStoreGateway::new();
        let job = sample_job(Uuid::new_v4());
        store.seed_job(job.clone(), vec![], vec![], vec![]).await;

        let future_expiry = Utc::now() + chrono::Duration::minutes(5);
        assert!(store.lock_job(job.id, future_expiry).await.unwrap());
        assert!(!store.lock_job(job.id, future_expiry).await.unwrap());

        let past_expiry = Utc::now() - chrono::Duration::minutes(1);
        {
            let mut inner = store.inner.write().await;
            inner.jobs.get_mut(&job.id).unwrap().job.lock_expires_at = Some(past_expiry);
        }
        assert!(store.lock_job(job.id, future_expiry).await.unwrap());
    }

    #[tokio::test]
    async fn token_usage_accumulates() {
        let store = InMemoryDataStoreGateway::new();
        let job = sample_job(Uuid::new_v4());
        store.seed_job(job.clone(), vec![], vec![], vec![]).await;

        store
            .update_job_token_usage(
                job.id,
                &TokenUsage {
                    input_tokens: 10,
                    output_tokens: 5,
                    reasoning_tokens: 0,
                    cached_input_tokens: 0,
                    total_tokens: 15,
                },
            )
            .await
            .unwrap();

        let updated = store.get_job(job.id).await.unwrap();
        assert_eq!(updated.tokens.total_tokens, 15);
    }

    #[tokio::test]
    async fn escalation_state_persists() {
        let store = InMemoryDataStoreGateway::new();
        let job = sample_job(Uuid::new_v4());
        store.seed_job(job.clone(), vec![], vec![], vec![]).await;

        let disabled = vec![Uuid::new_v4()];
        store
            .update_job_escalation(job.id, EscalationLevel::Critical, &disabled)
            .await
            .unwrap();

        let updated = store.get_job(job.id).await.unwrap();
        assert_eq!(updated.escalation_level, EscalationLevel::Critical);
        assert_eq!(updated.disabled_endpoint_ids, disabled);
    }
}
