//! Job Processor: the per-job pipeline run by each cycle worker. Every
//! side-effecting step after the main action is best-effort — its own
//! failure is logged, never propagated back to the worker loop.

use crate::error::EngineResult;
use crate::escalation::{self, EscalationInput, EscalationThresholds};
use crate::executor::EndpointExecutor;
use crate::metrics::{self, MetricsTimer};
use crate::model::{ExecutionSummary, JobContext};
use crate::reasoner::ReasonerGateway;
use crate::store::{DataStoreGateway, JobExecutionStatusUpdate};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

pub struct JobProcessorConfig {
    pub stale_lock_threshold_ms: i64,
    pub allow_cancellation: bool,
    pub escalation_thresholds: EscalationThresholds,
}

pub struct JobOutcome {
    pub job_id: Uuid,
    pub succeeded: bool,
    /// Another processor already owned the lock; not a failure, not counted
    /// toward successful/failed totals.
    pub skipped: bool,
    pub error: Option<String>,
}

pub struct JobProcessor {
    store: Arc<dyn DataStoreGateway>,
    reasoner: Arc<ReasonerGateway>,
    executor: Arc<EndpointExecutor>,
    config: JobProcessorConfig,
}

impl JobProcessor {
    pub fn new(
        store: Arc<dyn DataStoreGateway>,
        reasoner: Arc<ReasonerGateway>,
        executor: Arc<EndpointExecutor>,
        config: JobProcessorConfig,
    ) -> Self {
        Self {
            store,
            reasoner,
            executor,
            config,
        }
    }

    /// Exposed so `CycleOrchestrator` can pull lifetime call/token counters
    /// for `EngineState.stats` without this processor owning that concern.
    pub fn reasoner(&self) -> &Arc<ReasonerGateway> {
        &self.reasoner
    }

    pub fn executor(&self) -> &Arc<EndpointExecutor> {
        &self.executor
    }

    /// Runs the full lock -> context -> plan -> execute -> schedule ->
    /// unlock pipeline for one job. Never returns an `Err` to the caller:
    /// failures are folded into `JobOutcome`.
    pub async fn process(&self, job_id: Uuid, cancellation: watch::Receiver<bool>) -> JobOutcome {
        let _timer = MetricsTimer::new();
        match self.run(job_id, cancellation).await {
            Ok(Some(())) => {
                metrics::record_job_processed(metrics::JobStatus::Success);
                JobOutcome {
                    job_id,
                    succeeded: true,
                    skipped: false,
                    error: None,
                }
            }
            Ok(None) => {
                metrics::record_job_processed(metrics::JobStatus::Skipped);
                JobOutcome {
                    job_id,
                    succeeded: true,
                    skipped: true,
                    error: None,
                }
            }
            Err(e) => {
                metrics::record_job_processed(metrics::JobStatus::Failed);
                let message = e.to_string();
                self.record_failure(job_id, &message).await;
                JobOutcome {
                    job_id,
                    succeeded: false,
                    skipped: false,
                    error: Some(message),
                }
            }
        }
    }

    async fn run(&self, job_id: Uuid, cancellation: watch::Receiver<bool>) -> EngineResult<Option<()>> {
        let now = Utc::now();
        let lock_expires_at = now
            + chrono::Duration::milliseconds(self.config.stale_lock_threshold_ms);

        if !self.store.lock_job(job_id, lock_expires_at).await? {
            return Ok(None);
        }

        let result = self.run_locked(job_id, cancellation).await;

        // best-effort unlock regardless of outcome
        if let Err(e) = self.store.unlock_job(job_id).await {
            tracing::warn!(%job_id, error = %e, "failed to unlock job after processing");
        }

        result.map(Some)
    }

    async fn run_locked(&self, job_id: Uuid, cancellation: watch::Receiver<bool>) -> EngineResult<()> {
        if let Err(e) = self
            .store
            .update_execution_status(job_id, JobExecutionStatusUpdate::Running, None)
            .await
        {
            tracing::warn!(%job_id, error = %e, "failed to mark job running");
        }

        let mut context = self.store.get_job_context(job_id).await?;
        self.enrich_context(&mut context, cancellation);

        let (plan, plan_tokens) = self.reasoner.plan(&context).await?;
        if let Err(e) = self.store.update_job_token_usage(job_id, &plan_tokens).await {
            tracing::warn!(%job_id, error = %e, "failed to persist plan token usage");
        }
        self.store.record_execution_plan(job_id, &plan).await?;

        let start = Utc::now();
        let results = self
            .executor
            .execute_endpoints(
                job_id,
                &context.endpoints,
                &context.job.default_headers,
                &plan,
                context.execution.cancellation.clone(),
            )
            .await?;
        let end = Utc::now();

        self.store.record_endpoint_results(job_id, &results).await?;

        let summary = ExecutionSummary {
            start_time: start,
            end_time: end,
            total_duration_ms: results.iter().map(|r| r.execution_time_ms).sum(),
            success_count: results.iter().filter(|r| r.success).count() as u32,
            failure_count: results.iter().filter(|r| !r.success && !r.aborted).count() as u32,
        };
        self.store.record_execution_summary(job_id, &summary).await?;

        let escalation = escalation::compute(
            EscalationInput {
                failures: summary.failure_count,
                attempted: results.iter().filter(|r| !r.aborted).count() as u32,
                previous_level: context.job.escalation_level,
                failed_endpoint_ids: results
                    .iter()
                    .filter(|r| !r.success && !r.aborted)
                    .map(|r| r.endpoint_id)
                    .collect(),
                existing_disabled: context.job.disabled_endpoint_ids.clone(),
            },
            self.config.escalation_thresholds,
        );
        if let Err(e) = self
            .store
            .update_job_escalation(job_id, escalation.level, &escalation.disabled_endpoints)
            .await
        {
            tracing::warn!(%job_id, error = %e, "failed to persist escalation state");
        }

        let (decision, schedule_tokens) = self.reasoner.schedule(&context, &results).await?;
        if let Err(e) = self
            .store
            .update_job_token_usage(job_id, &schedule_tokens)
            .await
        {
            tracing::warn!(%job_id, error = %e, "failed to persist schedule token usage");
        }
        self.store.update_job_schedule(job_id, &decision).await?;

        if let Err(e) = self
            .store
            .update_execution_status(job_id, JobExecutionStatusUpdate::Completed, None)
            .await
        {
            tracing::warn!(%job_id, error = %e, "failed to mark job completed");
        }

        Ok(())
    }

    async fn record_failure(&self, job_id: Uuid, message: &str) {
        if let Err(e) = self.store.record_job_error(job_id, message, None).await {
            tracing::warn!(%job_id, error = %e, "failed to record job error");
        }
        if let Err(e) = self
            .store
            .update_execution_status(job_id, JobExecutionStatusUpdate::Failed, Some(message))
            .await
        {
            tracing::warn!(%job_id, error = %e, "failed to mark job failed");
        }
        if let Err(e) = self.store.unlock_job(job_id).await {
            tracing::warn!(%job_id, error = %e, "failed to unlock job after failure");
        }
    }

    fn enrich_context(&self, context: &mut JobContext, cancellation: watch::Receiver<bool>) {
        context.execution.current_time = Utc::now();
        context.execution.cancellation = if self.config.allow_cancellation {
            Some(cancellation)
        } else {
            None
        };
        let disabled = &context.job.disabled_endpoint_ids;
        if !disabled.is_empty() {
            context.endpoints.retain(|e| !disabled.contains(&e.id));
        }
    }
}
