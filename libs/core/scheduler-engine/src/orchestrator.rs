//! Cycle Orchestrator: fetches a batch of due jobs and runs them through a
//! bounded worker pool sharing a monotonic index, a `JoinSet` of workers
//! pulling from an atomic counter for concurrent job processing.

use crate::error::EngineResult;
use crate::events::EngineEvents;
use crate::job_processor::JobProcessor;
use crate::metrics;
use crate::model::{CycleProgress, EndpointProgress, EngineState, ProcessingResult};
use crate::store::DataStoreGateway;
use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinSet;
use uuid::Uuid;

pub struct CycleOrchestratorConfig {
    pub max_batch_size: usize,
    pub job_processing_concurrency: usize,
}

pub struct CycleOrchestrator {
    store: Arc<dyn DataStoreGateway>,
    processor: Arc<JobProcessor>,
    events: Arc<dyn EngineEvents>,
    config: CycleOrchestratorConfig,
}

impl CycleOrchestrator {
    pub fn new(
        store: Arc<dyn DataStoreGateway>,
        processor: Arc<JobProcessor>,
        events: Arc<dyn EngineEvents>,
        config: CycleOrchestratorConfig,
    ) -> Self {
        Self {
            store,
            processor,
            events,
            config,
        }
    }

    /// Runs one cycle to completion. `cancellation` is observed by the
    /// executor/reasoner through the job context; this method itself
    /// always runs every already-dispatched job to completion before
    /// returning (cancellation aborts in-flight I/O, not the loop).
    /// `state` is the lifecycle's shared `EngineState`: this method keeps
    /// `state.progress` current (`total` at spawn, `completed` per
    /// finished job) so `getState()` reflects an in-progress cycle.
    pub async fn process_cycle(
        &self,
        cancellation: watch::Receiver<bool>,
        state: Arc<RwLock<EngineState>>,
    ) -> EngineResult<ProcessingResult> {
        let cycle_id = Uuid::new_v4();
        let start_time = Utc::now();
        let cycle_clock = std::time::Instant::now();

        let job_ids = self.store.fetch_due_jobs(self.config.max_batch_size, start_time).await?;
        if job_ids.is_empty() {
            let end_time = Utc::now();
            metrics::record_cycle_duration(cycle_clock.elapsed());
            let reasoner_stats = self.processor.reasoner().stats_snapshot();
            return Ok(ProcessingResult {
                cycle_id,
                start_time,
                end_time,
                jobs_processed: 0,
                successful_jobs: 0,
                failed_jobs: 0,
                errors: vec![],
                endpoint_calls: self.processor.executor().call_count(),
                reasoner_calls: reasoner_stats.calls,
                tokens: reasoner_stats.tokens,
                plan_phase: reasoner_stats.plan_phase,
                schedule_phase: reasoner_stats.schedule_phase,
            });
        }

        let total = job_ids.len();
        self.events.on_execution_progress(None, total, 0);
        metrics::set_in_flight_jobs(total as f64);
        {
            let mut s = state.write().await;
            if let Some(progress) = s.progress.as_mut() {
                progress.total = total;
                progress.updated_at = Utc::now();
            }
        }

        let job_ids = Arc::new(job_ids);
        let next_index = Arc::new(AtomicUsize::new(0));
        let completed = Arc::new(AtomicUsize::new(0));
        let worker_count = self.config.job_processing_concurrency.min(total).max(1);

        let mut joinset = JoinSet::new();
        for _ in 0..worker_count {
            let job_ids = Arc::clone(&job_ids);
            let next_index = Arc::clone(&next_index);
            let completed = Arc::clone(&completed);
            let processor = Arc::clone(&self.processor);
            let events = Arc::clone(&self.events);
            let state = Arc::clone(&state);
            let mut cancellation = cancellation.clone();

            joinset.spawn(async move {
                let mut outcomes = Vec::new();
                loop {
                    if *cancellation.borrow() {
                        break;
                    }
                    let idx = next_index.fetch_add(1, Ordering::SeqCst);
                    if idx >= job_ids.len() {
                        break;
                    }
                    let job_id = job_ids[idx];
                    let outcome = processor.process(job_id, cancellation.clone()).await;
                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    events.on_execution_progress(Some(job_id), job_ids.len(), done);
                    {
                        let mut s = state.write().await;
                        if let Some(progress) = s.progress.as_mut() {
                            progress.completed = done;
                            progress.updated_at = Utc::now();
                        }
                    }
                    outcomes.push(outcome);
                }
                outcomes
            });
        }

        let mut successful = 0u32;
        let mut failed = 0u32;
        let mut errors = Vec::new();

        while let Some(joined) = joinset.join_next().await {
            let outcomes = joined.unwrap_or_default();
            for outcome in outcomes {
                if outcome.skipped {
                    continue;
                }
                if outcome.succeeded {
                    successful += 1;
                } else {
                    failed += 1;
                    if let Some(message) = outcome.error {
                        errors.push(crate::model::JobError {
                            job_id: outcome.job_id,
                            message,
                            code: None,
                            timestamp: Utc::now(),
                        });
                    }
                }
            }
        }

        let end_time = Utc::now();
        metrics::set_in_flight_jobs(0.0);
        metrics::record_cycle_duration(cycle_clock.elapsed());
        self.events.on_execution_progress(None, total, total);
        let reasoner_stats = self.processor.reasoner().stats_snapshot();

        Ok(ProcessingResult {
            cycle_id,
            start_time,
            end_time,
            jobs_processed: successful + failed,
            successful_jobs: successful,
            failed_jobs: failed,
            errors,
            endpoint_calls: self.processor.executor().call_count(),
            reasoner_calls: reasoner_stats.calls,
            tokens: reasoner_stats.tokens,
            plan_phase: reasoner_stats.plan_phase,
            schedule_phase: reasoner_stats.schedule_phase,
        })
    }
}

/// Builds the initial progress snapshot published when a cycle starts.
pub fn initial_progress(total: usize, now: chrono::DateTime<Utc>) -> CycleProgress {
    CycleProgress {
        total,
        completed: 0,
        started_at: now,
        updated_at: now,
        endpoints: Some(EndpointProgress {
            total: 0,
            completed: 0,
            by_id: None,
        }),
    }
}
