//! Engine Lifecycle: `start`/`stop`/`processCycle`/`getState`. Owns the
//! periodic tick (via `tokio-cron-scheduler`) and the single `EngineState`
//! instance, and the shutdown-aware cancellation signal fanned out to
//! every in-flight cycle.

use crate::error::{EngineError, EngineResult};
use crate::model::{EngineState, EngineStatus};
use crate::orchestrator::{initial_progress, CycleOrchestrator};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};
use tokio_cron_scheduler::{Job as CronJob, JobScheduler};

pub struct EngineLifecycle {
    orchestrator: Arc<CycleOrchestrator>,
    state: Arc<RwLock<EngineState>>,
    cancel_tx: Arc<Mutex<Option<watch::Sender<bool>>>>,
    scheduler: Mutex<Option<JobScheduler>>,
    processing_interval_ms: u64,
}

impl EngineLifecycle {
    pub fn new(orchestrator: Arc<CycleOrchestrator>, processing_interval_ms: u64) -> Self {
        Self {
            orchestrator,
            state: Arc::new(RwLock::new(EngineState {
                status: EngineStatus::Stopped,
                start_time: None,
                stop_time: None,
                last_processing_time: None,
                stats: Default::default(),
                progress: None,
            })),
            cancel_tx: Arc::new(Mutex::new(None)),
            scheduler: Mutex::new(None),
            processing_interval_ms,
        }
    }

    pub async fn get_state(&self) -> EngineState {
        self.state.read().await.clone()
    }

    pub async fn start(&self) -> EngineResult<()> {
        {
            let mut state = self.state.write().await;
            if state.status == EngineStatus::Running {
                return Err(EngineError::Internal("engine already running".to_string()));
            }
            state.status = EngineStatus::Running;
            state.start_time = Some(Utc::now());
            state.stop_time = None;
        }

        let (tx, _rx) = watch::channel(false);
        *self.cancel_tx.lock().await = Some(tx);

        let mut scheduler = JobScheduler::new()
            .await
            .map_err(|e| EngineError::Internal(e.to_string()))?;

        let orchestrator = Arc::clone(&self.orchestrator);
        let state = Arc::clone(&self.state);
        let cancel_tx = Arc::clone(&self.cancel_tx);
        let interval_ms = self.processing_interval_ms.max(1);

        let job = CronJob::new_repeated_async(
            std::time::Duration::from_millis(interval_ms),
            move |_uuid, _l| {
                let orchestrator = Arc::clone(&orchestrator);
                let state = Arc::clone(&state);
                let cancel_tx = Arc::clone(&cancel_tx);
                Box::pin(async move {
                    tick(orchestrator, state, cancel_tx).await;
                })
            },
        )
        .map_err(|e| EngineError::Internal(e.to_string()))?;

        scheduler
            .add(job)
            .await
            .map_err(|e| EngineError::Internal(e.to_string()))?;
        scheduler
            .start()
            .await
            .map_err(|e| EngineError::Internal(e.to_string()))?;

        *self.scheduler.lock().await = Some(scheduler);
        Ok(())
    }

    pub async fn stop(&self) -> EngineResult<()> {
        if let Some(tx) = self.cancel_tx.lock().await.take() {
            let _ = tx.send(true);
        }
        if let Some(mut scheduler) = self.scheduler.lock().await.take() {
            let _ = scheduler.shutdown().await;
        }

        let mut state = self.state.write().await;
        state.status = EngineStatus::Stopped;
        state.stop_time = Some(Utc::now());
        state.progress = None;
        Ok(())
    }

    /// Runs one cycle synchronously, bypassing the periodic tick. Used by
    /// callers (and tests) that want `processCycle` without `start()`.
    pub async fn process_cycle(&self) -> EngineResult<crate::model::ProcessingResult> {
        let tx = self.cancel_tx.lock().await.clone();
        let rx = match tx {
            Some(tx) => tx.subscribe(),
            None => {
                let (_tx, rx) = watch::channel(false);
                rx
            }
        };
        run_cycle(&self.orchestrator, &self.state, rx).await
    }
}

async fn tick(
    orchestrator: Arc<CycleOrchestrator>,
    state: Arc<RwLock<EngineState>>,
    cancel_tx: Arc<Mutex<Option<watch::Sender<bool>>>>,
) {
    let rx = {
        let guard = cancel_tx.lock().await;
        match guard.as_ref() {
            Some(tx) => tx.subscribe(),
            None => return,
        }
    };
    if let Err(e) = run_cycle(&orchestrator, &state, rx).await {
        tracing::error!(error = %e, "cycle failed; continuing to next tick");
    }
}

async fn run_cycle(
    orchestrator: &CycleOrchestrator,
    state: &Arc<RwLock<EngineState>>,
    cancellation: watch::Receiver<bool>,
) -> EngineResult<crate::model::ProcessingResult> {
    {
        let mut s = state.write().await;
        if s.progress.is_some() {
            return Err(EngineError::Internal(
                "a cycle is already in progress; tick dropped".to_string(),
            ));
        }
        s.progress = Some(initial_progress(0, Utc::now()));
    }

    let result = orchestrator.process_cycle(cancellation, Arc::clone(state)).await;

    let mut s = state.write().await;
    s.progress = None;
    s.last_processing_time = Some(Utc::now());
    if let Ok(result) = &result {
        s.stats.cycles_processed += 1;
        s.stats.jobs_processed += result.jobs_processed as u64;
        s.stats.jobs_successful += result.successful_jobs as u64;
        s.stats.jobs_failed += result.failed_jobs as u64;
        // Component-owned lifetime counters, not per-cycle deltas: set rather
        // than accumulated to avoid double-counting across cycles.
        s.stats.endpoint_calls = result.endpoint_calls;
        s.stats.reasoner_calls = result.reasoner_calls;
        s.stats.tokens = result.tokens.clone();
        s.stats.plan_phase = result.plan_phase.clone();
        s.stats.schedule_phase = result.schedule_phase.clone();
        let duration_ms = (result.end_time - result.start_time).num_milliseconds().max(0) as u64;
        s.stats.last_cycle_duration_ms = duration_ms;
        let n = s.stats.cycles_processed as f64;
        s.stats.avg_cycle_duration_ms =
            s.stats.avg_cycle_duration_ms + (duration_ms as f64 - s.stats.avg_cycle_duration_ms) / n;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_is_stopped() {
        // constructed without running the tokio runtime's scheduler
        let state = EngineState {
            status: EngineStatus::Stopped,
            start_time: None,
            stop_time: None,
            last_processing_time: None,
            stats: Default::default(),
            progress: None,
        };
        assert_eq!(state.status, EngineStatus::Stopped);
    }
}
