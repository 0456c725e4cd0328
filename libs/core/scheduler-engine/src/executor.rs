//! Endpoint Executor: dispatches an `ExecutionPlan` under one of three
//! strategies, calling out to a pluggable `EndpointCaller` with timeout,
//! retry, and circuit-breaker gating around every attempt.

use crate::circuit::{CircuitRegistry, StateChange};
use crate::classify::classify_endpoint_failure;
use crate::error::{EngineError, EngineResult};
use crate::events::{EndpointCallStatus, EngineEvents};
use crate::metrics;
use crate::model::{Endpoint, EndpointExecutionResult, ExecutionPlan, ExecutionStrategy, PlanEntry};
use crate::retry::{RetryDecision, RetryInput, RetryPolicy};
use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct HttpCallOutcome {
    pub status_code: Option<u16>,
    pub body: String,
    pub is_timeout: bool,
}

/// Transport used to actually call an endpoint's URL. Kept free of
/// `reqwest` types so the engine crate has no HTTP dependency of its own;
/// the domain crate supplies the concrete implementation.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait EndpointCaller: Send + Sync {
    async fn call(
        &self,
        method: &str,
        url: &str,
        headers: HashMap<String, String>,
        body: Option<serde_json::Value>,
        timeout: Duration,
        cancellation: Option<tokio::sync::watch::Receiver<bool>>,
    ) -> EngineResult<HttpCallOutcome>;
}

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub max_concurrency: usize,
    pub default_concurrency_limit: usize,
    pub default_timeout_ms: u64,
    pub max_endpoint_retries: u32,
    pub response_content_length_limit: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 16,
            default_concurrency_limit: 4,
            default_timeout_ms: 10_000,
            max_endpoint_retries: 3,
            response_content_length_limit: 4096,
        }
    }
}

pub struct EndpointExecutor {
    caller: Arc<dyn EndpointCaller>,
    circuits: Arc<CircuitRegistry>,
    retry_policy: Arc<dyn RetryPolicy>,
    config: ExecutorConfig,
    events: Arc<dyn EngineEvents>,
    call_count: AtomicU64,
}

impl EndpointExecutor {
    pub fn new(
        caller: Arc<dyn EndpointCaller>,
        circuits: Arc<CircuitRegistry>,
        retry_policy: Arc<dyn RetryPolicy>,
        config: ExecutorConfig,
        events: Arc<dyn EngineEvents>,
    ) -> Self {
        Self {
            caller,
            circuits,
            retry_policy,
            config,
            events,
            call_count: AtomicU64::new(0),
        }
    }

    /// Cumulative count of terminal endpoint-call outcomes since this
    /// executor was constructed, read once per cycle by `EngineLifecycle`.
    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::Relaxed)
    }

    pub async fn execute_endpoints(
        &self,
        job_id: Uuid,
        endpoints: &[Endpoint],
        job_default_headers: &HashMap<String, String>,
        plan: &ExecutionPlan,
        cancellation: Option<watch::Receiver<bool>>,
    ) -> EngineResult<Vec<EndpointExecutionResult>> {
        let by_id: HashMap<Uuid, &Endpoint> = endpoints.iter().map(|e| (e.id, e)).collect();

        match plan.execution_strategy {
            ExecutionStrategy::Sequential => {
                self.run_sequential(job_id, &by_id, job_default_headers, plan, cancellation)
                    .await
            }
            ExecutionStrategy::Parallel => {
                let limit = plan
                    .concurrency_limit
                    .unwrap_or(self.config.default_concurrency_limit)
                    .min(self.config.max_concurrency);
                self.run_wave(
                    job_id,
                    &by_id,
                    job_default_headers,
                    &plan.endpoints_to_call,
                    limit,
                    cancellation,
                )
                .await
            }
            ExecutionStrategy::Mixed => {
                self.run_mixed(job_id, &by_id, job_default_headers, plan, cancellation)
                    .await
            }
        }
    }

    async fn run_sequential(
        &self,
        job_id: Uuid,
        by_id: &HashMap<Uuid, &Endpoint>,
        job_default_headers: &HashMap<String, String>,
        plan: &ExecutionPlan,
        cancellation: Option<watch::Receiver<bool>>,
    ) -> EngineResult<Vec<EndpointExecutionResult>> {
        let mut ordered = plan.endpoints_to_call.clone();
        ordered.sort_by_key(|e| e.priority);

        let mut results = Vec::with_capacity(ordered.len());
        for entry in &ordered {
            let critical = entry.critical;
            let result = self
                .execute_single(job_id, by_id, job_default_headers, entry, cancellation.clone())
                .await;
            let failed = !result.success;
            results.push(result);
            if critical && failed {
                break;
            }
        }
        Ok(results)
    }

    async fn run_wave(
        &self,
        job_id: Uuid,
        by_id: &HashMap<Uuid, &Endpoint>,
        job_default_headers: &HashMap<String, String>,
        entries: &[PlanEntry],
        concurrency_limit: usize,
        cancellation: Option<watch::Receiver<bool>>,
    ) -> EngineResult<Vec<EndpointExecutionResult>> {
        let limit = concurrency_limit.max(1);
        let mut in_flight = FuturesUnordered::new();
        let mut remaining = entries.iter();
        let mut results = Vec::with_capacity(entries.len());

        for entry in remaining.by_ref().take(limit) {
            in_flight.push(self.execute_single(job_id, by_id, job_default_headers, entry, cancellation.clone()));
        }
        while let Some(result) = in_flight.next().await {
            results.push(result);
            if let Some(entry) = remaining.next() {
                in_flight.push(self.execute_single(job_id, by_id, job_default_headers, entry, cancellation.clone()));
            }
        }
        Ok(results)
    }

    async fn run_mixed(
        &self,
        job_id: Uuid,
        by_id: &HashMap<Uuid, &Endpoint>,
        job_default_headers: &HashMap<String, String>,
        plan: &ExecutionPlan,
        cancellation: Option<watch::Receiver<bool>>,
    ) -> EngineResult<Vec<EndpointExecutionResult>> {
        let mut pending: Vec<PlanEntry> = plan.endpoints_to_call.clone();
        let mut completed: HashSet<Uuid> = HashSet::new();
        let mut failed_critical: HashSet<Uuid> = HashSet::new();
        let mut results = Vec::with_capacity(pending.len());

        while !pending.is_empty() {
            let limit = plan
                .concurrency_limit
                .unwrap_or(self.config.default_concurrency_limit)
                .min(self.config.max_concurrency);

            let (ready, not_ready): (Vec<_>, Vec<_>) = pending.into_iter().partition(|e| {
                e.depends_on.iter().all(|d| completed.contains(d))
                    && e.depends_on.iter().all(|d| !failed_critical.contains(d))
            });

            if ready.is_empty() {
                let pending_ids = not_ready.iter().map(|e| e.endpoint_id).collect();
                return Err(EngineError::CircularDependency(pending_ids));
            }

            let wave = self
                .run_wave(job_id, by_id, job_default_headers, &ready, limit, cancellation.clone())
                .await?;
            for (entry, result) in ready.iter().zip(wave.iter()) {
                if result.success {
                    completed.insert(entry.endpoint_id);
                } else if entry.critical {
                    failed_critical.insert(entry.endpoint_id);
                }
            }
            results.extend(wave);
            pending = not_ready;
        }
        Ok(results)
    }

    async fn execute_single(
        &self,
        job_id: Uuid,
        by_id: &HashMap<Uuid, &Endpoint>,
        job_default_headers: &HashMap<String, String>,
        entry: &PlanEntry,
        cancellation: Option<watch::Receiver<bool>>,
    ) -> EndpointExecutionResult {
        let now = Utc::now();
        let Some(endpoint) = by_id.get(&entry.endpoint_id) else {
            return EndpointExecutionResult {
                endpoint_id: entry.endpoint_id,
                success: false,
                status_code: None,
                execution_time_ms: 0,
                timestamp: now,
                response_content: None,
                truncated: false,
                error: Some("endpoint not found".to_string()),
                attempts: 0,
                aborted: false,
            };
        };
        let endpoint = *endpoint;

        if self.circuits.try_admit(entry.endpoint_id) == crate::circuit::Admission::Rejected {
            self.record_call_outcome(false);
            self.events.on_endpoint_progress(
                job_id,
                entry.endpoint_id,
                EndpointCallStatus::Failed,
                0,
                Some("circuit_open"),
            );
            return EndpointExecutionResult {
                endpoint_id: entry.endpoint_id,
                success: false,
                status_code: None,
                execution_time_ms: 0,
                timestamp: now,
                response_content: None,
                truncated: false,
                error: Some("circuit_open".to_string()),
                attempts: 0,
                aborted: false,
            };
        }

        let mut headers = job_default_headers.clone();
        headers.extend(endpoint.default_headers.clone());
        if let Some(plan_headers) = &entry.headers {
            headers.extend(plan_headers.clone());
        }

        let (url, body) = self.build_request(endpoint, entry, &mut headers);
        let timeout = Duration::from_millis(if endpoint.timeout_ms > 0 {
            endpoint.timeout_ms
        } else {
            self.config.default_timeout_ms
        });

        let start = std::time::Instant::now();
        let max_attempts = self.config.max_endpoint_retries + 1;
        let mut last_error: Option<String> = None;
        let mut last_status: Option<u16> = None;
        let mut last_body: Option<String> = None;
        let mut aborted = false;

        for attempt in 1..=max_attempts {
            self.events
                .on_endpoint_progress(job_id, entry.endpoint_id, EndpointCallStatus::Running, attempt, None);

            let outcome = self
                .caller
                .call(
                    &endpoint.method,
                    &url,
                    headers.clone(),
                    body.clone(),
                    timeout,
                    cancellation.clone(),
                )
                .await;

            match outcome {
                Ok(outcome) if (200..300).contains(&outcome.status_code.unwrap_or(0)) => {
                    self.report_circuit_change(
                        entry.endpoint_id,
                        self.circuits.record_success(entry.endpoint_id),
                    );
                    self.record_call_outcome(true);
                    let (content, truncated) = self.truncate(&outcome.body);
                    self.events.on_endpoint_progress(
                        job_id,
                        entry.endpoint_id,
                        EndpointCallStatus::Success,
                        attempt,
                        None,
                    );
                    return EndpointExecutionResult {
                        endpoint_id: entry.endpoint_id,
                        success: true,
                        status_code: outcome.status_code,
                        execution_time_ms: start.elapsed().as_millis() as u64,
                        timestamp: Utc::now(),
                        response_content: Some(content),
                        truncated,
                        error: None,
                        attempts: attempt,
                        aborted: false,
                    };
                }
                Ok(outcome) => {
                    last_status = outcome.status_code;
                    last_body = Some(outcome.body.clone());
                    let classification =
                        classify_endpoint_failure(false, outcome.status_code, outcome.is_timeout);
                    last_error = Some(format!("http status {:?}", outcome.status_code));

                    let decision = self.retry_policy.evaluate(RetryInput {
                        attempt,
                        max_attempts,
                        category: classification.category,
                        transient: classification.transient,
                    });

                    if decision == RetryDecision::Retry {
                        self.events.on_retry_attempt(job_id, entry.endpoint_id, attempt);
                        let delay = self.retry_policy.next_delay_ms(attempt);
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                        continue;
                    }
                    if attempt == max_attempts {
                        self.events
                            .on_retry_exhausted(job_id, entry.endpoint_id, attempt);
                    }
                    self.report_circuit_change(
                        entry.endpoint_id,
                        self.circuits.record_failure(entry.endpoint_id),
                    );
                    break;
                }
                Err(EngineError::Aborted) => {
                    aborted = true;
                    break;
                }
                Err(e) => {
                    last_error = Some(e.to_string());
                    let classification = classify_endpoint_failure(false, None, false);
                    let decision = self.retry_policy.evaluate(RetryInput {
                        attempt,
                        max_attempts,
                        category: classification.category,
                        transient: classification.transient,
                    });
                    if decision == RetryDecision::Retry {
                        self.events.on_retry_attempt(job_id, entry.endpoint_id, attempt);
                        let delay = self.retry_policy.next_delay_ms(attempt);
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                        continue;
                    }
                    self.report_circuit_change(
                        entry.endpoint_id,
                        self.circuits.record_failure(entry.endpoint_id),
                    );
                    break;
                }
            }
        }

        if !aborted {
            self.record_call_outcome(false);
        }
        self.events.on_endpoint_progress(
            job_id,
            entry.endpoint_id,
            EndpointCallStatus::Failed,
            max_attempts,
            last_error.as_deref(),
        );

        let (content, truncated) = last_body
            .as_deref()
            .map(|b| self.truncate(b))
            .unwrap_or((String::new(), false));

        EndpointExecutionResult {
            endpoint_id: entry.endpoint_id,
            success: false,
            status_code: last_status,
            execution_time_ms: start.elapsed().as_millis() as u64,
            timestamp: Utc::now(),
            response_content: if last_body.is_some() { Some(content) } else { None },
            truncated,
            error: last_error,
            attempts: max_attempts,
            aborted,
        }
    }

    fn record_call_outcome(&self, success: bool) {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        metrics::record_endpoint_call(success);
    }

    /// Surfaces a circuit transition, if one happened, through both the
    /// event hook and its gauge. A no-op call costs one `Option` match.
    fn report_circuit_change(&self, endpoint_id: Uuid, change: Option<StateChange>) {
        if let Some(change) = change {
            self.events
                .on_circuit_state_change(endpoint_id, change.from, change.to);
            metrics::set_circuit_state(endpoint_id, change.to);
        }
    }

    fn build_request(
        &self,
        endpoint: &Endpoint,
        entry: &PlanEntry,
        headers: &mut HashMap<String, String>,
    ) -> (String, Option<serde_json::Value>) {
        let is_get = endpoint.method.eq_ignore_ascii_case("GET");
        if is_get {
            let query = entry
                .parameters
                .as_ref()
                .and_then(|v| v.as_object())
                .map(|obj| {
                    obj.iter()
                        .map(|(k, v)| {
                            format!(
                                "{}={}",
                                urlencoding::encode(k),
                                urlencoding::encode(&v.to_string().trim_matches('"'))
                            )
                        })
                        .collect::<Vec<_>>()
                        .join("&")
                })
                .unwrap_or_default();
            let url = if query.is_empty() {
                endpoint.url.clone()
            } else {
                format!("{}?{}", endpoint.url, query)
            };
            (url, None)
        } else {
            headers
                .entry("Content-Type".to_string())
                .or_insert_with(|| "application/json".to_string());
            (endpoint.url.clone(), entry.parameters.clone())
        }
    }

    fn truncate(&self, body: &str) -> (String, bool) {
        let limit = self.config.response_content_length_limit;
        if body.len() > limit {
            (body.chars().take(limit).collect(), true)
        } else {
            (body.to_string(), false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::{CircuitBreakerConfig, CircuitRegistry};
    use crate::events::NullEvents;
    use crate::model::ExecutionStrategy;
    use crate::retry::ExponentialBackoffPolicy;

    fn endpoint(id: Uuid) -> Endpoint {
        Endpoint {
            id,
            job_id: Uuid::new_v4(),
            method: "GET".to_string(),
            url: "https://example.test/ok".to_string(),
            default_headers: HashMap::new(),
            timeout_ms: 1000,
            fire_and_forget: false,
            created_at: Utc::now(),
        }
    }

    fn plan_entry(id: Uuid, priority: i32, critical: bool) -> PlanEntry {
        PlanEntry {
            endpoint_id: id,
            parameters: None,
            headers: None,
            priority,
            depends_on: vec![],
            critical,
        }
    }

    #[tokio::test]
    async fn sequential_stops_after_critical_failure() {
        let e1 = Uuid::new_v4();
        let e2 = Uuid::new_v4();
        let endpoints = vec![endpoint(e1), endpoint(e2)];

        let mut caller = MockEndpointCaller::new();
        caller.expect_call().times(1).returning(|_, _, _, _, _, _| {
            Ok(HttpCallOutcome {
                status_code: Some(500),
                body: "".into(),
                is_timeout: false,
            })
        });

        let executor = EndpointExecutor::new(
            Arc::new(caller),
            Arc::new(CircuitRegistry::new(CircuitBreakerConfig::default())),
            Arc::new(ExponentialBackoffPolicy { base_delay_ms: 1 }),
            ExecutorConfig {
                max_endpoint_retries: 0,
                ..Default::default()
            },
            Arc::new(NullEvents),
        );

        let plan = ExecutionPlan {
            endpoints_to_call: vec![plan_entry(e1, 1, true), plan_entry(e2, 2, false)],
            execution_strategy: ExecutionStrategy::Sequential,
            concurrency_limit: None,
            preliminary_next_run_at: None,
            reasoning: "r".into(),
            confidence: 0.5,
        };

        let results = executor
            .execute_endpoints(Uuid::new_v4(), &endpoints, &HashMap::new(), &plan, None)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!(!results[0].success);
    }

    #[tokio::test]
    async fn mixed_strategy_reports_cycle_as_circular_dependency() {
        let e1 = Uuid::new_v4();
        let e2 = Uuid::new_v4();
        let endpoints = vec![endpoint(e1), endpoint(e2)];
        let caller = MockEndpointCaller::new();

        let executor = EndpointExecutor::new(
            Arc::new(caller),
            Arc::new(CircuitRegistry::new(CircuitBreakerConfig::default())),
            Arc::new(ExponentialBackoffPolicy { base_delay_ms: 1 }),
            ExecutorConfig::default(),
            Arc::new(NullEvents),
        );

        let mut entry1 = plan_entry(e1, 1, false);
        entry1.depends_on = vec![e2];
        let mut entry2 = plan_entry(e2, 2, false);
        entry2.depends_on = vec![e1];

        let plan = ExecutionPlan {
            endpoints_to_call: vec![entry1, entry2],
            execution_strategy: ExecutionStrategy::Mixed,
            concurrency_limit: None,
            preliminary_next_run_at: None,
            reasoning: "r".into(),
            confidence: 0.5,
        };

        let err = executor
            .execute_endpoints(Uuid::new_v4(), &endpoints, &HashMap::new(), &plan, None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::CircularDependency(_)));
    }
}
