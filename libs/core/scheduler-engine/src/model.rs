//! Data model shared by every component of the engine: jobs, endpoints,
//! execution plans and results, schedule decisions, and the process-local
//! engine/circuit state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Active,
    Paused,
    Archived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemEnvironment {
    Production,
    Development,
    Test,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub reasoning_tokens: u64,
    pub cached_input_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn accumulate(&mut self, delta: &TokenUsage) {
        self.input_tokens += delta.input_tokens;
        self.output_tokens += delta.output_tokens;
        self.reasoning_tokens += delta.reasoning_tokens;
        self.cached_input_tokens += delta.cached_input_tokens;
        self.total_tokens += delta.total_tokens;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub definition: String,
    pub status: JobStatus,
    pub locked: bool,
    pub lock_expires_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub tokens: TokenUsage,
    pub owner_id: Uuid,
    #[serde(default)]
    pub default_headers: HashMap<String, String>,
    #[serde(default)]
    pub escalation_level: EscalationLevel,
    #[serde(default)]
    pub disabled_endpoint_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: Uuid,
    pub job_id: Uuid,
    pub method: String,
    pub url: String,
    pub default_headers: HashMap<String, String>,
    pub timeout_ms: u64,
    pub fire_and_forget: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointUsage {
    pub endpoint_id: Uuid,
    pub last_called_at: DateTime<Utc>,
    pub last_status_code: Option<u16>,
}

#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub current_time: DateTime<Utc>,
    pub system_environment: SystemEnvironment,
    pub resource_constraints: Option<serde_json::Value>,
    pub cancellation: Option<tokio::sync::watch::Receiver<bool>>,
}

#[derive(Debug, Clone)]
pub struct JobContext {
    pub job: Job,
    pub endpoints: Vec<Endpoint>,
    pub recent_messages: Vec<Message>,
    pub recent_endpoint_usage: Vec<EndpointUsage>,
    pub execution: ExecutionContext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStrategy {
    Sequential,
    Parallel,
    Mixed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanEntry {
    pub endpoint_id: Uuid,
    #[serde(default)]
    pub parameters: Option<serde_json::Value>,
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
    pub priority: i32,
    #[serde(default)]
    pub depends_on: Vec<Uuid>,
    #[serde(default)]
    pub critical: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub endpoints_to_call: Vec<PlanEntry>,
    pub execution_strategy: ExecutionStrategy,
    #[serde(default)]
    pub concurrency_limit: Option<usize>,
    #[serde(default)]
    pub preliminary_next_run_at: Option<DateTime<Utc>>,
    pub reasoning: String,
    pub confidence: f64,
}

impl ExecutionPlan {
    /// Validates the structural invariants every plan must satisfy before execution:
    /// every `depends_on` id appears in the plan, and under `mixed` the dependency
    /// graph is acyclic.
    pub fn validate(&self) -> Result<(), String> {
        let ids: std::collections::HashSet<Uuid> =
            self.endpoints_to_call.iter().map(|e| e.endpoint_id).collect();
        for entry in &self.endpoints_to_call {
            for dep in &entry.depends_on {
                if !ids.contains(dep) {
                    return Err(format!(
                        "plan references unknown dependency {dep} from endpoint {}",
                        entry.endpoint_id
                    ));
                }
            }
        }
        if self.execution_strategy == ExecutionStrategy::Mixed {
            self.check_acyclic()?;
        }
        Ok(())
    }

    fn check_acyclic(&self) -> Result<(), String> {
        let mut remaining: Vec<&PlanEntry> = self.endpoints_to_call.iter().collect();
        let mut done: std::collections::HashSet<Uuid> = std::collections::HashSet::new();
        while !remaining.is_empty() {
            let before = remaining.len();
            remaining.retain(|e| {
                if e.depends_on.iter().all(|d| done.contains(d)) {
                    done.insert(e.endpoint_id);
                    false
                } else {
                    true
                }
            });
            if remaining.len() == before {
                return Err("dependency graph under mixed strategy is cyclic".to_string());
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointExecutionResult {
    pub endpoint_id: Uuid,
    pub success: bool,
    pub status_code: Option<u16>,
    pub execution_time_ms: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub response_content: Option<String>,
    #[serde(default)]
    pub truncated: bool,
    #[serde(default)]
    pub error: Option<String>,
    pub attempts: u32,
    #[serde(default)]
    pub aborted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub total_duration_ms: u64,
    pub success_count: u32,
    pub failure_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobExecution {
    pub plan: ExecutionPlan,
    pub confidence: f64,
    pub reasoning: String,
    pub strategy: ExecutionStrategy,
    pub status: JobExecutionStatus,
    pub summary: Option<ExecutionSummary>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobError {
    pub job_id: Uuid,
    pub message: String,
    pub code: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionPriority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendedAction {
    #[serde(rename = "type")]
    pub action_type: String,
    pub details: String,
    pub priority: ActionPriority,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleDecision {
    pub next_run_at: DateTime<Utc>,
    pub reasoning: String,
    pub confidence: f64,
    #[serde(default)]
    pub recommended_actions: Vec<RecommendedAction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineStatus {
    Stopped,
    Running,
    Paused,
    Error,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhaseCounters {
    pub malformed_responses: u64,
    pub repair_attempts: u64,
    pub repair_successes: u64,
    pub repair_failures: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineStats {
    pub cycles_processed: u64,
    pub jobs_processed: u64,
    pub jobs_successful: u64,
    pub jobs_failed: u64,
    pub endpoint_calls: u64,
    pub reasoner_calls: u64,
    pub tokens: TokenUsage,
    pub plan_phase: PhaseCounters,
    pub schedule_phase: PhaseCounters,
    pub last_cycle_duration_ms: u64,
    pub avg_cycle_duration_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointProgress {
    pub total: usize,
    pub completed: usize,
    #[serde(default)]
    pub by_id: Option<HashMap<Uuid, bool>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleProgress {
    pub total: usize,
    pub completed: usize,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub endpoints: Option<EndpointProgress>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineState {
    pub status: EngineStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub stop_time: Option<DateTime<Utc>>,
    pub last_processing_time: Option<DateTime<Utc>>,
    pub stats: EngineStats,
    pub progress: Option<CycleProgress>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitBreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitState {
    pub state: CircuitBreakerState,
    pub consecutive_failures: u32,
    pub window_start: DateTime<Utc>,
    pub opened_at: Option<DateTime<Utc>>,
    pub half_open_in_flight: u32,
    pub half_open_successes: u32,
    pub half_open_failures: u32,
}

impl Default for CircuitState {
    fn default() -> Self {
        Self {
            state: CircuitBreakerState::Closed,
            consecutive_failures: 0,
            window_start: Utc::now(),
            opened_at: None,
            half_open_in_flight: 0,
            half_open_successes: 0,
            half_open_failures: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationLevel {
    None,
    Warn,
    Critical,
}

impl Default for EscalationLevel {
    fn default() -> Self {
        Self::None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    None,
    BackoffOnly,
    DisableEndpoint,
}

#[derive(Debug, Clone)]
pub struct ProcessingResult {
    pub cycle_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub jobs_processed: u32,
    pub successful_jobs: u32,
    pub failed_jobs: u32,
    pub errors: Vec<JobError>,
    /// Lifetime (not per-cycle) counters pulled from the executor/reasoner
    /// at the end of this cycle, folded into `EngineState.stats` verbatim.
    pub endpoint_calls: u64,
    pub reasoner_calls: u64,
    pub tokens: TokenUsage,
    pub plan_phase: PhaseCounters,
    pub schedule_phase: PhaseCounters,
}
