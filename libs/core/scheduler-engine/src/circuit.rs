//! Per-endpoint circuit breaker registry. Each endpoint id owns its own
//! state guarded by its own mutex, so two endpoints never contend on the
//! same lock.

use crate::model::{CircuitBreakerState, CircuitState};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub enabled: bool,
    pub failure_threshold: u32,
    pub window_ms: i64,
    pub cooldown_ms: i64,
    pub half_open_max_calls: u32,
    pub half_open_successes_to_close: u32,
    pub half_open_failures_to_reopen: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            window_ms: 60_000,
            cooldown_ms: 30_000,
            half_open_max_calls: 1,
            half_open_successes_to_close: 2,
            half_open_failures_to_reopen: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Rejected,
}

pub struct CircuitRegistry {
    config: CircuitBreakerConfig,
    states: Mutex<HashMap<Uuid, CircuitState>>,
}

impl CircuitRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn snapshot(&self, endpoint_id: Uuid) -> CircuitState {
        let mut states = self.states.lock().expect("circuit mutex poisoned");
        states.entry(endpoint_id).or_default().clone()
    }

    /// Decides whether a call to `endpoint_id` may proceed, transitioning
    /// open -> half-open when the cooldown has elapsed.
    pub fn try_admit(&self, endpoint_id: Uuid) -> Admission {
        if !self.config.enabled {
            return Admission::Allowed;
        }
        let mut states = self.states.lock().expect("circuit mutex poisoned");
        let state = states.entry(endpoint_id).or_default();
        match state.state {
            CircuitBreakerState::Closed => Admission::Allowed,
            CircuitBreakerState::Open => {
                let opened_at = state.opened_at.unwrap_or_else(Utc::now);
                let elapsed = Utc::now().signed_duration_since(opened_at).num_milliseconds();
                if elapsed >= self.config.cooldown_ms {
                    state.state = CircuitBreakerState::HalfOpen;
                    state.half_open_in_flight = 1;
                    state.half_open_successes = 0;
                    state.half_open_failures = 0;
                    Admission::Allowed
                } else {
                    Admission::Rejected
                }
            }
            CircuitBreakerState::HalfOpen => {
                if state.half_open_in_flight < self.config.half_open_max_calls {
                    state.half_open_in_flight += 1;
                    Admission::Allowed
                } else {
                    Admission::Rejected
                }
            }
        }
    }

    pub fn record_success(&self, endpoint_id: Uuid) -> Option<StateChange> {
        let mut states = self.states.lock().expect("circuit mutex poisoned");
        let state = states.entry(endpoint_id).or_default();
        match state.state {
            CircuitBreakerState::Closed => {
                state.consecutive_failures = 0;
                None
            }
            CircuitBreakerState::HalfOpen => {
                state.half_open_in_flight = state.half_open_in_flight.saturating_sub(1);
                state.half_open_successes += 1;
                if state.half_open_successes >= self.config.half_open_successes_to_close {
                    *state = CircuitState::default();
                    Some(StateChange {
                        from: CircuitBreakerState::HalfOpen,
                        to: CircuitBreakerState::Closed,
                    })
                } else {
                    None
                }
            }
            CircuitBreakerState::Open => None,
        }
    }

    pub fn record_failure(&self, endpoint_id: Uuid) -> Option<StateChange> {
        let mut states = self.states.lock().expect("circuit mutex poisoned");
        let state = states.entry(endpoint_id).or_default();
        let now = Utc::now();
        match state.state {
            CircuitBreakerState::Closed => {
                if now.signed_duration_since(state.window_start).num_milliseconds()
                    > self.config.window_ms
                {
                    state.window_start = now;
                    state.consecutive_failures = 0;
                }
                state.consecutive_failures += 1;
                if state.consecutive_failures >= self.config.failure_threshold {
                    state.state = CircuitBreakerState::Open;
                    state.opened_at = Some(now);
                    Some(StateChange {
                        from: CircuitBreakerState::Closed,
                        to: CircuitBreakerState::Open,
                    })
                } else {
                    None
                }
            }
            CircuitBreakerState::HalfOpen => {
                state.half_open_in_flight = state.half_open_in_flight.saturating_sub(1);
                state.half_open_failures += 1;
                if state.half_open_failures >= self.config.half_open_failures_to_reopen {
                    state.state = CircuitBreakerState::Open;
                    state.opened_at = Some(now);
                    state.consecutive_failures = self.config.failure_threshold;
                    Some(StateChange {
                        from: CircuitBreakerState::HalfOpen,
                        to: CircuitBreakerState::Open,
                    })
                } else {
                    None
                }
            }
            CircuitBreakerState::Open => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StateChange {
    pub from: CircuitBreakerState,
    pub to: CircuitBreakerState,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> Uuid {
        Uuid::new_v4()
    }

    #[test]
    fn opens_after_threshold_failures() {
        let registry = CircuitRegistry::new(CircuitBreakerConfig {
            failure_threshold: 2,
            ..Default::default()
        });
        let endpoint = id();
        assert_eq!(registry.try_admit(endpoint), Admission::Allowed);
        assert!(registry.record_failure(endpoint).is_none());
        assert_eq!(registry.try_admit(endpoint), Admission::Allowed);
        let change = registry.record_failure(endpoint).unwrap();
        assert_eq!(change.to, CircuitBreakerState::Open);
        assert_eq!(registry.try_admit(endpoint), Admission::Rejected);
    }

    #[test]
    fn half_open_closes_after_enough_successes() {
        let registry = CircuitRegistry::new(CircuitBreakerConfig {
            failure_threshold: 1,
            cooldown_ms: -1,
            half_open_successes_to_close: 1,
            ..Default::default()
        });
        let endpoint = id();
        registry.record_failure(endpoint);
        assert_eq!(registry.try_admit(endpoint), Admission::Allowed);
        let change = registry.record_success(endpoint).unwrap();
        assert_eq!(change.to, CircuitBreakerState::Closed);
    }

    #[test]
    fn disabled_breaker_always_admits() {
        let registry = CircuitRegistry::new(CircuitBreakerConfig {
            enabled: false,
            failure_threshold: 1,
            ..Default::default()
        });
        let endpoint = id();
        registry.record_failure(endpoint);
        assert_eq!(registry.try_admit(endpoint), Admission::Allowed);
    }
}
