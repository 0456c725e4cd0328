//! Retry policy: a pure decision function over attempt number and failure
//! classification, plus the backoff delay computation. Jitter is derived by
//! hashing the current timestamp rather than pulling in `rand`, matching the
//! approach already used elsewhere in this workspace for retry backoff.

use crate::classify::FailureCategory;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy)]
pub struct RetryInput {
    pub attempt: u32,
    pub max_attempts: u32,
    pub category: FailureCategory,
    pub transient: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    Stop,
}

pub trait RetryPolicy: Send + Sync {
    fn evaluate(&self, input: RetryInput) -> RetryDecision;
    fn next_delay_ms(&self, attempt: u32) -> u64;
}

#[derive(Debug, Clone)]
pub struct ExponentialBackoffPolicy {
    pub base_delay_ms: u64,
}

impl Default for ExponentialBackoffPolicy {
    fn default() -> Self {
        Self { base_delay_ms: 200 }
    }
}

impl RetryPolicy for ExponentialBackoffPolicy {
    fn evaluate(&self, input: RetryInput) -> RetryDecision {
        if input.transient && input.attempt < input.max_attempts {
            RetryDecision::Retry
        } else {
            RetryDecision::Stop
        }
    }

    fn next_delay_ms(&self, attempt: u32) -> u64 {
        let exponential = self.base_delay_ms.saturating_mul(1u64 << attempt.saturating_sub(1).min(20));
        exponential + apply_jitter(self.base_delay_ms)
    }
}

/// Returns a pseudo-random value in `[0, base_delay_ms)` derived from the
/// current timestamp, avoiding a dependency on `rand` for a single use site.
fn apply_jitter(base_delay_ms: u64) -> u64 {
    if base_delay_ms == 0 {
        return 0;
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let mut hasher = DefaultHasher::new();
    nanos.hash(&mut hasher);
    hasher.finish() % base_delay_ms
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retries_while_transient_and_under_max() {
        let policy = ExponentialBackoffPolicy::default();
        let decision = policy.evaluate(RetryInput {
            attempt: 1,
            max_attempts: 3,
            category: FailureCategory::Http5xx,
            transient: true,
        });
        assert_eq!(decision, RetryDecision::Retry);
    }

    #[test]
    fn stops_when_attempts_exhausted() {
        let policy = ExponentialBackoffPolicy::default();
        let decision = policy.evaluate(RetryInput {
            attempt: 3,
            max_attempts: 3,
            category: FailureCategory::Http5xx,
            transient: true,
        });
        assert_eq!(decision, RetryDecision::Stop);
    }

    #[test]
    fn stops_when_non_transient() {
        let policy = ExponentialBackoffPolicy::default();
        let decision = policy.evaluate(RetryInput {
            attempt: 1,
            max_attempts: 3,
            category: FailureCategory::Http4xx,
            transient: false,
        });
        assert_eq!(decision, RetryDecision::Stop);
    }

    #[test]
    fn delay_grows_exponentially_in_expectation() {
        let policy = ExponentialBackoffPolicy { base_delay_ms: 100 };
        let d1 = policy.next_delay_ms(1);
        let d3 = policy.next_delay_ms(3);
        assert!(d1 >= 100 && d1 < 200);
        assert!(d3 >= 400 && d3 < 500);
    }
}
