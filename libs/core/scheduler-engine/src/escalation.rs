//! Escalation Evaluator: pure computation from a job's failure ratio to an
//! escalation level and the recovery action it implies.

use crate::model::{EscalationLevel, RecoveryAction};
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
pub struct EscalationThresholds {
    pub warn_failure_ratio: f64,
    pub critical_failure_ratio: f64,
}

impl Default for EscalationThresholds {
    fn default() -> Self {
        Self {
            warn_failure_ratio: 0.3,
            critical_failure_ratio: 0.7,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EscalationInput {
    pub failures: u32,
    pub attempted: u32,
    pub previous_level: EscalationLevel,
    pub failed_endpoint_ids: Vec<Uuid>,
    pub existing_disabled: Vec<Uuid>,
}

#[derive(Debug, Clone)]
pub struct EscalationOutcome {
    pub level: EscalationLevel,
    pub recovery_action: RecoveryAction,
    pub disabled_endpoints: Vec<Uuid>,
    pub level_changed: bool,
}

pub fn compute(input: EscalationInput, thresholds: EscalationThresholds) -> EscalationOutcome {
    let ratio = input.failures as f64 / (input.attempted.max(1) as f64);
    let level = if ratio >= thresholds.critical_failure_ratio {
        EscalationLevel::Critical
    } else if ratio >= thresholds.warn_failure_ratio {
        EscalationLevel::Warn
    } else {
        EscalationLevel::None
    };

    let recovery_action = match level {
        EscalationLevel::None => RecoveryAction::None,
        EscalationLevel::Warn => RecoveryAction::BackoffOnly,
        EscalationLevel::Critical => RecoveryAction::DisableEndpoint,
    };

    let disabled_endpoints = if level == EscalationLevel::Critical {
        let mut set: HashSet<Uuid> = input.existing_disabled.into_iter().collect();
        set.extend(input.failed_endpoint_ids);
        set.into_iter().collect()
    } else {
        input.existing_disabled
    };

    let level_changed = level != input.previous_level
        && (level != EscalationLevel::None || input.previous_level != EscalationLevel::None);

    EscalationOutcome {
        level,
        recovery_action,
        disabled_endpoints,
        level_changed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(failures: u32, attempted: u32) -> EscalationInput {
        EscalationInput {
            failures,
            attempted,
            previous_level: EscalationLevel::None,
            failed_endpoint_ids: vec![],
            existing_disabled: vec![],
        }
    }

    #[test]
    fn zero_attempted_does_not_divide_by_zero() {
        let outcome = compute(input(0, 0), EscalationThresholds::default());
        assert_eq!(outcome.level, EscalationLevel::None);
    }

    #[test]
    fn high_ratio_is_critical() {
        let outcome = compute(input(8, 10), EscalationThresholds::default());
        assert_eq!(outcome.level, EscalationLevel::Critical);
        assert_eq!(outcome.recovery_action, RecoveryAction::DisableEndpoint);
    }

    #[test]
    fn moderate_ratio_is_warn() {
        let outcome = compute(input(4, 10), EscalationThresholds::default());
        assert_eq!(outcome.level, EscalationLevel::Warn);
        assert_eq!(outcome.recovery_action, RecoveryAction::BackoffOnly);
    }

    #[test]
    fn critical_unions_disabled_endpoints() {
        let existing = Uuid::new_v4();
        let newly_failed = Uuid::new_v4();
        let mut i = input(9, 10);
        i.existing_disabled = vec![existing];
        i.failed_endpoint_ids = vec![newly_failed];
        let outcome = compute(i, EscalationThresholds::default());
        assert!(outcome.disabled_endpoints.contains(&existing));
        assert!(outcome.disabled_endpoints.contains(&newly_failed));
    }
}
