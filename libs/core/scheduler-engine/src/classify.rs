//! Failure classification: maps an HTTP outcome or reasoner error text to a
//! category the Retry Policy and Circuit Breaker can act on.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    Network,
    Timeout,
    Aborted,
    Http4xx,
    Http5xx,
    Http429,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub category: FailureCategory,
    pub transient: bool,
}

/// Classifies an endpoint-call outcome. `status_code` is `None` for
/// connection-level failures (network error, timeout).
pub fn classify_endpoint_failure(
    aborted: bool,
    status_code: Option<u16>,
    is_timeout: bool,
) -> Classification {
    if aborted {
        return Classification {
            category: FailureCategory::Aborted,
            transient: false,
        };
    }
    if is_timeout {
        return Classification {
            category: FailureCategory::Timeout,
            transient: true,
        };
    }
    match status_code {
        Some(429) => Classification {
            category: FailureCategory::Http429,
            transient: true,
        },
        Some(408) | Some(425) => Classification {
            category: FailureCategory::Timeout,
            transient: true,
        },
        Some(code) if (500..600).contains(&code) => Classification {
            category: FailureCategory::Http5xx,
            transient: true,
        },
        Some(code) if (400..500).contains(&code) => Classification {
            category: FailureCategory::Http4xx,
            transient: false,
        },
        Some(_) => Classification {
            category: FailureCategory::Unknown,
            transient: false,
        },
        None => Classification {
            category: FailureCategory::Network,
            transient: true,
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonerFailureCategory {
    SemanticViolation,
    InvalidEnumValue,
    StructuralInconsistency,
    SchemaParseError,
    EmptyResponse,
    Unknown,
}

impl ReasonerFailureCategory {
    pub fn is_repairable(&self) -> bool {
        matches!(self, Self::SemanticViolation | Self::SchemaParseError)
    }
}

/// Classifies a reasoner validation failure by matching on its message.
/// Defaults to `SchemaParseError` per the taxonomy when nothing else matches.
pub fn classify_reasoner_failure(message: &str) -> ReasonerFailureCategory {
    let lower = message.to_lowercase();
    if lower.is_empty() || lower.contains("empty response") {
        ReasonerFailureCategory::EmptyResponse
    } else if lower.contains("semantic") {
        ReasonerFailureCategory::SemanticViolation
    } else if lower.contains("enum") || lower.contains("invalid value") {
        ReasonerFailureCategory::InvalidEnumValue
    } else if lower.contains("inconsistent") || lower.contains("inconsistency") {
        ReasonerFailureCategory::StructuralInconsistency
    } else if lower.contains("parse") || lower.contains("schema") {
        ReasonerFailureCategory::SchemaParseError
    } else {
        ReasonerFailureCategory::SchemaParseError
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_5xx_is_transient() {
        let c = classify_endpoint_failure(false, Some(503), false);
        assert_eq!(c.category, FailureCategory::Http5xx);
        assert!(c.transient);
    }

    #[test]
    fn status_4xx_is_not_transient() {
        let c = classify_endpoint_failure(false, Some(404), false);
        assert_eq!(c.category, FailureCategory::Http4xx);
        assert!(!c.transient);
    }

    #[test]
    fn status_429_is_transient() {
        let c = classify_endpoint_failure(false, Some(429), false);
        assert_eq!(c.category, FailureCategory::Http429);
        assert!(c.transient);
    }

    #[test]
    fn aborted_overrides_everything() {
        let c = classify_endpoint_failure(true, Some(200), false);
        assert_eq!(c.category, FailureCategory::Aborted);
        assert!(!c.transient);
    }

    #[test]
    fn network_error_has_no_status() {
        let c = classify_endpoint_failure(false, None, false);
        assert_eq!(c.category, FailureCategory::Network);
        assert!(c.transient);
    }

    #[test]
    fn reasoner_failure_defaults_to_schema_parse_error() {
        assert_eq!(
            classify_reasoner_failure("the model said something odd"),
            ReasonerFailureCategory::SchemaParseError
        );
    }

    #[test]
    fn only_semantic_and_schema_are_repairable() {
        assert!(ReasonerFailureCategory::SemanticViolation.is_repairable());
        assert!(ReasonerFailureCategory::SchemaParseError.is_repairable());
        assert!(!ReasonerFailureCategory::InvalidEnumValue.is_repairable());
        assert!(!ReasonerFailureCategory::EmptyResponse.is_repairable());
    }
}
