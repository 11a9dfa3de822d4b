//! Maps runtime errors onto the recovery taxonomy.
//!
//! The error kind decides first: an exact match, then a kind containing a
//! known token. Message keywords are the fallback. Configured critical kinds
//! override everything.

use crate::domain::models::{AgentError, ErrorClass};

/// Kinds per class, most severe class first. Order matters for the fuzzy
/// passes.
const CLASS_TABLE: &[(ErrorClass, &[&str])] = &[
    (ErrorClass::Fatal, &["data_corruption", "security_violation"]),
    (
        ErrorClass::Critical,
        &["system_error", "config_error", "auth_error", "resource_exhaustion"],
    ),
    (
        ErrorClass::StateInconsistency,
        &["state_corruption", "partial_update", "inconsistent_state"],
    ),
    (
        ErrorClass::LoopControl,
        &["infinite_loop", "stuck", "circular_dependency", "loop"],
    ),
    (
        ErrorClass::AgentSpecific,
        &["overload", "context_overflow", "token_limit", "invalid_output"],
    ),
    (
        ErrorClass::Transient,
        &["timeout", "rate_limit", "network", "connection", "unavailable"],
    ),
];

fn normalize(value: &str) -> String {
    value
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == '-' || c.is_whitespace() { '_' } else { c })
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct ErrorClassifier {
    critical_error_types: Vec<String>,
}

impl ErrorClassifier {
    pub fn new(critical_error_types: &[String]) -> Self {
        Self {
            critical_error_types: critical_error_types.iter().map(|k| normalize(k)).collect(),
        }
    }

    pub fn classify(&self, error: &AgentError) -> ErrorClass {
        let kind = normalize(&error.kind);

        if !kind.is_empty() && self.critical_error_types.contains(&kind) {
            return ErrorClass::Critical;
        }

        if let Some(class) = Self::exact_kind(&kind) {
            return class;
        }

        if !kind.is_empty() {
            if let Some(class) = Self::scan(&kind, |token| token.to_string()) {
                return class;
            }
        }

        // Messages use spaces, so "rate_limit" is looked up as "rate limit".
        let message = error.message.to_lowercase();
        Self::scan(&message, |token| token.replace('_', " ")).unwrap_or(ErrorClass::Unknown)
    }

    fn exact_kind(kind: &str) -> Option<ErrorClass> {
        CLASS_TABLE
            .iter()
            .find(|(_, kinds)| kinds.contains(&kind))
            .map(|(class, _)| *class)
    }

    fn scan(haystack: &str, render: impl Fn(&str) -> String) -> Option<ErrorClass> {
        CLASS_TABLE
            .iter()
            .find(|(_, kinds)| kinds.iter().any(|token| haystack.contains(render(token).as_str())))
            .map(|(class, _)| *class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(kind: &str, message: &str) -> ErrorClass {
        ErrorClassifier::new(&["resource_exhaustion".to_string()])
            .classify(&AgentError::new(kind, message))
    }

    #[test]
    fn test_exact_kinds() {
        assert_eq!(classify("timeout", ""), ErrorClass::Transient);
        assert_eq!(classify("rate_limit", ""), ErrorClass::Transient);
        assert_eq!(classify("context_overflow", ""), ErrorClass::AgentSpecific);
        assert_eq!(classify("partial_update", ""), ErrorClass::StateInconsistency);
        assert_eq!(classify("stuck", ""), ErrorClass::LoopControl);
        assert_eq!(classify("auth_error", ""), ErrorClass::Critical);
        assert_eq!(classify("security_violation", ""), ErrorClass::Fatal);
    }

    #[test]
    fn test_kind_normalization() {
        assert_eq!(classify("Rate-Limit", ""), ErrorClass::Transient);
        assert_eq!(classify("token limit", ""), ErrorClass::AgentSpecific);
    }

    #[test]
    fn test_kind_containing_token() {
        assert_eq!(classify("network_error", ""), ErrorClass::Transient);
        assert_eq!(classify("agent_stuck_detected", ""), ErrorClass::LoopControl);
    }

    #[test]
    fn test_message_fallback() {
        assert_eq!(classify("", "request timeout after 30s"), ErrorClass::Transient);
        assert_eq!(classify("agent_error", "hit the rate limit"), ErrorClass::Transient);
        assert_eq!(classify("", "detected data corruption in the index"), ErrorClass::Fatal);
        assert_eq!(classify("", "inconsistent state between steps"), ErrorClass::StateInconsistency);
    }

    #[test]
    fn test_unknown() {
        assert_eq!(classify("weird", "something odd happened"), ErrorClass::Unknown);
        assert_eq!(classify("", ""), ErrorClass::Unknown);
    }

    #[test]
    fn test_configured_critical_kinds() {
        let classifier = ErrorClassifier::new(&["quota_exceeded".to_string()]);
        assert_eq!(
            classifier.classify(&AgentError::new("quota_exceeded", "")),
            ErrorClass::Critical
        );
        // Without the override it would be unknown
        assert_eq!(
            ErrorClassifier::default().classify(&AgentError::new("quota_exceeded", "")),
            ErrorClass::Unknown
        );
    }
}
