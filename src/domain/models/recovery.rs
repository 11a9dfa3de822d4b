//! Recovery domain model.
//!
//! Errors raised by the hosting agent are classified into an [`ErrorClass`],
//! which selects a strategy plan. Every strategy execution becomes a
//! [`RecoveryAttempt`] chained to the previous attempt for the same task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::escalation::EscalationTicket;

/// Classification of a runtime error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Timeouts, rate limits, network blips
    Transient,
    /// Overload, context overflow, malformed agent output
    AgentSpecific,
    /// Corrupted or half-applied task state
    StateInconsistency,
    /// Infinite loops, stuck agents, circular dependencies
    LoopControl,
    /// System, config or auth failures
    Critical,
    /// Data corruption or security violations
    Fatal,
    /// Nothing matched
    Unknown,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::AgentSpecific => "agent_specific",
            Self::StateInconsistency => "state_inconsistency",
            Self::LoopControl => "loop_control",
            Self::Critical => "critical",
            Self::Fatal => "fatal",
            Self::Unknown => "unknown",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "transient" => Some(Self::Transient),
            "agent_specific" => Some(Self::AgentSpecific),
            "state_inconsistency" => Some(Self::StateInconsistency),
            "loop_control" => Some(Self::LoopControl),
            "critical" => Some(Self::Critical),
            "fatal" => Some(Self::Fatal),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

/// An error raised by the hosting agent runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentError {
    /// Machine-readable kind, e.g. `timeout` or `stuck`
    pub kind: String,
    pub message: String,
}

impl AgentError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for AgentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Failure reported by a recovery callback.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct AgentFailure(pub String);

impl AgentFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    Retry,
    Rollback,
    CircuitBreak,
    Escalate,
    Hybrid,
}

impl std::fmt::Display for RecoveryStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl RecoveryStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Retry => "retry",
            Self::Rollback => "rollback",
            Self::CircuitBreak => "circuit_break",
            Self::Escalate => "escalate",
            Self::Hybrid => "hybrid",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "retry" => Some(Self::Retry),
            "rollback" => Some(Self::Rollback),
            "circuit_break" => Some(Self::CircuitBreak),
            "escalate" => Some(Self::Escalate),
            "hybrid" => Some(Self::Hybrid),
            _ => None,
        }
    }

    /// Strategies that count against `max_auto_recovery_attempts`.
    pub fn is_automated(&self) -> bool {
        !matches!(self, Self::Escalate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryOutcome {
    Success,
    Failed,
    Abandoned,
}

impl std::fmt::Display for RecoveryOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl RecoveryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Abandoned => "abandoned",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            "abandoned" => Some(Self::Abandoned),
            _ => None,
        }
    }
}

/// The five phases of a recovery invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryPhase {
    Assessment,
    StrategySelection,
    Execution,
    Validation,
    Completion,
}

impl RecoveryPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Assessment => "assessment",
            Self::StrategySelection => "strategy_selection",
            Self::Execution => "execution",
            Self::Validation => "validation",
            Self::Completion => "completion",
        }
    }
}

/// Rewrite applied to the agent's input before a retry so a failed input is
/// never repeated verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptAdjustment {
    AddContext,
    Simplify,
    Rephrase,
    AddExample,
}

impl PromptAdjustment {
    const ROTATION: [PromptAdjustment; 4] = [
        Self::AddContext,
        Self::Simplify,
        Self::Rephrase,
        Self::AddExample,
    ];

    /// Round-robin choice for the zero-based retry index.
    pub fn for_attempt(index: u32) -> Self {
        Self::ROTATION[(index as usize) % Self::ROTATION.len()]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AddContext => "add_context",
            Self::Simplify => "simplify",
            Self::Rephrase => "rephrase",
            Self::AddExample => "add_example",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "add_context" => Some(Self::AddContext),
            "simplify" => Some(Self::Simplify),
            "rephrase" => Some(Self::Rephrase),
            "add_example" => Some(Self::AddExample),
            _ => None,
        }
    }

    /// Produce the adjusted prompt.
    pub fn apply(&self, prompt: &str, objective: &str) -> String {
        match self {
            Self::AddContext => format!(
                "Context: you are working on the task \"{objective}\". The previous attempt failed.\n\n{prompt}"
            ),
            Self::Simplify => format!(
                "Focus on the single most important next step only. Keep the answer short.\n\n{prompt}"
            ),
            Self::Rephrase => format!(
                "Restating the request in different words: accomplish \"{objective}\".\n\nOriginal request:\n{prompt}"
            ),
            Self::AddExample => format!(
                "{prompt}\n\nExample of the expected output: a concise, concrete result that directly advances \"{objective}\"."
            ),
        }
    }
}

/// One strategy execution within a recovery invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryAttempt {
    pub id: Uuid,
    pub task_id: Uuid,
    /// Shared by every attempt of one `handle_error` invocation
    pub recovery_id: Uuid,
    /// Previous attempt for the same task, forming the audit chain
    pub previous_attempt_id: Option<Uuid>,
    pub error_class: ErrorClass,
    pub error_kind: String,
    pub strategy: RecoveryStrategy,
    /// 1-based attempt number within this strategy
    pub attempt_number: u32,
    pub adjustment: Option<PromptAdjustment>,
    pub outcome: RecoveryOutcome,
    pub detail: String,
    pub created_at: DateTime<Utc>,
}

/// Caller-supplied context for a `handle_error` invocation.
#[derive(Debug, Clone, Default)]
pub struct RecoveryContext {
    /// Input that produced the failure; retries send an adjusted copy
    pub prompt: Option<String>,
    /// Cancels backoff waits and ends the invocation as abandoned
    pub cancel: CancellationToken,
}

impl RecoveryContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// What the orchestrator asks the host to re-run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetryRequest {
    pub task_id: Uuid,
    /// 1-based retry number
    pub attempt: u32,
    pub prompt: Option<String>,
    pub adjustment: Option<PromptAdjustment>,
}

/// Result of a `handle_error` invocation.
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryResult {
    pub recovery_id: Uuid,
    pub task_id: Uuid,
    pub error_class: ErrorClass,
    /// Final strategy that decided the outcome
    pub strategy: RecoveryStrategy,
    pub outcome: RecoveryOutcome,
    pub detail: String,
    pub attempts: Vec<RecoveryAttempt>,
    pub ticket: Option<EscalationTicket>,
}

impl RecoveryResult {
    pub fn is_recovered(&self) -> bool {
        self.outcome == RecoveryOutcome::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adjustment_rotation() {
        assert_eq!(PromptAdjustment::for_attempt(0), PromptAdjustment::AddContext);
        assert_eq!(PromptAdjustment::for_attempt(1), PromptAdjustment::Simplify);
        assert_eq!(PromptAdjustment::for_attempt(2), PromptAdjustment::Rephrase);
        assert_eq!(PromptAdjustment::for_attempt(3), PromptAdjustment::AddExample);
        assert_eq!(PromptAdjustment::for_attempt(4), PromptAdjustment::AddContext);
    }

    #[test]
    fn test_adjustment_changes_prompt() {
        let prompt = "write the parser tests";
        for index in 0..4 {
            let adjusted = PromptAdjustment::for_attempt(index).apply(prompt, "test the parser");
            assert_ne!(adjusted, prompt);
            assert!(adjusted.contains(prompt));
        }
    }

    #[test]
    fn test_class_round_trip() {
        for class in [
            ErrorClass::Transient,
            ErrorClass::AgentSpecific,
            ErrorClass::StateInconsistency,
            ErrorClass::LoopControl,
            ErrorClass::Critical,
            ErrorClass::Fatal,
            ErrorClass::Unknown,
        ] {
            assert_eq!(ErrorClass::from_str(class.as_str()), Some(class));
        }
    }

    #[test]
    fn test_escalate_not_automated() {
        assert!(!RecoveryStrategy::Escalate.is_automated());
        assert!(RecoveryStrategy::Retry.is_automated());
        assert!(RecoveryStrategy::Hybrid.is_automated());
    }
}
