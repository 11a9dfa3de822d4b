//! Domain errors for the Warden supervision core.

use thiserror::Error;
use uuid::Uuid;

/// Domain-level errors that can occur while supervising a task.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("Intervention not found: {0}")]
    InterventionNotFound(Uuid),

    #[error("Snapshot not found: {0}")]
    SnapshotNotFound(Uuid),

    #[error("Snapshot version {version} not found for task {task_id}")]
    SnapshotVersionNotFound { task_id: Uuid, version: i64 },

    #[error("Escalation ticket not found: {0}")]
    TicketNotFound(Uuid),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition { from: String, to: String, reason: String },

    /// The circuit breaker paused this task; calls are rejected until reset.
    #[error("Circuit open for task {task_id}: {reason}")]
    CircuitOpen { task_id: Uuid, reason: String },

    #[error("Task {0} is blocked and awaiting human acknowledgment")]
    AwaitingAcknowledgment(Uuid),

    #[error("Task {0} is in a terminal state")]
    TaskTerminal(Uuid),

    #[error("Snapshot {snapshot_id} failed checksum verification (expected {expected}, computed {actual})")]
    SnapshotCorrupted {
        snapshot_id: Uuid,
        expected: String,
        actual: String,
    },

    #[error("Snapshot {snapshot_id} does not belong to task {task_id}")]
    SnapshotTaskMismatch { snapshot_id: Uuid, task_id: Uuid },

    #[error("Invalid ticket transition from {from} to {to}")]
    InvalidTicketTransition { from: String, to: String },

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl DomainError {
    /// Whether this error is the fail-fast circuit-breaker rejection.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }
}

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}
