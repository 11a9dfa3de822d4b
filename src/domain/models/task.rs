//! Supervised task domain model.
//!
//! A task is the unit of supervision: the declared objective an agent is
//! pursuing, its status in the intervention state machine, and the running
//! scores the policy engine maintains.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};

/// Status of a supervised task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Agent is pursuing the task coherently
    #[default]
    Active,
    /// A coherence problem was detected and an intervention is pending
    NeedsIntervention,
    /// Execution is blocked until a human acknowledges
    Blocked,
    /// Task finished
    Completed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::NeedsIntervention => "needs_intervention",
            Self::Blocked => "blocked",
            Self::Completed => "completed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(Self::Active),
            "needs_intervention" => Some(Self::NeedsIntervention),
            "blocked" => Some(Self::Blocked),
            "completed" | "complete" => Some(Self::Completed),
            _ => None,
        }
    }

    /// Valid transitions from this status.
    ///
    /// `Blocked -> Active` is only reachable through human acknowledgment,
    /// which the supervisor enforces.
    pub fn valid_transitions(&self) -> Vec<TaskStatus> {
        match self {
            Self::Active => vec![Self::NeedsIntervention, Self::Blocked, Self::Completed],
            Self::NeedsIntervention => vec![Self::Active, Self::Blocked],
            Self::Blocked => vec![Self::Active],
            Self::Completed => vec![],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        *self == new_status || self.valid_transitions().contains(&new_status)
    }
}

/// A task under supervision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    /// Declared objective the agent was assigned
    pub objective: String,
    pub status: TaskStatus,
    /// Running quality estimate in [0, 1]
    pub quality_score: f64,
    /// Coherence of the most recent assessed step in [0, 1]
    pub coherence_score: f64,
    /// How much the business cares about this task, in [0, 1]
    pub business_criticality: f64,
    /// Set while the circuit breaker holds the task paused
    pub paused_at: Option<DateTime<Utc>>,
    pub pause_reason: Option<String>,
    /// Set when a human accepts a blocked task as final
    pub closed_at: Option<DateTime<Utc>>,
    /// Highest snapshot version ever issued for this task
    pub last_snapshot_version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(objective: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            objective: objective.into(),
            status: TaskStatus::Active,
            quality_score: 1.0,
            coherence_score: 1.0,
            business_criticality: 0.5,
            paused_at: None,
            pause_reason: None,
            closed_at: None,
            last_snapshot_version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_business_criticality(mut self, criticality: f64) -> Self {
        self.business_criticality = criticality.clamp(0.0, 1.0);
        self
    }

    pub fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }

    pub fn is_terminal(&self) -> bool {
        self.status == TaskStatus::Completed
            || (self.status == TaskStatus::Blocked && self.closed_at.is_some())
    }

    /// Move to `new_status`, validating against the state machine.
    pub fn transition_to(&mut self, new_status: TaskStatus) -> DomainResult<()> {
        if !self.status.can_transition_to(new_status) {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: new_status.as_str().to_string(),
                reason: "transition not allowed by supervision state machine".to_string(),
            });
        }
        self.status = new_status;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Fold the confidence of a derailment assessment into the scores.
    pub fn apply_assessment_scores(&mut self, confidence: f64) {
        let coherence = (1.0 - confidence).clamp(0.0, 1.0);
        self.coherence_score = coherence;
        self.quality_score = (0.8 * self.quality_score + 0.2 * coherence).clamp(0.0, 1.0);
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_strings() {
        for status in [
            TaskStatus::Active,
            TaskStatus::NeedsIntervention,
            TaskStatus::Blocked,
            TaskStatus::Completed,
        ] {
            assert_eq!(TaskStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(TaskStatus::from_str("bogus"), None);
    }

    #[test]
    fn test_state_machine() {
        assert!(TaskStatus::Active.can_transition_to(TaskStatus::NeedsIntervention));
        assert!(TaskStatus::Active.can_transition_to(TaskStatus::Blocked));
        assert!(TaskStatus::NeedsIntervention.can_transition_to(TaskStatus::Active));
        assert!(TaskStatus::NeedsIntervention.can_transition_to(TaskStatus::Blocked));
        assert!(TaskStatus::Blocked.can_transition_to(TaskStatus::Active));
        assert!(!TaskStatus::Blocked.can_transition_to(TaskStatus::NeedsIntervention));
        assert!(!TaskStatus::Completed.can_transition_to(TaskStatus::Active));
        assert!(!TaskStatus::NeedsIntervention.can_transition_to(TaskStatus::Completed));
    }

    #[test]
    fn test_transition_rejected() {
        let mut task = Task::new("write unit tests");
        task.status = TaskStatus::Completed;
        let err = task.transition_to(TaskStatus::Active).unwrap_err();
        assert!(matches!(err, DomainError::InvalidStateTransition { .. }));
    }

    #[test]
    fn test_scores_follow_confidence() {
        let mut task = Task::new("write unit tests");
        task.apply_assessment_scores(0.85);
        assert!((task.coherence_score - 0.15).abs() < 1e-9);
        assert!((task.quality_score - (0.8 + 0.2 * 0.15)).abs() < 1e-9);
    }

    #[test]
    fn test_terminal() {
        let mut task = Task::new("x");
        assert!(!task.is_terminal());
        task.status = TaskStatus::Blocked;
        assert!(!task.is_terminal());
        task.closed_at = Some(Utc::now());
        assert!(task.is_terminal());
    }
}
