//! Append-only supervision timeline.
//!
//! Every assessment, intervention, status change, snapshot, rollback and
//! recovery decision is recorded here with its rationale so a task's
//! supervision can be replayed after the fact.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity level of a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryLevel {
    /// Detailed debugging information.
    Debug,
    /// General information about operations.
    Info,
    /// Policy or recovery decisions.
    Decision,
    /// Warning conditions.
    Warning,
    /// Error conditions.
    Error,
    /// Critical issues requiring attention.
    Critical,
}

impl HistoryLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Decision => "decision",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "decision" => Some(Self::Decision),
            "warning" | "warn" => Some(Self::Warning),
            "error" => Some(Self::Error),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }

    /// Numeric ordering persisted alongside the label so level filters can
    /// be pushed into SQL.
    pub fn ordinal(&self) -> i64 {
        match self {
            Self::Debug => 0,
            Self::Info => 1,
            Self::Decision => 2,
            Self::Warning => 3,
            Self::Error => 4,
            Self::Critical => 5,
        }
    }
}

/// Type of recorded event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    TaskStarted,
    TaskCompleted,
    Assessment,
    Intervention,
    InterventionAbsorbed,
    InterventionResolved,
    StatusChanged,
    BlockAcknowledged,
    SnapshotCreated,
    SnapshotSkipped,
    SnapshotsEvicted,
    Rollback,
    RecoveryPhase,
    RecoveryAttempt,
    CircuitOpened,
    CircuitReset,
    Escalation,
    EscalationUpdated,
}

impl HistoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaskStarted => "task_started",
            Self::TaskCompleted => "task_completed",
            Self::Assessment => "assessment",
            Self::Intervention => "intervention",
            Self::InterventionAbsorbed => "intervention_absorbed",
            Self::InterventionResolved => "intervention_resolved",
            Self::StatusChanged => "status_changed",
            Self::BlockAcknowledged => "block_acknowledged",
            Self::SnapshotCreated => "snapshot_created",
            Self::SnapshotSkipped => "snapshot_skipped",
            Self::SnapshotsEvicted => "snapshots_evicted",
            Self::Rollback => "rollback",
            Self::RecoveryPhase => "recovery_phase",
            Self::RecoveryAttempt => "recovery_attempt",
            Self::CircuitOpened => "circuit_opened",
            Self::CircuitReset => "circuit_reset",
            Self::Escalation => "escalation",
            Self::EscalationUpdated => "escalation_updated",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        let kind = match s.to_lowercase().as_str() {
            "task_started" => Self::TaskStarted,
            "task_completed" => Self::TaskCompleted,
            "assessment" => Self::Assessment,
            "intervention" => Self::Intervention,
            "intervention_absorbed" => Self::InterventionAbsorbed,
            "intervention_resolved" => Self::InterventionResolved,
            "status_changed" => Self::StatusChanged,
            "block_acknowledged" => Self::BlockAcknowledged,
            "snapshot_created" => Self::SnapshotCreated,
            "snapshot_skipped" => Self::SnapshotSkipped,
            "snapshots_evicted" => Self::SnapshotsEvicted,
            "rollback" => Self::Rollback,
            "recovery_phase" => Self::RecoveryPhase,
            "recovery_attempt" => Self::RecoveryAttempt,
            "circuit_opened" => Self::CircuitOpened,
            "circuit_reset" => Self::CircuitReset,
            "escalation" => Self::Escalation,
            "escalation_updated" => Self::EscalationUpdated,
            _ => return None,
        };
        Some(kind)
    }
}

/// Who caused the event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HistoryActor {
    /// Supervisor bookkeeping.
    System,
    /// Intervention policy engine.
    Policy,
    /// Recovery orchestrator.
    Orchestrator,
    /// A human operator or the hosting process acting for one.
    Human { identifier: String },
}

impl HistoryActor {
    pub fn human(identifier: impl Into<String>) -> Self {
        Self::Human {
            identifier: identifier.into(),
        }
    }
}

/// Decision rationale for policy and recovery decisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRationale {
    /// The decision that was made.
    pub decision: String,
    /// Why this decision was made.
    pub reasoning: String,
    /// Alternatives that were considered.
    pub alternatives: Vec<String>,
    /// Data/factors that influenced the decision.
    pub factors: Vec<(String, String)>,
    /// Confidence in the decision (0.0 - 1.0).
    pub confidence: f64,
}

impl DecisionRationale {
    pub fn new(decision: impl Into<String>, reasoning: impl Into<String>) -> Self {
        Self {
            decision: decision.into(),
            reasoning: reasoning.into(),
            alternatives: Vec::new(),
            factors: Vec::new(),
            confidence: 1.0,
        }
    }

    pub fn with_alternative(mut self, alt: impl Into<String>) -> Self {
        self.alternatives.push(alt.into());
        self
    }

    pub fn with_factor(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.factors.push((name.into(), value.into()));
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }
}

/// A single timeline entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub task_id: Uuid,
    pub kind: HistoryKind,
    pub level: HistoryLevel,
    pub actor: HistoryActor,
    /// Human-readable message.
    pub message: String,
    /// Previous state (for state changes).
    pub previous_state: Option<String>,
    /// New state (for state changes).
    pub new_state: Option<String>,
    pub rationale: Option<DecisionRationale>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(
        task_id: Uuid,
        kind: HistoryKind,
        level: HistoryLevel,
        actor: HistoryActor,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            kind,
            level,
            actor,
            message: message.into(),
            previous_state: None,
            new_state: None,
            rationale: None,
            metadata: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    /// Set state transition.
    pub fn with_state_change(mut self, previous: impl Into<String>, new: impl Into<String>) -> Self {
        self.previous_state = Some(previous.into());
        self.new_state = Some(new.into());
        self
    }

    pub fn with_rationale(mut self, rationale: DecisionRationale) -> Self {
        self.rationale = Some(rationale);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Filter for querying the timeline.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub task_id: Option<Uuid>,
    pub kind: Option<HistoryKind>,
    /// Filter by minimum level.
    pub min_level: Option<HistoryLevel>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl HistoryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_task(mut self, task_id: Uuid) -> Self {
        self.task_id = Some(task_id);
        self
    }

    pub fn with_kind(mut self, kind: HistoryKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_min_level(mut self, level: HistoryLevel) -> Self {
        self.min_level = Some(level);
        self
    }

    pub fn since(mut self, from: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self
    }

    pub fn with_time_range(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Check if an entry matches this filter.
    pub fn matches(&self, entry: &HistoryEntry) -> bool {
        if let Some(task_id) = self.task_id {
            if entry.task_id != task_id {
                return false;
            }
        }

        if let Some(kind) = self.kind {
            if entry.kind != kind {
                return false;
            }
        }

        if let Some(min_level) = self.min_level {
            if entry.level < min_level {
                return false;
            }
        }

        if let Some(from) = self.from {
            if entry.created_at < from {
                return false;
            }
        }

        if let Some(to) = self.to {
            if entry.created_at > to {
                return false;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(HistoryLevel::Debug < HistoryLevel::Info);
        assert!(HistoryLevel::Decision < HistoryLevel::Warning);
        assert!(HistoryLevel::Error < HistoryLevel::Critical);
        assert!(HistoryLevel::Info.ordinal() < HistoryLevel::Critical.ordinal());
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!(HistoryKind::parse_str("rollback"), Some(HistoryKind::Rollback));
        assert_eq!(
            HistoryKind::parse_str(HistoryKind::SnapshotSkipped.as_str()),
            Some(HistoryKind::SnapshotSkipped)
        );
        assert_eq!(HistoryKind::parse_str("nope"), None);
    }

    #[test]
    fn test_filter_matches() {
        let task_id = Uuid::new_v4();
        let entry = HistoryEntry::new(
            task_id,
            HistoryKind::Intervention,
            HistoryLevel::Decision,
            HistoryActor::Policy,
            "redirected",
        );

        assert!(HistoryFilter::new().for_task(task_id).matches(&entry));
        assert!(!HistoryFilter::new().for_task(Uuid::new_v4()).matches(&entry));
        assert!(HistoryFilter::new()
            .with_min_level(HistoryLevel::Info)
            .matches(&entry));
        assert!(!HistoryFilter::new()
            .with_min_level(HistoryLevel::Warning)
            .matches(&entry));
        assert!(!HistoryFilter::new()
            .with_kind(HistoryKind::Rollback)
            .matches(&entry));
    }

    #[test]
    fn test_rationale_builder() {
        let rationale = DecisionRationale::new("redirect", "confidence in redirect band")
            .with_alternative("warning")
            .with_factor("confidence", "0.85")
            .with_confidence(1.5);
        assert_eq!(rationale.alternatives, vec!["warning".to_string()]);
        assert_eq!(rationale.factors.len(), 1);
        assert!((rationale.confidence - 1.0).abs() < f64::EPSILON);
    }
}
