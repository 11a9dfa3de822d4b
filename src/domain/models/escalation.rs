//! Escalation tickets: requests for human review raised by the recovery
//! orchestrator once automated strategies are exhausted or an error is
//! classified critical.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};

use super::recovery::ErrorClass;

/// Ordered severity levels; higher is more urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationSeverity {
    AutoRecovery,
    SupervisorReview,
    HumanIntervention,
    CriticalAlert,
}

impl std::fmt::Display for EscalationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl EscalationSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AutoRecovery => "auto_recovery",
            Self::SupervisorReview => "supervisor_review",
            Self::HumanIntervention => "human_intervention",
            Self::CriticalAlert => "critical_alert",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "auto_recovery" => Some(Self::AutoRecovery),
            "supervisor_review" => Some(Self::SupervisorReview),
            "human_intervention" => Some(Self::HumanIntervention),
            "critical_alert" => Some(Self::CriticalAlert),
            _ => None,
        }
    }

    /// Position on the 0..=3 scale used by the priority formula.
    pub fn level(&self) -> u8 {
        match self {
            Self::AutoRecovery => 0,
            Self::SupervisorReview => 1,
            Self::HumanIntervention => 2,
            Self::CriticalAlert => 3,
        }
    }

    pub fn from_level(level: u8) -> Self {
        match level {
            0 => Self::AutoRecovery,
            1 => Self::SupervisorReview,
            2 => Self::HumanIntervention,
            _ => Self::CriticalAlert,
        }
    }

    /// Raise by `steps` levels, saturating at `CriticalAlert`.
    pub fn raised_by(&self, steps: u32) -> Self {
        let level = u32::from(self.level()).saturating_add(steps).min(3);
        Self::from_level(level as u8)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    Acknowledged,
    Resolved,
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Acknowledged => "acknowledged",
            Self::Resolved => "resolved",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "open" => Some(Self::Open),
            "acknowledged" | "ack" => Some(Self::Acknowledged),
            "resolved" => Some(Self::Resolved),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationTicket {
    pub id: Uuid,
    pub task_id: Uuid,
    pub recovery_id: Uuid,
    pub severity: EscalationSeverity,
    /// Priority in [0, 100]
    pub priority: f64,
    pub status: TicketStatus,
    pub error_class: ErrorClass,
    pub reason: String,
    pub resolution: Option<String>,
    pub created_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl EscalationTicket {
    pub fn new(
        task_id: Uuid,
        recovery_id: Uuid,
        severity: EscalationSeverity,
        priority: f64,
        error_class: ErrorClass,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            recovery_id,
            severity,
            priority: priority.clamp(0.0, 100.0),
            status: TicketStatus::Open,
            error_class,
            reason: reason.into(),
            resolution: None,
            created_at: Utc::now(),
            acknowledged_at: None,
            resolved_at: None,
        }
    }

    pub fn acknowledge(&mut self) -> DomainResult<()> {
        if self.status != TicketStatus::Open {
            return Err(DomainError::InvalidTicketTransition {
                from: self.status.as_str().to_string(),
                to: TicketStatus::Acknowledged.as_str().to_string(),
            });
        }
        self.status = TicketStatus::Acknowledged;
        self.acknowledged_at = Some(Utc::now());
        Ok(())
    }

    /// Resolve from either open or acknowledged.
    pub fn resolve(&mut self, resolution: impl Into<String>) -> DomainResult<()> {
        if self.status == TicketStatus::Resolved {
            return Err(DomainError::InvalidTicketTransition {
                from: self.status.as_str().to_string(),
                to: TicketStatus::Resolved.as_str().to_string(),
            });
        }
        let now = Utc::now();
        if self.acknowledged_at.is_none() {
            self.acknowledged_at = Some(now);
        }
        self.status = TicketStatus::Resolved;
        self.resolution = Some(resolution.into());
        self.resolved_at = Some(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_raise_saturates() {
        assert_eq!(
            EscalationSeverity::AutoRecovery.raised_by(1),
            EscalationSeverity::SupervisorReview
        );
        assert_eq!(
            EscalationSeverity::SupervisorReview.raised_by(5),
            EscalationSeverity::CriticalAlert
        );
        assert_eq!(
            EscalationSeverity::CriticalAlert.raised_by(0),
            EscalationSeverity::CriticalAlert
        );
    }

    #[test]
    fn test_ticket_lifecycle() {
        let mut ticket = EscalationTicket::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            EscalationSeverity::HumanIntervention,
            72.0,
            ErrorClass::LoopControl,
            "agent stuck",
        );
        assert_eq!(ticket.status, TicketStatus::Open);
        ticket.acknowledge().unwrap();
        assert!(ticket.acknowledge().is_err());
        ticket.resolve("restarted agent").unwrap();
        assert_eq!(ticket.status, TicketStatus::Resolved);
        assert!(ticket.resolve("again").is_err());
    }

    #[test]
    fn test_priority_clamped() {
        let ticket = EscalationTicket::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            EscalationSeverity::CriticalAlert,
            140.0,
            ErrorClass::Fatal,
            "x",
        );
        assert!((ticket.priority - 100.0).abs() < f64::EPSILON);
    }
}
