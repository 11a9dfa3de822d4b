//! Escalation tickets: severity, priority and lifecycle.

use std::sync::Arc;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    DecisionRationale, ErrorClass, EscalationSeverity, EscalationTicket, EscalationWeights,
    HistoryActor, HistoryEntry, HistoryKind, HistoryLevel, NotificationConfig, Task,
};
use crate::domain::ports::{EscalationNotifier, RecoveryRepository, TicketFilter};

/// Severity and priority rules. Pure.
#[derive(Debug, Clone)]
pub struct EscalationPolicy {
    weights: EscalationWeights,
    max_retries: u32,
}

impl EscalationPolicy {
    pub fn new(weights: EscalationWeights, max_retries: u32) -> Self {
        Self { weights, max_retries }
    }

    pub fn base_severity(class: ErrorClass) -> EscalationSeverity {
        match class {
            ErrorClass::Transient => EscalationSeverity::AutoRecovery,
            ErrorClass::AgentSpecific | ErrorClass::StateInconsistency | ErrorClass::Unknown => {
                EscalationSeverity::SupervisorReview
            }
            ErrorClass::LoopControl | ErrorClass::Critical => EscalationSeverity::HumanIntervention,
            ErrorClass::Fatal => EscalationSeverity::CriticalAlert,
        }
    }

    /// Base severity raised one level per ticket already opened for the task.
    pub fn severity(class: ErrorClass, prior_tickets: u64) -> EscalationSeverity {
        let steps = u32::try_from(prior_tickets).unwrap_or(u32::MAX);
        Self::base_severity(class).raised_by(steps)
    }

    /// Priority in [0, 100].
    pub fn priority(&self, severity: EscalationSeverity, retries_used: u32, criticality: f64) -> f64 {
        let severity_part = f64::from(severity.level()) / 3.0;
        let retry_part = if self.max_retries == 0 {
            1.0
        } else {
            (f64::from(retries_used) / f64::from(self.max_retries)).min(1.0)
        };
        let score = self.weights.severity * severity_part
            + self.weights.retry_exhaustion * retry_part
            + self.weights.business_criticality * criticality.clamp(0.0, 1.0);
        (100.0 * score).clamp(0.0, 100.0)
    }
}

/// Opens tickets, hands them to the notifier, and moves them through
/// open → acknowledged → resolved.
pub struct EscalationService {
    repository: Arc<dyn RecoveryRepository>,
    notifier: Arc<dyn EscalationNotifier>,
    policy: EscalationPolicy,
    channels: NotificationConfig,
}

impl EscalationService {
    pub fn new(
        repository: Arc<dyn RecoveryRepository>,
        notifier: Arc<dyn EscalationNotifier>,
        policy: EscalationPolicy,
        channels: NotificationConfig,
    ) -> Self {
        Self {
            repository,
            notifier,
            policy,
            channels,
        }
    }

    /// Persist a ticket for `task`, then notify. A notifier failure is logged;
    /// the ticket stays open either way.
    #[instrument(skip(self, task, reason), fields(task_id = %task.id), err)]
    pub async fn open_ticket(
        &self,
        task: &Task,
        recovery_id: Uuid,
        class: ErrorClass,
        retries_used: u32,
        reason: &str,
    ) -> DomainResult<EscalationTicket> {
        let prior = self.repository.count_tickets_for_task(task.id).await?;
        let severity = EscalationPolicy::severity(class, prior);
        let priority = self.policy.priority(severity, retries_used, task.business_criticality);

        let ticket = EscalationTicket::new(task.id, recovery_id, severity, priority, class, reason);

        let level = if severity == EscalationSeverity::CriticalAlert {
            HistoryLevel::Critical
        } else {
            HistoryLevel::Warning
        };
        let entry = HistoryEntry::new(
            task.id,
            HistoryKind::Escalation,
            level,
            HistoryActor::Orchestrator,
            format!("Escalated at {severity} (priority {priority:.1}): {reason}"),
        )
        .with_rationale(
            DecisionRationale::new(format!("escalate:{severity}"), reason)
                .with_factor("error_class", class.as_str())
                .with_factor("prior_tickets", prior.to_string())
                .with_factor("retries_used", retries_used.to_string())
                .with_factor("business_criticality", format!("{:.2}", task.business_criticality)),
        )
        .with_metadata("ticket_id", serde_json::json!(ticket.id.to_string()))
        .with_metadata("recovery_id", serde_json::json!(recovery_id.to_string()));

        self.repository.insert_ticket(&ticket, &entry).await?;
        info!(
            ticket_id = %ticket.id,
            severity = %severity,
            priority,
            "Escalation ticket opened"
        );

        if let Err(e) = self.notifier.notify(&ticket, &self.channels).await {
            warn!(ticket_id = %ticket.id, error = %e, "Escalation notifier failed");
        }

        Ok(ticket)
    }

    pub async fn get(&self, id: Uuid) -> DomainResult<EscalationTicket> {
        self.repository
            .get_ticket(id)
            .await?
            .ok_or(DomainError::TicketNotFound(id))
    }

    pub async fn list(&self, filter: TicketFilter) -> DomainResult<Vec<EscalationTicket>> {
        self.repository.list_tickets(filter).await
    }

    pub async fn acknowledge(
        &self,
        id: Uuid,
        actor: HistoryActor,
        note: Option<&str>,
    ) -> DomainResult<EscalationTicket> {
        let mut ticket = self.get(id).await?;
        let previous = ticket.status;
        ticket.acknowledge()?;

        let mut entry = HistoryEntry::new(
            ticket.task_id,
            HistoryKind::EscalationUpdated,
            HistoryLevel::Info,
            actor,
            format!("Escalation ticket {id} acknowledged"),
        )
        .with_state_change(previous.as_str(), ticket.status.as_str())
        .with_metadata("ticket_id", serde_json::json!(id.to_string()));
        if let Some(note) = note {
            entry = entry.with_metadata("note", serde_json::json!(note));
        }

        self.repository.update_ticket(&ticket, &entry).await?;
        Ok(ticket)
    }

    pub async fn resolve(
        &self,
        id: Uuid,
        actor: HistoryActor,
        resolution: &str,
    ) -> DomainResult<EscalationTicket> {
        let mut ticket = self.get(id).await?;
        let previous = ticket.status;
        ticket.resolve(resolution)?;

        let entry = HistoryEntry::new(
            ticket.task_id,
            HistoryKind::EscalationUpdated,
            HistoryLevel::Info,
            actor,
            format!("Escalation ticket {id} resolved: {resolution}"),
        )
        .with_state_change(previous.as_str(), ticket.status.as_str())
        .with_metadata("ticket_id", serde_json::json!(id.to_string()));

        self.repository.update_ticket(&ticket, &entry).await?;
        Ok(ticket)
    }
}
