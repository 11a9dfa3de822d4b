//! Escalation notifier that emits structured log events.
//!
//! Delivery to email, Slack or webhooks is owned by an external process that
//! tails these events; this adapter only reports which channels are enabled.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::domain::errors::DomainResult;
use crate::domain::models::{EscalationSeverity, EscalationTicket, NotificationConfig};
use crate::domain::ports::EscalationNotifier;

#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EscalationNotifier for LogNotifier {
    async fn notify(&self, ticket: &EscalationTicket, channels: &NotificationConfig) -> DomainResult<()> {
        let enabled = channels.enabled_channels().join(",");

        if ticket.severity >= EscalationSeverity::HumanIntervention {
            warn!(
                ticket_id = %ticket.id,
                task_id = %ticket.task_id,
                severity = %ticket.severity,
                priority = ticket.priority,
                error_class = %ticket.error_class,
                channels = %enabled,
                "escalation ticket opened"
            );
        } else {
            info!(
                ticket_id = %ticket.id,
                task_id = %ticket.task_id,
                severity = %ticket.severity,
                priority = ticket.priority,
                channels = %enabled,
                "escalation ticket opened"
            );
        }

        Ok(())
    }
}
