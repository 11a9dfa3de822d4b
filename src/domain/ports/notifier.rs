use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{EscalationTicket, NotificationConfig};

/// Delivery of escalation tickets to humans. Delivery itself lives outside
/// this crate; the orchestrator only hands over the ticket and the enabled
/// channels.
#[async_trait]
pub trait EscalationNotifier: Send + Sync {
    async fn notify(&self, ticket: &EscalationTicket, channels: &NotificationConfig) -> DomainResult<()>;
}
