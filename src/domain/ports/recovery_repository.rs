use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{EscalationTicket, HistoryEntry, RecoveryAttempt, TicketStatus};

#[derive(Default, Debug, Clone)]
pub struct TicketFilter {
    pub task_id: Option<Uuid>,
    pub status: Option<TicketStatus>,
    pub limit: Option<usize>,
}

/// Repository port for recovery attempts and escalation tickets
#[async_trait]
pub trait RecoveryRepository: Send + Sync {
    /// Insert an attempt together with its history entry
    async fn record_attempt(&self, attempt: &RecoveryAttempt, entry: &HistoryEntry) -> DomainResult<()>;

    /// Most recent attempt for a task; the next attempt chains to it
    async fn last_attempt(&self, task_id: Uuid) -> DomainResult<Option<RecoveryAttempt>>;

    /// Attempts for a task in chain order
    async fn list_attempts(&self, task_id: Uuid) -> DomainResult<Vec<RecoveryAttempt>>;

    /// Automated (non-escalation) attempts a task has consumed
    async fn count_automated_attempts(&self, task_id: Uuid) -> DomainResult<u64>;

    async fn insert_ticket(&self, ticket: &EscalationTicket, entry: &HistoryEntry) -> DomainResult<()>;

    async fn update_ticket(&self, ticket: &EscalationTicket, entry: &HistoryEntry) -> DomainResult<()>;

    async fn get_ticket(&self, id: Uuid) -> DomainResult<Option<EscalationTicket>>;

    /// Tickets ordered by priority, highest first
    async fn list_tickets(&self, filter: TicketFilter) -> DomainResult<Vec<EscalationTicket>>;

    /// Tickets ever opened for a task
    async fn count_tickets_for_task(&self, task_id: Uuid) -> DomainResult<u64>;
}
