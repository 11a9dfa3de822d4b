//! SQLite implementation of the RecoveryRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    ErrorClass, EscalationSeverity, EscalationTicket, HistoryEntry, PromptAdjustment,
    RecoveryAttempt, RecoveryOutcome, RecoveryStrategy, TicketStatus,
};
use crate::domain::ports::{RecoveryRepository, TicketFilter};

use super::{
    format_datetime, format_optional_datetime, insert_history_entry, parse_datetime, parse_enum,
    parse_optional_datetime, parse_optional_uuid, parse_uuid,
};

#[derive(Clone)]
pub struct SqliteRecoveryRepository {
    pool: SqlitePool,
}

impl SqliteRecoveryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecoveryRepository for SqliteRecoveryRepository {
    async fn record_attempt(&self, attempt: &RecoveryAttempt, entry: &HistoryEntry) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"INSERT INTO recovery_attempts (id, task_id, recovery_id, previous_attempt_id,
               error_class, error_kind, strategy, attempt_number, adjustment, outcome, detail, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(attempt.id.to_string())
        .bind(attempt.task_id.to_string())
        .bind(attempt.recovery_id.to_string())
        .bind(attempt.previous_attempt_id.map(|id| id.to_string()))
        .bind(attempt.error_class.as_str())
        .bind(&attempt.error_kind)
        .bind(attempt.strategy.as_str())
        .bind(i64::from(attempt.attempt_number))
        .bind(attempt.adjustment.map(|a| a.as_str()))
        .bind(attempt.outcome.as_str())
        .bind(&attempt.detail)
        .bind(format_datetime(&attempt.created_at))
        .execute(&mut *tx)
        .await?;

        insert_history_entry(&mut tx, entry).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn last_attempt(&self, task_id: Uuid) -> DomainResult<Option<RecoveryAttempt>> {
        let row: Option<AttemptRow> = sqlx::query_as(
            "SELECT * FROM recovery_attempts WHERE task_id = ? ORDER BY created_at DESC, rowid DESC LIMIT 1",
        )
        .bind(task_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(RecoveryAttempt::try_from).transpose()
    }

    async fn list_attempts(&self, task_id: Uuid) -> DomainResult<Vec<RecoveryAttempt>> {
        let rows: Vec<AttemptRow> = sqlx::query_as(
            "SELECT * FROM recovery_attempts WHERE task_id = ? ORDER BY created_at ASC, rowid ASC",
        )
        .bind(task_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(RecoveryAttempt::try_from).collect()
    }

    async fn count_automated_attempts(&self, task_id: Uuid) -> DomainResult<u64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM recovery_attempts WHERE task_id = ? AND strategy != 'escalate'",
        )
        .bind(task_id.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(count.max(0) as u64)
    }

    async fn insert_ticket(&self, ticket: &EscalationTicket, entry: &HistoryEntry) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"INSERT INTO escalation_tickets (id, task_id, recovery_id, severity, priority, status,
               error_class, reason, resolution, created_at, acknowledged_at, resolved_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(ticket.id.to_string())
        .bind(ticket.task_id.to_string())
        .bind(ticket.recovery_id.to_string())
        .bind(ticket.severity.as_str())
        .bind(ticket.priority)
        .bind(ticket.status.as_str())
        .bind(ticket.error_class.as_str())
        .bind(&ticket.reason)
        .bind(&ticket.resolution)
        .bind(format_datetime(&ticket.created_at))
        .bind(format_optional_datetime(&ticket.acknowledged_at))
        .bind(format_optional_datetime(&ticket.resolved_at))
        .execute(&mut *tx)
        .await?;

        insert_history_entry(&mut tx, entry).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn update_ticket(&self, ticket: &EscalationTicket, entry: &HistoryEntry) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"UPDATE escalation_tickets SET status = ?, resolution = ?, acknowledged_at = ?, resolved_at = ?
               WHERE id = ?"#,
        )
        .bind(ticket.status.as_str())
        .bind(&ticket.resolution)
        .bind(format_optional_datetime(&ticket.acknowledged_at))
        .bind(format_optional_datetime(&ticket.resolved_at))
        .bind(ticket.id.to_string())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::TicketNotFound(ticket.id));
        }

        insert_history_entry(&mut tx, entry).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_ticket(&self, id: Uuid) -> DomainResult<Option<EscalationTicket>> {
        let row: Option<TicketRow> = sqlx::query_as("SELECT * FROM escalation_tickets WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(EscalationTicket::try_from).transpose()
    }

    async fn list_tickets(&self, filter: TicketFilter) -> DomainResult<Vec<EscalationTicket>> {
        let mut query = String::from("SELECT * FROM escalation_tickets WHERE 1=1");
        if filter.task_id.is_some() {
            query.push_str(" AND task_id = ?");
        }
        if filter.status.is_some() {
            query.push_str(" AND status = ?");
        }
        query.push_str(" ORDER BY priority DESC, created_at ASC");
        if let Some(limit) = filter.limit {
            query.push_str(&format!(" LIMIT {limit}"));
        }

        let mut q = sqlx::query_as::<_, TicketRow>(&query);
        if let Some(task_id) = filter.task_id {
            q = q.bind(task_id.to_string());
        }
        if let Some(status) = filter.status {
            q = q.bind(status.as_str());
        }

        let rows: Vec<TicketRow> = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(EscalationTicket::try_from).collect()
    }

    async fn count_tickets_for_task(&self, task_id: Uuid) -> DomainResult<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM escalation_tickets WHERE task_id = ?")
            .bind(task_id.to_string())
            .fetch_one(&self.pool)
            .await?;

        Ok(count.max(0) as u64)
    }
}

#[derive(sqlx::FromRow)]
struct AttemptRow {
    id: String,
    task_id: String,
    recovery_id: String,
    previous_attempt_id: Option<String>,
    error_class: String,
    error_kind: String,
    strategy: String,
    attempt_number: i64,
    adjustment: Option<String>,
    outcome: String,
    detail: String,
    created_at: String,
}

impl TryFrom<AttemptRow> for RecoveryAttempt {
    type Error = DomainError;

    fn try_from(row: AttemptRow) -> Result<Self, Self::Error> {
        let adjustment = row
            .adjustment
            .map(|a| parse_enum(&a, "prompt adjustment", PromptAdjustment::parse_str))
            .transpose()?;

        Ok(RecoveryAttempt {
            id: parse_uuid(&row.id)?,
            task_id: parse_uuid(&row.task_id)?,
            recovery_id: parse_uuid(&row.recovery_id)?,
            previous_attempt_id: parse_optional_uuid(row.previous_attempt_id)?,
            error_class: parse_enum(&row.error_class, "error class", ErrorClass::from_str)?,
            error_kind: row.error_kind,
            strategy: parse_enum(&row.strategy, "strategy", RecoveryStrategy::from_str)?,
            attempt_number: u32::try_from(row.attempt_number)
                .map_err(|e| DomainError::SerializationError(e.to_string()))?,
            adjustment,
            outcome: parse_enum(&row.outcome, "outcome", RecoveryOutcome::from_str)?,
            detail: row.detail,
            created_at: parse_datetime(&row.created_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TicketRow {
    id: String,
    task_id: String,
    recovery_id: String,
    severity: String,
    priority: f64,
    status: String,
    error_class: String,
    reason: String,
    resolution: Option<String>,
    created_at: String,
    acknowledged_at: Option<String>,
    resolved_at: Option<String>,
}

impl TryFrom<TicketRow> for EscalationTicket {
    type Error = DomainError;

    fn try_from(row: TicketRow) -> Result<Self, Self::Error> {
        Ok(EscalationTicket {
            id: parse_uuid(&row.id)?,
            task_id: parse_uuid(&row.task_id)?,
            recovery_id: parse_uuid(&row.recovery_id)?,
            severity: parse_enum(&row.severity, "severity", EscalationSeverity::from_str)?,
            priority: row.priority,
            status: parse_enum(&row.status, "ticket status", TicketStatus::from_str)?,
            error_class: parse_enum(&row.error_class, "error class", ErrorClass::from_str)?,
            reason: row.reason,
            resolution: row.resolution,
            created_at: parse_datetime(&row.created_at)?,
            acknowledged_at: parse_optional_datetime(row.acknowledged_at)?,
            resolved_at: parse_optional_datetime(row.resolved_at)?,
        })
    }
}
