//! SQLite implementation of the InterventionRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{DerailmentType, Intervention, InterventionAction};
use crate::domain::ports::{DecisionRecord, InterventionFilter, InterventionRepository};

use super::task_repository::update_task_row;
use super::{
    format_datetime, format_optional_datetime, insert_history_entry, parse_datetime, parse_enum,
    parse_optional_datetime, parse_optional_uuid, parse_uuid,
};

#[derive(Clone)]
pub struct SqliteInterventionRepository {
    pool: SqlitePool,
}

impl SqliteInterventionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InterventionRepository for SqliteInterventionRepository {
    async fn get(&self, id: Uuid) -> DomainResult<Option<Intervention>> {
        let row: Option<InterventionRow> = sqlx::query_as("SELECT * FROM interventions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Intervention::try_from).transpose()
    }

    async fn get_open(&self, task_id: Uuid) -> DomainResult<Option<Intervention>> {
        let row: Option<InterventionRow> =
            sqlx::query_as("SELECT * FROM interventions WHERE task_id = ? AND resolved_at IS NULL")
                .bind(task_id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        row.map(Intervention::try_from).transpose()
    }

    async fn list(&self, filter: InterventionFilter) -> DomainResult<Vec<Intervention>> {
        let mut query = String::from("SELECT * FROM interventions WHERE 1=1");
        if filter.task_id.is_some() {
            query.push_str(" AND task_id = ?");
        }
        if filter.open_only {
            query.push_str(" AND resolved_at IS NULL");
        }
        query.push_str(" ORDER BY created_at DESC, rowid DESC");
        if let Some(limit) = filter.limit {
            query.push_str(&format!(" LIMIT {limit}"));
        }

        let mut q = sqlx::query_as::<_, InterventionRow>(&query);
        if let Some(task_id) = filter.task_id {
            q = q.bind(task_id.to_string());
        }

        let rows: Vec<InterventionRow> = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(Intervention::try_from).collect()
    }

    async fn commit(&self, record: DecisionRecord<'_>) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;

        update_task_row(&mut tx, record.task).await?;

        for intervention in &record.updated {
            let result = sqlx::query(
                r#"UPDATE interventions SET was_successful = ?, resolution = ?, superseded_by = ?,
                   resolved_at = ?
                   WHERE id = ?"#,
            )
            .bind(intervention.was_successful)
            .bind(&intervention.resolution)
            .bind(intervention.superseded_by.map(|id| id.to_string()))
            .bind(format_optional_datetime(&intervention.resolved_at))
            .bind(intervention.id.to_string())
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                return Err(DomainError::InterventionNotFound(intervention.id));
            }
        }

        if let Some(intervention) = record.created {
            let action_json = serde_json::to_string(&intervention.action)?;
            sqlx::query(
                r#"INSERT INTO interventions (id, task_id, intervention_type, action, trigger_reason,
                   action_taken, confidence_score, derailment_type, was_successful, resolution,
                   superseded_by, created_at, resolved_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(intervention.id.to_string())
            .bind(intervention.task_id.to_string())
            .bind(intervention.kind().as_str())
            .bind(&action_json)
            .bind(&intervention.trigger_reason)
            .bind(&intervention.action_taken)
            .bind(intervention.confidence_score)
            .bind(intervention.derailment_type.as_str())
            .bind(intervention.was_successful)
            .bind(&intervention.resolution)
            .bind(intervention.superseded_by.map(|id| id.to_string()))
            .bind(format_datetime(&intervention.created_at))
            .bind(format_optional_datetime(&intervention.resolved_at))
            .execute(&mut *tx)
            .await?;
        }

        for entry in &record.history {
            insert_history_entry(&mut tx, entry).await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct InterventionRow {
    id: String,
    task_id: String,
    action: String,
    trigger_reason: String,
    action_taken: String,
    confidence_score: f64,
    derailment_type: String,
    was_successful: bool,
    resolution: Option<String>,
    superseded_by: Option<String>,
    created_at: String,
    resolved_at: Option<String>,
}

impl TryFrom<InterventionRow> for Intervention {
    type Error = DomainError;

    fn try_from(row: InterventionRow) -> Result<Self, Self::Error> {
        let action: InterventionAction = serde_json::from_str(&row.action)?;
        Ok(Intervention {
            id: parse_uuid(&row.id)?,
            task_id: parse_uuid(&row.task_id)?,
            action,
            trigger_reason: row.trigger_reason,
            action_taken: row.action_taken,
            confidence_score: row.confidence_score,
            derailment_type: parse_enum(&row.derailment_type, "derailment type", DerailmentType::from_str)?,
            was_successful: row.was_successful,
            resolution: row.resolution,
            superseded_by: parse_optional_uuid(row.superseded_by)?,
            created_at: parse_datetime(&row.created_at)?,
            resolved_at: parse_optional_datetime(row.resolved_at)?,
        })
    }
}
