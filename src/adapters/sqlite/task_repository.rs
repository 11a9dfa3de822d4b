//! SQLite implementation of the TaskRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{HistoryEntry, Task, TaskStatus};
use crate::domain::ports::{TaskFilter, TaskRepository};

use super::{
    format_datetime, format_optional_datetime, insert_history_entry, parse_datetime, parse_enum,
    parse_optional_datetime, parse_uuid,
};

#[derive(Clone)]
pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    async fn create(&self, task: &Task, entry: &HistoryEntry) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"INSERT INTO tasks (id, objective, status, quality_score, coherence_score,
               business_criticality, paused_at, pause_reason, closed_at, last_snapshot_version,
               created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(task.id.to_string())
        .bind(&task.objective)
        .bind(task.status.as_str())
        .bind(task.quality_score)
        .bind(task.coherence_score)
        .bind(task.business_criticality)
        .bind(format_optional_datetime(&task.paused_at))
        .bind(&task.pause_reason)
        .bind(format_optional_datetime(&task.closed_at))
        .bind(task.last_snapshot_version)
        .bind(format_datetime(&task.created_at))
        .bind(format_datetime(&task.updated_at))
        .execute(&mut *tx)
        .await?;

        insert_history_entry(&mut tx, entry).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Task>> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Task::try_from).transpose()
    }

    async fn list(&self, filter: TaskFilter) -> DomainResult<Vec<Task>> {
        let mut query = String::from("SELECT * FROM tasks WHERE 1=1");
        if filter.status.is_some() {
            query.push_str(" AND status = ?");
        }
        match filter.paused {
            Some(true) => query.push_str(" AND paused_at IS NOT NULL"),
            Some(false) => query.push_str(" AND paused_at IS NULL"),
            None => {}
        }
        query.push_str(" ORDER BY updated_at DESC");
        if let Some(limit) = filter.limit {
            query.push_str(&format!(" LIMIT {limit}"));
        }

        let mut q = sqlx::query_as::<_, TaskRow>(&query);
        if let Some(status) = filter.status {
            q = q.bind(status.as_str());
        }

        let rows: Vec<TaskRow> = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(Task::try_from).collect()
    }

    async fn update_with_history(&self, task: &Task, entries: &[HistoryEntry]) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;
        update_task_row(&mut tx, task).await?;
        for entry in entries {
            insert_history_entry(&mut tx, entry).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

/// Write every mutable task column inside an open transaction.
pub(crate) async fn update_task_row(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    task: &Task,
) -> DomainResult<()> {
    let result = sqlx::query(
        r#"UPDATE tasks SET status = ?, quality_score = ?, coherence_score = ?,
           business_criticality = ?, paused_at = ?, pause_reason = ?, closed_at = ?,
           updated_at = ?
           WHERE id = ?"#,
    )
    .bind(task.status.as_str())
    .bind(task.quality_score)
    .bind(task.coherence_score)
    .bind(task.business_criticality)
    .bind(format_optional_datetime(&task.paused_at))
    .bind(&task.pause_reason)
    .bind(format_optional_datetime(&task.closed_at))
    .bind(format_datetime(&task.updated_at))
    .bind(task.id.to_string())
    .execute(&mut **tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DomainError::TaskNotFound(task.id));
    }
    Ok(())
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: String,
    objective: String,
    status: String,
    quality_score: f64,
    coherence_score: f64,
    business_criticality: f64,
    paused_at: Option<String>,
    pause_reason: Option<String>,
    closed_at: Option<String>,
    last_snapshot_version: i64,
    created_at: String,
    updated_at: String,
}

impl TryFrom<TaskRow> for Task {
    type Error = DomainError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        Ok(Task {
            id: parse_uuid(&row.id)?,
            objective: row.objective,
            status: parse_enum(&row.status, "status", TaskStatus::from_str)?,
            quality_score: row.quality_score,
            coherence_score: row.coherence_score,
            business_criticality: row.business_criticality,
            paused_at: parse_optional_datetime(row.paused_at)?,
            pause_reason: row.pause_reason,
            closed_at: parse_optional_datetime(row.closed_at)?,
            last_snapshot_version: row.last_snapshot_version,
            created_at: parse_datetime(&row.created_at)?,
            updated_at: parse_datetime(&row.updated_at)?,
        })
    }
}
