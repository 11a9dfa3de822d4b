//! SQLite implementation of the HistoryRepository.
//!
//! The table is append-only; triggers abort any UPDATE or DELETE.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    DecisionRationale, HistoryActor, HistoryEntry, HistoryFilter, HistoryKind, HistoryLevel,
};
use crate::domain::ports::HistoryRepository;

use super::{format_datetime, insert_history_entry, parse_datetime, parse_enum, parse_json_or_default, parse_uuid};

#[derive(Clone)]
pub struct SqliteHistoryRepository {
    pool: SqlitePool,
}

impl SqliteHistoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HistoryRepository for SqliteHistoryRepository {
    async fn append(&self, entry: &HistoryEntry) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;
        insert_history_entry(&mut tx, entry).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn query(&self, filter: &HistoryFilter) -> DomainResult<Vec<HistoryEntry>> {
        let mut query = String::from("SELECT * FROM history WHERE 1=1");
        if filter.task_id.is_some() {
            query.push_str(" AND task_id = ?");
        }
        if filter.kind.is_some() {
            query.push_str(" AND kind = ?");
        }
        if filter.min_level.is_some() {
            query.push_str(" AND level_ord >= ?");
        }
        if filter.from.is_some() {
            query.push_str(" AND created_at >= ?");
        }
        if filter.to.is_some() {
            query.push_str(" AND created_at <= ?");
        }
        query.push_str(" ORDER BY created_at ASC, rowid ASC");
        if let Some(limit) = filter.limit {
            query.push_str(&format!(" LIMIT {limit}"));
        }

        let mut q = sqlx::query_as::<_, HistoryRow>(&query);
        if let Some(task_id) = filter.task_id {
            q = q.bind(task_id.to_string());
        }
        if let Some(kind) = filter.kind {
            q = q.bind(kind.as_str());
        }
        if let Some(level) = filter.min_level {
            q = q.bind(level.ordinal());
        }
        if let Some(from) = filter.from {
            q = q.bind(format_datetime(&from));
        }
        if let Some(to) = filter.to {
            q = q.bind(format_datetime(&to));
        }

        let rows: Vec<HistoryRow> = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(HistoryEntry::try_from).collect()
    }
}

#[derive(sqlx::FromRow)]
struct HistoryRow {
    id: String,
    task_id: String,
    kind: String,
    level: String,
    actor: String,
    message: String,
    previous_state: Option<String>,
    new_state: Option<String>,
    rationale: Option<String>,
    metadata: Option<String>,
    created_at: String,
}

impl TryFrom<HistoryRow> for HistoryEntry {
    type Error = DomainError;

    fn try_from(row: HistoryRow) -> Result<Self, Self::Error> {
        let actor: HistoryActor = serde_json::from_str(&row.actor)?;
        let rationale: Option<DecisionRationale> =
            row.rationale.map(|s| serde_json::from_str(&s)).transpose()?;

        Ok(HistoryEntry {
            id: parse_uuid(&row.id)?,
            task_id: parse_uuid(&row.task_id)?,
            kind: parse_enum(&row.kind, "history kind", HistoryKind::parse_str)?,
            level: parse_enum(&row.level, "history level", HistoryLevel::parse_str)?,
            actor,
            message: row.message,
            previous_state: row.previous_state,
            new_state: row.new_state,
            rationale,
            metadata: parse_json_or_default(row.metadata)?,
            created_at: parse_datetime(&row.created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteTaskRepository};
    use crate::domain::models::Task;
    use crate::domain::ports::TaskRepository;
    use serde_json::json;

    async fn setup() -> (SqlitePool, SqliteHistoryRepository, Task) {
        let pool = create_migrated_test_pool().await.unwrap();
        let tasks = SqliteTaskRepository::new(pool.clone());
        let task = Task::new("document the API");
        let entry = HistoryEntry::new(task.id, HistoryKind::TaskStarted, HistoryLevel::Info, HistoryActor::System, "start");
        tasks.create(&task, &entry).await.unwrap();
        (pool.clone(), SqliteHistoryRepository::new(pool), task)
    }

    #[tokio::test]
    async fn test_append_and_filter() {
        let (_pool, repo, task) = setup().await;
        let decision = HistoryEntry::new(task.id, HistoryKind::Intervention, HistoryLevel::Decision, HistoryActor::Policy, "redirect")
            .with_state_change("active", "needs_intervention")
            .with_rationale(DecisionRationale::new("redirect", "confidence 0.85").with_factor("confidence", "0.85"))
            .with_metadata("confidence", json!(0.85));
        repo.append(&decision).await.unwrap();

        let all = repo.query(&HistoryFilter::new().for_task(task.id)).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].kind, HistoryKind::TaskStarted);
        assert_eq!(all[1].id, decision.id);
        assert_eq!(all[1].rationale, decision.rationale);
        assert_eq!(all[1].metadata, decision.metadata);
        assert_eq!(all[1].new_state.as_deref(), Some("needs_intervention"));

        let decisions = repo
            .query(&HistoryFilter::new().for_task(task.id).with_min_level(HistoryLevel::Decision))
            .await
            .unwrap();
        assert_eq!(decisions.len(), 1);

        let by_kind = repo
            .query(&HistoryFilter::new().with_kind(HistoryKind::TaskStarted).with_limit(5))
            .await
            .unwrap();
        assert_eq!(by_kind.len(), 1);
    }

    #[tokio::test]
    async fn test_history_is_append_only() {
        let (pool, repo, task) = setup().await;
        let entries = repo.query(&HistoryFilter::new().for_task(task.id)).await.unwrap();
        let id = entries[0].id.to_string();

        let update = sqlx::query("UPDATE history SET message = 'rewritten' WHERE id = ?")
            .bind(&id)
            .execute(&pool)
            .await;
        assert!(update.is_err());

        let delete = sqlx::query("DELETE FROM history WHERE id = ?").bind(&id).execute(&pool).await;
        assert!(delete.is_err());
    }
}
