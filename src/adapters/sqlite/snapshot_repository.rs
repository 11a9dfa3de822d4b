//! SQLite implementation of the SnapshotRepository.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::Snapshot;
use crate::domain::ports::SnapshotRepository;

use super::{format_datetime, parse_datetime, parse_uuid};

#[derive(Clone)]
pub struct SqliteSnapshotRepository {
    pool: SqlitePool,
}

impl SqliteSnapshotRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SnapshotRepository for SqliteSnapshotRepository {
    async fn create_next(&self, task_id: Uuid, payload: &Value) -> DomainResult<Snapshot> {
        let mut tx = self.pool.begin().await?;

        let version: Option<(i64,)> = sqlx::query_as(
            "UPDATE tasks SET last_snapshot_version = last_snapshot_version + 1 WHERE id = ? RETURNING last_snapshot_version",
        )
        .bind(task_id.to_string())
        .fetch_optional(&mut *tx)
        .await?;

        let (version,) = version.ok_or(DomainError::TaskNotFound(task_id))?;
        let snapshot = Snapshot::new(task_id, version, payload)?;

        sqlx::query(
            r#"INSERT INTO snapshots (id, task_id, version, payload, checksum, created_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(snapshot.id.to_string())
        .bind(snapshot.task_id.to_string())
        .bind(snapshot.version)
        .bind(&snapshot.payload)
        .bind(&snapshot.checksum)
        .bind(format_datetime(&snapshot.created_at))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.get(snapshot.id)
            .await?
            .ok_or(DomainError::SnapshotNotFound(snapshot.id))
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Snapshot>> {
        let row: Option<SnapshotRow> = sqlx::query_as("SELECT * FROM snapshots WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Snapshot::try_from).transpose()
    }

    async fn get_version(&self, task_id: Uuid, version: i64) -> DomainResult<Option<Snapshot>> {
        let row: Option<SnapshotRow> =
            sqlx::query_as("SELECT * FROM snapshots WHERE task_id = ? AND version = ?")
                .bind(task_id.to_string())
                .bind(version)
                .fetch_optional(&self.pool)
                .await?;

        row.map(Snapshot::try_from).transpose()
    }

    async fn list_for_task(&self, task_id: Uuid) -> DomainResult<Vec<Snapshot>> {
        let rows: Vec<SnapshotRow> =
            sqlx::query_as("SELECT * FROM snapshots WHERE task_id = ? ORDER BY version DESC")
                .bind(task_id.to_string())
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(Snapshot::try_from).collect()
    }

    async fn task_ids(&self) -> DomainResult<Vec<Uuid>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT DISTINCT task_id FROM snapshots")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(|(id,)| parse_uuid(id)).collect()
    }

    async fn delete_many(&self, ids: &[Uuid]) -> DomainResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut removed = 0;
        for id in ids {
            let result = sqlx::query("DELETE FROM snapshots WHERE id = ?")
                .bind(id.to_string())
                .execute(&mut *tx)
                .await?;
            removed += result.rows_affected();
        }
        tx.commit().await?;
        Ok(removed)
    }
}

#[derive(sqlx::FromRow)]
struct SnapshotRow {
    id: String,
    task_id: String,
    version: i64,
    payload: String,
    checksum: String,
    created_at: String,
}

impl TryFrom<SnapshotRow> for Snapshot {
    type Error = DomainError;

    fn try_from(row: SnapshotRow) -> Result<Self, Self::Error> {
        Ok(Snapshot {
            id: parse_uuid(&row.id)?,
            task_id: parse_uuid(&row.task_id)?,
            version: row.version,
            payload: row.payload,
            checksum: row.checksum,
            created_at: parse_datetime(&row.created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteTaskRepository};
    use crate::domain::models::{HistoryActor, HistoryEntry, HistoryKind, HistoryLevel, Task};
    use crate::domain::ports::TaskRepository;
    use serde_json::json;

    async fn setup() -> (SqliteSnapshotRepository, SqliteTaskRepository, Task) {
        let pool = create_migrated_test_pool().await.unwrap();
        let tasks = SqliteTaskRepository::new(pool.clone());
        let task = Task::new("refactor parser");
        let entry = HistoryEntry::new(task.id, HistoryKind::TaskStarted, HistoryLevel::Info, HistoryActor::System, "start");
        tasks.create(&task, &entry).await.unwrap();
        (SqliteSnapshotRepository::new(pool), tasks, task)
    }

    #[tokio::test]
    async fn test_versions_are_monotonic_after_delete() {
        let (repo, tasks, task) = setup().await;

        let first = repo.create_next(task.id, &json!({"step": 1})).await.unwrap();
        let second = repo.create_next(task.id, &json!({"step": 2})).await.unwrap();
        assert_eq!(first.version, 1);
        assert_eq!(second.version, 2);
        assert!(second.verify().is_ok());

        repo.delete_many(&[second.id]).await.unwrap();
        let third = repo.create_next(task.id, &json!({"step": 3})).await.unwrap();
        assert_eq!(third.version, 3);

        let listed = repo.list_for_task(task.id).await.unwrap();
        assert_eq!(listed.iter().map(|s| s.version).collect::<Vec<_>>(), vec![3, 1]);
        assert_eq!(tasks.get(task.id).await.unwrap().unwrap().last_snapshot_version, 3);
    }

    #[tokio::test]
    async fn test_unknown_task_rejected() {
        let (repo, _tasks, _task) = setup().await;
        let err = repo.create_next(Uuid::new_v4(), &json!({})).await.unwrap_err();
        assert!(matches!(err, DomainError::TaskNotFound(_)));
    }

    #[tokio::test]
    async fn test_get_version_and_task_ids() {
        let (repo, _tasks, task) = setup().await;
        let snapshot = repo.create_next(task.id, &json!({"a": true})).await.unwrap();

        let fetched = repo.get_version(task.id, 1).await.unwrap().unwrap();
        assert_eq!(fetched.id, snapshot.id);
        assert!(repo.get_version(task.id, 2).await.unwrap().is_none());
        assert_eq!(repo.task_ids().await.unwrap(), vec![task.id]);
    }
}
