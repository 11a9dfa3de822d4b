use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::Snapshot;

/// Repository port for snapshots
#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    /// Allocate the next version from the task's counter and insert the
    /// snapshot in one transaction. Returns the row as read back from storage.
    async fn create_next(&self, task_id: Uuid, payload: &Value) -> DomainResult<Snapshot>;

    async fn get(&self, id: Uuid) -> DomainResult<Option<Snapshot>>;

    async fn get_version(&self, task_id: Uuid, version: i64) -> DomainResult<Option<Snapshot>>;

    /// All snapshots for a task, newest version first
    async fn list_for_task(&self, task_id: Uuid) -> DomainResult<Vec<Snapshot>>;

    /// Task ids that currently own at least one snapshot
    async fn task_ids(&self) -> DomainResult<Vec<Uuid>>;

    /// Delete the given snapshots; returns the number removed
    async fn delete_many(&self, ids: &[Uuid]) -> DomainResult<u64>;
}
