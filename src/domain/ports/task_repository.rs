use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{HistoryEntry, Task, TaskStatus};

/// Filters for querying tasks
#[derive(Default, Debug, Clone)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub paused: Option<bool>,
    pub limit: Option<usize>,
}

/// Repository port for supervised task persistence
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Insert a new task together with its opening history entry
    async fn create(&self, task: &Task, entry: &HistoryEntry) -> DomainResult<()>;

    async fn get(&self, id: Uuid) -> DomainResult<Option<Task>>;

    /// List tasks, most recently updated first
    async fn list(&self, filter: TaskFilter) -> DomainResult<Vec<Task>>;

    /// Persist the task row and append the entries in a single transaction
    async fn update_with_history(&self, task: &Task, entries: &[HistoryEntry]) -> DomainResult<()>;
}
