use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{HistoryEntry, Intervention, Task};

/// Everything one policy decision writes, committed as a unit.
///
/// Updated interventions are written before the created one so that a
/// superseded record is closed before its replacement opens.
#[derive(Debug, Clone)]
pub struct DecisionRecord<'a> {
    pub task: &'a Task,
    pub created: Option<&'a Intervention>,
    pub updated: Vec<&'a Intervention>,
    pub history: Vec<HistoryEntry>,
}

#[derive(Default, Debug, Clone)]
pub struct InterventionFilter {
    pub task_id: Option<Uuid>,
    pub open_only: bool,
    pub limit: Option<usize>,
}

/// Repository port for interventions
#[async_trait]
pub trait InterventionRepository: Send + Sync {
    async fn get(&self, id: Uuid) -> DomainResult<Option<Intervention>>;

    /// The unresolved intervention for a task, if any
    async fn get_open(&self, task_id: Uuid) -> DomainResult<Option<Intervention>>;

    /// List interventions, newest first
    async fn list(&self, filter: InterventionFilter) -> DomainResult<Vec<Intervention>>;

    /// Atomically write the task, intervention changes and history entries.
    /// On error nothing is written.
    async fn commit(&self, record: DecisionRecord<'_>) -> DomainResult<()>;
}
