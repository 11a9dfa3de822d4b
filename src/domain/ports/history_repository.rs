use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{HistoryEntry, HistoryFilter};

/// Append-only timeline storage. There is no update or delete.
#[async_trait]
pub trait HistoryRepository: Send + Sync {
    async fn append(&self, entry: &HistoryEntry) -> DomainResult<()>;

    /// Matching entries in chronological order
    async fn query(&self, filter: &HistoryFilter) -> DomainResult<Vec<HistoryEntry>>;
}
