//! Snapshot and timeline store.
//!
//! Snapshots are verified after every write and before every use. Retention
//! runs after each write and can be triggered on demand.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    HistoryActor, HistoryEntry, HistoryFilter, HistoryKind, HistoryLevel, Snapshot, SnapshotConfig,
    SnapshotDelta,
};
use crate::domain::ports::{HistoryRepository, SnapshotRepository};

/// Metadata key under which an assessment entry keeps the assessed step.
pub const STEP_METADATA_KEY: &str = "step";

pub struct HistoryStore {
    snapshots: Arc<dyn SnapshotRepository>,
    history: Arc<dyn HistoryRepository>,
    config: SnapshotConfig,
}

impl HistoryStore {
    pub fn new(
        snapshots: Arc<dyn SnapshotRepository>,
        history: Arc<dyn HistoryRepository>,
        config: SnapshotConfig,
    ) -> Self {
        Self {
            snapshots,
            history,
            config,
        }
    }

    /// Store a new snapshot version and apply retention.
    #[instrument(skip(self, payload, actor), err)]
    pub async fn snapshot(
        &self,
        task_id: Uuid,
        payload: &Value,
        actor: HistoryActor,
    ) -> DomainResult<Snapshot> {
        let snapshot = self.snapshots.create_next(task_id, payload).await?;

        if let Err(e) = snapshot.verify() {
            self.record_skipped(&snapshot, "read-back after write").await?;
            return Err(e);
        }

        self.history
            .append(
                &HistoryEntry::new(
                    task_id,
                    HistoryKind::SnapshotCreated,
                    HistoryLevel::Info,
                    actor,
                    format!("Snapshot v{} created", snapshot.version),
                )
                .with_metadata("snapshot_id", json!(snapshot.id.to_string()))
                .with_metadata("version", json!(snapshot.version))
                .with_metadata("checksum", json!(snapshot.checksum)),
            )
            .await?;

        debug!(snapshot_id = %snapshot.id, version = snapshot.version, "Snapshot stored");
        self.cleanup_task(task_id).await?;
        Ok(snapshot)
    }

    /// Verified payload of `snapshot_id`. Touches no task state.
    #[instrument(skip(self, actor), err)]
    pub async fn rollback(
        &self,
        task_id: Uuid,
        snapshot_id: Uuid,
        actor: HistoryActor,
    ) -> DomainResult<Value> {
        let snapshot = self
            .snapshots
            .get(snapshot_id)
            .await?
            .ok_or(DomainError::SnapshotNotFound(snapshot_id))?;

        if snapshot.task_id != task_id {
            return Err(DomainError::SnapshotTaskMismatch { snapshot_id, task_id });
        }

        if let Err(e) = snapshot.verify() {
            self.record_skipped(&snapshot, "rollback").await?;
            return Err(e);
        }

        let payload = snapshot.payload_json()?;
        self.record_rollback(&snapshot, actor).await?;
        Ok(payload)
    }

    /// Newest snapshot that passes verification, with its payload.
    ///
    /// Corrupt snapshots on the way are recorded as skipped.
    pub async fn latest_valid(&self, task_id: Uuid) -> DomainResult<Option<(Snapshot, Value)>> {
        for snapshot in self.snapshots.list_for_task(task_id).await? {
            if snapshot.verify().is_err() {
                self.record_skipped(&snapshot, "recovery rollback").await?;
                continue;
            }
            match snapshot.payload_json() {
                Ok(payload) => return Ok(Some((snapshot, payload))),
                Err(e) => {
                    warn!(snapshot_id = %snapshot.id, error = %e, "Snapshot payload unreadable");
                    self.record_skipped(&snapshot, "unparseable payload").await?;
                }
            }
        }
        Ok(None)
    }

    pub async fn record_rollback(&self, snapshot: &Snapshot, actor: HistoryActor) -> DomainResult<()> {
        self.history
            .append(
                &HistoryEntry::new(
                    snapshot.task_id,
                    HistoryKind::Rollback,
                    HistoryLevel::Decision,
                    actor,
                    format!("Rolled back to snapshot v{}", snapshot.version),
                )
                .with_metadata("snapshot_id", json!(snapshot.id.to_string()))
                .with_metadata("version", json!(snapshot.version)),
            )
            .await
    }

    async fn record_skipped(&self, snapshot: &Snapshot, during: &str) -> DomainResult<()> {
        warn!(
            snapshot_id = %snapshot.id,
            task_id = %snapshot.task_id,
            version = snapshot.version,
            during,
            "Snapshot failed checksum verification"
        );
        self.history
            .append(
                &HistoryEntry::new(
                    snapshot.task_id,
                    HistoryKind::SnapshotSkipped,
                    HistoryLevel::Error,
                    HistoryActor::System,
                    format!("Snapshot v{} failed verification during {during}", snapshot.version),
                )
                .with_metadata("snapshot_id", json!(snapshot.id.to_string()))
                .with_metadata("version", json!(snapshot.version)),
            )
            .await
    }

    pub async fn list(&self, task_id: Uuid) -> DomainResult<Vec<Snapshot>> {
        self.snapshots.list_for_task(task_id).await
    }

    /// Structural diff between two verified versions.
    pub async fn diff(&self, task_id: Uuid, from: i64, to: i64) -> DomainResult<SnapshotDelta> {
        let older = self.verified_version(task_id, from).await?;
        let newer = self.verified_version(task_id, to).await?;
        Ok(SnapshotDelta::compute(
            task_id,
            (from, &older.payload_json()?),
            (to, &newer.payload_json()?),
        ))
    }

    async fn verified_version(&self, task_id: Uuid, version: i64) -> DomainResult<Snapshot> {
        let snapshot = self
            .snapshots
            .get_version(task_id, version)
            .await?
            .ok_or(DomainError::SnapshotVersionNotFound { task_id, version })?;
        snapshot.verify()?;
        Ok(snapshot)
    }

    /// Evict snapshots beyond the count limit (oldest first) or older than
    /// the age limit.
    pub async fn cleanup_task(&self, task_id: Uuid) -> DomainResult<u64> {
        let cutoff = Utc::now() - Duration::hours(i64::from(self.config.cleanup_after_hours));
        let keep = usize::try_from(self.config.max_snapshots).unwrap_or(usize::MAX);

        let evict: Vec<Uuid> = self
            .snapshots
            .list_for_task(task_id)
            .await?
            .into_iter()
            .enumerate()
            .filter(|(index, s)| *index >= keep || s.created_at < cutoff)
            .map(|(_, s)| s.id)
            .collect();

        if evict.is_empty() {
            return Ok(0);
        }

        let removed = self.snapshots.delete_many(&evict).await?;
        self.history
            .append(
                &HistoryEntry::new(
                    task_id,
                    HistoryKind::SnapshotsEvicted,
                    HistoryLevel::Debug,
                    HistoryActor::System,
                    format!("Evicted {removed} snapshot(s)"),
                )
                .with_metadata("count", json!(removed)),
            )
            .await?;
        debug!(task_id = %task_id, removed, "Snapshots evicted");
        Ok(removed)
    }

    /// Retention across every task that owns snapshots.
    pub async fn cleanup_all(&self) -> DomainResult<u64> {
        let mut total = 0;
        for task_id in self.snapshots.task_ids().await? {
            total += self.cleanup_task(task_id).await?;
        }
        if total > 0 {
            info!(removed = total, "Snapshot cleanup finished");
        }
        Ok(total)
    }

    pub async fn record(&self, entry: &HistoryEntry) -> DomainResult<()> {
        self.history.append(entry).await
    }

    pub async fn query(&self, filter: &HistoryFilter) -> DomainResult<Vec<HistoryEntry>> {
        self.history.query(filter).await
    }

    /// Step texts assessed for `task_id` at or after `since`, oldest first.
    /// Steps assessed before the latest circuit reset do not count.
    pub async fn recent_steps(&self, task_id: Uuid, since: DateTime<Utc>) -> DomainResult<Vec<String>> {
        let last_reset = self
            .history
            .query(
                &HistoryFilter::new()
                    .for_task(task_id)
                    .with_kind(HistoryKind::CircuitReset)
                    .since(since),
            )
            .await?
            .last()
            .map(|entry| entry.created_at);

        let steps = self
            .history
            .query(
                &HistoryFilter::new()
                    .for_task(task_id)
                    .with_kind(HistoryKind::Assessment)
                    .since(since),
            )
            .await?
            .into_iter()
            .filter(|entry| last_reset.is_none_or(|reset| entry.created_at > reset))
            .filter_map(|entry| {
                entry
                    .metadata
                    .get(STEP_METADATA_KEY)
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .collect();
        Ok(steps)
    }
}
