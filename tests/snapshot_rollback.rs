//! Snapshot store behaviour seen through the supervisor.

mod common;

use common::supervisor;
use serde_json::json;
use warden::domain::models::{ChangeKind, HistoryFilter, HistoryKind};
use warden::DomainError;

#[tokio::test]
async fn test_versions_diff_and_rollback() {
    let (supervisor, _pool) = supervisor().await;
    let task = supervisor.start_task("translate the help pages", None).await.unwrap();

    let first = supervisor
        .create_snapshot(task.id, &json!({"pages": 3, "locale": "de"}))
        .await
        .unwrap();
    let second = supervisor
        .create_snapshot(task.id, &json!({"pages": 5, "locale": "de", "done": false}))
        .await
        .unwrap();
    assert_eq!(first.version, 1);
    assert_eq!(second.version, 2);
    assert_eq!(supervisor.get_task(task.id).await.unwrap().last_snapshot_version, 2);

    let delta = supervisor.diff_snapshots(task.id, 1, 2).await.unwrap();
    assert_eq!(delta.changes.len(), 2);
    let pages = delta.changes.iter().find(|c| c.path == "/pages").unwrap();
    assert_eq!(pages.kind, ChangeKind::Modified);
    let done = delta.changes.iter().find(|c| c.path == "/done").unwrap();
    assert_eq!(done.kind, ChangeKind::Added);

    let payload = supervisor.rollback(task.id, first.id).await.unwrap();
    assert_eq!(payload, json!({"pages": 3, "locale": "de"}));

    let rollbacks = supervisor
        .query_history(&HistoryFilter::new().for_task(task.id).with_kind(HistoryKind::Rollback))
        .await
        .unwrap();
    assert_eq!(rollbacks.len(), 1);
}

#[tokio::test]
async fn test_corrupted_snapshot_is_refused() {
    let (supervisor, pool) = supervisor().await;
    let task = supervisor.start_task("translate the help pages", None).await.unwrap();
    let snapshot = supervisor
        .create_snapshot(task.id, &json!({"pages": 3}))
        .await
        .unwrap();

    sqlx::query("UPDATE snapshots SET payload = ? WHERE id = ?")
        .bind(r#"{"pages":300}"#)
        .bind(snapshot.id.to_string())
        .execute(&pool)
        .await
        .unwrap();

    let before = supervisor.get_task(task.id).await.unwrap();
    let err = supervisor.rollback(task.id, snapshot.id).await.unwrap_err();
    assert!(matches!(err, DomainError::SnapshotCorrupted { snapshot_id, .. } if snapshot_id == snapshot.id));

    let after = supervisor.get_task(task.id).await.unwrap();
    assert_eq!(after.status, before.status);
    assert_eq!(after.last_snapshot_version, before.last_snapshot_version);

    let skipped = supervisor
        .query_history(
            &HistoryFilter::new()
                .for_task(task.id)
                .with_kind(HistoryKind::SnapshotSkipped),
        )
        .await
        .unwrap();
    assert_eq!(skipped.len(), 1);
}

#[tokio::test]
async fn test_snapshot_of_other_task_is_rejected() {
    let (supervisor, _pool) = supervisor().await;
    let owner = supervisor.start_task("first task", None).await.unwrap();
    let other = supervisor.start_task("second task", None).await.unwrap();
    let snapshot = supervisor.create_snapshot(owner.id, &json!({"a": 1})).await.unwrap();

    let err = supervisor.rollback(other.id, snapshot.id).await.unwrap_err();
    assert!(matches!(err, DomainError::SnapshotTaskMismatch { .. }));
}

#[tokio::test]
async fn test_retention_keeps_newest_snapshots() {
    let (supervisor, _pool) = supervisor().await;
    let task = supervisor.start_task("index the archive", None).await.unwrap();

    for n in 0..12 {
        supervisor
            .create_snapshot(task.id, &json!({"batch": n}))
            .await
            .unwrap();
    }

    let snapshots = supervisor.list_snapshots(task.id).await.unwrap();
    assert_eq!(snapshots.len(), 10);
    let mut versions: Vec<i64> = snapshots.iter().map(|s| s.version).collect();
    versions.sort_unstable();
    assert_eq!(versions.first(), Some(&3));
    assert_eq!(versions.last(), Some(&12));
}

#[tokio::test]
async fn test_snapshots_refused_on_completed_task() {
    let (supervisor, _pool) = supervisor().await;
    let task = supervisor.start_task("index the archive", None).await.unwrap();
    supervisor.complete_task(task.id).await.unwrap();

    let err = supervisor
        .create_snapshot(task.id, &json!({"late": true}))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::TaskTerminal(_)));
}
