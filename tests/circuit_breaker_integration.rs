//! Fail-fast behaviour once the loop detector pauses a task.

mod common;

use common::{fast_config, supervisor};
use warden::domain::models::{HistoryFilter, HistoryKind, RecoveryStrategy};
use warden::domain::ports::TaskFilter;
use warden::{
    CoherenceAssessment, DerailmentType, DomainError, InterventionPreferences, InterventionRequest,
    Supervisor,
};

const STEP: &str = "Checking whether the migration ran";

#[tokio::test]
async fn test_repeated_steps_open_circuit_until_reset() {
    let (supervisor, _pool) = supervisor().await;
    let task = supervisor
        .start_task("Apply the pending schema migrations", None)
        .await
        .unwrap();

    for _ in 0..3 {
        supervisor.assess_step(task.id, STEP, &[]).await.unwrap();
    }

    let paused = supervisor.get_task(task.id).await.unwrap();
    assert!(paused.is_paused());
    assert!(paused.pause_reason.as_deref().unwrap_or_default().contains("loop"));

    let err = supervisor.assess_step(task.id, STEP, &[]).await.unwrap_err();
    assert!(err.is_circuit_open());

    let assessment = CoherenceAssessment::new(DerailmentType::TaskDrift, 0.75, "off objective");
    let err = supervisor
        .intervene(
            task.id,
            &assessment,
            &InterventionPreferences::default(),
            InterventionRequest::None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::CircuitOpen { task_id, .. } if task_id == task.id));

    let listed = supervisor
        .list_tasks(TaskFilter {
            paused: Some(true),
            ..TaskFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);

    let attempts = supervisor.list_recovery_attempts(task.id).await.unwrap();
    assert!(attempts.iter().any(|a| a.strategy == RecoveryStrategy::CircuitBreak));

    let reset = supervisor.reset_circuit(task.id, "oncall").await.unwrap();
    assert!(!reset.is_paused());
    assert!(reset.pause_reason.is_none());

    supervisor
        .assess_step(task.id, "Migration 0042 applied, verifying row counts", &[])
        .await
        .unwrap();

    let kinds: Vec<HistoryKind> = supervisor
        .query_history(&HistoryFilter::new().for_task(task.id))
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.kind)
        .collect();
    assert!(kinds.contains(&HistoryKind::CircuitOpened));
    assert!(kinds.contains(&HistoryKind::CircuitReset));
}

#[tokio::test]
async fn test_distinct_steps_never_trip() {
    let (supervisor, _pool) = supervisor().await;
    let task = supervisor
        .start_task("Apply the pending schema migrations", None)
        .await
        .unwrap();

    for n in 0..6 {
        supervisor
            .assess_step(task.id, &format!("Applied migration {n:04} to the orders schema"), &[])
            .await
            .unwrap();
    }

    assert!(!supervisor.get_task(task.id).await.unwrap().is_paused());
}

#[tokio::test]
async fn test_repeats_are_detected_across_supervisor_instances() {
    let (first, pool) = supervisor().await;
    let task = first
        .start_task("Apply the pending schema migrations", None)
        .await
        .unwrap();

    for _ in 0..2 {
        let fresh = Supervisor::from_pool(pool.clone(), fast_config()).unwrap();
        fresh.assess_step(task.id, STEP, &[]).await.unwrap();
        assert!(!fresh.get_task(task.id).await.unwrap().is_paused());
    }

    let third = Supervisor::from_pool(pool.clone(), fast_config()).unwrap();
    third.assess_step(task.id, STEP, &[]).await.unwrap();
    assert!(first.get_task(task.id).await.unwrap().is_paused());

    let err = first.assess_step(task.id, STEP, &[]).await.unwrap_err();
    assert!(err.is_circuit_open());
}

#[tokio::test]
async fn test_loop_detection_follows_configuration() {
    let (_, pool) = supervisor().await;
    let mut config = fast_config();
    config.loop_detection.repeat_threshold = 5;
    let supervisor = Supervisor::from_pool(pool, config).unwrap();
    let task = supervisor
        .start_task("Apply the pending schema migrations", None)
        .await
        .unwrap();

    for _ in 0..4 {
        supervisor.assess_step(task.id, STEP, &[]).await.unwrap();
    }
    assert!(!supervisor.get_task(task.id).await.unwrap().is_paused());

    supervisor.assess_step(task.id, STEP, &[]).await.unwrap();
    assert!(supervisor.get_task(task.id).await.unwrap().is_paused());
}
