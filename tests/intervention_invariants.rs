//! Invariants of the intervention ledger across arbitrary call sequences.

mod common;

use proptest::prelude::*;
use warden::domain::models::{HistoryFilter, HistoryKind};
use warden::domain::ports::InterventionFilter;
use warden::{
    CoherenceAssessment, DerailmentType, DomainError, InterventionPreferences, InterventionRequest,
    TaskStatus,
};

fn request_strategy() -> impl Strategy<Value = InterventionRequest> {
    prop_oneof![
        4 => Just(InterventionRequest::None),
        1 => Just(InterventionRequest::ForceBlock),
        1 => "[a-z ]{3,20}".prop_map(InterventionRequest::Suggest),
        1 => "[a-z ]{3,20}".prop_map(InterventionRequest::Rewrite),
    ]
}

fn call_strategy() -> impl Strategy<Value = (f64, InterventionRequest)> {
    (0.0f64..=1.0, request_strategy())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// At most one intervention is open per task, whatever the caller does.
    #[test]
    fn prop_single_open_intervention(calls in prop::collection::vec(call_strategy(), 1..12)) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let (supervisor, _pool) = common::supervisor().await;
            let prefs = InterventionPreferences::default();
            let task = supervisor.start_task("Write unit tests for module X", None).await.unwrap();

            for (confidence, request) in calls {
                let assessment = CoherenceAssessment::new(DerailmentType::TaskDrift, confidence, "generated");
                match supervisor.intervene(task.id, &assessment, &prefs, request).await {
                    Ok(_) | Err(DomainError::AwaitingAcknowledgment(_)) => {}
                    Err(e) => panic!("unexpected error: {e}"),
                }

                let open = supervisor
                    .list_interventions(InterventionFilter {
                        task_id: Some(task.id),
                        open_only: true,
                        limit: None,
                    })
                    .await
                    .unwrap();
                assert!(open.len() <= 1, "{} open interventions", open.len());

                let current = supervisor.get_task(task.id).await.unwrap();
                assert!((0.0..=1.0).contains(&current.coherence_score));
            }
        });
    }
}

#[tokio::test]
async fn test_failed_commit_leaves_task_untouched() {
    let (supervisor, pool) = common::supervisor().await;
    let task = supervisor
        .start_task("Write unit tests for module X", None)
        .await
        .unwrap();

    sqlx::query("DROP TABLE interventions")
        .execute(&pool)
        .await
        .unwrap();

    let assessment = CoherenceAssessment::new(DerailmentType::TaskDrift, 0.85, "off objective");
    let result = supervisor
        .intervene(
            task.id,
            &assessment,
            &InterventionPreferences::default(),
            InterventionRequest::None,
        )
        .await;
    assert!(result.is_err());

    let after = supervisor.get_task(task.id).await.unwrap();
    assert_eq!(after.status, TaskStatus::Active);
    assert!((after.coherence_score - task.coherence_score).abs() < f64::EPSILON);

    let interventions = supervisor
        .query_history(
            &HistoryFilter::new()
                .for_task(task.id)
                .with_kind(HistoryKind::Intervention),
        )
        .await
        .unwrap();
    assert!(interventions.is_empty());
}
