//! Recovery through the supervisor facade.

mod common;

use common::{supervisor, ScriptedCallback};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use warden::domain::models::{
    AgentFailure, ErrorClass, EscalationSeverity, PromptAdjustment, RecoveryOutcome,
    RecoveryStrategy, TicketStatus,
};
use warden::domain::ports::TicketFilter;
use warden::{AgentError, DomainError, RecoveryContext, TaskStatus};

#[tokio::test]
async fn test_transient_error_recovers_with_retry() {
    let (supervisor, _pool) = supervisor().await;
    let task = supervisor.start_task("sync the invoice ledger", None).await.unwrap();

    let callback = ScriptedCallback::with_retries(vec![Err(AgentFailure::new("502")), Ok(())]);
    let result = supervisor
        .handle_error(
            task.id,
            &AgentError::new("timeout", "upstream took too long"),
            &RecoveryContext::new(),
            &callback,
        )
        .await
        .unwrap();

    assert!(result.is_recovered());
    assert_eq!(result.error_class, ErrorClass::Transient);
    assert_eq!(result.strategy, RecoveryStrategy::Retry);
    assert_eq!(callback.retry_count(), 2);

    let attempts = supervisor.list_recovery_attempts(task.id).await.unwrap();
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0].outcome, RecoveryOutcome::Failed);
    assert_eq!(attempts[1].outcome, RecoveryOutcome::Success);
}

#[tokio::test]
async fn test_exhausted_retries_open_ticket_that_can_be_worked() {
    let (supervisor, _pool) = supervisor().await;
    let task = supervisor.start_task("sync the invoice ledger", None).await.unwrap();

    let callback = ScriptedCallback::default();
    let result = supervisor
        .handle_error(task.id, &AgentError::new("rate_limit", ""), &RecoveryContext::new(), &callback)
        .await
        .unwrap();

    assert_eq!(callback.retry_count(), 3);
    let ticket = result.ticket.expect("ticket");
    assert_eq!(ticket.status, TicketStatus::Open);
    assert_eq!(ticket.severity, EscalationSeverity::AutoRecovery);

    let acked = supervisor
        .acknowledge_escalation(ticket.id, "oncall", Some("looking"))
        .await
        .unwrap();
    assert_eq!(acked.status, TicketStatus::Acknowledged);

    let resolved = supervisor
        .resolve_escalation(ticket.id, "oncall", "raised the provider quota")
        .await
        .unwrap();
    assert_eq!(resolved.status, TicketStatus::Resolved);
    assert_eq!(resolved.resolution.as_deref(), Some("raised the provider quota"));

    let err = supervisor
        .acknowledge_escalation(ticket.id, "oncall", None)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::InvalidTicketTransition { .. }));

    let open = supervisor
        .query_escalations(TicketFilter {
            status: Some(TicketStatus::Open),
            ..TicketFilter::default()
        })
        .await
        .unwrap();
    assert!(open.is_empty());
}

#[tokio::test]
async fn test_agent_specific_error_adjusts_prompt() {
    let (supervisor, _pool) = supervisor().await;
    let task = supervisor.start_task("summarise the quarterly report", None).await.unwrap();

    let callback = ScriptedCallback::with_retries(vec![Ok(())]);
    let ctx = RecoveryContext::new().with_prompt("summarise sections 1 to 4");
    let result = supervisor
        .handle_error(task.id, &AgentError::new("context_overflow", ""), &ctx, &callback)
        .await
        .unwrap();

    assert!(result.is_recovered());
    let requests = callback.retries.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].adjustment, Some(PromptAdjustment::AddContext));
    assert_eq!(requests[0].task_id, task.id);
}

#[tokio::test]
async fn test_state_inconsistency_restores_snapshot() {
    let (supervisor, _pool) = supervisor().await;
    let task = supervisor.start_task("rebuild the search index", None).await.unwrap();
    supervisor
        .create_snapshot(task.id, &json!({"indexed": 120}))
        .await
        .unwrap();

    let callback = ScriptedCallback::default();
    let result = supervisor
        .handle_error(
            task.id,
            &AgentError::new("partial_update", "half the shards were written"),
            &RecoveryContext::new(),
            &callback,
        )
        .await
        .unwrap();

    assert!(result.is_recovered());
    assert_eq!(result.strategy, RecoveryStrategy::Rollback);
    assert_eq!(*callback.restored.lock().unwrap(), vec![1]);
}

#[tokio::test]
async fn test_fatal_error_freezes_task() {
    let (supervisor, _pool) = supervisor().await;
    let task = supervisor.start_task("rotate the signing keys", None).await.unwrap();

    let callback = ScriptedCallback::default();
    let result = supervisor
        .handle_error(
            task.id,
            &AgentError::new("security_violation", "attempted to read a secret"),
            &RecoveryContext::new(),
            &callback,
        )
        .await
        .unwrap();

    assert_eq!(result.error_class, ErrorClass::Fatal);
    assert!(result.ticket.is_some());
    assert_eq!(callback.retry_count(), 0);

    let task = supervisor.get_task(task.id).await.unwrap();
    assert!(task.is_paused());
    assert_eq!(task.status, TaskStatus::Active);
}

#[tokio::test]
async fn test_cancelled_recovery_is_abandoned_without_ticket() {
    let (supervisor, _pool) = supervisor().await;
    let task = supervisor.start_task("sync the invoice ledger", None).await.unwrap();

    let token = CancellationToken::new();
    token.cancel();
    let callback = ScriptedCallback::default();
    let result = supervisor
        .handle_error(
            task.id,
            &AgentError::new("network", "connection reset"),
            &RecoveryContext::new().with_cancellation(token),
            &callback,
        )
        .await
        .unwrap();

    assert_eq!(result.outcome, RecoveryOutcome::Abandoned);
    assert!(result.ticket.is_none());
}
