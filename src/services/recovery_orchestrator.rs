//! Recovery orchestration for failing or blocked tasks.
//!
//! One `handle_error` call walks five phases (assessment, strategy
//! selection, execution, validation, completion) and records each one in
//! the timeline. Every strategy execution becomes a [`RecoveryAttempt`]
//! chained to the task's previous attempt. Plans always end in escalation,
//! so an invocation either recovers, is cancelled, or opens a ticket.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    AgentError, DecisionRationale, ErrorClass, EscalationTicket, HistoryActor, HistoryEntry,
    HistoryKind, HistoryLevel, PromptAdjustment, RecoveryAttempt, RecoveryConfig, RecoveryContext,
    RecoveryOutcome, RecoveryPhase, RecoveryResult, RecoveryStrategy, RetryConfig, RetryRequest,
    Task, TaskStatus,
};
use crate::domain::ports::{RecoveryCallback, RecoveryRepository, TaskRepository};
use crate::services::error_classifier::ErrorClassifier;
use crate::services::escalation::EscalationService;
use crate::services::history_store::HistoryStore;
use crate::services::retry_policy::{cancelable_sleep, BackoffPolicy, SuccessRateTracker};

/// One step of a recovery plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanStep {
    Retry { adjusted: bool },
    Rollback,
    CircuitBreak,
    /// One rollback followed by one adjusted retry
    Hybrid,
    /// Pause the task without an attempt record
    Freeze,
    Escalate,
}

impl PlanStep {
    pub fn strategy(&self) -> RecoveryStrategy {
        match self {
            Self::Retry { .. } => RecoveryStrategy::Retry,
            Self::Rollback => RecoveryStrategy::Rollback,
            Self::CircuitBreak | Self::Freeze => RecoveryStrategy::CircuitBreak,
            Self::Hybrid => RecoveryStrategy::Hybrid,
            Self::Escalate => RecoveryStrategy::Escalate,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Retry { adjusted: false } => "retry",
            Self::Retry { adjusted: true } => "retry_with_prompt_adjustment",
            Self::Rollback => "rollback",
            Self::CircuitBreak => "circuit_break",
            Self::Hybrid => "hybrid",
            Self::Freeze => "freeze",
            Self::Escalate => "escalate",
        }
    }
}

/// Strategy plan for an error class.
pub fn plan_for(class: ErrorClass) -> Vec<PlanStep> {
    match class {
        ErrorClass::Transient => vec![PlanStep::Retry { adjusted: false }, PlanStep::Escalate],
        ErrorClass::AgentSpecific => vec![PlanStep::Retry { adjusted: true }, PlanStep::Escalate],
        ErrorClass::StateInconsistency => vec![PlanStep::Rollback, PlanStep::Escalate],
        ErrorClass::LoopControl => vec![PlanStep::CircuitBreak, PlanStep::Escalate],
        ErrorClass::Unknown => vec![PlanStep::Hybrid, PlanStep::Escalate],
        ErrorClass::Critical => vec![PlanStep::Escalate],
        ErrorClass::Fatal => vec![PlanStep::Freeze, PlanStep::Escalate],
    }
}

enum StepOutcome {
    Recovered(String),
    Failed(String),
    Cancelled(String),
}

/// Mutable bookkeeping for one invocation.
struct RecoveryRun {
    recovery_id: Uuid,
    task: Task,
    class: ErrorClass,
    error_kind: String,
    attempts: Vec<RecoveryAttempt>,
    previous_attempt_id: Option<Uuid>,
    automated_used: u64,
    retries_used: u32,
}

pub struct RecoveryOrchestrator {
    tasks: Arc<dyn TaskRepository>,
    recovery: Arc<dyn RecoveryRepository>,
    store: Arc<HistoryStore>,
    escalation: Arc<EscalationService>,
    tracker: Arc<SuccessRateTracker>,
    classifier: ErrorClassifier,
    backoff: BackoffPolicy,
    retry: RetryConfig,
    max_auto_attempts: u64,
}

impl RecoveryOrchestrator {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        recovery: Arc<dyn RecoveryRepository>,
        store: Arc<HistoryStore>,
        escalation: Arc<EscalationService>,
        tracker: Arc<SuccessRateTracker>,
        retry: RetryConfig,
        recovery_config: &RecoveryConfig,
    ) -> Self {
        Self {
            tasks,
            recovery,
            store,
            escalation,
            tracker,
            classifier: ErrorClassifier::new(&recovery_config.critical_error_types),
            backoff: BackoffPolicy::from_config(&retry),
            retry,
            max_auto_attempts: u64::from(recovery_config.max_auto_recovery_attempts),
        }
    }

    pub fn classify(&self, error: &AgentError) -> ErrorClass {
        self.classifier.classify(error)
    }

    /// Run recovery for `task` after `error`.
    ///
    /// The caller holds the task's lock for the whole call.
    #[instrument(skip(self, task, ctx, callback), fields(task_id = %task.id, error_kind = %error.kind), err)]
    pub async fn handle_error(
        &self,
        task: Task,
        error: &AgentError,
        ctx: &RecoveryContext,
        callback: &dyn RecoveryCallback,
    ) -> DomainResult<RecoveryResult> {
        if task.is_terminal() {
            return Err(DomainError::TaskTerminal(task.id));
        }

        let class = self.classifier.classify(error);
        let mut run = RecoveryRun {
            recovery_id: Uuid::new_v4(),
            previous_attempt_id: self.recovery.last_attempt(task.id).await?.map(|a| a.id),
            automated_used: self.recovery.count_automated_attempts(task.id).await?,
            task,
            class,
            error_kind: error.kind.clone(),
            attempts: Vec::new(),
            retries_used: 0,
        };

        self.record_phase(
            &run,
            RecoveryPhase::Assessment,
            HistoryLevel::Info,
            format!("Classified \"{error}\" as {class}"),
            None,
        )
        .await?;

        let (plan, plan_reason) = self.select_plan(&run);
        let plan_labels: Vec<&str> = plan.iter().map(PlanStep::label).collect();
        let mut rationale = DecisionRationale::new(plan_labels.join(" -> "), plan_reason.clone())
            .with_factor("error_class", class.as_str())
            .with_factor("automated_attempts_used", run.automated_used.to_string())
            .with_factor("max_auto_recovery_attempts", self.max_auto_attempts.to_string());
        for alternative in plan_for(class).iter().filter(|step| !plan.contains(step)) {
            rationale = rationale.with_alternative(alternative.label());
        }
        self.record_phase(
            &run,
            RecoveryPhase::StrategySelection,
            HistoryLevel::Decision,
            format!("Selected plan {}", plan_labels.join(" -> ")),
            Some(rationale),
        )
        .await?;

        let mut last_failure = plan_reason;
        for step in plan {
            if step.strategy().is_automated()
                && step != PlanStep::Freeze
                && run.automated_used >= self.max_auto_attempts
            {
                last_failure = format!(
                    "automated recovery budget of {} attempts exhausted",
                    self.max_auto_attempts
                );
                continue;
            }

            self.record_phase(
                &run,
                RecoveryPhase::Execution,
                HistoryLevel::Info,
                format!("Executing {}", step.label()),
                None,
            )
            .await?;

            let outcome = match step {
                PlanStep::Escalate => return self.escalate(run, &last_failure).await,
                PlanStep::Retry { adjusted } => {
                    let max_retries = self.retry.max_retries;
                    self.run_retries(&mut run, ctx, callback, RecoveryStrategy::Retry, adjusted, max_retries)
                        .await?
                }
                PlanStep::Rollback => {
                    self.run_rollback(&mut run, callback, RecoveryStrategy::Rollback)
                        .await?
                }
                PlanStep::CircuitBreak => self.run_circuit_break(&mut run).await?,
                PlanStep::Hybrid => self.run_hybrid(&mut run, ctx, callback).await?,
                PlanStep::Freeze => self.run_freeze(&mut run, error).await?,
            };

            match outcome {
                StepOutcome::Recovered(detail) => {
                    self.record_phase(
                        &run,
                        RecoveryPhase::Validation,
                        HistoryLevel::Info,
                        format!("{} succeeded: {detail}", step.label()),
                        None,
                    )
                    .await?;
                    return self
                        .complete(run, step.strategy(), RecoveryOutcome::Success, detail, None)
                        .await;
                }
                StepOutcome::Cancelled(detail) => {
                    self.record_phase(
                        &run,
                        RecoveryPhase::Validation,
                        HistoryLevel::Warning,
                        format!("{} cancelled: {detail}", step.label()),
                        None,
                    )
                    .await?;
                    return self
                        .complete(run, step.strategy(), RecoveryOutcome::Abandoned, detail, None)
                        .await;
                }
                StepOutcome::Failed(detail) => {
                    self.record_phase(
                        &run,
                        RecoveryPhase::Validation,
                        HistoryLevel::Warning,
                        format!("{} did not recover the task: {detail}", step.label()),
                        None,
                    )
                    .await?;
                    last_failure = detail;
                }
            }
        }

        // Plans end in escalation, so only an empty plan gets here.
        self.escalate(run, &last_failure).await
    }

    fn select_plan(&self, run: &RecoveryRun) -> (Vec<PlanStep>, String) {
        if run.class == ErrorClass::Fatal {
            return (plan_for(ErrorClass::Fatal), "fatal errors freeze the task and escalate".to_string());
        }
        if run.automated_used >= self.max_auto_attempts {
            return (
                vec![PlanStep::Escalate],
                format!(
                    "task already consumed {} of {} automated recovery attempts",
                    run.automated_used, self.max_auto_attempts
                ),
            );
        }
        if run.task.is_paused() {
            return (
                vec![PlanStep::Escalate],
                "task is paused by the circuit breaker".to_string(),
            );
        }
        let reason = match run.class {
            ErrorClass::Critical => "critical errors escalate immediately",
            ErrorClass::Transient => "transient errors usually clear on retry",
            ErrorClass::AgentSpecific => "agent-specific errors need an adjusted prompt",
            ErrorClass::StateInconsistency => "inconsistent state is restored from a snapshot",
            ErrorClass::LoopControl => "loops are stopped by pausing the task",
            _ => "unclassified errors try rollback then an adjusted retry",
        };
        (plan_for(run.class), reason.to_string())
    }

    async fn run_retries(
        &self,
        run: &mut RecoveryRun,
        ctx: &RecoveryContext,
        callback: &dyn RecoveryCallback,
        strategy: RecoveryStrategy,
        adjusted: bool,
        max_retries: u32,
    ) -> DomainResult<StepOutcome> {
        for k in 0..max_retries {
            if run.automated_used >= self.max_auto_attempts {
                return Ok(StepOutcome::Failed(
                    "automated recovery budget exhausted during retries".to_string(),
                ));
            }

            if self
                .tracker
                .should_abandon(run.class, self.retry.success_rate_threshold, self.retry.min_samples)
                .await
            {
                let (rate, samples) = self.tracker.estimate(run.class).await;
                let detail = format!(
                    "retrying abandoned: {} success rate {rate:.2} over {samples} samples is below {:.2}",
                    run.class, self.retry.success_rate_threshold
                );
                self.record_phase(run, RecoveryPhase::Execution, HistoryLevel::Warning, detail.clone(), None)
                    .await?;
                return Ok(StepOutcome::Failed(detail));
            }

            let delay = self.backoff.delay(k);
            if !cancelable_sleep(delay, &ctx.cancel).await {
                return Ok(StepOutcome::Cancelled(format!(
                    "cancelled while waiting {}ms before retry {}",
                    delay.as_millis(),
                    k + 1
                )));
            }

            let adjustment = adjusted.then(|| PromptAdjustment::for_attempt(k));
            let prompt = match (&ctx.prompt, adjustment) {
                (Some(prompt), Some(adjustment)) => Some(adjustment.apply(prompt, &run.task.objective)),
                (prompt, _) => prompt.clone(),
            };

            run.retries_used += 1;
            let result = callback
                .retry(RetryRequest {
                    task_id: run.task.id,
                    attempt: k + 1,
                    prompt,
                    adjustment,
                })
                .await;
            self.tracker.record(run.class, result.is_ok()).await;

            match result {
                Ok(()) => {
                    let detail = format!("retry {} succeeded", k + 1);
                    self.record_attempt(run, strategy, adjustment, RecoveryOutcome::Success, detail.clone())
                        .await?;
                    return Ok(StepOutcome::Recovered(detail));
                }
                Err(failure) => {
                    self.record_attempt(
                        run,
                        strategy,
                        adjustment,
                        RecoveryOutcome::Failed,
                        format!("retry {} failed: {failure}", k + 1),
                    )
                    .await?;
                }
            }
        }

        Ok(StepOutcome::Failed(format!("{max_retries} retries exhausted")))
    }

    async fn run_rollback(
        &self,
        run: &mut RecoveryRun,
        callback: &dyn RecoveryCallback,
        strategy: RecoveryStrategy,
    ) -> DomainResult<StepOutcome> {
        let Some((snapshot, payload)) = self.store.latest_valid(run.task.id).await? else {
            let detail = "no verified snapshot to roll back to".to_string();
            self.record_attempt(run, strategy, None, RecoveryOutcome::Failed, detail.clone())
                .await?;
            return Ok(StepOutcome::Failed(detail));
        };

        match callback.restore(&snapshot, &payload).await {
            Ok(()) => {
                self.store
                    .record_rollback(&snapshot, HistoryActor::Orchestrator)
                    .await?;
                let detail = format!("restored snapshot v{}", snapshot.version);
                self.record_attempt(run, strategy, None, RecoveryOutcome::Success, detail.clone())
                    .await?;
                Ok(StepOutcome::Recovered(detail))
            }
            Err(failure) => {
                let detail = format!("restore of snapshot v{} failed: {failure}", snapshot.version);
                self.record_attempt(run, strategy, None, RecoveryOutcome::Failed, detail.clone())
                    .await?;
                Ok(StepOutcome::Failed(detail))
            }
        }
    }

    async fn run_hybrid(
        &self,
        run: &mut RecoveryRun,
        ctx: &RecoveryContext,
        callback: &dyn RecoveryCallback,
    ) -> DomainResult<StepOutcome> {
        let rollback = self.run_rollback(run, callback, RecoveryStrategy::Hybrid).await?;
        let retry = self
            .run_retries(run, ctx, callback, RecoveryStrategy::Hybrid, true, 1)
            .await?;

        Ok(match (rollback, retry) {
            (StepOutcome::Recovered(restored), StepOutcome::Recovered(retried)) => {
                StepOutcome::Recovered(format!("{restored}; {retried}"))
            }
            (_, StepOutcome::Recovered(retried)) => StepOutcome::Recovered(retried),
            (_, other) => other,
        })
    }

    async fn run_circuit_break(&self, run: &mut RecoveryRun) -> DomainResult<StepOutcome> {
        let tripped_before = self
            .recovery
            .list_attempts(run.task.id)
            .await?
            .iter()
            .any(|a| a.strategy == RecoveryStrategy::CircuitBreak);
        let already_blocked = run.task.status == TaskStatus::Blocked;

        self.pause(&mut run.task, "loop control: circuit opened by recovery").await?;

        let (outcome, step) = if already_blocked {
            let detail = "task is already blocked; pausing does not resolve the loop".to_string();
            (RecoveryOutcome::Failed, StepOutcome::Failed(detail))
        } else if tripped_before {
            let detail = "circuit already tripped for this task; loop persists".to_string();
            (RecoveryOutcome::Failed, StepOutcome::Failed(detail))
        } else {
            let detail = "task paused; circuit open until reset".to_string();
            (RecoveryOutcome::Success, StepOutcome::Recovered(detail))
        };

        let detail = match &step {
            StepOutcome::Recovered(d) | StepOutcome::Failed(d) | StepOutcome::Cancelled(d) => d.clone(),
        };
        self.record_attempt(run, RecoveryStrategy::CircuitBreak, None, outcome, detail)
            .await?;
        Ok(step)
    }

    async fn run_freeze(&self, run: &mut RecoveryRun, error: &AgentError) -> DomainResult<StepOutcome> {
        self.pause(&mut run.task, &format!("frozen after fatal error: {error}"))
            .await?;
        Ok(StepOutcome::Failed(format!("task frozen after fatal error: {error}")))
    }

    async fn escalate(&self, mut run: RecoveryRun, reason: &str) -> DomainResult<RecoveryResult> {
        let reason = format!("{} error ({}): {reason}", run.class, run.error_kind);
        let ticket = self
            .escalation
            .open_ticket(&run.task, run.recovery_id, run.class, run.retries_used, &reason)
            .await?;

        let detail = format!("escalated as ticket {} at {}", ticket.id, ticket.severity);
        self.record_attempt(
            &mut run,
            RecoveryStrategy::Escalate,
            None,
            RecoveryOutcome::Abandoned,
            detail.clone(),
        )
        .await?;
        self.record_phase(
            &run,
            RecoveryPhase::Validation,
            HistoryLevel::Warning,
            "automated recovery handed to a human".to_string(),
            None,
        )
        .await?;

        self.complete(run, RecoveryStrategy::Escalate, RecoveryOutcome::Failed, detail, Some(ticket))
            .await
    }

    async fn complete(
        &self,
        run: RecoveryRun,
        strategy: RecoveryStrategy,
        outcome: RecoveryOutcome,
        detail: String,
        ticket: Option<EscalationTicket>,
    ) -> DomainResult<RecoveryResult> {
        let level = match outcome {
            RecoveryOutcome::Success => HistoryLevel::Info,
            RecoveryOutcome::Abandoned => HistoryLevel::Warning,
            RecoveryOutcome::Failed => HistoryLevel::Error,
        };
        self.record_phase(
            &run,
            RecoveryPhase::Completion,
            level,
            format!("Recovery {outcome} via {strategy}: {detail}"),
            None,
        )
        .await?;

        info!(
            recovery_id = %run.recovery_id,
            class = %run.class,
            strategy = %strategy,
            outcome = %outcome,
            attempts = run.attempts.len(),
            "Recovery finished"
        );

        Ok(RecoveryResult {
            recovery_id: run.recovery_id,
            task_id: run.task.id,
            error_class: run.class,
            strategy,
            outcome,
            detail,
            attempts: run.attempts,
            ticket,
        })
    }

    /// Pause `task` after the loop detector fired on its step stream.
    /// Recorded as a successful circuit-break attempt.
    #[instrument(skip(self, task), fields(task_id = %task.id), err)]
    pub async fn trip_circuit(&self, task: &mut Task, reason: &str) -> DomainResult<()> {
        let mut run = RecoveryRun {
            recovery_id: Uuid::new_v4(),
            previous_attempt_id: self.recovery.last_attempt(task.id).await?.map(|a| a.id),
            automated_used: self.recovery.count_automated_attempts(task.id).await?,
            task: task.clone(),
            class: ErrorClass::LoopControl,
            error_kind: "loop_detected".to_string(),
            attempts: Vec::new(),
            retries_used: 0,
        };

        self.pause(&mut run.task, reason).await?;
        self.record_attempt(
            &mut run,
            RecoveryStrategy::CircuitBreak,
            None,
            RecoveryOutcome::Success,
            format!("loop detector paused the task: {reason}"),
        )
        .await?;

        *task = run.task;
        Ok(())
    }

    /// Lift the pause gate. No-op for a task that is not paused.
    pub async fn reset_circuit(&self, task: &mut Task, actor: HistoryActor) -> DomainResult<()> {
        if !task.is_paused() {
            return Ok(());
        }

        let reason = task.pause_reason.take().unwrap_or_default();
        task.paused_at = None;
        task.updated_at = Utc::now();

        let entry = HistoryEntry::new(
            task.id,
            HistoryKind::CircuitReset,
            HistoryLevel::Info,
            actor,
            "Circuit reset; task accepts steps again",
        )
        .with_state_change("paused", "running")
        .with_metadata("previous_reason", json!(reason));
        self.tasks.update_with_history(task, &[entry]).await?;
        info!(task_id = %task.id, "Circuit reset");
        Ok(())
    }

    async fn pause(&self, task: &mut Task, reason: &str) -> DomainResult<()> {
        if task.is_paused() {
            return Ok(());
        }
        task.paused_at = Some(Utc::now());
        task.pause_reason = Some(reason.to_string());
        task.updated_at = Utc::now();

        let entry = HistoryEntry::new(
            task.id,
            HistoryKind::CircuitOpened,
            HistoryLevel::Warning,
            HistoryActor::Orchestrator,
            format!("Circuit opened: {reason}"),
        )
        .with_state_change("running", "paused");
        self.tasks.update_with_history(task, &[entry]).await?;
        warn!(task_id = %task.id, reason, "Task paused");
        Ok(())
    }

    async fn record_attempt(
        &self,
        run: &mut RecoveryRun,
        strategy: RecoveryStrategy,
        adjustment: Option<PromptAdjustment>,
        outcome: RecoveryOutcome,
        detail: String,
    ) -> DomainResult<()> {
        let attempt_number = u32::try_from(run.attempts.len())
            .unwrap_or(u32::MAX)
            .saturating_add(1);
        let attempt = RecoveryAttempt {
            id: Uuid::new_v4(),
            task_id: run.task.id,
            recovery_id: run.recovery_id,
            previous_attempt_id: run.previous_attempt_id,
            error_class: run.class,
            error_kind: run.error_kind.clone(),
            strategy,
            attempt_number,
            adjustment,
            outcome,
            detail,
            created_at: Utc::now(),
        };

        let level = match outcome {
            RecoveryOutcome::Success => HistoryLevel::Info,
            RecoveryOutcome::Failed | RecoveryOutcome::Abandoned => HistoryLevel::Warning,
        };
        let mut entry = HistoryEntry::new(
            run.task.id,
            HistoryKind::RecoveryAttempt,
            level,
            HistoryActor::Orchestrator,
            format!("{strategy} attempt {attempt_number} {outcome}: {}", attempt.detail),
        )
        .with_metadata("recovery_id", json!(run.recovery_id.to_string()))
        .with_metadata("attempt_id", json!(attempt.id.to_string()));
        if let Some(adjustment) = adjustment {
            entry = entry.with_metadata("adjustment", json!(adjustment.as_str()));
        }

        self.recovery.record_attempt(&attempt, &entry).await?;

        run.previous_attempt_id = Some(attempt.id);
        if strategy.is_automated() {
            run.automated_used += 1;
        }
        run.attempts.push(attempt);
        Ok(())
    }

    async fn record_phase(
        &self,
        run: &RecoveryRun,
        phase: RecoveryPhase,
        level: HistoryLevel,
        message: String,
        rationale: Option<DecisionRationale>,
    ) -> DomainResult<()> {
        let mut entry = HistoryEntry::new(
            run.task.id,
            HistoryKind::RecoveryPhase,
            level,
            HistoryActor::Orchestrator,
            message,
        )
        .with_metadata("phase", json!(phase.as_str()))
        .with_metadata("recovery_id", json!(run.recovery_id.to_string()))
        .with_metadata("error_class", json!(run.class.as_str()));
        if let Some(rationale) = rationale {
            entry = entry.with_rationale(rationale);
        }
        self.store.record(&entry).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{
        create_migrated_test_pool, SqliteHistoryRepository, SqliteRecoveryRepository,
        SqliteSnapshotRepository, SqliteTaskRepository,
    };
    use crate::adapters::LogNotifier;
    use crate::domain::models::{
        AgentFailure, EscalationSeverity, EscalationWeights, NotificationConfig, Snapshot,
        SnapshotConfig,
    };
    use crate::services::escalation::EscalationPolicy;
    use async_trait::async_trait;
    use serde_json::Value;
    use sqlx::SqlitePool;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    #[derive(Default)]
    struct ScriptedCallback {
        retry_results: Mutex<VecDeque<Result<(), AgentFailure>>>,
        restore_fails: bool,
        retries: Mutex<Vec<RetryRequest>>,
        restored: Mutex<Vec<i64>>,
    }

    impl ScriptedCallback {
        fn with_retries(results: Vec<Result<(), AgentFailure>>) -> Self {
            Self {
                retry_results: Mutex::new(results.into()),
                ..Self::default()
            }
        }

        fn retry_count(&self) -> usize {
            self.retries.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl RecoveryCallback for ScriptedCallback {
        async fn retry(&self, request: RetryRequest) -> Result<(), AgentFailure> {
            self.retries.lock().unwrap().push(request);
            self.retry_results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(AgentFailure::new("still failing")))
        }

        async fn restore(&self, snapshot: &Snapshot, _payload: &Value) -> Result<(), AgentFailure> {
            if self.restore_fails {
                return Err(AgentFailure::new("restore rejected"));
            }
            self.restored.lock().unwrap().push(snapshot.version);
            Ok(())
        }
    }

    struct Harness {
        orchestrator: RecoveryOrchestrator,
        store: Arc<HistoryStore>,
        tasks: Arc<SqliteTaskRepository>,
        tracker: Arc<SuccessRateTracker>,
        pool: SqlitePool,
        task: Task,
    }

    impl Harness {
        async fn task(&self) -> Task {
            self.tasks.get(self.task.id).await.unwrap().unwrap()
        }
    }

    async fn harness_with(recovery_config: RecoveryConfig) -> Harness {
        let pool = create_migrated_test_pool().await.unwrap();
        let tasks = Arc::new(SqliteTaskRepository::new(pool.clone()));
        let recovery = Arc::new(SqliteRecoveryRepository::new(pool.clone()));
        let store = Arc::new(HistoryStore::new(
            Arc::new(SqliteSnapshotRepository::new(pool.clone())),
            Arc::new(SqliteHistoryRepository::new(pool.clone())),
            SnapshotConfig::default(),
        ));
        let retry = RetryConfig {
            base_delay_ms: 1,
            max_delay_ms: 5,
            ..RetryConfig::default()
        };
        let escalation = Arc::new(EscalationService::new(
            recovery.clone(),
            Arc::new(LogNotifier::new()),
            EscalationPolicy::new(EscalationWeights::default(), retry.max_retries),
            NotificationConfig::default(),
        ));
        let tracker = Arc::new(SuccessRateTracker::new());
        let orchestrator = RecoveryOrchestrator::new(
            tasks.clone(),
            recovery,
            store.clone(),
            escalation,
            tracker.clone(),
            retry,
            &recovery_config,
        );

        let task = Task::new("migrate the billing tables");
        tasks
            .create(
                &task,
                &HistoryEntry::new(
                    task.id,
                    HistoryKind::TaskStarted,
                    HistoryLevel::Info,
                    HistoryActor::System,
                    "started",
                ),
            )
            .await
            .unwrap();

        Harness {
            orchestrator,
            store,
            tasks,
            tracker,
            pool,
            task,
        }
    }

    async fn harness() -> Harness {
        harness_with(RecoveryConfig::default()).await
    }

    #[tokio::test]
    async fn test_transient_recovers_on_second_retry() {
        let h = harness().await;
        let callback = ScriptedCallback::with_retries(vec![Err(AgentFailure::new("503")), Ok(())]);

        let result = h
            .orchestrator
            .handle_error(h.task.clone(), &AgentError::new("timeout", "upstream"), &RecoveryContext::new(), &callback)
            .await
            .unwrap();

        assert_eq!(result.error_class, ErrorClass::Transient);
        assert_eq!(result.outcome, RecoveryOutcome::Success);
        assert_eq!(result.strategy, RecoveryStrategy::Retry);
        assert!(result.ticket.is_none());
        assert_eq!(result.attempts.len(), 2);
        assert_eq!(result.attempts[1].previous_attempt_id, Some(result.attempts[0].id));
        assert_eq!(callback.retry_count(), 2);

        let phases = h
            .store
            .query(&crate::domain::models::HistoryFilter::new().with_kind(HistoryKind::RecoveryPhase))
            .await
            .unwrap();
        let names: Vec<String> = phases
            .iter()
            .filter_map(|e| e.metadata.get("phase").and_then(|v| v.as_str()).map(String::from))
            .collect();
        assert_eq!(names.first().map(String::as_str), Some("assessment"));
        assert_eq!(names.last().map(String::as_str), Some("completion"));
        assert!(names.contains(&"strategy_selection".to_string()));
    }

    #[tokio::test]
    async fn test_transient_exhaustion_escalates() {
        let h = harness().await;
        let callback = ScriptedCallback::default();

        let result = h
            .orchestrator
            .handle_error(h.task.clone(), &AgentError::new("rate_limit", ""), &RecoveryContext::new(), &callback)
            .await
            .unwrap();

        assert_eq!(callback.retry_count(), 3);
        let retries = result
            .attempts
            .iter()
            .filter(|a| a.strategy == RecoveryStrategy::Retry)
            .count();
        assert_eq!(retries, 3);
        assert_eq!(result.strategy, RecoveryStrategy::Escalate);
        let ticket = result.ticket.expect("ticket");
        assert_eq!(ticket.severity, EscalationSeverity::AutoRecovery);
        assert_eq!(result.attempts.last().unwrap().outcome, RecoveryOutcome::Abandoned);
    }

    #[tokio::test]
    async fn test_agent_specific_rotates_prompt_adjustments() {
        let h = harness().await;
        let callback = ScriptedCallback::with_retries(vec![Err(AgentFailure::new("bad json")), Ok(())]);
        let ctx = RecoveryContext::new().with_prompt("emit the migration plan");

        let result = h
            .orchestrator
            .handle_error(h.task.clone(), &AgentError::new("invalid_output", ""), &ctx, &callback)
            .await
            .unwrap();

        assert!(result.is_recovered());
        let requests = callback.retries.lock().unwrap().clone();
        assert_eq!(requests[0].adjustment, Some(PromptAdjustment::AddContext));
        assert_eq!(requests[1].adjustment, Some(PromptAdjustment::Simplify));
        let prompt = requests[0].prompt.clone().unwrap();
        assert!(prompt.contains("emit the migration plan"));
        assert_ne!(prompt, "emit the migration plan");
    }

    #[tokio::test]
    async fn test_state_inconsistency_restores_newest_valid_snapshot() {
        let h = harness().await;
        h.store
            .snapshot(h.task.id, &serde_json::json!({"v": 1}), HistoryActor::System)
            .await
            .unwrap();
        let newest = h
            .store
            .snapshot(h.task.id, &serde_json::json!({"v": 2}), HistoryActor::System)
            .await
            .unwrap();
        sqlx::query("UPDATE snapshots SET payload = '{}' WHERE id = ?")
            .bind(newest.id.to_string())
            .execute(&h.pool)
            .await
            .unwrap();

        let callback = ScriptedCallback::default();
        let result = h
            .orchestrator
            .handle_error(h.task.clone(), &AgentError::new("partial_update", ""), &RecoveryContext::new(), &callback)
            .await
            .unwrap();

        assert_eq!(result.outcome, RecoveryOutcome::Success);
        assert_eq!(result.strategy, RecoveryStrategy::Rollback);
        assert_eq!(*callback.restored.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_rollback_without_snapshot_escalates() {
        let h = harness().await;
        let callback = ScriptedCallback::default();
        let result = h
            .orchestrator
            .handle_error(h.task.clone(), &AgentError::new("state_corruption", ""), &RecoveryContext::new(), &callback)
            .await
            .unwrap();

        assert_eq!(result.attempts[0].strategy, RecoveryStrategy::Rollback);
        assert_eq!(result.attempts[0].outcome, RecoveryOutcome::Failed);
        assert_eq!(
            result.ticket.map(|t| t.severity),
            Some(EscalationSeverity::SupervisorReview)
        );
    }

    #[tokio::test]
    async fn test_unknown_runs_hybrid() {
        let h = harness().await;
        h.store
            .snapshot(h.task.id, &serde_json::json!({"v": 1}), HistoryActor::System)
            .await
            .unwrap();
        let callback = ScriptedCallback::with_retries(vec![Ok(())]);
        let result = h
            .orchestrator
            .handle_error(h.task.clone(), &AgentError::new("mystery", "odd"), &RecoveryContext::new(), &callback)
            .await
            .unwrap();

        assert_eq!(result.error_class, ErrorClass::Unknown);
        assert_eq!(result.strategy, RecoveryStrategy::Hybrid);
        assert!(result.is_recovered());
        assert_eq!(result.attempts.len(), 2);
        assert!(result.attempts.iter().all(|a| a.strategy == RecoveryStrategy::Hybrid));
        assert_eq!(callback.retry_count(), 1);
    }

    #[tokio::test]
    async fn test_loop_control_pauses_then_escalates_on_repeat() {
        let h = harness().await;
        let callback = ScriptedCallback::default();

        let first = h
            .orchestrator
            .handle_error(h.task.clone(), &AgentError::new("infinite_loop", ""), &RecoveryContext::new(), &callback)
            .await
            .unwrap();
        assert!(first.is_recovered());
        assert_eq!(first.strategy, RecoveryStrategy::CircuitBreak);
        let paused = h.task().await;
        assert!(paused.is_paused());

        let mut task = paused;
        h.orchestrator
            .reset_circuit(&mut task, HistoryActor::human("oncall"))
            .await
            .unwrap();
        assert!(!h.task().await.is_paused());

        let second = h
            .orchestrator
            .handle_error(h.task().await, &AgentError::new("stuck", ""), &RecoveryContext::new(), &callback)
            .await
            .unwrap();
        assert_eq!(second.strategy, RecoveryStrategy::Escalate);
        assert_eq!(
            second.ticket.map(|t| t.severity),
            Some(EscalationSeverity::HumanIntervention)
        );
    }

    #[tokio::test]
    async fn test_fatal_freezes_and_alerts() {
        let h = harness().await;
        let callback = ScriptedCallback::default();
        let result = h
            .orchestrator
            .handle_error(h.task.clone(), &AgentError::new("security_violation", "exfiltration"), &RecoveryContext::new(), &callback)
            .await
            .unwrap();

        assert_eq!(result.error_class, ErrorClass::Fatal);
        assert_eq!(result.ticket.map(|t| t.severity), Some(EscalationSeverity::CriticalAlert));
        assert!(h.task().await.is_paused());
        assert_eq!(callback.retry_count(), 0);
    }

    #[tokio::test]
    async fn test_cancellation_abandons_without_ticket() {
        let h = harness().await;
        let token = CancellationToken::new();
        token.cancel();
        let ctx = RecoveryContext::new().with_cancellation(token);
        let callback = ScriptedCallback::default();

        let result = h
            .orchestrator
            .handle_error(h.task.clone(), &AgentError::new("timeout", ""), &ctx, &callback)
            .await
            .unwrap();

        assert_eq!(result.outcome, RecoveryOutcome::Abandoned);
        assert!(result.ticket.is_none());
        assert!(result.attempts.is_empty());
        assert_eq!(callback.retry_count(), 0);
    }

    #[tokio::test]
    async fn test_budget_exhaustion_escalates_immediately() {
        let h = harness_with(RecoveryConfig {
            max_auto_recovery_attempts: 2,
            ..RecoveryConfig::default()
        })
        .await;
        let callback = ScriptedCallback::default();

        let first = h
            .orchestrator
            .handle_error(h.task.clone(), &AgentError::new("timeout", ""), &RecoveryContext::new(), &callback)
            .await
            .unwrap();
        // Budget stops retrying after two attempts
        assert_eq!(callback.retry_count(), 2);
        assert!(first.ticket.is_some());

        let second = h
            .orchestrator
            .handle_error(h.task().await, &AgentError::new("timeout", ""), &RecoveryContext::new(), &callback)
            .await
            .unwrap();
        assert_eq!(callback.retry_count(), 2);
        assert_eq!(second.attempts.len(), 1);
        assert_eq!(second.strategy, RecoveryStrategy::Escalate);
    }

    #[tokio::test]
    async fn test_adaptive_abandonment_skips_retries() {
        let h = harness().await;
        for _ in 0..10 {
            h.tracker.record(ErrorClass::Transient, false).await;
        }
        let callback = ScriptedCallback::default();
        let result = h
            .orchestrator
            .handle_error(h.task.clone(), &AgentError::new("timeout", ""), &RecoveryContext::new(), &callback)
            .await
            .unwrap();

        assert_eq!(callback.retry_count(), 0);
        assert_eq!(result.strategy, RecoveryStrategy::Escalate);
        assert!(result.detail.contains("escalated"));
    }

    #[tokio::test]
    async fn test_completed_task_rejected() {
        let h = harness().await;
        let mut task = h.task.clone();
        task.transition_to(TaskStatus::Completed).unwrap();
        let err = h
            .orchestrator
            .handle_error(task, &AgentError::new("timeout", ""), &RecoveryContext::new(), &ScriptedCallback::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::TaskTerminal(_)));
    }
}
