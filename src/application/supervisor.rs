use crate::adapters::sqlite::{
    SqliteHistoryRepository, SqliteInterventionRepository, SqliteRecoveryRepository,
    SqliteSnapshotRepository, SqliteTaskRepository,
};
use crate::adapters::LogNotifier;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    AgentError, CoherenceAssessment, Config, DecisionRationale, EscalationTicket, HistoryActor,
    HistoryEntry, HistoryFilter, HistoryKind, HistoryLevel, IdeaRisk, Intervention,
    InterventionDecision, InterventionPreferences, InterventionRequest,
    InterventionType, RecoveryAttempt, RecoveryContext, RecoveryResult, Snapshot, SnapshotDelta,
    Task, TaskStatus,
};
use crate::domain::ports::{
    CoherenceScorer, DecisionRecord, EscalationNotifier, InterventionFilter,
    InterventionRepository, RecoveryCallback, RecoveryRepository, TaskFilter, TaskRepository,
    TicketFilter,
};
use crate::services::{
    decide, validate_preferences, EscalationPolicy, EscalationService, HeuristicScorer,
    HistoryStore, IdeaValidator, LoopBreaker, RecoveryOrchestrator, SuccessRateTracker,
};
use crate::services::history_store::STEP_METADATA_KEY;
use chrono::Utc;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Replaceable collaborators of a [`Supervisor`].
pub struct SupervisorComponents {
    pub scorer: Arc<dyn CoherenceScorer>,
    pub notifier: Arc<dyn EscalationNotifier>,
    pub idea_validator: IdeaValidator,
    pub tracker: Arc<SuccessRateTracker>,
}

impl SupervisorComponents {
    /// Heuristic scorer, log notifier, stock idea pattern sets and a fresh
    /// success-rate tracker.
    pub fn defaults(config: &Config) -> DomainResult<Self> {
        Ok(Self {
            scorer: Arc::new(HeuristicScorer::new(config.coherence.clone())),
            notifier: Arc::new(LogNotifier::new()),
            idea_validator: IdeaValidator::with_default_sets()?,
            tracker: Arc::new(SuccessRateTracker::new()),
        })
    }
}

/// Library facade for agent supervision.
///
/// The `Supervisor` owns every supervision operation on a task:
/// - Scores agent steps and feeds the loop detector
/// - Applies the intervention policy and commits decisions atomically
/// - Runs recovery for failing or blocked tasks
/// - Stores and verifies snapshots, serves the history timeline
/// - Screens project ideas
///
/// # Concurrency Design
///
/// Calls for different tasks run concurrently. Calls for the same task are
/// serialized through a per-task async mutex held for the whole call,
/// including recovery waits. A paused task fails fast with
/// [`DomainError::CircuitOpen`] instead of queueing.
///
/// # Examples
///
/// ```no_run
/// use warden::application::Supervisor;
/// use warden::domain::models::{Config, InterventionRequest};
///
/// async fn example(pool: sqlx::SqlitePool) -> warden::domain::errors::DomainResult<()> {
///     let config = Config::default();
///     let supervisor = Supervisor::from_pool(pool, config.clone())?;
///
///     let task = supervisor.start_task("write unit tests for module X", None).await?;
///     let assessment = supervisor
///         .assess_step(task.id, "Writing unit tests for the parser", &[])
///         .await?;
///     supervisor
///         .intervene(task.id, &assessment, &config.intervention, InterventionRequest::None)
///         .await?;
///     Ok(())
/// }
/// ```
pub struct Supervisor {
    tasks: Arc<dyn TaskRepository>,
    interventions: Arc<dyn InterventionRepository>,
    recovery: Arc<dyn RecoveryRepository>,
    store: Arc<HistoryStore>,
    scorer: Arc<dyn CoherenceScorer>,
    idea_validator: IdeaValidator,
    loop_breaker: LoopBreaker,
    escalation: Arc<EscalationService>,
    orchestrator: RecoveryOrchestrator,
    task_locks: Arc<RwLock<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

impl Supervisor {
    /// Wire SQLite repositories on `pool` with the default components.
    pub fn from_pool(pool: SqlitePool, config: Config) -> DomainResult<Self> {
        let components = SupervisorComponents::defaults(&config)?;
        Ok(Self::with_components(pool, config, components))
    }

    pub fn with_components(pool: SqlitePool, config: Config, components: SupervisorComponents) -> Self {
        let tasks: Arc<dyn TaskRepository> = Arc::new(SqliteTaskRepository::new(pool.clone()));
        let interventions: Arc<dyn InterventionRepository> =
            Arc::new(SqliteInterventionRepository::new(pool.clone()));
        let recovery: Arc<dyn RecoveryRepository> = Arc::new(SqliteRecoveryRepository::new(pool.clone()));
        let store = Arc::new(HistoryStore::new(
            Arc::new(SqliteSnapshotRepository::new(pool.clone())),
            Arc::new(SqliteHistoryRepository::new(pool)),
            config.snapshots.clone(),
        ));
        let escalation = Arc::new(EscalationService::new(
            recovery.clone(),
            components.notifier,
            EscalationPolicy::new(
                config.recovery.escalation_weights.clone(),
                config.retry.max_retries,
            ),
            config.notifications,
        ));
        let loop_breaker = LoopBreaker::new(config.loop_detection.clone());
        let orchestrator = RecoveryOrchestrator::new(
            tasks.clone(),
            recovery.clone(),
            store.clone(),
            escalation.clone(),
            components.tracker,
            config.retry.clone(),
            &config.recovery,
        );

        Self {
            tasks,
            interventions,
            recovery,
            store,
            scorer: components.scorer,
            idea_validator: components.idea_validator,
            loop_breaker,
            escalation,
            orchestrator,
            task_locks: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    async fn task_lock(&self, task_id: Uuid) -> Arc<Mutex<()>> {
        {
            let locks = self.task_locks.read().await;
            if let Some(lock) = locks.get(&task_id) {
                return lock.clone();
            }
        }
        let mut locks = self.task_locks.write().await;
        locks
            .entry(task_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the lock of a task that reached a terminal state. Callers still
    /// holding the old `Arc` finish against it and then see the task as
    /// terminal.
    async fn release_lock(&self, task_id: Uuid) {
        self.task_locks.write().await.remove(&task_id);
    }

    async fn load(&self, task_id: Uuid) -> DomainResult<Task> {
        self.tasks
            .get(task_id)
            .await?
            .ok_or(DomainError::TaskNotFound(task_id))
    }

    fn ensure_running(task: &Task) -> DomainResult<()> {
        if task.is_terminal() {
            return Err(DomainError::TaskTerminal(task.id));
        }
        if task.is_paused() {
            return Err(DomainError::CircuitOpen {
                task_id: task.id,
                reason: task.pause_reason.clone().unwrap_or_default(),
            });
        }
        Ok(())
    }

    // ---- tasks ----

    #[instrument(skip(self, objective), err)]
    pub async fn start_task(&self, objective: &str, business_criticality: Option<f64>) -> DomainResult<Task> {
        let objective = objective.trim();
        if objective.is_empty() {
            return Err(DomainError::ValidationFailed("task objective cannot be empty".to_string()));
        }

        let mut task = Task::new(objective);
        if let Some(criticality) = business_criticality {
            task = task.with_business_criticality(criticality);
        }

        let entry = HistoryEntry::new(
            task.id,
            HistoryKind::TaskStarted,
            HistoryLevel::Info,
            HistoryActor::System,
            format!("Supervision started: {objective}"),
        )
        .with_metadata("business_criticality", json!(task.business_criticality));
        self.tasks.create(&task, &entry).await?;

        info!(task_id = %task.id, "Task supervision started");
        Ok(task)
    }

    pub async fn get_task(&self, task_id: Uuid) -> DomainResult<Task> {
        self.load(task_id).await
    }

    pub async fn list_tasks(&self, filter: TaskFilter) -> DomainResult<Vec<Task>> {
        self.tasks.list(filter).await
    }

    /// Mark an active task completed. Any open guidance is resolved in the
    /// same commit.
    #[instrument(skip(self), err)]
    pub async fn complete_task(&self, task_id: Uuid) -> DomainResult<Task> {
        let lock = self.task_lock(task_id).await;
        let guard = lock.lock().await;

        let mut task = self.load(task_id).await?;
        Self::ensure_running(&task)?;
        let previous = task.status;
        task.transition_to(TaskStatus::Completed)?;

        let mut open = self.interventions.get_open(task_id).await?;
        if let Some(intervention) = open.as_mut() {
            intervention.resolve(true, "task completed");
        }

        let history = vec![
            HistoryEntry::new(
                task_id,
                HistoryKind::TaskCompleted,
                HistoryLevel::Info,
                HistoryActor::System,
                "Task completed",
            )
            .with_state_change(previous.as_str(), task.status.as_str()),
        ];
        self.interventions
            .commit(DecisionRecord {
                task: &task,
                created: None,
                updated: open.iter().collect(),
                history,
            })
            .await?;

        drop(guard);
        self.release_lock(task_id).await;
        info!(task_id = %task_id, "Task completed");
        Ok(task)
    }

    // ---- coherence ----

    /// Score one agent step and feed the loop detector.
    ///
    /// Scoring is read-only for the task. The detector window is the task's
    /// persisted assessments inside `loop_detection.time_window_seconds`, so
    /// repeats are caught across processes. When the detector trips, the task
    /// is paused before this returns.
    #[instrument(skip(self, step, recent_history), err)]
    pub async fn assess_step(
        &self,
        task_id: Uuid,
        step: &str,
        recent_history: &[String],
    ) -> DomainResult<CoherenceAssessment> {
        let lock = self.task_lock(task_id).await;
        let _guard = lock.lock().await;

        let mut task = self.load(task_id).await?;
        Self::ensure_running(&task)?;

        let earlier = self
            .store
            .recent_steps(task_id, self.loop_breaker.window_start(Utc::now()))
            .await?;
        let assessment = self.scorer.assess(&task.objective, step, recent_history);
        let level = if assessment.is_derailed() {
            HistoryLevel::Warning
        } else {
            HistoryLevel::Info
        };
        self.store
            .record(
                &HistoryEntry::new(
                    task_id,
                    HistoryKind::Assessment,
                    level,
                    HistoryActor::System,
                    format!(
                        "Step assessed as {} ({:.2})",
                        assessment.derailment_type, assessment.confidence
                    ),
                )
                .with_metadata("derailment_type", json!(assessment.derailment_type.as_str()))
                .with_metadata("confidence", json!(assessment.confidence))
                .with_metadata("explanation", json!(assessment.explanation))
                .with_metadata(STEP_METADATA_KEY, json!(step)),
            )
            .await?;

        let check = self
            .loop_breaker
            .check(task_id, &task.objective, step, earlier.as_slice());
        if check.tripped {
            let reason = format!(
                "loop detected: step signature repeated {} times",
                check.occurrences
            );
            self.orchestrator.trip_circuit(&mut task, &reason).await?;
        }

        debug!(
            task_id = %task_id,
            derailment = %assessment.derailment_type,
            confidence = assessment.confidence,
            "Step assessed"
        );
        Ok(assessment)
    }

    // ---- interventions ----

    /// Apply the intervention policy to `assessment` and commit the result.
    ///
    /// Task status, scores, intervention rows and history are written in one
    /// transaction. A new intervention supersedes a lower-ranked open one;
    /// otherwise the open one absorbs the decision.
    #[instrument(skip(self, assessment, prefs), fields(confidence = assessment.confidence), err)]
    pub async fn intervene(
        &self,
        task_id: Uuid,
        assessment: &CoherenceAssessment,
        prefs: &InterventionPreferences,
        request: InterventionRequest,
    ) -> DomainResult<InterventionDecision> {
        validate_preferences(prefs)?;

        let lock = self.task_lock(task_id).await;
        let _guard = lock.lock().await;

        let mut task = self.load(task_id).await?;
        Self::ensure_running(&task)?;
        if task.status == TaskStatus::Blocked {
            return Err(DomainError::AwaitingAcknowledgment(task_id));
        }

        let decision = decide(&task.objective, assessment, prefs, &request);
        let previous_status = task.status;
        task.apply_assessment_scores(assessment.confidence);
        if let Some(target) = decision.target_status {
            if target != task.status {
                task.transition_to(target)?;
            }
        }

        let mut history = Vec::new();
        let mut created = None;
        let mut superseded = None;
        let mut absorbed_by = None;
        let mut updated = Vec::new();

        if let Some(action) = decision.action.clone() {
            let intervention = Intervention::new(
                task_id,
                action,
                decision.trigger_reason.clone(),
                decision.action_taken.clone(),
                assessment.confidence,
                assessment.derailment_type,
            )
            .with_success(decision.was_successful);

            let rationale = DecisionRationale::new(
                intervention.kind().as_str(),
                decision.trigger_reason.clone(),
            )
            .with_factor("confidence", format!("{:.2}", assessment.confidence))
            .with_factor("derailment_type", assessment.derailment_type.as_str())
            .with_factor("block_threshold", format!("{:.2}", prefs.block_threshold))
            .with_factor("redirect_threshold", format!("{:.2}", prefs.redirect_threshold))
            .with_factor("warning_threshold", format!("{:.2}", prefs.warning_threshold))
            .with_confidence(assessment.confidence);

            match self.interventions.get_open(task_id).await? {
                Some(open) if intervention.kind().rank() <= open.kind().rank() => {
                    absorbed_by = Some(open.id);
                    history.push(
                        HistoryEntry::new(
                            task_id,
                            HistoryKind::InterventionAbsorbed,
                            HistoryLevel::Decision,
                            HistoryActor::Policy,
                            format!(
                                "{} absorbed by open {} {}",
                                intervention.kind(),
                                open.kind(),
                                open.id
                            ),
                        )
                        .with_rationale(rationale),
                    );
                }
                Some(mut open) => {
                    open.supersede(intervention.id);
                    superseded = Some(open.id);
                    history.push(
                        HistoryEntry::new(
                            task_id,
                            HistoryKind::Intervention,
                            HistoryLevel::Decision,
                            HistoryActor::Policy,
                            format!(
                                "{}: {} (supersedes {} {})",
                                intervention.kind(),
                                intervention.action_taken,
                                open.kind(),
                                open.id
                            ),
                        )
                        .with_rationale(rationale)
                        .with_metadata("intervention_id", json!(intervention.id.to_string())),
                    );
                    updated.push(open);
                    created = Some(intervention);
                }
                None => {
                    history.push(
                        HistoryEntry::new(
                            task_id,
                            HistoryKind::Intervention,
                            HistoryLevel::Decision,
                            HistoryActor::Policy,
                            format!("{}: {}", intervention.kind(), intervention.action_taken),
                        )
                        .with_rationale(rationale)
                        .with_metadata("intervention_id", json!(intervention.id.to_string())),
                    );
                    created = Some(intervention);
                }
            }
        }

        if task.status != previous_status {
            history.push(
                HistoryEntry::new(
                    task_id,
                    HistoryKind::StatusChanged,
                    HistoryLevel::Info,
                    HistoryActor::Policy,
                    format!("Status changed to {}", task.status),
                )
                .with_state_change(previous_status.as_str(), task.status.as_str()),
            );
        }

        self.interventions
            .commit(DecisionRecord {
                task: &task,
                created: created.as_ref(),
                updated: updated.iter().collect(),
                history,
            })
            .await?;

        if let Some(intervention) = &created {
            info!(
                task_id = %task_id,
                intervention = %intervention.kind(),
                status = %task.status,
                "Intervention recorded"
            );
        }

        Ok(InterventionDecision {
            task_id,
            intervention: created,
            superseded,
            absorbed_by,
            previous_status,
            status: task.status,
            recovery_required: decision.recovery_required,
        })
    }

    /// Caller feedback on an open intervention. A successful resolution on a
    /// task that needs intervention returns it to active.
    #[instrument(skip(self, resolved_by, note), err)]
    pub async fn resolve_intervention(
        &self,
        task_id: Uuid,
        intervention_id: Uuid,
        success: bool,
        resolved_by: &str,
        note: &str,
    ) -> DomainResult<Intervention> {
        let lock = self.task_lock(task_id).await;
        let _guard = lock.lock().await;

        let mut task = self.load(task_id).await?;
        if task.is_terminal() {
            return Err(DomainError::TaskTerminal(task_id));
        }
        let mut intervention = self
            .interventions
            .get(intervention_id)
            .await?
            .filter(|i| i.task_id == task_id)
            .ok_or(DomainError::InterventionNotFound(intervention_id))?;
        if !intervention.is_open() {
            return Err(DomainError::ValidationFailed(format!(
                "intervention {intervention_id} is already resolved"
            )));
        }
        if intervention.kind() == InterventionType::Block {
            return Err(DomainError::ValidationFailed(
                "blocks are resolved by acknowledging the task".to_string(),
            ));
        }

        intervention.resolve(success, note);
        let previous = task.status;
        if success && task.status == TaskStatus::NeedsIntervention {
            task.transition_to(TaskStatus::Active)?;
        }

        let actor = HistoryActor::human(resolved_by);
        let mut history = vec![HistoryEntry::new(
            task_id,
            HistoryKind::InterventionResolved,
            HistoryLevel::Info,
            actor.clone(),
            format!(
                "{} {} resolved ({}): {note}",
                intervention.kind(),
                intervention_id,
                if success { "successful" } else { "unsuccessful" }
            ),
        )];
        if task.status != previous {
            history.push(
                HistoryEntry::new(
                    task_id,
                    HistoryKind::StatusChanged,
                    HistoryLevel::Info,
                    actor,
                    format!("Status changed to {}", task.status),
                )
                .with_state_change(previous.as_str(), task.status.as_str()),
            );
        }

        self.interventions
            .commit(DecisionRecord {
                task: &task,
                created: None,
                updated: vec![&intervention],
                history,
            })
            .await?;
        Ok(intervention)
    }

    /// Human acknowledgment of a blocked task: resume it or close it as final.
    #[instrument(skip(self, note), err)]
    pub async fn acknowledge_block(
        &self,
        task_id: Uuid,
        resume: bool,
        acknowledged_by: &str,
        note: &str,
    ) -> DomainResult<Task> {
        let lock = self.task_lock(task_id).await;
        let guard = lock.lock().await;

        let mut task = self.load(task_id).await?;
        if task.is_terminal() {
            return Err(DomainError::TaskTerminal(task_id));
        }
        if task.status != TaskStatus::Blocked {
            return Err(DomainError::InvalidStateTransition {
                from: task.status.as_str().to_string(),
                to: TaskStatus::Active.as_str().to_string(),
                reason: "only blocked tasks can be acknowledged".to_string(),
            });
        }

        let mut open = self.interventions.get_open(task_id).await?;
        if let Some(intervention) = open.as_mut() {
            intervention.resolve(resume, format!("acknowledged by {acknowledged_by}: {note}"));
        }

        let actor = HistoryActor::human(acknowledged_by);
        let mut history = vec![HistoryEntry::new(
            task_id,
            HistoryKind::BlockAcknowledged,
            HistoryLevel::Decision,
            actor.clone(),
            if resume {
                format!("Block acknowledged, task resumed: {note}")
            } else {
                format!("Block acknowledged, task closed: {note}")
            },
        )];

        if resume {
            task.transition_to(TaskStatus::Active)?;
            history.push(
                HistoryEntry::new(
                    task_id,
                    HistoryKind::StatusChanged,
                    HistoryLevel::Info,
                    actor,
                    "Status changed to active",
                )
                .with_state_change(TaskStatus::Blocked.as_str(), TaskStatus::Active.as_str()),
            );
        } else {
            task.closed_at = Some(Utc::now());
            task.updated_at = Utc::now();
        }

        self.interventions
            .commit(DecisionRecord {
                task: &task,
                created: None,
                updated: open.iter().collect(),
                history,
            })
            .await?;

        drop(guard);
        if !resume {
            self.release_lock(task_id).await;
        }
        info!(task_id = %task_id, resume, "Block acknowledged");
        Ok(task)
    }

    pub async fn list_interventions(&self, filter: InterventionFilter) -> DomainResult<Vec<Intervention>> {
        self.interventions.list(filter).await
    }

    // ---- recovery ----

    /// Run the recovery orchestrator for `task_id`.
    ///
    /// The task's lock is held for the whole run; `callback` must not call
    /// back into this supervisor for the same task.
    #[instrument(skip(self, ctx, callback), err)]
    pub async fn handle_error(
        &self,
        task_id: Uuid,
        error: &AgentError,
        ctx: &RecoveryContext,
        callback: &dyn RecoveryCallback,
    ) -> DomainResult<RecoveryResult> {
        let lock = self.task_lock(task_id).await;
        let _guard = lock.lock().await;

        let task = self.load(task_id).await?;
        let result = self.orchestrator.handle_error(task, error, ctx, callback).await?;
        if let Some(ticket) = &result.ticket {
            warn!(task_id = %task_id, ticket_id = %ticket.id, "Recovery escalated");
        }
        Ok(result)
    }

    /// Lift the pause gate opened by the circuit breaker.
    #[instrument(skip(self), err)]
    pub async fn reset_circuit(&self, task_id: Uuid, reset_by: &str) -> DomainResult<Task> {
        let lock = self.task_lock(task_id).await;
        let _guard = lock.lock().await;

        let mut task = self.load(task_id).await?;
        self.orchestrator
            .reset_circuit(&mut task, HistoryActor::human(reset_by))
            .await?;
        Ok(task)
    }

    pub async fn list_recovery_attempts(&self, task_id: Uuid) -> DomainResult<Vec<RecoveryAttempt>> {
        self.recovery.list_attempts(task_id).await
    }

    // ---- snapshots & history ----

    #[instrument(skip(self, payload), err)]
    pub async fn create_snapshot(&self, task_id: Uuid, payload: &Value) -> DomainResult<Snapshot> {
        let lock = self.task_lock(task_id).await;
        let _guard = lock.lock().await;

        let task = self.load(task_id).await?;
        if task.is_terminal() {
            return Err(DomainError::TaskTerminal(task_id));
        }
        self.store.snapshot(task_id, payload, HistoryActor::System).await
    }

    /// Verified payload of a snapshot. Task state is not touched; restoring
    /// agent state from the payload is up to the caller.
    #[instrument(skip(self), err)]
    pub async fn rollback(&self, task_id: Uuid, snapshot_id: Uuid) -> DomainResult<Value> {
        let lock = self.task_lock(task_id).await;
        let _guard = lock.lock().await;

        self.load(task_id).await?;
        self.store
            .rollback(task_id, snapshot_id, HistoryActor::System)
            .await
    }

    pub async fn list_snapshots(&self, task_id: Uuid) -> DomainResult<Vec<Snapshot>> {
        self.store.list(task_id).await
    }

    pub async fn diff_snapshots(&self, task_id: Uuid, from: i64, to: i64) -> DomainResult<SnapshotDelta> {
        self.store.diff(task_id, from, to).await
    }

    /// Apply snapshot retention to one task, or to all when `task_id` is
    /// `None`. Returns the number of snapshots evicted.
    pub async fn cleanup_snapshots(&self, task_id: Option<Uuid>) -> DomainResult<u64> {
        match task_id {
            Some(task_id) => {
                let lock = self.task_lock(task_id).await;
                let _guard = lock.lock().await;
                self.store.cleanup_task(task_id).await
            }
            None => self.store.cleanup_all().await,
        }
    }

    pub async fn query_history(&self, filter: &HistoryFilter) -> DomainResult<Vec<HistoryEntry>> {
        self.store.query(filter).await
    }

    // ---- escalations ----

    pub async fn query_escalations(&self, filter: TicketFilter) -> DomainResult<Vec<EscalationTicket>> {
        self.escalation.list(filter).await
    }

    pub async fn acknowledge_escalation(
        &self,
        ticket_id: Uuid,
        acknowledged_by: &str,
        note: Option<&str>,
    ) -> DomainResult<EscalationTicket> {
        self.escalation
            .acknowledge(ticket_id, HistoryActor::human(acknowledged_by), note)
            .await
    }

    pub async fn resolve_escalation(
        &self,
        ticket_id: Uuid,
        resolved_by: &str,
        resolution: &str,
    ) -> DomainResult<EscalationTicket> {
        self.escalation
            .resolve(ticket_id, HistoryActor::human(resolved_by), resolution)
            .await
    }

    // ---- ideas ----

    pub fn validate_idea(&self, idea: &str) -> IdeaRisk {
        self.idea_validator.validate(idea)
    }
}
