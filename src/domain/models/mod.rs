pub mod coherence;
pub mod config;
pub mod escalation;
pub mod history;
pub mod idea;
pub mod intervention;
pub mod recovery;
pub mod snapshot;
pub mod task;

pub use coherence::{CoherenceAssessment, DerailmentType};
pub use config::{
    BackoffKind, CoherenceConfig, Config, DatabaseConfig, EscalationWeights, LoggingConfig,
    LoopDetectionConfig, NotificationConfig, RecoveryConfig, RetryConfig, SnapshotConfig,
};
pub use escalation::{EscalationSeverity, EscalationTicket, TicketStatus};
pub use history::{
    DecisionRationale, HistoryActor, HistoryEntry, HistoryFilter, HistoryKind, HistoryLevel,
};
pub use idea::{FindingKind, IdeaFinding, IdeaRisk, RiskLevel};
pub use intervention::{
    BlockPayload, GuidancePayload, Intervention, InterventionAction, InterventionDecision,
    InterventionPreferences, InterventionRequest, InterventionType, RedirectPayload,
    WarningPayload,
};
pub use recovery::{
    AgentError, AgentFailure, ErrorClass, PromptAdjustment, RecoveryAttempt, RecoveryContext,
    RecoveryOutcome, RecoveryPhase, RecoveryResult, RecoveryStrategy, RetryRequest,
};
pub use snapshot::{ChangeKind, DeltaChange, Snapshot, SnapshotDelta};
pub use task::{Task, TaskStatus};
