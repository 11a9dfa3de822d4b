//! Domain services: scoring, policy, recovery and the snapshot store.

pub mod coherence_analyzer;
pub mod error_classifier;
pub mod escalation;
pub mod history_store;
pub mod idea_validator;
pub mod intervention_policy;
pub mod loop_breaker;
pub mod recovery_orchestrator;
pub mod retry_policy;

pub use coherence_analyzer::{extract_keywords, HeuristicScorer};
pub use error_classifier::ErrorClassifier;
pub use escalation::{EscalationPolicy, EscalationService};
pub use history_store::HistoryStore;
pub use idea_validator::{default_pattern_sets, IdeaValidator, RegexPatternSet};
pub use intervention_policy::{decide, refocus_prompt, validate_preferences, PolicyDecision};
pub use loop_breaker::{LoopBreaker, LoopCheck};
pub use recovery_orchestrator::{plan_for, PlanStep, RecoveryOrchestrator};
pub use retry_policy::{cancelable_sleep, BackoffPolicy, SuccessRateTracker};
