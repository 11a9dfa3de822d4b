//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines the interfaces adapters implement:
//! - Repositories for tasks, interventions, snapshots, history and recovery
//! - CoherenceScorer and PatternSet: swappable heuristics
//! - EscalationNotifier: delivery of escalation tickets
//! - RecoveryCallback: host hooks driven during recovery

pub mod coherence_scorer;
pub mod history_repository;
pub mod intervention_repository;
pub mod notifier;
pub mod pattern_set;
pub mod recovery_callback;
pub mod recovery_repository;
pub mod snapshot_repository;
pub mod task_repository;

pub use coherence_scorer::CoherenceScorer;
pub use history_repository::HistoryRepository;
pub use intervention_repository::{DecisionRecord, InterventionFilter, InterventionRepository};
pub use notifier::EscalationNotifier;
pub use pattern_set::PatternSet;
pub use recovery_callback::RecoveryCallback;
pub use recovery_repository::{RecoveryRepository, TicketFilter};
pub use snapshot_repository::SnapshotRepository;
pub use task_repository::{TaskFilter, TaskRepository};
