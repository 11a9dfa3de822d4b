//! Warden - coherence supervision for autonomous agents
//!
//! Warden watches a long-running agent's steps against the task objective it
//! was given. It scores each step for derailment, applies a graduated
//! intervention policy (warning, redirect, block, or caller-requested
//! guidance), recovers failing tasks through retry, rollback, circuit
//! breaking and escalation, and keeps a verified snapshot store and an
//! append-only timeline of every decision.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): models, errors and port traits
//! - **Adapters** (`adapters`): SQLite repositories and the log notifier
//! - **Service Layer** (`services`): scoring, policy, recovery, snapshots
//! - **Application Layer** (`application`): the [`Supervisor`] facade
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```no_run
//! use warden::adapters::sqlite::initialize_database;
//! use warden::{ConfigLoader, InterventionRequest, Supervisor};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigLoader::load()?;
//!     let pool = initialize_database("sqlite:.warden/warden.db", None).await?;
//!     let supervisor = Supervisor::from_pool(pool, config.clone())?;
//!
//!     let task = supervisor.start_task("Write unit tests for module X", None).await?;
//!     let assessment = supervisor
//!         .assess_step(task.id, "Added tests for the parser functions", &[])
//!         .await?;
//!     let decision = supervisor
//!         .intervene(task.id, &assessment, &config.intervention, InterventionRequest::None)
//!         .await?;
//!     println!("{:?}", decision.status);
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use application::{Supervisor, SupervisorComponents};
pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    AgentError, AgentFailure, CoherenceAssessment, Config, DerailmentType, EscalationTicket,
    IdeaRisk, Intervention, InterventionDecision, InterventionPreferences, InterventionRequest,
    RecoveryContext, RecoveryResult, RetryRequest, Snapshot, Task, TaskStatus,
};
pub use domain::ports::{CoherenceScorer, EscalationNotifier, PatternSet, RecoveryCallback};
pub use infrastructure::config::{ConfigError, ConfigLoader};
