//! Command-line interface for inspecting and driving supervision.

pub mod commands;
pub mod context;
pub mod id_resolver;
pub mod output;

use clap::{Parser, Subcommand};

use crate::domain::errors::DomainError;

pub use context::CliContext;

#[derive(Parser, Debug)]
#[command(name = "warden")]
#[command(about = "Warden - coherence supervision for autonomous agents", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize Warden configuration and database
    Init(commands::init::InitArgs),

    /// Supervised task management
    Task(commands::task::TaskArgs),

    /// Assess an agent step and optionally apply the intervention policy
    Step(commands::step::StepArgs),

    /// Intervention records
    Intervention(commands::intervention::InterventionArgs),

    /// Snapshot management
    Snapshot(commands::snapshot::SnapshotArgs),

    /// Query the supervision timeline
    History(commands::history::HistoryArgs),

    /// Escalation tickets
    Escalation(commands::escalation::EscalationArgs),

    /// Screen a project idea for feasibility risks
    Idea(commands::idea::IdeaArgs),
}

/// Print `err` (human or JSON) and exit non-zero.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    let code = err
        .downcast_ref::<DomainError>()
        .map_or("error", error_code);

    if json_mode {
        let body = serde_json::json!({
            "success": false,
            "error": code,
            "message": format!("{err:#}"),
        });
        eprintln!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("Error: {err:#}");
    }
    std::process::exit(1);
}

fn error_code(err: &DomainError) -> &'static str {
    match err {
        DomainError::TaskNotFound(_)
        | DomainError::InterventionNotFound(_)
        | DomainError::SnapshotNotFound(_)
        | DomainError::SnapshotVersionNotFound { .. }
        | DomainError::TicketNotFound(_) => "not_found",
        DomainError::CircuitOpen { .. } => "circuit_open",
        DomainError::AwaitingAcknowledgment(_) => "awaiting_acknowledgment",
        DomainError::TaskTerminal(_) => "task_terminal",
        DomainError::SnapshotCorrupted { .. } => "snapshot_invalid",
        DomainError::InvalidStateTransition { .. } | DomainError::InvalidTicketTransition { .. } => {
            "invalid_transition"
        }
        DomainError::ValidationFailed(_) | DomainError::SnapshotTaskMismatch { .. } => "invalid_input",
        DomainError::DatabaseError(_) | DomainError::SerializationError(_) => "storage",
    }
}
