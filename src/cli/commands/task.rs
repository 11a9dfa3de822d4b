//! Task CLI commands.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use crate::cli::id_resolver::resolve_task_id;
use crate::cli::output::{list_table, output, render_list, short_id, truncate, CommandOutput};
use crate::cli::CliContext;
use crate::domain::models::{Task, TaskStatus};
use crate::domain::ports::TaskFilter;

#[derive(Args, Debug)]
pub struct TaskArgs {
    #[command(subcommand)]
    pub command: TaskCommands,
}

#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// Start supervising a task
    Start {
        /// Declared task objective
        objective: String,
        /// Business criticality in [0, 1]
        #[arg(short, long)]
        criticality: Option<f64>,
    },
    /// List supervised tasks
    List {
        /// Filter by status (active, needs_intervention, blocked, completed)
        #[arg(short, long)]
        status: Option<String>,
        /// Only tasks paused by the circuit breaker
        #[arg(long)]
        paused: bool,
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },
    /// Show task details
    Show {
        /// Task ID or unique prefix
        id: String,
    },
    /// Mark a task completed
    Complete { id: String },
    /// Acknowledge a blocked task
    Ack {
        id: String,
        /// Resume the task instead of closing it
        #[arg(long)]
        resume: bool,
        #[arg(long, default_value = "operator")]
        by: String,
        #[arg(short, long, default_value = "")]
        note: String,
    },
    /// Reset the circuit breaker on a paused task
    Reset {
        id: String,
        #[arg(long, default_value = "operator")]
        by: String,
    },
}

#[derive(Debug, serde::Serialize)]
pub struct TaskOutput {
    pub id: String,
    pub objective: String,
    pub status: String,
    pub quality_score: f64,
    pub coherence_score: f64,
    pub business_criticality: f64,
    pub paused: bool,
    pub pause_reason: Option<String>,
    pub closed: bool,
    pub last_snapshot_version: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&Task> for TaskOutput {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.to_string(),
            objective: task.objective.clone(),
            status: task.status.as_str().to_string(),
            quality_score: task.quality_score,
            coherence_score: task.coherence_score,
            business_criticality: task.business_criticality,
            paused: task.is_paused(),
            pause_reason: task.pause_reason.clone(),
            closed: task.closed_at.is_some(),
            last_snapshot_version: task.last_snapshot_version,
            created_at: task.created_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            updated_at: task.updated_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        }
    }
}

impl CommandOutput for TaskOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![
            format!("Task: {}", self.id),
            format!("Objective: {}", self.objective),
            format!("Status: {}", self.status),
            format!("Quality: {:.2}", self.quality_score),
            format!("Coherence: {:.2}", self.coherence_score),
            format!("Business criticality: {:.2}", self.business_criticality),
            format!("Snapshots issued: {}", self.last_snapshot_version),
            format!("Created: {}", self.created_at),
            format!("Updated: {}", self.updated_at),
        ];
        if self.paused {
            lines.push(format!(
                "Paused: {}",
                self.pause_reason.as_deref().unwrap_or("circuit open")
            ));
        }
        if self.closed {
            lines.push("Closed: block accepted as final".to_string());
        }
        lines.join("\n")
    }
}

#[derive(Debug, serde::Serialize)]
pub struct TaskListOutput {
    pub tasks: Vec<TaskOutput>,
    pub total: usize,
}

impl CommandOutput for TaskListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["id", "status", "coherence", "paused", "objective"]);
        for task in &self.tasks {
            table.add_row(vec![
                task.id.chars().take(8).collect::<String>(),
                task.status.clone(),
                format!("{:.2}", task.coherence_score),
                if task.paused { "yes" } else { "" }.to_string(),
                truncate(&task.objective, 60),
            ]);
        }
        render_list("task", &table, self.total)
    }
}

#[derive(Debug, serde::Serialize)]
pub struct TaskActionOutput {
    pub success: bool,
    pub message: String,
    pub task: TaskOutput,
}

impl CommandOutput for TaskActionOutput {
    fn to_human(&self) -> String {
        self.message.clone()
    }
}

pub async fn execute(args: TaskArgs, json_mode: bool) -> Result<()> {
    let ctx = CliContext::open().await?;
    let supervisor = &ctx.supervisor;

    match args.command {
        TaskCommands::Start { objective, criticality } => {
            let task = supervisor
                .start_task(&objective, criticality)
                .await
                .context("Failed to start task")?;
            output(
                &TaskActionOutput {
                    success: true,
                    message: format!("Supervising task {}", task.id),
                    task: TaskOutput::from(&task),
                },
                json_mode,
            );
        }

        TaskCommands::List { status, paused, limit } => {
            let status = status
                .map(|s| TaskStatus::from_str(&s).ok_or_else(|| anyhow::anyhow!("Invalid status: {s}")))
                .transpose()?;
            let tasks = supervisor
                .list_tasks(TaskFilter {
                    status,
                    paused: paused.then_some(true),
                    limit: Some(limit),
                })
                .await?;
            output(
                &TaskListOutput {
                    total: tasks.len(),
                    tasks: tasks.iter().map(TaskOutput::from).collect(),
                },
                json_mode,
            );
        }

        TaskCommands::Show { id } => {
            let task_id = resolve_task_id(&ctx.pool, &id).await?;
            let task = supervisor.get_task(task_id).await?;
            output(&TaskOutput::from(&task), json_mode);
        }

        TaskCommands::Complete { id } => {
            let task_id = resolve_task_id(&ctx.pool, &id).await?;
            let task = supervisor.complete_task(task_id).await?;
            output(
                &TaskActionOutput {
                    success: true,
                    message: format!("Task completed: {}", short_id(&task.id)),
                    task: TaskOutput::from(&task),
                },
                json_mode,
            );
        }

        TaskCommands::Ack { id, resume, by, note } => {
            let task_id = resolve_task_id(&ctx.pool, &id).await?;
            let task = supervisor.acknowledge_block(task_id, resume, &by, &note).await?;
            let message = if resume {
                format!("Task resumed: {}", short_id(&task.id))
            } else {
                format!("Task closed: {}", short_id(&task.id))
            };
            output(
                &TaskActionOutput {
                    success: true,
                    message,
                    task: TaskOutput::from(&task),
                },
                json_mode,
            );
        }

        TaskCommands::Reset { id, by } => {
            let task_id = resolve_task_id(&ctx.pool, &id).await?;
            let task = supervisor.reset_circuit(task_id, &by).await?;
            output(
                &TaskActionOutput {
                    success: true,
                    message: format!("Circuit reset for task {}", short_id(&task.id)),
                    task: TaskOutput::from(&task),
                },
                json_mode,
            );
        }
    }

    Ok(())
}
