//! Intervention CLI commands.

use anyhow::Result;
use clap::{Args, Subcommand};

use crate::cli::id_resolver::{resolve_intervention_id, resolve_task_id};
use crate::cli::output::{list_table, output, render_list, short_id, truncate, CommandOutput};
use crate::cli::CliContext;
use crate::domain::models::Intervention;
use crate::domain::ports::InterventionFilter;

#[derive(Args, Debug)]
pub struct InterventionArgs {
    #[command(subcommand)]
    pub command: InterventionCommands,
}

#[derive(Subcommand, Debug)]
pub enum InterventionCommands {
    /// List interventions
    List {
        /// Restrict to one task
        #[arg(short, long)]
        task: Option<String>,
        /// Only unresolved interventions
        #[arg(long)]
        open: bool,
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },
    /// Record the outcome of a warning, redirect or guidance intervention
    Resolve {
        /// Task ID or unique prefix
        task: String,
        /// Intervention ID or unique prefix
        id: String,
        /// Mark the intervention as unsuccessful
        #[arg(long)]
        failed: bool,
        #[arg(short, long, default_value = "")]
        note: String,
        /// Who is reporting the outcome
        #[arg(long, default_value = "operator")]
        by: String,
    },
}

#[derive(Debug, serde::Serialize)]
pub struct InterventionListOutput {
    pub interventions: Vec<Intervention>,
    pub total: usize,
}

impl CommandOutput for InterventionListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["id", "task", "type", "confidence", "state", "action"]);
        for i in &self.interventions {
            let state = match (i.is_open(), i.superseded_by) {
                (true, _) => "open",
                (false, Some(_)) => "superseded",
                (false, None) if i.was_successful => "resolved",
                (false, None) => "failed",
            };
            table.add_row(vec![
                short_id(&i.id),
                short_id(&i.task_id),
                i.kind().to_string(),
                format!("{:.2}", i.confidence_score),
                state.to_string(),
                truncate(&i.action_taken, 50),
            ]);
        }
        render_list("intervention", &table, self.total)
    }
}

#[derive(Debug, serde::Serialize)]
pub struct InterventionActionOutput {
    pub success: bool,
    pub message: String,
    pub intervention: Intervention,
}

impl CommandOutput for InterventionActionOutput {
    fn to_human(&self) -> String {
        self.message.clone()
    }
}

pub async fn execute(args: InterventionArgs, json_mode: bool) -> Result<()> {
    let ctx = CliContext::open().await?;

    match args.command {
        InterventionCommands::List { task, open, limit } => {
            let task_id = match task {
                Some(prefix) => Some(resolve_task_id(&ctx.pool, &prefix).await?),
                None => None,
            };
            let interventions = ctx
                .supervisor
                .list_interventions(InterventionFilter {
                    task_id,
                    open_only: open,
                    limit: Some(limit),
                })
                .await?;
            output(
                &InterventionListOutput {
                    total: interventions.len(),
                    interventions,
                },
                json_mode,
            );
        }

        InterventionCommands::Resolve {
            task,
            id,
            failed,
            note,
            by,
        } => {
            let task_id = resolve_task_id(&ctx.pool, &task).await?;
            let intervention_id = resolve_intervention_id(&ctx.pool, &id).await?;
            let intervention = ctx
                .supervisor
                .resolve_intervention(task_id, intervention_id, !failed, &by, &note)
                .await?;
            output(
                &InterventionActionOutput {
                    success: true,
                    message: format!(
                        "Intervention {} resolved ({})",
                        short_id(&intervention.id),
                        if failed { "unsuccessful" } else { "successful" }
                    ),
                    intervention,
                },
                json_mode,
            );
        }
    }

    Ok(())
}
