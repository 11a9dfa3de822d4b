//! Escalation ticket CLI commands.

use anyhow::{anyhow, Result};
use clap::{Args, Subcommand};

use crate::cli::id_resolver::{resolve_task_id, resolve_ticket_id};
use crate::cli::output::{list_table, output, render_list, short_id, truncate, CommandOutput};
use crate::cli::CliContext;
use crate::domain::models::{EscalationTicket, TicketStatus};
use crate::domain::ports::TicketFilter;

#[derive(Args, Debug)]
pub struct EscalationArgs {
    #[command(subcommand)]
    pub command: EscalationCommands,
}

#[derive(Subcommand, Debug)]
pub enum EscalationCommands {
    /// List tickets, highest priority first
    List {
        #[arg(short, long)]
        task: Option<String>,
        /// Filter by status (open, acknowledged, resolved)
        #[arg(short, long)]
        status: Option<String>,
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },
    /// Acknowledge an open ticket
    Ack {
        /// Ticket ID or unique prefix
        id: String,
        #[arg(long, default_value = "operator")]
        by: String,
        #[arg(short, long)]
        note: Option<String>,
    },
    /// Resolve a ticket
    Resolve {
        id: String,
        /// Resolution note
        resolution: String,
        #[arg(long, default_value = "operator")]
        by: String,
    },
}

#[derive(Debug, serde::Serialize)]
pub struct TicketListOutput {
    pub tickets: Vec<EscalationTicket>,
    pub total: usize,
}

impl CommandOutput for TicketListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["id", "task", "severity", "priority", "status", "reason"]);
        for ticket in &self.tickets {
            table.add_row(vec![
                short_id(&ticket.id),
                short_id(&ticket.task_id),
                ticket.severity.to_string(),
                format!("{:.1}", ticket.priority),
                ticket.status.to_string(),
                truncate(&ticket.reason, 50),
            ]);
        }
        render_list("ticket", &table, self.total)
    }
}

#[derive(Debug, serde::Serialize)]
pub struct TicketActionOutput {
    pub success: bool,
    pub message: String,
    pub ticket: EscalationTicket,
}

impl CommandOutput for TicketActionOutput {
    fn to_human(&self) -> String {
        self.message.clone()
    }
}

pub async fn execute(args: EscalationArgs, json_mode: bool) -> Result<()> {
    let ctx = CliContext::open().await?;

    match args.command {
        EscalationCommands::List { task, status, limit } => {
            let task_id = match task {
                Some(prefix) => Some(resolve_task_id(&ctx.pool, &prefix).await?),
                None => None,
            };
            let status = status
                .map(|s| TicketStatus::from_str(&s).ok_or_else(|| anyhow!("Invalid status: {s}")))
                .transpose()?;
            let tickets = ctx
                .supervisor
                .query_escalations(TicketFilter {
                    task_id,
                    status,
                    limit: Some(limit),
                })
                .await?;
            output(
                &TicketListOutput {
                    total: tickets.len(),
                    tickets,
                },
                json_mode,
            );
        }

        EscalationCommands::Ack { id, by, note } => {
            let ticket_id = resolve_ticket_id(&ctx.pool, &id).await?;
            let ticket = ctx
                .supervisor
                .acknowledge_escalation(ticket_id, &by, note.as_deref())
                .await?;
            output(
                &TicketActionOutput {
                    success: true,
                    message: format!("Ticket {} acknowledged by {by}", short_id(&ticket.id)),
                    ticket,
                },
                json_mode,
            );
        }

        EscalationCommands::Resolve { id, resolution, by } => {
            let ticket_id = resolve_ticket_id(&ctx.pool, &id).await?;
            let ticket = ctx
                .supervisor
                .resolve_escalation(ticket_id, &by, &resolution)
                .await?;
            output(
                &TicketActionOutput {
                    success: true,
                    message: format!("Ticket {} resolved", short_id(&ticket.id)),
                    ticket,
                },
                json_mode,
            );
        }
    }

    Ok(())
}
