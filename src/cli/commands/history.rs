//! `warden history`: query the supervision timeline.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use clap::Args;

use crate::cli::id_resolver::resolve_task_id;
use crate::cli::output::{list_table, output, render_list, truncate, CommandOutput};
use crate::cli::CliContext;
use crate::domain::models::{HistoryActor, HistoryEntry, HistoryFilter, HistoryKind, HistoryLevel};

#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Restrict to one task (ID or unique prefix)
    #[arg(short, long)]
    pub task: Option<String>,

    /// Event kind, e.g. intervention, rollback, recovery_attempt
    #[arg(short, long)]
    pub kind: Option<String>,

    /// Minimum level (debug, info, decision, warning, error, critical)
    #[arg(long)]
    pub min_level: Option<String>,

    /// RFC 3339 lower bound
    #[arg(long)]
    pub since: Option<DateTime<Utc>>,

    /// RFC 3339 upper bound
    #[arg(long)]
    pub until: Option<DateTime<Utc>>,

    #[arg(short, long, default_value = "100")]
    pub limit: usize,
}

#[derive(Debug, serde::Serialize)]
pub struct HistoryOutput {
    pub entries: Vec<HistoryEntry>,
    pub total: usize,
}

fn actor_label(actor: &HistoryActor) -> String {
    match actor {
        HistoryActor::System => "system".to_string(),
        HistoryActor::Policy => "policy".to_string(),
        HistoryActor::Orchestrator => "orchestrator".to_string(),
        HistoryActor::Human { identifier } => identifier.clone(),
    }
}

impl CommandOutput for HistoryOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["time", "level", "kind", "actor", "message"]);
        for entry in &self.entries {
            table.add_row(vec![
                entry.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                entry.level.as_str().to_string(),
                entry.kind.as_str().to_string(),
                actor_label(&entry.actor),
                truncate(&entry.message, 80),
            ]);
        }
        render_list("entry", &table, self.total)
    }
}

pub async fn execute(args: HistoryArgs, json_mode: bool) -> Result<()> {
    let ctx = CliContext::open().await?;

    let mut filter = HistoryFilter::new().with_limit(args.limit);
    filter.from = args.since;
    filter.to = args.until;
    if let Some(prefix) = &args.task {
        filter = filter.for_task(resolve_task_id(&ctx.pool, prefix).await?);
    }
    if let Some(kind) = &args.kind {
        let kind = HistoryKind::parse_str(kind).ok_or_else(|| anyhow!("Invalid kind: {kind}"))?;
        filter = filter.with_kind(kind);
    }
    if let Some(level) = &args.min_level {
        let level = HistoryLevel::parse_str(level).ok_or_else(|| anyhow!("Invalid level: {level}"))?;
        filter = filter.with_min_level(level);
    }

    let entries = ctx.supervisor.query_history(&filter).await?;
    output(
        &HistoryOutput {
            total: entries.len(),
            entries,
        },
        json_mode,
    );
    Ok(())
}
