//! Snapshot CLI commands.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde_json::Value;
use std::path::PathBuf;

use crate::cli::id_resolver::{resolve_snapshot_id, resolve_task_id};
use crate::cli::output::{list_table, output, render_list, short_id, CommandOutput};
use crate::cli::CliContext;
use crate::domain::models::{ChangeKind, Snapshot, SnapshotDelta};

#[derive(Args, Debug)]
pub struct SnapshotArgs {
    #[command(subcommand)]
    pub command: SnapshotCommands,
}

#[derive(Subcommand, Debug)]
pub enum SnapshotCommands {
    /// Store a JSON state payload as the next snapshot version
    Create {
        /// Task ID or unique prefix
        task: String,
        /// Inline JSON payload
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        payload: Option<String>,
        /// Read the JSON payload from a file
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// List snapshots of a task, newest first
    List { task: String },
    /// Verify a snapshot and print its payload
    Rollback {
        task: String,
        /// Snapshot ID or unique prefix
        snapshot: String,
    },
    /// Structural diff between two versions
    Diff { task: String, from: i64, to: i64 },
    /// Apply snapshot retention now
    Cleanup {
        /// Restrict to one task; all tasks otherwise
        #[arg(short, long)]
        task: Option<String>,
    },
}

#[derive(Debug, serde::Serialize)]
pub struct SnapshotSummary {
    pub id: String,
    pub version: i64,
    pub checksum: String,
    pub valid: bool,
    pub size_bytes: usize,
    pub created_at: String,
}

impl From<&Snapshot> for SnapshotSummary {
    fn from(snapshot: &Snapshot) -> Self {
        Self {
            id: snapshot.id.to_string(),
            version: snapshot.version,
            checksum: snapshot.checksum.clone(),
            valid: snapshot.is_valid(),
            size_bytes: snapshot.payload.len(),
            created_at: snapshot.created_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        }
    }
}

impl CommandOutput for SnapshotSummary {
    fn to_human(&self) -> String {
        format!("Snapshot v{} stored: {}", self.version, self.id)
    }
}

#[derive(Debug, serde::Serialize)]
pub struct SnapshotListOutput {
    pub snapshots: Vec<SnapshotSummary>,
    pub total: usize,
}

impl CommandOutput for SnapshotListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["version", "id", "valid", "bytes", "created"]);
        for s in &self.snapshots {
            table.add_row(vec![
                format!("v{}", s.version),
                s.id.chars().take(8).collect(),
                if s.valid { "yes" } else { "CORRUPT" }.to_string(),
                s.size_bytes.to_string(),
                s.created_at.clone(),
            ]);
        }
        render_list("snapshot", &table, self.total)
    }
}

#[derive(Debug, serde::Serialize)]
pub struct RollbackOutput {
    pub snapshot_id: String,
    pub payload: Value,
}

impl CommandOutput for RollbackOutput {
    fn to_human(&self) -> String {
        serde_json::to_string_pretty(&self.payload).unwrap_or_default()
    }
}

#[derive(Debug, serde::Serialize)]
pub struct DiffOutput {
    #[serde(flatten)]
    pub delta: SnapshotDelta,
}

impl CommandOutput for DiffOutput {
    fn to_human(&self) -> String {
        if self.delta.is_empty() {
            return format!(
                "No changes between v{} and v{}",
                self.delta.from_version, self.delta.to_version
            );
        }
        let mut lines = vec![format!(
            "Changes v{} -> v{}:",
            self.delta.from_version, self.delta.to_version
        )];
        for change in &self.delta.changes {
            let render = |v: &Option<Value>| v.as_ref().map(Value::to_string).unwrap_or_default();
            let line = match change.kind {
                ChangeKind::Added => format!("  + {} = {}", change.path, render(&change.new)),
                ChangeKind::Removed => format!("  - {} (was {})", change.path, render(&change.old)),
                ChangeKind::Modified => format!(
                    "  ~ {}: {} -> {}",
                    change.path,
                    render(&change.old),
                    render(&change.new)
                ),
            };
            lines.push(line);
        }
        lines.join("\n")
    }
}

#[derive(Debug, serde::Serialize)]
pub struct CleanupOutput {
    pub evicted: u64,
}

impl CommandOutput for CleanupOutput {
    fn to_human(&self) -> String {
        format!("Evicted {} snapshot(s)", self.evicted)
    }
}

pub async fn execute(args: SnapshotArgs, json_mode: bool) -> Result<()> {
    let ctx = CliContext::open().await?;
    let supervisor = &ctx.supervisor;

    match args.command {
        SnapshotCommands::Create { task, payload, file } => {
            let task_id = resolve_task_id(&ctx.pool, &task).await?;
            let text = match (payload, file) {
                (Some(inline), _) => inline,
                (None, Some(path)) => tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                (None, None) => anyhow::bail!("Either --payload or --file is required"),
            };
            let payload: Value = serde_json::from_str(&text).context("Payload is not valid JSON")?;
            let snapshot = supervisor.create_snapshot(task_id, &payload).await?;
            output(&SnapshotSummary::from(&snapshot), json_mode);
        }

        SnapshotCommands::List { task } => {
            let task_id = resolve_task_id(&ctx.pool, &task).await?;
            let snapshots = supervisor.list_snapshots(task_id).await?;
            output(
                &SnapshotListOutput {
                    total: snapshots.len(),
                    snapshots: snapshots.iter().map(SnapshotSummary::from).collect(),
                },
                json_mode,
            );
        }

        SnapshotCommands::Rollback { task, snapshot } => {
            let task_id = resolve_task_id(&ctx.pool, &task).await?;
            let snapshot_id = resolve_snapshot_id(&ctx.pool, &snapshot).await?;
            let payload = supervisor.rollback(task_id, snapshot_id).await?;
            output(
                &RollbackOutput {
                    snapshot_id: short_id(&snapshot_id),
                    payload,
                },
                json_mode,
            );
        }

        SnapshotCommands::Diff { task, from, to } => {
            let task_id = resolve_task_id(&ctx.pool, &task).await?;
            let delta = supervisor.diff_snapshots(task_id, from, to).await?;
            output(&DiffOutput { delta }, json_mode);
        }

        SnapshotCommands::Cleanup { task } => {
            let task_id = match task {
                Some(prefix) => Some(resolve_task_id(&ctx.pool, &prefix).await?),
                None => None,
            };
            let evicted = supervisor.cleanup_snapshots(task_id).await?;
            output(&CleanupOutput { evicted }, json_mode);
        }
    }

    Ok(())
}
