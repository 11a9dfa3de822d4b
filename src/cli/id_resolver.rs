//! Short ID prefix resolution for CLI commands.
//!
//! Any unique prefix of a UUID is accepted in place of the full id, similar
//! to git short hashes.

use anyhow::{bail, Result};
use sqlx::SqlitePool;
use std::fmt::Write as _;
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
enum Entity {
    Task,
    Intervention,
    Snapshot,
    Ticket,
}

impl Entity {
    fn label(self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Intervention => "intervention",
            Self::Snapshot => "snapshot",
            Self::Ticket => "escalation ticket",
        }
    }

    fn query(self) -> &'static str {
        match self {
            Self::Task => "SELECT id FROM tasks WHERE id LIKE ? LIMIT 10",
            Self::Intervention => "SELECT id FROM interventions WHERE id LIKE ? LIMIT 10",
            Self::Snapshot => "SELECT id FROM snapshots WHERE id LIKE ? LIMIT 10",
            Self::Ticket => "SELECT id FROM escalation_tickets WHERE id LIKE ? LIMIT 10",
        }
    }
}

pub async fn resolve_task_id(pool: &SqlitePool, prefix: &str) -> Result<Uuid> {
    resolve_prefix(pool, prefix, Entity::Task).await
}

pub async fn resolve_intervention_id(pool: &SqlitePool, prefix: &str) -> Result<Uuid> {
    resolve_prefix(pool, prefix, Entity::Intervention).await
}

pub async fn resolve_snapshot_id(pool: &SqlitePool, prefix: &str) -> Result<Uuid> {
    resolve_prefix(pool, prefix, Entity::Snapshot).await
}

pub async fn resolve_ticket_id(pool: &SqlitePool, prefix: &str) -> Result<Uuid> {
    resolve_prefix(pool, prefix, Entity::Ticket).await
}

fn validate_prefix(prefix: &str) -> Result<()> {
    if prefix.is_empty() {
        bail!("ID prefix must not be empty");
    }
    if !prefix.chars().all(|c| c.is_ascii_hexdigit() || c == '-') {
        bail!("Invalid ID prefix '{prefix}': must contain only hex characters and dashes");
    }
    Ok(())
}

async fn resolve_prefix(pool: &SqlitePool, prefix: &str, entity: Entity) -> Result<Uuid> {
    if let Ok(uuid) = Uuid::parse_str(prefix) {
        return Ok(uuid);
    }

    validate_prefix(prefix)?;

    let pattern = format!("{}%", prefix.to_lowercase());
    let rows: Vec<(String,)> = sqlx::query_as(entity.query())
        .bind(&pattern)
        .fetch_all(pool)
        .await?;

    match rows.as_slice() {
        [] => bail!("No {} found matching '{prefix}'", entity.label()),
        [(id,)] => Ok(Uuid::parse_str(id)?),
        _ => {
            let mut msg = format!(
                "Ambiguous prefix '{prefix}': matches {} {}s:",
                rows.len(),
                entity.label()
            );
            for (id,) in &rows {
                let _ = write!(msg, "\n  {id}");
            }
            bail!("{msg}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use crate::application::Supervisor;
    use crate::domain::models::Config;

    #[tokio::test]
    async fn test_resolve_task_prefix() {
        let pool = create_migrated_test_pool().await.unwrap();
        let supervisor = Supervisor::from_pool(pool.clone(), Config::default()).unwrap();
        let task = supervisor.start_task("write unit tests", None).await.unwrap();

        let prefix = &task.id.to_string()[..8];
        assert_eq!(resolve_task_id(&pool, prefix).await.unwrap(), task.id);
        assert_eq!(
            resolve_task_id(&pool, &task.id.to_string()).await.unwrap(),
            task.id
        );
    }

    #[tokio::test]
    async fn test_resolve_rejects_bad_prefixes() {
        let pool = create_migrated_test_pool().await.unwrap();
        assert!(resolve_task_id(&pool, "").await.is_err());
        assert!(resolve_task_id(&pool, "zz-not-hex").await.is_err());
        assert!(resolve_task_id(&pool, "abcdef").await.is_err());
    }
}
