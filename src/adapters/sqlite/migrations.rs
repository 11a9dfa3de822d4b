//! Embedded schema migrations.
//!
//! Applied versions are recorded in `schema_migrations` together with a
//! SHA-256 of the script. A recorded script whose text has since changed is
//! refused rather than silently skipped.

use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Migration {version} ({name}) failed: {source}")]
    Failed {
        version: i64,
        name: &'static str,
        #[source]
        source: sqlx::Error,
    },
    #[error("Migration {version} was edited after it was applied (recorded {recorded}, embedded {embedded})")]
    Drifted {
        version: i64,
        recorded: String,
        embedded: String,
    },
    #[error("Cannot read schema_migrations: {0}")]
    Bookkeeping(#[source] sqlx::Error),
}

/// One embedded schema script.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub sql: &'static str,
}

impl Migration {
    pub fn checksum(&self) -> String {
        hex::encode(Sha256::digest(self.sql.as_bytes()))
    }
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "supervision schema",
    sql: include_str!("../../../migrations/001_initial_schema.sql"),
}];

pub fn all_embedded_migrations() -> &'static [Migration] {
    MIGRATIONS
}

pub struct Migrator {
    pool: SqlitePool,
}

impl Migrator {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Apply pending migrations in version order and return how many ran.
    pub async fn run(&self, migrations: &[Migration]) -> Result<usize, MigrationError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                checksum TEXT NOT NULL,
                applied_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(MigrationError::Bookkeeping)?;

        let recorded: Vec<(i64, String)> =
            sqlx::query_as("SELECT version, checksum FROM schema_migrations")
                .fetch_all(&self.pool)
                .await
                .map_err(MigrationError::Bookkeeping)?;

        let mut ordered: Vec<&Migration> = migrations.iter().collect();
        ordered.sort_by_key(|m| m.version);

        let mut applied = 0;
        for migration in ordered {
            match recorded.iter().find(|(version, _)| *version == migration.version) {
                Some((_, checksum)) if *checksum == migration.checksum() => continue,
                Some((_, checksum)) => {
                    return Err(MigrationError::Drifted {
                        version: migration.version,
                        recorded: checksum.clone(),
                        embedded: migration.checksum(),
                    });
                }
                None => {
                    self.apply(migration).await?;
                    applied += 1;
                }
            }
        }

        if applied == 0 {
            debug!("Schema is current");
        }
        Ok(applied)
    }

    pub async fn current_version(&self) -> Result<i64, MigrationError> {
        let (version,): (i64,) = sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
            .fetch_one(&self.pool)
            .await
            .map_err(MigrationError::Bookkeeping)?;
        Ok(version)
    }

    async fn apply(&self, migration: &Migration) -> Result<(), MigrationError> {
        let failed = |source| MigrationError::Failed {
            version: migration.version,
            name: migration.name,
            source,
        };

        let mut tx = self.pool.begin().await.map_err(failed)?;
        sqlx::query(migration.sql)
            .execute(&mut *tx)
            .await
            .map_err(failed)?;
        sqlx::query("INSERT INTO schema_migrations (version, name, checksum) VALUES (?, ?, ?)")
            .bind(migration.version)
            .bind(migration.name)
            .bind(migration.checksum())
            .execute(&mut *tx)
            .await
            .map_err(failed)?;
        tx.commit().await.map_err(failed)?;

        info!(version = migration.version, name = migration.name, "Migration applied");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_test_pool;

    #[tokio::test]
    async fn test_migrations_are_recorded_and_idempotent() {
        let pool = create_test_pool().await.unwrap();
        let migrator = Migrator::new(pool.clone());

        assert_eq!(migrator.run(all_embedded_migrations()).await.unwrap(), 1);
        assert_eq!(migrator.current_version().await.unwrap(), 1);
        assert_eq!(migrator.run(all_embedded_migrations()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_edited_migration_is_refused() {
        let pool = create_test_pool().await.unwrap();
        let migrator = Migrator::new(pool.clone());
        migrator.run(all_embedded_migrations()).await.unwrap();

        sqlx::query("UPDATE schema_migrations SET checksum = 'stale' WHERE version = 1")
            .execute(&pool)
            .await
            .unwrap();

        let err = migrator.run(all_embedded_migrations()).await.unwrap_err();
        assert!(matches!(err, MigrationError::Drifted { version: 1, .. }));
    }

    #[tokio::test]
    async fn test_schema_tables_exist() {
        let pool = create_test_pool().await.unwrap();
        Migrator::new(pool.clone())
            .run(all_embedded_migrations())
            .await
            .unwrap();

        for table in ["tasks", "interventions", "snapshots", "history", "recovery_attempts", "escalation_tickets"] {
            let (count,): (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
                    .bind(table)
                    .fetch_one(&pool)
                    .await
                    .unwrap();
            assert_eq!(count, 1, "missing table {table}");
        }
    }
}
