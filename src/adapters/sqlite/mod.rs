//! SQLite database adapters for the Warden supervision core.

pub mod connection;
pub mod history_repository;
pub mod intervention_repository;
pub mod migrations;
pub mod recovery_repository;
pub mod snapshot_repository;
pub mod task_repository;

pub use connection::{
    create_pool, create_test_pool, database_url, verify_connection, ConnectionError, PoolConfig,
};
pub use history_repository::SqliteHistoryRepository;
pub use intervention_repository::SqliteInterventionRepository;
pub use migrations::{all_embedded_migrations, Migration, MigrationError, Migrator};
pub use recovery_repository::SqliteRecoveryRepository;
pub use snapshot_repository::SqliteSnapshotRepository;
pub use task_repository::SqliteTaskRepository;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::HistoryEntry;

/// Format a timestamp for storage. Fixed-width UTC so that text ordering
/// matches time ordering.
pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn format_optional_datetime(dt: &Option<DateTime<Utc>>) -> Option<String> {
    dt.as_ref().map(format_datetime)
}

/// Parse a UUID string from a SQLite row field.
pub fn parse_uuid(s: &str) -> DomainResult<Uuid> {
    Uuid::parse_str(s).map_err(|e| DomainError::SerializationError(e.to_string()))
}

/// Parse an optional UUID string from a SQLite row field.
pub fn parse_optional_uuid(s: Option<String>) -> DomainResult<Option<Uuid>> {
    s.map(|s| Uuid::parse_str(&s))
        .transpose()
        .map_err(|e| DomainError::SerializationError(e.to_string()))
}

/// Parse an RFC3339 datetime string from a SQLite row field.
pub fn parse_datetime(s: &str) -> DomainResult<DateTime<Utc>> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map_err(|e| DomainError::SerializationError(e.to_string()))
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse an optional RFC3339 datetime string from a SQLite row field.
pub fn parse_optional_datetime(s: Option<String>) -> DomainResult<Option<DateTime<Utc>>> {
    s.map(|s| chrono::DateTime::parse_from_rfc3339(&s).map(|d| d.with_timezone(&Utc)))
        .transpose()
        .map_err(|e| DomainError::SerializationError(e.to_string()))
}

/// Parse a JSON string from a SQLite row field, falling back to the type's default.
pub fn parse_json_or_default<T: serde::de::DeserializeOwned + Default>(s: Option<String>) -> DomainResult<T> {
    s.map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| DomainError::SerializationError(e.to_string()))
        .map(|opt| opt.unwrap_or_default())
}

/// Parse an enum column through its `from_str`-style constructor.
pub fn parse_enum<T>(value: &str, column: &str, parse: impl Fn(&str) -> Option<T>) -> DomainResult<T> {
    parse(value).ok_or_else(|| DomainError::SerializationError(format!("Invalid {column}: {value}")))
}

/// Append a history entry inside an open transaction.
pub(crate) async fn insert_history_entry(
    tx: &mut Transaction<'_, Sqlite>,
    entry: &HistoryEntry,
) -> DomainResult<()> {
    let actor_json = serde_json::to_string(&entry.actor)?;
    let rationale_json = entry.rationale.as_ref().map(serde_json::to_string).transpose()?;
    let metadata_json = serde_json::to_string(&entry.metadata)?;

    sqlx::query(
        r#"INSERT INTO history (id, task_id, kind, level, level_ord, actor, message,
           previous_state, new_state, rationale, metadata, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(entry.id.to_string())
    .bind(entry.task_id.to_string())
    .bind(entry.kind.as_str())
    .bind(entry.level.as_str())
    .bind(entry.level.ordinal())
    .bind(&actor_json)
    .bind(&entry.message)
    .bind(&entry.previous_state)
    .bind(&entry.new_state)
    .bind(&rationale_json)
    .bind(&metadata_json)
    .bind(format_datetime(&entry.created_at))
    .execute(&mut **tx)
    .await?;

    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),
    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),
    #[error("Query error: {0}")]
    Query(#[from] sqlx::Error),
}

pub async fn initialize_database(database_url: &str, config: Option<PoolConfig>) -> Result<SqlitePool, DatabaseError> {
    let pool = create_pool(database_url, config).await?;
    let migrator = Migrator::new(pool.clone());
    migrator.run(all_embedded_migrations()).await?;
    Ok(pool)
}

/// Create an in-memory test pool with all migrations applied.
pub async fn create_migrated_test_pool() -> Result<SqlitePool, DatabaseError> {
    let pool = create_test_pool().await?;
    let migrator = Migrator::new(pool.clone());
    migrator.run(all_embedded_migrations()).await?;
    Ok(pool)
}
