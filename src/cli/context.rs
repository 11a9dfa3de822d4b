//! Shared setup for commands that need storage.

use anyhow::{Context, Result};
use sqlx::SqlitePool;

use crate::adapters::sqlite::{database_url, initialize_database, PoolConfig};
use crate::application::Supervisor;
use crate::domain::models::Config;
use crate::infrastructure::config::ConfigLoader;

pub struct CliContext {
    pub config: Config,
    pub pool: SqlitePool,
    pub supervisor: Supervisor,
}

impl CliContext {
    /// Load project configuration and open the supervision database.
    pub async fn open() -> Result<Self> {
        let config = ConfigLoader::load().context("Failed to load configuration")?;
        Self::with_config(config).await
    }

    pub async fn with_config(config: Config) -> Result<Self> {
        let pool = initialize_database(
            &database_url(&config.database.path),
            Some(PoolConfig::from(&config.database)),
        )
            .await
            .context("Failed to open database. Run 'warden init' first.")?;
        let supervisor = Supervisor::from_pool(pool.clone(), config.clone())
            .context("Failed to construct supervisor")?;

        Ok(Self {
            config,
            pool,
            supervisor,
        })
    }
}
