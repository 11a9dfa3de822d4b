//! Shared fixtures for the integration tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::SqlitePool;
use warden::adapters::sqlite::create_migrated_test_pool;
use warden::domain::models::{AgentFailure, RetryConfig, RetryRequest, Snapshot};
use warden::{Config, RecoveryCallback, Supervisor};

/// Config with millisecond backoff so recovery tests stay fast.
pub fn fast_config() -> Config {
    Config {
        retry: RetryConfig {
            base_delay_ms: 1,
            max_delay_ms: 5,
            ..RetryConfig::default()
        },
        ..Config::default()
    }
}

/// Supervisor over a fresh in-memory database, plus the pool for direct
/// inspection.
pub async fn supervisor() -> (Supervisor, SqlitePool) {
    let pool = create_migrated_test_pool()
        .await
        .expect("Failed to create test pool");
    let supervisor =
        Supervisor::from_pool(pool.clone(), fast_config()).expect("Failed to build supervisor");
    (supervisor, pool)
}

/// Setup test logging
#[allow(dead_code)]
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Host callback replaying a fixed script of retry results.
///
/// Once the script runs out every retry fails.
#[derive(Default)]
#[allow(dead_code)]
pub struct ScriptedCallback {
    retry_results: Mutex<VecDeque<Result<(), AgentFailure>>>,
    pub restore_fails: bool,
    pub retries: Mutex<Vec<RetryRequest>>,
    pub restored: Mutex<Vec<i64>>,
}

#[allow(dead_code)]
impl ScriptedCallback {
    pub fn with_retries(results: Vec<Result<(), AgentFailure>>) -> Self {
        Self {
            retry_results: Mutex::new(results.into()),
            ..Self::default()
        }
    }

    pub fn retry_count(&self) -> usize {
        self.retries.lock().unwrap().len()
    }
}

#[async_trait]
impl RecoveryCallback for ScriptedCallback {
    async fn retry(&self, request: RetryRequest) -> Result<(), AgentFailure> {
        self.retries.lock().unwrap().push(request);
        self.retry_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AgentFailure::new("still failing")))
    }

    async fn restore(&self, snapshot: &Snapshot, _payload: &Value) -> Result<(), AgentFailure> {
        if self.restore_fails {
            return Err(AgentFailure::new("restore rejected"));
        }
        self.restored.lock().unwrap().push(snapshot.version);
        Ok(())
    }
}
