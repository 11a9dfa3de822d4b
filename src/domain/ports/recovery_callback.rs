use async_trait::async_trait;
use serde_json::Value;

use crate::domain::models::{AgentFailure, RetryRequest, Snapshot};

/// Host-side hooks the recovery orchestrator drives.
///
/// Implementations must not call back into the supervisor for the same task;
/// the task's lock is held for the whole recovery invocation.
#[async_trait]
pub trait RecoveryCallback: Send + Sync {
    /// Re-run the failed work, optionally with an adjusted prompt
    async fn retry(&self, request: RetryRequest) -> Result<(), AgentFailure>;

    /// Restore agent state from a verified snapshot payload
    async fn restore(&self, snapshot: &Snapshot, payload: &Value) -> Result<(), AgentFailure>;
}
