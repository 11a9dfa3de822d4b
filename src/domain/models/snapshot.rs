//! Versioned, checksum-verified task state snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};

/// Immutable copy of task state usable for rollback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: Uuid,
    pub task_id: Uuid,
    /// Monotonic per task; never reused after eviction
    pub version: i64,
    /// Stored payload text (serialized JSON); the checksum covers these bytes
    pub payload: String,
    /// SHA-256 hex digest of `payload`
    pub checksum: String,
    pub created_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(task_id: Uuid, version: i64, payload: &Value) -> DomainResult<Self> {
        let text = serde_json::to_string(payload)?;
        let checksum = compute_checksum(&text);
        Ok(Self {
            id: Uuid::new_v4(),
            task_id,
            version,
            payload: text,
            checksum,
            created_at: Utc::now(),
        })
    }

    /// Recompute the checksum and compare it with the stored one.
    pub fn verify(&self) -> DomainResult<()> {
        let actual = compute_checksum(&self.payload);
        if actual != self.checksum {
            return Err(DomainError::SnapshotCorrupted {
                snapshot_id: self.id,
                expected: self.checksum.clone(),
                actual,
            });
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.verify().is_ok()
    }

    /// Parsed payload. Callers verify first.
    pub fn payload_json(&self) -> DomainResult<Value> {
        Ok(serde_json::from_str(&self.payload)?)
    }
}

pub fn compute_checksum(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
}

/// A single structural difference, addressed by JSON pointer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaChange {
    pub path: String,
    pub kind: ChangeKind,
    pub old: Option<Value>,
    pub new: Option<Value>,
}

/// Structural comparison between two snapshot versions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotDelta {
    pub task_id: Uuid,
    pub from_version: i64,
    pub to_version: i64,
    pub changes: Vec<DeltaChange>,
}

impl SnapshotDelta {
    pub fn compute(task_id: Uuid, from: (i64, &Value), to: (i64, &Value)) -> Self {
        let mut changes = Vec::new();
        diff_values("", from.1, to.1, &mut changes);
        Self {
            task_id,
            from_version: from.0,
            to_version: to.0,
            changes,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

fn escape_pointer_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

fn diff_values(path: &str, old: &Value, new: &Value, out: &mut Vec<DeltaChange>) {
    match (old, new) {
        (Value::Object(a), Value::Object(b)) => {
            for (key, old_child) in a {
                let child_path = format!("{path}/{}", escape_pointer_token(key));
                match b.get(key) {
                    Some(new_child) => diff_values(&child_path, old_child, new_child, out),
                    None => out.push(DeltaChange {
                        path: child_path,
                        kind: ChangeKind::Removed,
                        old: Some(old_child.clone()),
                        new: None,
                    }),
                }
            }
            for (key, new_child) in b {
                if !a.contains_key(key) {
                    out.push(DeltaChange {
                        path: format!("{path}/{}", escape_pointer_token(key)),
                        kind: ChangeKind::Added,
                        old: None,
                        new: Some(new_child.clone()),
                    });
                }
            }
        }
        (Value::Array(a), Value::Array(b)) => {
            let common = a.len().min(b.len());
            for index in 0..common {
                diff_values(&format!("{path}/{index}"), &a[index], &b[index], out);
            }
            for (index, removed) in a.iter().enumerate().skip(common) {
                out.push(DeltaChange {
                    path: format!("{path}/{index}"),
                    kind: ChangeKind::Removed,
                    old: Some(removed.clone()),
                    new: None,
                });
            }
            for (index, added) in b.iter().enumerate().skip(common) {
                out.push(DeltaChange {
                    path: format!("{path}/{index}"),
                    kind: ChangeKind::Added,
                    old: None,
                    new: Some(added.clone()),
                });
            }
        }
        _ if old != new => out.push(DeltaChange {
            path: path.to_string(),
            kind: ChangeKind::Modified,
            old: Some(old.clone()),
            new: Some(new.clone()),
        }),
        _ => {}
    }
}
