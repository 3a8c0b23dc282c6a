//! Outbox queue item model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::Table;

/// Mutation kind carried by a queue item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueOperation {
    Insert,
    Update,
    Delete,
}

impl QueueOperation {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for QueueOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueOperation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "insert" => Ok(Self::Insert),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(Error::Validation(format!("unknown operation '{other}'"))),
        }
    }
}

/// Lifecycle state of a queue item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    Syncing,
    Synced,
    Failed,
}

impl QueueStatus {
    pub const ALL: [Self; 4] = [Self::Pending, Self::Syncing, Self::Synced, Self::Failed];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| Error::Validation(format!("unknown queue status '{s}'")))
    }
}

/// A pending mutation awaiting replication
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    /// Monotonic queue position
    pub id: i64,
    pub table_name: Table,
    pub operation: QueueOperation,
    pub record_id: i64,
    /// Serialized record of `table_name`
    pub payload: String,
    pub status: QueueStatus,
    pub retry_count: i64,
    pub error_message: Option<String>,
    /// Unix ms
    pub created_at: i64,
    /// Unix ms
    pub synced_at: Option<i64>,
}

impl QueueItem {
    /// Ordering key: items sharing it must reach the remote in `id` order.
    pub const fn record_key(&self) -> (Table, i64) {
        (self.table_name, self.record_id)
    }
}

/// Queue cardinality by status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: i64,
    pub syncing: i64,
    pub synced: i64,
    pub failed: i64,
}

impl QueueStats {
    pub const fn total(&self) -> i64 {
        self.pending + self.syncing + self.synced + self.failed
    }
}
