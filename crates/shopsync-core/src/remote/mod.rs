//! Remote backend protocol client.
//!
//! [`RemoteAdapter`] is the seam between the sync engine and a relational
//! backend: idempotent row upserts and deletes, change feeds since a cursor,
//! and a connectivity/schema probe. [`SupabaseAdapter`] speaks `PostgREST`;
//! [`MemoryRemote`] keeps rows in process for tests and offline use.

mod memory;
mod supabase;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{ChangeType, QueueOperation, RemoteChange, RemoteTarget, Table};

pub use memory::{MemoryConnector, MemoryRemote, PushRecord};
pub use supabase::{SupabaseAdapter, SupabaseConnector};

/// Tables the remote schema must expose before sync can run
pub const REQUIRED_TABLES: [Table; 5] = Table::ALL;

/// PostgreSQL DDL for the remote schema
pub const fn migration_sql() -> &'static str {
    include_str!("../../sql/remote_schema.sql")
}

/// Outcome of a connectivity and schema probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    /// False on network failure or rejected credentials
    pub connected: bool,
    /// False when the backend is reachable but the schema is missing
    pub tables_exist: bool,
    pub message: String,
}

impl ConnectionStatus {
    pub fn ready() -> Self {
        Self {
            connected: true,
            tables_exist: true,
            message: "Connection successful! All tables found.".to_string(),
        }
    }

    pub fn missing_tables() -> Self {
        Self {
            connected: true,
            tables_exist: false,
            message: "Connected, but required tables are missing. \
                      Run the SQL from get_migration_sql on the backend first."
                .to_string(),
        }
    }

    pub fn unreachable(message: impl Into<String>) -> Self {
        Self {
            connected: false,
            tables_exist: false,
            message: message.into(),
        }
    }

    /// Turn a failed probe into the error that gates sync on it
    pub fn ensure_ready(&self) -> Result<()> {
        if !self.connected {
            return Err(Error::Connectivity(self.message.clone()));
        }
        if !self.tables_exist {
            return Err(Error::Schema(self.message.clone()));
        }
        Ok(())
    }
}

/// Protocol client for one remote backend instance
#[async_trait]
pub trait RemoteAdapter: Send + Sync {
    /// Probe connectivity and schema; never fails, the status carries the outcome
    async fn test_connection(&self) -> ConnectionStatus;

    /// Apply one mutation.
    ///
    /// Must be idempotent: re-sending a row the remote already holds is a
    /// success, not a conflict.
    async fn push(
        &self,
        table: Table,
        operation: QueueOperation,
        record_id: i64,
        payload: &str,
    ) -> Result<()>;

    /// Rows changed after `since` (Unix ms)
    async fn pull(&self, since: i64) -> Result<Vec<RemoteChange>>;

    /// Remove every row of the replicated tables
    async fn truncate_tables(&self) -> Result<()>;
}

/// Builds adapters for connection targets
pub trait RemoteConnector: Send + Sync {
    fn connect(&self, target: &RemoteTarget) -> Result<Arc<dyn RemoteAdapter>>;
}

/// Change type for a remote row: created rows still carry their creation time
pub(crate) const fn change_type_for(created_at: i64, updated_at: i64) -> ChangeType {
    if created_at == updated_at {
        ChangeType::New
    } else {
        ChangeType::Modified
    }
}
