//! In-process remote backend.
//!
//! Keeps rows per table in memory and records every push, with knobs for
//! reachability, missing schema, per-record failures and latency.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{change_type_for, ConnectionStatus, RemoteAdapter, RemoteConnector};
use crate::error::{Error, Result};
use crate::models::{QueueOperation, RemoteChange, RemoteTarget, Table};

/// One push as the backend received it
#[derive(Debug, Clone, PartialEq)]
pub struct PushRecord {
    pub table: Table,
    pub operation: QueueOperation,
    pub record_id: i64,
    pub payload: serde_json::Value,
}

pub struct MemoryRemote {
    rows: Mutex<HashMap<Table, BTreeMap<i64, serde_json::Value>>>,
    pushes: Mutex<Vec<PushRecord>>,
    failing: Mutex<HashSet<(Table, i64)>>,
    slow: Mutex<HashMap<(Table, i64), Duration>>,
    reachable: AtomicBool,
    tables_exist: AtomicBool,
    latency: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
            pushes: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            slow: Mutex::new(HashMap::new()),
            reachable: AtomicBool::new(true),
            tables_exist: AtomicBool::new(true),
            latency: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend whose every request takes at least `latency`
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn set_tables_exist(&self, tables_exist: bool) {
        self.tables_exist.store(tables_exist, Ordering::SeqCst);
    }

    /// Reject pushes of one record with an HTTP 500
    pub async fn fail_record(&self, table: Table, record_id: i64) {
        self.failing.lock().await.insert((table, record_id));
    }

    pub async fn heal_record(&self, table: Table, record_id: i64) {
        self.failing.lock().await.remove(&(table, record_id));
    }

    /// Delay pushes of one record
    pub async fn slow_record(&self, table: Table, record_id: i64, delay: Duration) {
        self.slow.lock().await.insert((table, record_id), delay);
    }

    /// Store a row as if another client had written it
    pub async fn seed_row(&self, table: Table, row: serde_json::Value) {
        if let Some(id) = row.get("id").and_then(serde_json::Value::as_i64) {
            self.rows.lock().await.entry(table).or_default().insert(id, row);
        }
    }

    pub async fn row(&self, table: Table, record_id: i64) -> Option<serde_json::Value> {
        self.rows
            .lock()
            .await
            .get(&table)
            .and_then(|rows| rows.get(&record_id))
            .cloned()
    }

    pub async fn row_count(&self) -> usize {
        self.rows.lock().await.values().map(BTreeMap::len).sum()
    }

    pub async fn push_log(&self) -> Vec<PushRecord> {
        self.pushes.lock().await.clone()
    }

    /// Highest number of pushes observed in flight at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn ensure_reachable(&self) -> Result<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::Connectivity("memory backend is unreachable".to_string()))
        }
    }

    async fn apply_push(
        &self,
        table: Table,
        operation: QueueOperation,
        record_id: i64,
        payload: &str,
    ) -> Result<()> {
        let delay = self.slow.lock().await.get(&(table, record_id)).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().await.contains(&(table, record_id)) {
            return Err(Error::Push(format!(
                "injected failure for {table} #{record_id} (500)"
            )));
        }

        let payload: serde_json::Value = serde_json::from_str(payload)
            .map_err(|error| Error::Push(format!("invalid payload: {error} (400)")))?;

        {
            let mut rows = self.rows.lock().await;
            let table_rows = rows.entry(table).or_default();
            if operation == QueueOperation::Delete && !table.soft_deletes() {
                table_rows.remove(&record_id);
            } else {
                table_rows.insert(record_id, payload.clone());
            }
        }

        self.pushes.lock().await.push(PushRecord {
            table,
            operation,
            record_id,
            payload,
        });
        Ok(())
    }
}

#[async_trait]
impl RemoteAdapter for MemoryRemote {
    async fn test_connection(&self) -> ConnectionStatus {
        if !self.reachable.load(Ordering::SeqCst) {
            return ConnectionStatus::unreachable("Connection failed: memory backend is unreachable");
        }
        if self.tables_exist.load(Ordering::SeqCst) {
            ConnectionStatus::ready()
        } else {
            ConnectionStatus::missing_tables()
        }
    }

    async fn push(
        &self,
        table: Table,
        operation: QueueOperation,
        record_id: i64,
        payload: &str,
    ) -> Result<()> {
        self.ensure_reachable()?;

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let result = self.apply_push(table, operation, record_id, payload).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn pull(&self, since: i64) -> Result<Vec<RemoteChange>> {
        self.ensure_reachable()?;

        let rows = self.rows.lock().await;
        let mut changes = Vec::new();
        for table in Table::ALL {
            let Some(table_rows) = rows.get(&table) else {
                continue;
            };
            for (record_id, row) in table_rows {
                let updated_at = row
                    .get("updated_at")
                    .and_then(serde_json::Value::as_i64)
                    .unwrap_or_default();
                if updated_at <= since {
                    continue;
                }
                let created_at = row
                    .get("created_at")
                    .and_then(serde_json::Value::as_i64)
                    .unwrap_or(updated_at);
                changes.push(RemoteChange {
                    table_name: table,
                    record_id: *record_id,
                    change_type: change_type_for(created_at, updated_at),
                    payload: row.clone(),
                });
            }
        }
        Ok(changes)
    }

    async fn truncate_tables(&self) -> Result<()> {
        self.ensure_reachable()?;
        self.rows.lock().await.clear();
        Ok(())
    }
}

/// Routes connection targets to in-process backends by URL
#[derive(Default, Clone)]
pub struct MemoryConnector {
    backends: HashMap<String, Arc<MemoryRemote>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_backend(mut self, url: impl Into<String>, remote: Arc<MemoryRemote>) -> Self {
        self.backends.insert(url.into(), remote);
        self
    }
}

impl RemoteConnector for MemoryConnector {
    fn connect(&self, target: &RemoteTarget) -> Result<Arc<dyn RemoteAdapter>> {
        let remote: Arc<dyn RemoteAdapter> = self
            .backends
            .get(&target.url)
            .cloned()
            .ok_or_else(|| Error::Connectivity(format!("no backend at {}", target.url)))?;
        Ok(remote)
    }
}
