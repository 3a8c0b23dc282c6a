//! Durable, ordered outbox of local mutations awaiting replication

mod repository;

pub use repository::QueueRepository;

use crate::db::Store;
use crate::error::Result;
use crate::models::{QueueItem, QueueOperation, QueueStats, QueueStatus, Table};

/// Outbox queue backed by the local store
#[derive(Clone)]
pub struct Outbox {
    store: Store,
}

impl Outbox {
    pub const fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn enqueue(
        &self,
        table: Table,
        operation: QueueOperation,
        record_id: i64,
        payload: &str,
    ) -> Result<i64> {
        let db = self.store.lock().await;
        QueueRepository::new(db.connection())
            .enqueue(table, operation, record_id, payload)
            .await
    }

    pub async fn dequeue_batch(&self, max: u32) -> Result<Vec<QueueItem>> {
        let db = self.store.lock().await;
        QueueRepository::new(db.connection()).dequeue_batch(max).await
    }

    /// Pending items that are not held back behind a failed one
    pub async fn count_ready(&self) -> Result<i64> {
        let db = self.store.lock().await;
        QueueRepository::new(db.connection()).count_ready().await
    }

    pub async fn mark_status(&self, id: i64, status: QueueStatus, error: Option<&str>) -> Result<()> {
        let db = self.store.lock().await;
        QueueRepository::new(db.connection())
            .mark_status(id, status, error)
            .await
    }

    pub async fn stats(&self) -> Result<QueueStats> {
        let db = self.store.lock().await;
        QueueRepository::new(db.connection()).stats().await
    }

    pub async fn retry_failed(&self) -> Result<u64> {
        let db = self.store.lock().await;
        let count = QueueRepository::new(db.connection()).retry_failed().await?;
        if count > 0 {
            tracing::info!("Re-queued {count} failed items");
        }
        Ok(count)
    }

    pub async fn clear_synced(&self, older_than_days: u32) -> Result<u64> {
        let db = self.store.lock().await;
        QueueRepository::new(db.connection())
            .clear_synced(older_than_days)
            .await
    }

    pub async fn list_items(&self, status: Option<QueueStatus>, limit: u32) -> Result<Vec<QueueItem>> {
        let db = self.store.lock().await;
        QueueRepository::new(db.connection())
            .list_items(status, limit)
            .await
    }

    pub async fn recover_interrupted(&self) -> Result<u64> {
        let db = self.store.lock().await;
        let count = QueueRepository::new(db.connection())
            .recover_interrupted()
            .await?;
        if count > 0 {
            tracing::warn!("Recovered {count} items interrupted mid-push");
        }
        Ok(count)
    }

    pub async fn prune_history(&self, keep: u32) -> Result<u64> {
        let db = self.store.lock().await;
        QueueRepository::new(db.connection()).prune_history(keep).await
    }

    pub async fn clear_history(&self) -> Result<u64> {
        let db = self.store.lock().await;
        QueueRepository::new(db.connection()).clear_history().await
    }
}
