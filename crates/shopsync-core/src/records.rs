//! Business record writes.
//!
//! Every mutation lands in its table and in the outbox within one
//! transaction, so a committed row always has its queue item.

use crate::db::{LibSqlRecordRepository, RecordRepository, Store};
use crate::error::{Error, Result};
use crate::models::{QueueOperation, RecordPayload, Table};
use crate::outbox::QueueRepository;
use crate::util::now_millis;

/// Entry point for the application's record writes
#[derive(Clone)]
pub struct RecordStore {
    store: Store,
}

impl RecordStore {
    pub const fn new(store: Store) -> Self {
        Self { store }
    }

    /// Insert or update a record, stamping `updated_at`, and queue it.
    ///
    /// Returns the outbox item id.
    pub async fn save(&self, mut record: RecordPayload) -> Result<i64> {
        if record.record_id() <= 0 {
            return Err(Error::Validation(format!(
                "{} record id must be positive",
                record.table()
            )));
        }
        record.touch(now_millis());

        let db = self.store.lock().await;
        let tx = db.connection().transaction().await?;
        let records = LibSqlRecordRepository::new(&tx);

        let operation = if records
            .get(record.table(), record.record_id())
            .await?
            .is_some()
        {
            QueueOperation::Update
        } else {
            QueueOperation::Insert
        };
        records.upsert(&record).await?;
        let queue_id = QueueRepository::new(&tx)
            .enqueue_record(operation, &record)
            .await?;

        tx.commit().await?;
        Ok(queue_id)
    }

    /// Delete a record and queue the deletion.
    ///
    /// Tables with `deleted_at` keep the row as a tombstone; shop settings
    /// are removed outright.
    pub async fn delete(&self, table: Table, id: i64) -> Result<i64> {
        let db = self.store.lock().await;
        let tx = db.connection().transaction().await?;
        let records = LibSqlRecordRepository::new(&tx);

        let mut record = records
            .get(table, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("{table} record {id}")))?;

        if record.mark_deleted(now_millis()) {
            records.upsert(&record).await?;
        } else {
            records.remove(table, id).await?;
        }
        let queue_id = QueueRepository::new(&tx)
            .enqueue_record(QueueOperation::Delete, &record)
            .await?;

        tx.commit().await?;
        Ok(queue_id)
    }

    pub async fn get(&self, table: Table, id: i64) -> Result<Option<RecordPayload>> {
        let db = self.store.lock().await;
        LibSqlRecordRepository::new(db.connection())
            .get(table, id)
            .await
    }

    pub async fn list(&self, table: Table) -> Result<Vec<RecordPayload>> {
        let db = self.store.lock().await;
        LibSqlRecordRepository::new(db.connection())
            .list(table)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{customer_record, shop_settings_record};
    use crate::models::QueueStatus;
    use crate::outbox::Outbox;
    use pretty_assertions::assert_eq;

    async fn setup() -> (RecordStore, Outbox) {
        let store = Store::open_in_memory().await.unwrap();
        (RecordStore::new(store.clone()), Outbox::new(store))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_save_enqueues_insert_then_update() {
        let (records, outbox) = setup().await;

        records.save(customer_record(1, "Nilar")).await.unwrap();
        records.save(customer_record(1, "Nilar Win")).await.unwrap();

        let items = outbox.dequeue_batch(10).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].operation, QueueOperation::Insert);
        assert_eq!(items[1].operation, QueueOperation::Update);
        assert!(items.iter().all(|item| item.record_id == 1));

        let stored = records.get(Table::Customers, 1).await.unwrap().unwrap();
        let queued = RecordPayload::decode(Table::Customers, &items[1].payload).unwrap();
        assert_eq!(stored, queued);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delete_keeps_tombstone() {
        let (records, outbox) = setup().await;
        records.save(customer_record(3, "Zaw")).await.unwrap();

        records.delete(Table::Customers, 3).await.unwrap();

        let stored = records.get(Table::Customers, 3).await.unwrap().unwrap();
        match stored {
            RecordPayload::Customers(customer) => assert!(customer.deleted_at.is_some()),
            other => panic!("unexpected payload {other:?}"),
        }

        let deletes = outbox
            .list_items(Some(QueueStatus::Pending), 10)
            .await
            .unwrap();
        assert_eq!(deletes[0].operation, QueueOperation::Delete);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delete_shop_settings_removes_row() {
        let (records, outbox) = setup().await;
        records.save(shop_settings_record()).await.unwrap();

        records.delete(Table::ShopSettings, 1).await.unwrap();

        assert!(records.get(Table::ShopSettings, 1).await.unwrap().is_none());
        assert_eq!(outbox.stats().await.unwrap().pending, 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delete_missing_record_changes_nothing() {
        let (records, outbox) = setup().await;

        assert!(matches!(
            records.delete(Table::Orders, 404).await,
            Err(Error::NotFound(_))
        ));
        assert_eq!(outbox.stats().await.unwrap().total(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_save_rejects_unassigned_id() {
        let (records, _) = setup().await;
        assert!(records.save(customer_record(0, "Nobody")).await.is_err());
    }
}
