//! SQL for the `sync_queue` table.
//!
//! Every function takes a plain connection so callers can run it inside a
//! transaction that also writes the business row.

use libsql::Connection;

use crate::db::{LibSqlSessionRepository, SessionRepository};
use crate::error::{Error, Result};
use crate::models::{QueueItem, QueueOperation, QueueStats, QueueStatus, RecordPayload, Table};
use crate::util::{days_before, now_millis};

const ITEM_COLUMNS: &str = "id, table_name, operation, record_id, payload, status, \
     retry_count, error_message, created_at, synced_at";

/// Pending items not held back behind an older failed or in-flight item of
/// the same record
const READY_ITEMS: &str = "FROM sync_queue q
     WHERE q.status = 'pending'
       AND NOT EXISTS (
           SELECT 1 FROM sync_queue older
           WHERE older.table_name = q.table_name
             AND older.record_id = q.record_id
             AND older.id < q.id
             AND older.status IN ('failed', 'syncing')
       )";

/// Queue operations bound to one connection
pub struct QueueRepository<'a> {
    conn: &'a Connection,
}

impl<'a> QueueRepository<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_item(row: &libsql::Row) -> Result<QueueItem> {
        let table_name: String = row.get(1)?;
        let operation: String = row.get(2)?;
        let status: String = row.get(5)?;
        Ok(QueueItem {
            id: row.get(0)?,
            table_name: table_name.parse()?,
            operation: operation.parse()?,
            record_id: row.get(3)?,
            payload: row.get(4)?,
            status: status.parse()?,
            retry_count: row.get(6)?,
            error_message: row.get(7)?,
            created_at: row.get(8)?,
            synced_at: row.get(9)?,
        })
    }

    async fn collect(&self, mut rows: libsql::Rows) -> Result<Vec<QueueItem>> {
        let mut items = Vec::new();
        while let Some(row) = rows.next().await? {
            items.push(Self::parse_item(&row)?);
        }
        Ok(items)
    }

    /// Append a pending item and return its id
    pub async fn enqueue(
        &self,
        table: Table,
        operation: QueueOperation,
        record_id: i64,
        payload: &str,
    ) -> Result<i64> {
        self.conn
            .execute(
                "INSERT INTO sync_queue (table_name, operation, record_id, payload, status, created_at)
                 VALUES (?, ?, ?, ?, 'pending', ?)",
                libsql::params![
                    table.as_str(),
                    operation.as_str(),
                    record_id,
                    payload,
                    now_millis()
                ],
            )
            .await?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Append the serialized form of a typed record
    pub async fn enqueue_record(
        &self,
        operation: QueueOperation,
        record: &RecordPayload,
    ) -> Result<i64> {
        self.enqueue(
            record.table(),
            operation,
            record.record_id(),
            &record.encode()?,
        )
        .await
    }

    /// Pending items in ascending id order.
    ///
    /// An item is held back while an older item of the same record is still
    /// failed or in flight, so a record's mutations never overtake each other.
    pub async fn dequeue_batch(&self, max: u32) -> Result<Vec<QueueItem>> {
        let rows = self
            .conn
            .query(
                &format!("SELECT {ITEM_COLUMNS} {READY_ITEMS} ORDER BY q.id ASC LIMIT ?"),
                [i64::from(max)],
            )
            .await?;
        self.collect(rows).await
    }

    /// Number of items the next `dequeue_batch` calls would hand out
    pub async fn count_ready(&self) -> Result<i64> {
        let mut rows = self
            .conn
            .query(&format!("SELECT COUNT(*) {READY_ITEMS}"), ())
            .await?;
        match rows.next().await? {
            Some(row) => Ok(row.get(0)?),
            None => Ok(0),
        }
    }

    /// Move an item to `status`.
    ///
    /// `Failed` bumps the retry count and stores the error, `Synced` stamps
    /// `synced_at`, `Pending` clears any previous error.
    pub async fn mark_status(&self, id: i64, status: QueueStatus, error: Option<&str>) -> Result<()> {
        let updated = match status {
            QueueStatus::Failed => {
                self.conn
                    .execute(
                        "UPDATE sync_queue
                         SET status = 'failed', retry_count = retry_count + 1, error_message = ?
                         WHERE id = ?",
                        libsql::params![error.unwrap_or("unknown error"), id],
                    )
                    .await?
            }
            QueueStatus::Synced => {
                self.conn
                    .execute(
                        "UPDATE sync_queue
                         SET status = 'synced', synced_at = ?, error_message = NULL
                         WHERE id = ?",
                        [now_millis(), id],
                    )
                    .await?
            }
            QueueStatus::Pending => {
                self.conn
                    .execute(
                        "UPDATE sync_queue SET status = 'pending', error_message = NULL WHERE id = ?",
                        [id],
                    )
                    .await?
            }
            QueueStatus::Syncing => {
                self.conn
                    .execute("UPDATE sync_queue SET status = 'syncing' WHERE id = ?", [id])
                    .await?
            }
        };

        if updated == 0 {
            return Err(Error::NotFound(format!("queue item {id}")));
        }
        Ok(())
    }

    pub async fn stats(&self) -> Result<QueueStats> {
        let mut rows = self
            .conn
            .query(
                "SELECT status, COUNT(*) FROM sync_queue GROUP BY status",
                (),
            )
            .await?;

        let mut stats = QueueStats::default();
        while let Some(row) = rows.next().await? {
            let status: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            match status.parse()? {
                QueueStatus::Pending => stats.pending = count,
                QueueStatus::Syncing => stats.syncing = count,
                QueueStatus::Synced => stats.synced = count,
                QueueStatus::Failed => stats.failed = count,
            }
        }
        Ok(stats)
    }

    /// Return every failed item to `pending`, keeping its id
    pub async fn retry_failed(&self) -> Result<u64> {
        let count = self
            .conn
            .execute(
                "UPDATE sync_queue SET status = 'pending', error_message = NULL
                 WHERE status = 'failed'",
                (),
            )
            .await?;
        Ok(count)
    }

    /// Delete synced items whose `synced_at` lies before the cutoff
    pub async fn clear_synced(&self, older_than_days: u32) -> Result<u64> {
        let cutoff = days_before(now_millis(), i64::from(older_than_days));
        let count = self
            .conn
            .execute(
                "DELETE FROM sync_queue
                 WHERE status = 'synced' AND synced_at IS NOT NULL AND synced_at < ?",
                [cutoff],
            )
            .await?;
        Ok(count)
    }

    /// Newest items first, optionally filtered by status
    pub async fn list_items(&self, status: Option<QueueStatus>, limit: u32) -> Result<Vec<QueueItem>> {
        let rows = match status {
            Some(status) => {
                self.conn
                    .query(
                        &format!(
                            "SELECT {ITEM_COLUMNS} FROM sync_queue WHERE status = ?
                             ORDER BY id DESC LIMIT ?"
                        ),
                        libsql::params![status.as_str(), i64::from(limit)],
                    )
                    .await?
            }
            None => {
                self.conn
                    .query(
                        &format!("SELECT {ITEM_COLUMNS} FROM sync_queue ORDER BY id DESC LIMIT ?"),
                        [i64::from(limit)],
                    )
                    .await?
            }
        };
        self.collect(rows).await
    }

    /// Reset items left `syncing` by an interrupted process
    pub async fn recover_interrupted(&self) -> Result<u64> {
        let count = self
            .conn
            .execute(
                "UPDATE sync_queue SET status = 'pending' WHERE status = 'syncing'",
                (),
            )
            .await?;
        Ok(count)
    }

    /// Drop items that a snapshot re-enqueue supersedes.
    ///
    /// A snapshot cannot express a hard delete, since the row is gone
    /// locally. With `keep_hard_deletes` those items stay queued and failed
    /// ones go back to pending so the cycle pushes them.
    pub async fn discard_unsent(&self, keep_hard_deletes: bool) -> Result<u64> {
        if !keep_hard_deletes {
            let count = self
                .conn
                .execute(
                    "DELETE FROM sync_queue WHERE status IN ('pending', 'failed')",
                    (),
                )
                .await?;
            return Ok(count);
        }

        let hard_tables = Table::ALL
            .into_iter()
            .filter(|table| !table.soft_deletes())
            .map(|table| format!("'{}'", table.as_str()))
            .collect::<Vec<_>>()
            .join(", ");
        let hard_delete = format!(
            "operation = '{}' AND table_name IN ({hard_tables})",
            QueueOperation::Delete.as_str()
        );

        let count = self
            .conn
            .execute(
                &format!(
                    "DELETE FROM sync_queue
                     WHERE status IN ('pending', 'failed') AND NOT ({hard_delete})"
                ),
                (),
            )
            .await?;
        self.conn
            .execute(
                &format!(
                    "UPDATE sync_queue SET status = 'pending', error_message = NULL
                     WHERE status = 'failed' AND {hard_delete}"
                ),
                (),
            )
            .await?;
        Ok(count)
    }

    /// Keep the newest `keep` synced items and finished sessions
    pub async fn prune_history(&self, keep: u32) -> Result<u64> {
        let items = self
            .conn
            .execute(
                "DELETE FROM sync_queue
                 WHERE status = 'synced' AND id NOT IN (
                     SELECT id FROM sync_queue WHERE status = 'synced'
                     ORDER BY id DESC LIMIT ?
                 )",
                [i64::from(keep)],
            )
            .await?;
        let sessions = LibSqlSessionRepository::new(self.conn).prune(keep).await?;
        Ok(items + sessions)
    }

    /// Remove every synced item and finished session
    pub async fn clear_history(&self) -> Result<u64> {
        let items = self
            .conn
            .execute("DELETE FROM sync_queue WHERE status = 'synced'", ())
            .await?;
        let sessions = LibSqlSessionRepository::new(self.conn)
            .clear_finished()
            .await?;
        Ok(items + sessions)
    }
}
