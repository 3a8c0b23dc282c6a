//! Remote-to-local apply path.
//!
//! Remote rows land in the local store without touching the outbox, one
//! transaction per change. Conflicts resolve by application order: a remote
//! change overwrites the local row, and a still-pending local item for the
//! same record re-pushes and wins again on the next cycle.

use std::sync::Arc;

use crate::db::{
    get_state, set_state, LibSqlRecordRepository, RecordRepository, Store, PULL_CURSOR_KEY,
};
use crate::error::{Error, Result};
use crate::models::{ChangeType, CycleKind, RecordPayload, RemoteChange};
use crate::sync::SyncScheduler;

pub struct PullEngine {
    store: Store,
    scheduler: Arc<SyncScheduler>,
}

/// Counts of one apply run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub applied: i64,
    pub skipped: i64,
    /// Highest `updated_at` among applied changes
    pub cursor: Option<i64>,
}

impl ApplyOutcome {
    pub fn summary(&self) -> String {
        format!("{} applied, {} skipped", self.applied, self.skipped)
    }
}

impl PullEngine {
    pub const fn new(store: Store, scheduler: Arc<SyncScheduler>) -> Self {
        Self { store, scheduler }
    }

    /// Highest remote `updated_at` applied so far
    pub async fn cursor(&self) -> Result<i64> {
        let db = self.store.lock().await;
        let Some(raw) = get_state(db.connection(), PULL_CURSOR_KEY).await? else {
            return Ok(0);
        };
        raw.parse()
            .map_err(|_| Error::Database(format!("corrupt pull cursor '{raw}'")))
    }

    /// Remote rows changed since the stored cursor
    pub async fn fetch_remote_changes(&self) -> Result<Vec<RemoteChange>> {
        let _guard = self.scheduler.cycle_lock().try_begin(CycleKind::Pull)?;
        self.fetch().await
    }

    /// Apply changes to the local store and advance the cursor
    pub async fn apply_remote_changes(&self, changes: &[RemoteChange]) -> Result<String> {
        let _guard = self.scheduler.cycle_lock().try_begin(CycleKind::Pull)?;
        let outcome = self.apply(changes).await?;
        Ok(outcome.summary())
    }

    /// Fetch and apply under a single hold of the cycle lock
    pub async fn pull(&self) -> Result<String> {
        let _guard = self.scheduler.cycle_lock().try_begin(CycleKind::Pull)?;
        let changes = self.fetch().await?;
        let outcome = self.apply(&changes).await?;
        Ok(outcome.summary())
    }

    async fn fetch(&self) -> Result<Vec<RemoteChange>> {
        let adapter = self.scheduler.connect_active().await?;
        let since = self.cursor().await?;
        let changes = adapter.pull(since).await?;
        tracing::info!("Fetched {} remote changes since {since}", changes.len());
        Ok(changes)
    }

    async fn apply(&self, changes: &[RemoteChange]) -> Result<ApplyOutcome> {
        let session_id = self.scheduler.start_session(CycleKind::Pull).await?;
        let total = i64::try_from(changes.len()).unwrap_or(i64::MAX);

        let mut outcome = ApplyOutcome::default();
        for change in changes {
            let record = match decode_change(change) {
                Ok(record) => record,
                Err(error) => {
                    tracing::warn!(
                        "Skipping remote change for {} #{}: {error}",
                        change.table_name,
                        change.record_id
                    );
                    outcome.skipped += 1;
                    continue;
                }
            };

            if let Err(error) = self.apply_one(change.change_type, &record).await {
                self.scheduler
                    .finish_session(session_id, total, outcome.applied, outcome.skipped + 1)
                    .await?;
                return Err(error);
            }
            outcome.applied += 1;
            let updated_at = record.updated_at();
            outcome.cursor = Some(outcome.cursor.map_or(updated_at, |cursor| cursor.max(updated_at)));
        }

        if let Some(cursor) = outcome.cursor {
            self.advance_cursor(cursor).await?;
        }
        self.scheduler
            .finish_session(session_id, total, outcome.applied, outcome.skipped)
            .await?;
        self.scheduler.prune_history().await;

        tracing::info!("Applied remote changes: {}", outcome.summary());
        Ok(outcome)
    }

    async fn apply_one(&self, change_type: ChangeType, record: &RecordPayload) -> Result<()> {
        let db = self.store.lock().await;
        let tx = db.connection().transaction().await?;
        let records = LibSqlRecordRepository::new(&tx);
        match change_type {
            ChangeType::New => {
                records.insert_if_absent(record).await?;
            }
            ChangeType::Modified => records.upsert(record).await?,
        }
        tx.commit().await?;
        Ok(())
    }

    /// Move the cursor forward, never back
    async fn advance_cursor(&self, candidate: i64) -> Result<()> {
        let current = self.cursor().await?;
        if candidate > current {
            let db = self.store.lock().await;
            set_state(db.connection(), PULL_CURSOR_KEY, &candidate.to_string()).await?;
        }
        Ok(())
    }
}

fn decode_change(change: &RemoteChange) -> Result<RecordPayload> {
    let record = change.record()?;
    if record.record_id() != change.record_id {
        return Err(Error::Validation(format!(
            "payload id {} does not match record id {}",
            record.record_id(),
            change.record_id
        )));
    }
    if record.record_id() <= 0 {
        return Err(Error::Validation("record id must be positive".to_string()));
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::db::{LibSqlSyncConfigRepository, SyncConfigRepository};
    use crate::fixtures::{customer_record, target};
    use crate::models::{QueueStats, SessionStatus, Table};
    use crate::records::RecordStore;
    use crate::remote::{MemoryConnector, MemoryRemote};
    use crate::vault::{KdfParams, Vault};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const URL: &str = "https://pull.example.com";

    struct Harness {
        store: Store,
        remote: Arc<MemoryRemote>,
        pull: PullEngine,
        scheduler: Arc<SyncScheduler>,
    }

    async fn harness() -> Harness {
        let store = Store::open_in_memory().await.unwrap();
        {
            let db = store.lock().await;
            LibSqlSyncConfigRepository::new(db.connection())
                .replace(&target(URL), false)
                .await
                .unwrap();
        }
        let remote = Arc::new(MemoryRemote::new());
        let scheduler = Arc::new(SyncScheduler::new(
            store.clone(),
            Arc::new(Vault::with_params(store.clone(), KdfParams::fast())),
            Arc::new(MemoryConnector::new().with_backend(URL, remote.clone())),
            EngineConfig::default(),
        ));
        Harness {
            pull: PullEngine::new(store.clone(), scheduler.clone()),
            store,
            remote,
            scheduler,
        }
    }

    fn change(record_id: i64, change_type: ChangeType, payload: serde_json::Value) -> RemoteChange {
        RemoteChange {
            table_name: Table::Customers,
            record_id,
            change_type,
            payload,
        }
    }

    fn customer_json(id: i64, name: &str, created_at: i64, updated_at: i64) -> serde_json::Value {
        json!({
            "id": id,
            "name": name,
            "created_at": created_at,
            "updated_at": updated_at,
        })
    }

    async fn snapshot(store: &Store) -> Vec<RecordPayload> {
        let db = store.lock().await;
        LibSqlRecordRepository::new(db.connection())
            .list(Table::Customers)
            .await
            .unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_apply_is_idempotent_and_never_enqueues() {
        let h = harness().await;
        let changes = vec![
            change(1, ChangeType::New, customer_json(1, "Hla", 10, 10)),
            change(2, ChangeType::Modified, customer_json(2, "Mya", 10, 40)),
        ];

        assert_eq!(
            h.pull.apply_remote_changes(&changes).await.unwrap(),
            "2 applied, 0 skipped"
        );
        let once = snapshot(&h.store).await;
        h.pull.apply_remote_changes(&changes).await.unwrap();
        assert_eq!(snapshot(&h.store).await, once);
        assert_eq!(once.len(), 2);

        assert_eq!(
            h.scheduler.outbox().stats().await.unwrap(),
            QueueStats::default()
        );
        assert_eq!(h.pull.cursor().await.unwrap(), 40);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_new_keeps_existing_row_and_modified_overwrites() {
        let h = harness().await;
        RecordStore::new(h.store.clone())
            .save(customer_record(1, "Local"))
            .await
            .unwrap();

        h.pull
            .apply_remote_changes(&[change(1, ChangeType::New, customer_json(1, "Remote", 5, 5))])
            .await
            .unwrap();
        let local = &snapshot(&h.store).await[0];
        assert_eq!(local.to_value().unwrap()["name"], "Local");

        h.pull
            .apply_remote_changes(&[change(
                1,
                ChangeType::Modified,
                customer_json(1, "Remote", 5, 9),
            )])
            .await
            .unwrap();
        let local = &snapshot(&h.store).await[0];
        assert_eq!(local.to_value().unwrap()["name"], "Remote");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_malformed_changes_are_skipped() {
        let h = harness().await;
        let changes = vec![
            change(1, ChangeType::New, json!({"id": 1, "created_at": 1})),
            change(2, ChangeType::New, customer_json(3, "wrong id", 1, 1)),
            change(4, ChangeType::New, customer_json(4, "ok", 7, 7)),
        ];

        assert_eq!(
            h.pull.apply_remote_changes(&changes).await.unwrap(),
            "1 applied, 2 skipped"
        );
        assert_eq!(snapshot(&h.store).await.len(), 1);

        let session = &h.scheduler.recent_sessions(1).await.unwrap()[0];
        assert_eq!(session.kind, CycleKind::Pull);
        assert_eq!(
            (session.total_queued, session.total_synced, session.total_failed),
            (3, 1, 2)
        );
        assert_eq!(session.status, SessionStatus::Completed);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_fetch_uses_cursor() {
        let h = harness().await;
        h.remote
            .seed_row(Table::Customers, customer_json(1, "first", 100, 100))
            .await;

        assert_eq!(h.pull.pull().await.unwrap(), "1 applied, 0 skipped");
        assert!(h.pull.fetch_remote_changes().await.unwrap().is_empty());

        h.remote
            .seed_row(Table::Customers, customer_json(1, "edited", 100, 200))
            .await;
        let changes = h.pull.fetch_remote_changes().await.unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].change_type, ChangeType::Modified);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_pull_respects_cycle_lock() {
        let h = harness().await;
        let _guard = h
            .scheduler
            .cycle_lock()
            .try_begin(CycleKind::Incremental)
            .unwrap();

        assert!(matches!(
            h.pull.fetch_remote_changes().await,
            Err(Error::SyncInProgress)
        ));
        assert!(matches!(
            h.pull.apply_remote_changes(&[]).await,
            Err(Error::SyncInProgress)
        ));
    }
}
