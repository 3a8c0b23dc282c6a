//! Push side of the sync engine.
//!
//! [`SyncScheduler`] runs incremental and full cycles under the single-flight
//! [`CycleLock`], records a session for each, and hands per-record lanes to
//! the push engine. [`SyncTimer`] triggers incremental cycles in the
//! background.

mod lanes;
mod lock;
mod timer;

pub use lanes::{push_lanes, PushJob, PushTally};
pub use lock::{CycleGuard, CycleLock, CycleState};
pub use timer::SyncTimer;

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::db::{
    LibSqlRecordRepository, LibSqlSessionRepository, LibSqlSyncConfigRepository,
    RecordRepository, SessionRepository, Store, SyncConfigRepository,
};
use crate::error::{Error, Result};
use crate::models::{
    CycleKind, QueueOperation, QueueStatus, RemoteTarget, SyncConfig, SyncSession, Table,
};
use crate::outbox::{Outbox, QueueRepository};
use crate::remote::{ConnectionStatus, RemoteAdapter, RemoteConnector};
use crate::vault::{Vault, SERVICE_KEY_ENTRY};

pub struct SyncScheduler {
    store: Store,
    outbox: Outbox,
    vault: Arc<Vault>,
    connector: Arc<dyn RemoteConnector>,
    config: EngineConfig,
    cycle: CycleLock,
}

impl SyncScheduler {
    pub fn new(
        store: Store,
        vault: Arc<Vault>,
        connector: Arc<dyn RemoteConnector>,
        config: EngineConfig,
    ) -> Self {
        Self {
            outbox: Outbox::new(store.clone()),
            store,
            vault,
            connector,
            config,
            cycle: CycleLock::new(),
        }
    }

    pub const fn cycle_lock(&self) -> &CycleLock {
        &self.cycle
    }

    pub const fn engine_config(&self) -> &EngineConfig {
        &self.config
    }

    pub const fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    pub fn state(&self) -> CycleState {
        self.cycle.state()
    }

    /// Active remote configuration, if one was saved
    pub async fn active_config(&self) -> Result<Option<SyncConfig>> {
        let db = self.store.lock().await;
        LibSqlSyncConfigRepository::new(db.connection()).active().await
    }

    /// Active configuration or a validation error telling the caller to save one
    pub async fn require_config(&self) -> Result<SyncConfig> {
        self.active_config()
            .await?
            .ok_or_else(|| Error::Validation("sync is not configured".to_string()))
    }

    /// Credentials of `config`, opening the vault entry when the key is sealed
    pub async fn resolve_target(&self, config: &SyncConfig) -> Result<RemoteTarget> {
        if !config.service_key_sealed {
            return RemoteTarget::new(
                config.url.clone(),
                config.anon_key.clone(),
                config.service_key.clone(),
            );
        }

        let access = self.vault.access().await;
        let secret = {
            let db = self.store.lock().await;
            access.open(db.connection(), SERVICE_KEY_ENTRY).await?
        };
        let secret = secret.ok_or_else(|| {
            Error::Auth("service key is missing from the vault; save the sync config again".to_string())
        })?;
        RemoteTarget::new(
            config.url.clone(),
            config.anon_key.clone(),
            secret.as_str()?.to_string(),
        )
    }

    /// Build an adapter for the active configuration
    pub async fn connect_active(&self) -> Result<Arc<dyn RemoteAdapter>> {
        let config = self.require_config().await?;
        let target = self.resolve_target(&config).await?;
        self.connector.connect(&target)
    }

    pub fn connect(&self, target: &RemoteTarget) -> Result<Arc<dyn RemoteAdapter>> {
        self.connector.connect(target)
    }

    /// Probe the active backend
    pub async fn test_connection(&self) -> Result<ConnectionStatus> {
        let adapter = self.connect_active().await?;
        Ok(adapter.test_connection().await)
    }

    /// Everything a cycle needs before touching the queue
    async fn preflight(&self) -> Result<Arc<dyn RemoteAdapter>> {
        let config = self.require_config().await?;
        if !config.sync_enabled {
            return Err(Error::Validation("sync is disabled".to_string()));
        }
        let target = self.resolve_target(&config).await?;
        self.connector.connect(&target)
    }

    /// Drain the pending queue once
    pub async fn run_incremental(&self) -> Result<String> {
        let _guard = self.cycle.try_begin(CycleKind::Incremental)?;
        let adapter = self.preflight().await?;

        let session_id = self.start_session(CycleKind::Incremental).await?;
        tracing::info!("Starting incremental sync");
        let drained = self.drain(adapter).await;
        let (queued, tally) = self.close_session(session_id, drained).await?;

        let summary = format!("{} synced, {} failed", tally.synced, tally.failed);
        tracing::info!("Incremental sync of {queued} items finished: {summary}");
        self.finish_cycle(tally, summary).await
    }

    /// Re-send every local record, optionally wiping the remote first
    pub async fn run_full(&self, truncate: bool) -> Result<String> {
        let _guard = self.cycle.try_begin(CycleKind::Full)?;
        let adapter = self.preflight().await?;

        // Nothing destructive happens before the backend proves usable
        adapter.test_connection().await.ensure_ready()?;
        if truncate {
            tracing::info!("Truncating remote tables before full sync");
            adapter.truncate_tables().await?;
        }

        let session_id = self.start_session(CycleKind::Full).await?;
        let requeued = match self.requeue_snapshot(truncate).await {
            Ok(count) => count,
            Err(error) => {
                self.finish_session(session_id, 0, 0, 0).await?;
                return Err(error);
            }
        };
        tracing::info!("Starting full sync of {requeued} records");
        let drained = self.drain(adapter).await;
        let (_, tally) = self.close_session(session_id, drained).await?;

        let summary = format!(
            "Full sync: {requeued} records queued, {} synced, {} failed",
            tally.synced, tally.failed
        );
        tracing::info!("{summary}");
        self.finish_cycle(tally, summary).await
    }

    /// Replace unsent items with one insert per local record, in one transaction.
    ///
    /// Without a truncate the remote may still hold rows deleted locally, so
    /// their queued hard deletes survive.
    async fn requeue_snapshot(&self, truncated: bool) -> Result<i64> {
        let db = self.store.lock().await;
        let tx = db.connection().transaction().await?;
        let queue = QueueRepository::new(&tx);
        let discarded = queue.discard_unsent(!truncated).await?;
        if discarded > 0 {
            tracing::info!("Dropped {discarded} unsent items superseded by full sync");
        }

        let records = LibSqlRecordRepository::new(&tx);
        let mut queued = 0;
        for table in Table::ALL {
            for record in records.list(table).await? {
                queue.enqueue_record(QueueOperation::Insert, &record).await?;
                queued += 1;
            }
        }
        tx.commit().await?;
        Ok(queued)
    }

    /// Push pending batches until the queue has nothing eligible left
    async fn drain(&self, adapter: Arc<dyn RemoteAdapter>) -> Result<(i64, PushTally)> {
        let mut queued = 0;
        let mut tally = PushTally::default();

        loop {
            let batch = self.outbox.dequeue_batch(self.config.batch_size).await?;
            if batch.is_empty() {
                break;
            }
            queued += i64::try_from(batch.len()).unwrap_or(i64::MAX);

            for item in &batch {
                self.outbox
                    .mark_status(item.id, QueueStatus::Syncing, None)
                    .await?;
            }
            let jobs = batch.into_iter().map(PushJob::from_item).collect();
            let pushed = push_lanes(
                Arc::clone(&adapter),
                jobs,
                Some(self.outbox.clone()),
                &self.config,
            )
            .await?;
            tally.absorb(pushed);

            if tally.fatal.is_some() {
                break;
            }
        }
        Ok((queued, tally))
    }

    pub(crate) async fn start_session(&self, kind: CycleKind) -> Result<i64> {
        let db = self.store.lock().await;
        LibSqlSessionRepository::new(db.connection())
            .start(kind)
            .await
    }

    /// Record the outcome of a cycle on its session, then pass it through
    pub(crate) async fn close_session(
        &self,
        session_id: i64,
        outcome: Result<(i64, PushTally)>,
    ) -> Result<(i64, PushTally)> {
        let (queued, synced, failed) = match &outcome {
            Ok((queued, tally)) => (*queued, tally.synced, tally.failed),
            Err(_) => (0, 0, 0),
        };
        let session = self.finish_session(session_id, queued, synced, failed).await?;
        tracing::debug!("Session {} closed as {:?}", session.id, session.status);
        outcome
    }

    pub(crate) async fn finish_session(
        &self,
        session_id: i64,
        queued: i64,
        synced: i64,
        failed: i64,
    ) -> Result<SyncSession> {
        let db = self.store.lock().await;
        LibSqlSessionRepository::new(db.connection())
            .finish(session_id, queued, synced, failed)
            .await
    }

    /// Trim history, then surface a cycle-aborting error or the summary
    async fn finish_cycle(&self, tally: PushTally, summary: String) -> Result<String> {
        self.prune_history().await;
        match tally.fatal {
            Some(error) => {
                tracing::warn!("Sync aborted after {summary}: {error}");
                Err(error)
            }
            None => Ok(summary),
        }
    }

    pub(crate) async fn prune_history(&self) {
        if let Err(error) = self
            .outbox
            .prune_history(self.config.history_retention)
            .await
        {
            tracing::warn!("Failed to prune sync history: {error}");
        }
    }

    pub async fn recent_sessions(&self, limit: u32) -> Result<Vec<SyncSession>> {
        let db = self.store.lock().await;
        LibSqlSessionRepository::new(db.connection())
            .list_recent(limit)
            .await
    }
}
