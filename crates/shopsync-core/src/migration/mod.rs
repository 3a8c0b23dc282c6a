//! Move replication to a new backend instance.
//!
//! Every step gates the next: master password, reachability and schema of
//! the new target, a full snapshot push against it, and only then the swap
//! of the active configuration. Until the swap the old backend stays active
//! and keeps its queue.

use std::sync::Arc;

use crate::db::{
    LibSqlRecordRepository, LibSqlSyncConfigRepository, RecordRepository, Store,
    SyncConfigRepository,
};
use crate::error::{Error, Result};
use crate::models::{CycleKind, RemoteTarget, SyncConfig, Table};
use crate::sync::{push_lanes, PushJob, SyncScheduler};
use crate::vault::{self, Vault, SERVICE_KEY_ENTRY};

pub struct MigrationCoordinator {
    store: Store,
    vault: Arc<Vault>,
    scheduler: Arc<SyncScheduler>,
}

impl MigrationCoordinator {
    pub const fn new(store: Store, vault: Arc<Vault>, scheduler: Arc<SyncScheduler>) -> Self {
        Self {
            store,
            vault,
            scheduler,
        }
    }

    /// Push the whole local store to `target` and make it the active backend.
    ///
    /// The new target is emptied first. When any record fails, nothing is
    /// swapped and the error names how many failed; rows already written to
    /// the new target stay there and are overwritten by the next attempt.
    pub async fn migrate(&self, master_password: &str, target: RemoteTarget) -> Result<String> {
        let _guard = self
            .scheduler
            .cycle_lock()
            .try_begin(CycleKind::Migration)?;

        if !self.vault.is_initialized().await? {
            return Err(Error::Auth(
                "set a master password before migrating".to_string(),
            ));
        }
        if !self.vault.verify_master_password(master_password).await? {
            return Err(Error::Auth("master password is incorrect".to_string()));
        }

        let adapter = self.scheduler.connect(&target)?;
        adapter.test_connection().await.ensure_ready()?;

        tracing::info!("Migrating to {}", target.url);
        adapter.truncate_tables().await?;

        let jobs = self.snapshot_jobs().await?;
        let total = i64::try_from(jobs.len()).unwrap_or(i64::MAX);
        let session_id = self.scheduler.start_session(CycleKind::Migration).await?;
        let pushed = push_lanes(adapter, jobs, None, self.scheduler.engine_config()).await;
        let tally = match pushed {
            Ok(tally) => tally,
            Err(error) => {
                self.scheduler.finish_session(session_id, total, 0, 0).await?;
                return Err(error);
            }
        };
        self.scheduler
            .finish_session(session_id, total, tally.synced, tally.failed)
            .await?;

        if let Some(error) = tally.fatal {
            tracing::warn!("Migration to {} aborted: {error}", target.url);
            return Err(error);
        }
        if tally.failed > 0 {
            tracing::warn!(
                "Migration to {} aborted: {} of {total} records failed",
                target.url,
                tally.failed
            );
            return Err(Error::Push(format!(
                "Migration aborted: {} of {total} records failed to push; the previous backend stays active",
                tally.failed
            )));
        }

        let config = self.swap_config(&target).await?;
        tracing::info!(
            "Migration complete; sync config #{} now targets {}",
            config.id.unwrap_or_default(),
            config.url
        );
        Ok(format!(
            "Migration complete: {} records pushed to {}",
            tally.synced, target.url
        ))
    }

    async fn snapshot_jobs(&self) -> Result<Vec<PushJob>> {
        let db = self.store.lock().await;
        let records = LibSqlRecordRepository::new(db.connection());
        let mut jobs = Vec::new();
        for table in Table::ALL {
            for record in records.list(table).await? {
                jobs.push(PushJob::snapshot(&record)?);
            }
        }
        Ok(jobs)
    }

    /// Seal the new service key and activate the new row in one transaction
    async fn swap_config(&self, target: &RemoteTarget) -> Result<SyncConfig> {
        let access = self.vault.access().await;
        let entry = access.seal(SERVICE_KEY_ENTRY, &target.service_key)?;

        let db = self.store.lock().await;
        let tx = db.connection().transaction().await?;
        let config = LibSqlSyncConfigRepository::new(&tx)
            .replace(target, true)
            .await?;
        vault::write_entry(&tx, &entry).await?;
        tx.commit().await?;
        Ok(config)
    }
}
