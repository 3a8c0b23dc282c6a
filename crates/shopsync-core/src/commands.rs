//! Command surface of the sync engine.
//!
//! [`SyncService`] wires the components together and exposes every command
//! twice: as a typed async method, and through [`SyncService::invoke`], which
//! takes a command name plus a JSON argument object and answers with JSON or
//! an error string.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::config::EngineConfig;
use crate::db::{
    LibSqlSessionRepository, LibSqlSyncConfigRepository, SessionRepository, Store,
    SyncConfigRepository,
};
use crate::error::{Error, Result};
use crate::migration::MigrationCoordinator;
use crate::models::{
    QueueItem, QueueStats, QueueStatus, RemoteChange, RemoteTarget, SyncConfig, SyncSession,
};
use crate::outbox::Outbox;
use crate::pull::PullEngine;
use crate::records::RecordStore;
use crate::remote::{migration_sql, ConnectionStatus, RemoteConnector};
use crate::sync::{CycleState, SyncScheduler, SyncTimer};
use crate::vault::{self, Vault, SERVICE_KEY_ENTRY};

const DEFAULT_LIST_LIMIT: u32 = 50;

/// Names accepted by [`SyncService::invoke`]
pub const COMMANDS: [&str; 20] = [
    "save_sync_config",
    "get_sync_config",
    "update_sync_interval",
    "test_sync_connection",
    "get_migration_sql",
    "trigger_sync_now",
    "trigger_full_sync",
    "truncate_and_sync",
    "get_sync_queue_stats",
    "get_sync_sessions",
    "get_sync_queue_items",
    "retry_failed_items",
    "clear_synced_items",
    "set_master_password",
    "verify_master_password",
    "migrate_to_new_database",
    "fetch_remote_changes",
    "apply_remote_changes",
    "clean_sync_data",
    "lock_vault",
];

pub struct SyncService {
    store: Store,
    vault: Arc<Vault>,
    scheduler: Arc<SyncScheduler>,
    pull: PullEngine,
    migration: MigrationCoordinator,
    records: RecordStore,
    timer: Mutex<Option<SyncTimer>>,
}

impl SyncService {
    /// Assemble the engine and recover items a crash left mid-push
    pub async fn start(
        store: Store,
        vault: Vault,
        connector: Arc<dyn RemoteConnector>,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate()?;
        let vault = Arc::new(vault);
        let scheduler = Arc::new(SyncScheduler::new(
            store.clone(),
            Arc::clone(&vault),
            connector,
            config,
        ));
        let service = Self {
            pull: PullEngine::new(store.clone(), Arc::clone(&scheduler)),
            migration: MigrationCoordinator::new(
                store.clone(),
                Arc::clone(&vault),
                Arc::clone(&scheduler),
            ),
            records: RecordStore::new(store.clone()),
            store,
            vault,
            scheduler,
            timer: Mutex::new(None),
        };
        service.outbox().recover_interrupted().await?;
        service.close_interrupted_sessions().await?;
        Ok(service)
    }

    async fn close_interrupted_sessions(&self) -> Result<()> {
        let db = self.store.lock().await;
        let closed = LibSqlSessionRepository::new(db.connection())
            .close_interrupted()
            .await?;
        if closed > 0 {
            tracing::warn!("Closed {closed} sync sessions interrupted by a crash");
        }
        Ok(())
    }

    /// Business record writes that feed the outbox
    pub const fn records(&self) -> &RecordStore {
        &self.records
    }

    pub fn outbox(&self) -> &Outbox {
        self.scheduler.outbox()
    }

    pub fn cycle_state(&self) -> CycleState {
        self.scheduler.state()
    }

    /// Start the background timer; a running timer is left alone
    pub async fn start_background_sync(&self) -> bool {
        let mut timer = self.timer.lock().await;
        if timer.as_ref().is_some_and(SyncTimer::is_running) {
            return false;
        }
        *timer = Some(SyncTimer::start(Arc::clone(&self.scheduler)));
        true
    }

    pub async fn stop_background_sync(&self) {
        let timer = self.timer.lock().await.take();
        if let Some(timer) = timer {
            timer.stop().await;
        }
    }

    /// Stop the timer and forget the unlocked vault key
    pub async fn shutdown(&self) {
        self.stop_background_sync().await;
        self.vault.lock().await;
    }

    pub async fn save_sync_config(&self, url: &str, anon_key: &str, service_key: &str) -> Result<()> {
        let target = RemoteTarget::new(url, anon_key, service_key)?;

        if self.vault.is_initialized().await? {
            let access = self.vault.access().await;
            let entry = access.seal(SERVICE_KEY_ENTRY, &target.service_key)?;
            let db = self.store.lock().await;
            let tx = db.connection().transaction().await?;
            LibSqlSyncConfigRepository::new(&tx)
                .replace(&target, true)
                .await?;
            vault::write_entry(&tx, &entry).await?;
            tx.commit().await?;
        } else {
            let db = self.store.lock().await;
            let tx = db.connection().transaction().await?;
            LibSqlSyncConfigRepository::new(&tx)
                .replace(&target, false)
                .await?;
            tx.commit().await?;
        }
        tracing::info!("Saved sync config for {}", target.url);
        Ok(())
    }

    pub async fn get_sync_config(&self) -> Result<Option<SyncConfig>> {
        self.scheduler.active_config().await
    }

    pub async fn update_sync_interval(&self, seconds: u64) -> Result<()> {
        let db = self.store.lock().await;
        LibSqlSyncConfigRepository::new(db.connection())
            .set_interval(seconds)
            .await
    }

    pub async fn test_sync_connection(&self) -> Result<ConnectionStatus> {
        self.scheduler.test_connection().await
    }

    pub const fn get_migration_sql(&self) -> &'static str {
        migration_sql()
    }

    pub async fn trigger_sync_now(&self) -> Result<String> {
        self.scheduler.run_incremental().await
    }

    /// Initial upload: re-send everything without clearing the remote
    pub async fn trigger_full_sync(&self) -> Result<String> {
        self.scheduler.run_full(false).await
    }

    pub async fn truncate_and_sync(&self) -> Result<String> {
        self.scheduler.run_full(true).await
    }

    pub async fn get_sync_queue_stats(&self) -> Result<QueueStats> {
        self.outbox().stats().await
    }

    pub async fn get_sync_sessions(&self, limit: u32) -> Result<Vec<SyncSession>> {
        self.scheduler.recent_sessions(limit).await
    }

    pub async fn get_sync_queue_items(
        &self,
        status: Option<QueueStatus>,
        limit: u32,
    ) -> Result<Vec<QueueItem>> {
        self.outbox().list_items(status, limit).await
    }

    pub async fn retry_failed_items(&self) -> Result<u64> {
        self.outbox().retry_failed().await
    }

    pub async fn clear_synced_items(&self, older_than_days: u32) -> Result<u64> {
        self.outbox().clear_synced(older_than_days).await
    }

    /// Remove synced items and finished sessions
    pub async fn clean_sync_data(&self) -> Result<u64> {
        self.outbox().clear_history().await
    }

    /// Set or change the master password, then move a plaintext service key into the vault
    pub async fn set_master_password(&self, current: Option<&str>, new_master: &str) -> Result<()> {
        self.vault.set_master_password(current, new_master).await?;
        self.seal_legacy_service_key().await
    }

    pub async fn has_master_password(&self) -> Result<bool> {
        self.vault.is_initialized().await
    }

    pub async fn verify_master_password(&self, input: &str) -> Result<bool> {
        self.vault.verify_master_password(input).await
    }

    pub async fn lock_vault(&self) {
        self.vault.lock().await;
    }

    pub async fn migrate_to_new_database(
        &self,
        master_password: &str,
        new_url: &str,
        new_anon_key: &str,
        new_service_key: &str,
    ) -> Result<String> {
        let target = RemoteTarget::new(new_url, new_anon_key, new_service_key)?;
        self.migration.migrate(master_password, target).await
    }

    pub async fn fetch_remote_changes(&self) -> Result<Vec<RemoteChange>> {
        self.pull.fetch_remote_changes().await
    }

    pub async fn apply_remote_changes(&self, changes: &[RemoteChange]) -> Result<String> {
        self.pull.apply_remote_changes(changes).await
    }

    /// Fetch and apply remote changes in one cycle
    pub async fn pull_remote_changes(&self) -> Result<String> {
        self.pull.pull().await
    }

    async fn seal_legacy_service_key(&self) -> Result<()> {
        let Some(config) = self.scheduler.active_config().await? else {
            return Ok(());
        };
        if config.service_key_sealed || config.service_key.is_empty() {
            return Ok(());
        }

        let access = self.vault.access().await;
        let entry = access.seal(SERVICE_KEY_ENTRY, &config.service_key)?;
        let db = self.store.lock().await;
        let tx = db.connection().transaction().await?;
        vault::write_entry(&tx, &entry).await?;
        LibSqlSyncConfigRepository::new(&tx).mark_sealed().await?;
        tx.commit().await?;
        tracing::info!("Moved the stored service key into the vault");
        Ok(())
    }

    /// Run a command by name with JSON arguments
    pub async fn invoke(&self, command: &str, args: Value) -> std::result::Result<Value, String> {
        self.dispatch(command, args).await.map_err(String::from)
    }

    async fn dispatch(&self, command: &str, args: Value) -> Result<Value> {
        match command {
            "save_sync_config" => {
                let args: SaveConfigArgs = parse_args(command, args)?;
                self.save_sync_config(&args.url, &args.anon_key, &args.service_key)
                    .await?;
                Ok(Value::Null)
            }
            "get_sync_config" => Ok(serde_json::to_value(self.get_sync_config().await?)?),
            "update_sync_interval" => {
                let args: IntervalArgs = parse_args(command, args)?;
                self.update_sync_interval(args.interval).await?;
                Ok(Value::Null)
            }
            "test_sync_connection" => Ok(serde_json::to_value(self.test_sync_connection().await?)?),
            "get_migration_sql" => Ok(json!(self.get_migration_sql())),
            "trigger_sync_now" => Ok(json!(self.trigger_sync_now().await?)),
            "trigger_full_sync" => Ok(json!(self.trigger_full_sync().await?)),
            "truncate_and_sync" => Ok(json!(self.truncate_and_sync().await?)),
            "get_sync_queue_stats" => Ok(serde_json::to_value(self.get_sync_queue_stats().await?)?),
            "get_sync_sessions" => {
                let args: LimitArgs = parse_args(command, args)?;
                Ok(serde_json::to_value(
                    self.get_sync_sessions(args.limit.unwrap_or(DEFAULT_LIST_LIMIT))
                        .await?,
                )?)
            }
            "get_sync_queue_items" => {
                let args: QueueItemsArgs = parse_args(command, args)?;
                let status = args
                    .status
                    .as_deref()
                    .map(str::parse::<QueueStatus>)
                    .transpose()?;
                Ok(serde_json::to_value(
                    self.get_sync_queue_items(status, args.limit.unwrap_or(DEFAULT_LIST_LIMIT))
                        .await?,
                )?)
            }
            "retry_failed_items" => Ok(json!(self.retry_failed_items().await?)),
            "clear_synced_items" => {
                let args: ClearArgs = parse_args(command, args)?;
                Ok(json!(self.clear_synced_items(args.older_than_days).await?))
            }
            "clean_sync_data" => Ok(json!(self.clean_sync_data().await?)),
            "set_master_password" => {
                let args: MasterPasswordArgs = parse_args(command, args)?;
                self.set_master_password(args.current_password.as_deref(), &args.new_master)
                    .await?;
                Ok(Value::Null)
            }
            "verify_master_password" => {
                let args: VerifyArgs = parse_args(command, args)?;
                Ok(json!(self.verify_master_password(&args.input).await?))
            }
            "lock_vault" => {
                self.lock_vault().await;
                Ok(Value::Null)
            }
            "migrate_to_new_database" => {
                let args: MigrateArgs = parse_args(command, args)?;
                Ok(json!(
                    self.migrate_to_new_database(
                        &args.master_password,
                        &args.new_url,
                        &args.new_anon_key,
                        &args.new_service_key,
                    )
                    .await?
                ))
            }
            "fetch_remote_changes" => Ok(serde_json::to_value(self.fetch_remote_changes().await?)?),
            "apply_remote_changes" => {
                let args: ApplyArgs = parse_args(command, args)?;
                Ok(json!(self.apply_remote_changes(&args.changes).await?))
            }
            other => Err(Error::Validation(format!("unknown command '{other}'"))),
        }
    }
}

fn parse_args<T: DeserializeOwned>(command: &str, args: Value) -> Result<T> {
    // Commands without arguments may be sent `null`
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args)
        .map_err(|error| Error::Validation(format!("invalid arguments for {command}: {error}")))
}

#[derive(Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
struct SaveConfigArgs {
    url: String,
    anon_key: String,
    service_key: String,
}

#[derive(Deserialize)]
struct IntervalArgs {
    interval: u64,
}

#[derive(Deserialize)]
struct LimitArgs {
    limit: Option<u32>,
}

#[derive(Deserialize)]
struct QueueItemsArgs {
    status: Option<String>,
    limit: Option<u32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClearArgs {
    older_than_days: u32,
}

#[derive(Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
struct MasterPasswordArgs {
    current_password: Option<String>,
    new_master: String,
}

#[derive(Deserialize, Zeroize, ZeroizeOnDrop)]
struct VerifyArgs {
    input: String,
}

#[derive(Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
struct MigrateArgs {
    master_password: String,
    new_url: String,
    new_anon_key: String,
    new_service_key: String,
}

#[derive(Deserialize)]
struct ApplyArgs {
    changes: Vec<RemoteChange>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::customer_record;
    use crate::models::{CycleKind, QueueOperation, SessionStatus, Table};
    use crate::remote::{MemoryConnector, MemoryRemote};
    use crate::vault::KdfParams;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    const URL: &str = "https://shop.example.com";
    const NEW_URL: &str = "https://fresh.example.com";

    struct Harness {
        service: Arc<SyncService>,
        remote: Arc<MemoryRemote>,
        fresh: Arc<MemoryRemote>,
    }

    async fn harness_with(remote: MemoryRemote) -> Harness {
        let store = Store::open_in_memory().await.unwrap();
        let remote = Arc::new(remote);
        let fresh = Arc::new(MemoryRemote::new());
        let connector = MemoryConnector::new()
            .with_backend(URL, remote.clone())
            .with_backend(NEW_URL, fresh.clone());
        let service = SyncService::start(
            store.clone(),
            Vault::with_params(store, KdfParams::fast()),
            Arc::new(connector),
            EngineConfig::default(),
        )
        .await
        .unwrap();
        service
            .invoke(
                "save_sync_config",
                json!({"url": URL, "anonKey": "anon", "serviceKey": "service"}),
            )
            .await
            .unwrap();
        Harness {
            service: Arc::new(service),
            remote,
            fresh,
        }
    }

    async fn harness() -> Harness {
        harness_with(MemoryRemote::new()).await
    }

    async fn stats(service: &SyncService) -> Value {
        service.invoke("get_sync_queue_stats", Value::Null).await.unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_scenario_empty_queue() {
        let h = harness().await;

        let summary = h.service.invoke("trigger_sync_now", Value::Null).await.unwrap();
        assert!(summary.as_str().unwrap().starts_with("0 synced"));
        assert_eq!(
            stats(&h.service).await,
            json!({"pending": 0, "syncing": 0, "synced": 0, "failed": 0})
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_scenario_partial_failures_then_retry() {
        let h = harness().await;
        for id in 1..=5 {
            h.service
                .records()
                .save(customer_record(id, "Customer"))
                .await
                .unwrap();
        }
        h.remote.fail_record(Table::Customers, 2).await;
        h.remote.fail_record(Table::Customers, 5).await;

        h.service.invoke("trigger_sync_now", json!({})).await.unwrap();
        assert_eq!(
            stats(&h.service).await,
            json!({"pending": 0, "syncing": 0, "synced": 3, "failed": 2})
        );

        let failed = h
            .service
            .invoke("get_sync_queue_items", json!({"status": "failed", "limit": 10}))
            .await
            .unwrap();
        assert_eq!(failed.as_array().unwrap().len(), 2);
        assert_eq!(failed[0]["retry_count"], 1);

        assert_eq!(
            h.service.invoke("retry_failed_items", Value::Null).await.unwrap(),
            json!(2)
        );
        assert_eq!(
            stats(&h.service).await,
            json!({"pending": 2, "syncing": 0, "synced": 3, "failed": 0})
        );
        assert_eq!(
            h.service.invoke("retry_failed_items", Value::Null).await.unwrap(),
            json!(0)
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_scenario_migration_to_schemaless_target() {
        let h = harness().await;
        h.service
            .invoke("set_master_password", json!({"currentPassword": null, "newMaster": "pw"}))
            .await
            .unwrap();
        h.fresh.set_tables_exist(false);

        let error = h
            .service
            .invoke(
                "migrate_to_new_database",
                json!({
                    "masterPassword": "pw",
                    "newUrl": NEW_URL,
                    "newAnonKey": "fresh-anon",
                    "newServiceKey": "fresh-service",
                }),
            )
            .await
            .unwrap_err();
        assert!(error.contains("get_migration_sql"));

        let config = h.service.invoke("get_sync_config", Value::Null).await.unwrap();
        assert_eq!(config["url"], URL);
        assert_eq!(config["anon_key"], "anon");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_scenario_successful_migration() {
        let h = harness().await;
        h.service
            .set_master_password(None, "pw")
            .await
            .unwrap();
        h.service
            .records()
            .save(customer_record(1, "Aye"))
            .await
            .unwrap();

        let summary = h
            .service
            .invoke(
                "migrate_to_new_database",
                json!({
                    "masterPassword": "pw",
                    "newUrl": NEW_URL,
                    "newAnonKey": "fresh-anon",
                    "newServiceKey": "fresh-service",
                }),
            )
            .await
            .unwrap();
        assert!(summary.as_str().unwrap().starts_with("Migration complete"));

        let config = h.service.invoke("get_sync_config", Value::Null).await.unwrap();
        assert_eq!(config["url"], NEW_URL);
        assert_eq!(config["anon_key"], "fresh-anon");
        assert!(config.get("service_key").is_none());
        assert!(h.fresh.row(Table::Customers, 1).await.is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_scenario_concurrent_sync_now() {
        let h = harness_with(MemoryRemote::with_latency(Duration::from_millis(200))).await;
        h.service
            .records()
            .save(customer_record(1, "slow"))
            .await
            .unwrap();

        let first = {
            let service = h.service.clone();
            tokio::spawn(async move { service.invoke("trigger_sync_now", Value::Null).await })
        };
        while h.service.cycle_state() == CycleState::Idle {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let second = h.service.invoke("trigger_sync_now", Value::Null).await;
        assert_eq!(second, Err("sync already in progress".to_string()));
        assert_eq!(first.await.unwrap().unwrap(), json!("1 synced, 0 failed"));
        assert_eq!(h.remote.push_log().await.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_master_password_seals_saved_service_key() {
        let h = harness().await;
        let before = h.service.get_sync_config().await.unwrap().unwrap();
        assert!(!before.service_key_sealed);

        h.service.set_master_password(None, "pw").await.unwrap();
        let after = h.service.get_sync_config().await.unwrap().unwrap();
        assert!(after.service_key_sealed);
        assert!(after.service_key.is_empty());

        // New saves go straight into the vault
        h.service
            .save_sync_config(URL, "anon-2", "service-2")
            .await
            .unwrap();
        let saved = h.service.get_sync_config().await.unwrap().unwrap();
        assert!(saved.service_key_sealed);

        h.service.lock_vault().await;
        assert!(h
            .service
            .save_sync_config(URL, "anon-3", "service-3")
            .await
            .is_err());
        assert_eq!(
            h.service
                .invoke("verify_master_password", json!({"input": "pw"}))
                .await
                .unwrap(),
            json!(true)
        );
        assert_eq!(
            h.service.invoke("trigger_sync_now", Value::Null).await.unwrap(),
            json!("0 synced, 0 failed")
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_pull_commands_round_trip_json() {
        let h = harness().await;
        h.remote
            .seed_row(
                Table::Customers,
                json!({"id": 3, "name": "Remote", "created_at": 10, "updated_at": 10}),
            )
            .await;

        let changes = h
            .service
            .invoke("fetch_remote_changes", Value::Null)
            .await
            .unwrap();
        assert_eq!(changes[0]["change_type"], "new");

        let summary = h
            .service
            .invoke("apply_remote_changes", json!({ "changes": changes }))
            .await
            .unwrap();
        assert_eq!(summary, json!("1 applied, 0 skipped"));
        assert!(h
            .service
            .records()
            .get(Table::Customers, 3)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_config_commands() {
        let h = harness().await;

        h.service
            .invoke("update_sync_interval", json!({"interval": 90}))
            .await
            .unwrap();
        let config = h.service.invoke("get_sync_config", Value::Null).await.unwrap();
        assert_eq!(config["sync_interval"], 90);

        let status = h
            .service
            .invoke("test_sync_connection", Value::Null)
            .await
            .unwrap();
        assert_eq!(status["connected"], true);
        assert_eq!(status["tables_exist"], true);

        let sql = h.service.invoke("get_migration_sql", Value::Null).await.unwrap();
        assert!(sql.as_str().unwrap().contains("public.customers ("));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_invalid_invocations_return_messages() {
        let h = harness().await;

        let unknown = h.service.invoke("format_disk", Value::Null).await.unwrap_err();
        assert!(unknown.contains("unknown command"));

        let missing = h
            .service
            .invoke("clear_synced_items", json!({}))
            .await
            .unwrap_err();
        assert!(missing.contains("olderThanDays"));

        let bad_status = h
            .service
            .invoke("get_sync_queue_items", json!({"status": "lost"}))
            .await
            .unwrap_err();
        assert!(bad_status.contains("unknown queue status"));

        assert!(h
            .service
            .invoke("update_sync_interval", json!({"interval": 0}))
            .await
            .is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_history_commands() {
        let h = harness().await;
        h.service
            .records()
            .save(customer_record(1, "x"))
            .await
            .unwrap();
        h.service.trigger_sync_now().await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let sessions = h
            .service
            .invoke("get_sync_sessions", json!({"limit": 5}))
            .await
            .unwrap();
        assert_eq!(sessions.as_array().unwrap().len(), 1);
        assert_eq!(
            h.service
                .invoke("clear_synced_items", json!({"olderThanDays": 0}))
                .await
                .unwrap(),
            json!(1)
        );
        assert_eq!(
            h.service.invoke("clean_sync_data", Value::Null).await.unwrap(),
            json!(1)
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_background_sync_lifecycle() {
        let h = harness().await;
        assert!(h.service.start_background_sync().await);
        assert!(!h.service.start_background_sync().await);
        h.service.shutdown().await;
        assert!(h.service.start_background_sync().await);
        h.service.stop_background_sync().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_start_recovers_interrupted_items() {
        let store = Store::open_in_memory().await.unwrap();
        let outbox = Outbox::new(store.clone());
        let payload = customer_record(1, "x").encode().unwrap();
        let id = outbox
            .enqueue(Table::Customers, QueueOperation::Insert, 1, &payload)
            .await
            .unwrap();
        outbox.mark_status(id, QueueStatus::Syncing, None).await.unwrap();

        let service = SyncService::start(
            store.clone(),
            Vault::with_params(store, KdfParams::fast()),
            Arc::new(MemoryConnector::new()),
            EngineConfig::default(),
        )
        .await
        .unwrap();
        assert_eq!(service.get_sync_queue_stats().await.unwrap().pending, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_start_closes_orphaned_running_session() {
        let store = Store::open_in_memory().await.unwrap();
        let orphan = {
            let db = store.lock().await;
            LibSqlSessionRepository::new(db.connection())
                .start(CycleKind::Incremental)
                .await
                .unwrap()
        };

        let service = SyncService::start(
            store.clone(),
            Vault::with_params(store.clone(), KdfParams::fast()),
            Arc::new(MemoryConnector::new().with_backend(URL, Arc::new(MemoryRemote::new()))),
            EngineConfig::default(),
        )
        .await
        .unwrap();
        service.save_sync_config(URL, "anon", "service").await.unwrap();
        service.trigger_sync_now().await.unwrap();

        let sessions = service.get_sync_sessions(10).await.unwrap();
        assert_eq!(sessions.len(), 2);
        assert!(sessions
            .iter()
            .all(|session| session.status != SessionStatus::Running));
        let closed = sessions.iter().find(|session| session.id == orphan).unwrap();
        assert_eq!(closed.status, SessionStatus::Failed);
        assert!(closed.finished_at.is_some());
    }

    #[test]
    fn command_table_is_complete() {
        assert_eq!(COMMANDS.len(), 20);
        assert!(COMMANDS.contains(&"migrate_to_new_database"));
    }
}
