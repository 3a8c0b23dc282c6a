use std::env;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use shopsync_core::models::{QueueItem, QueueStats, SyncConfig, SyncSession};
use shopsync_core::{EngineConfig, Store, SupabaseConnector, SyncService, Vault};

use crate::error::CliError;

pub const DB_PATH_ENV: &str = "SHOPSYNC_DB_PATH";
pub const MASTER_PASSWORD_ENV: &str = "SHOPSYNC_MASTER_PASSWORD";

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os(DB_PATH_ENV).map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("shopsync")
        .join("shopsync.db")
}

/// Open the local store and assemble the engine around it
pub async fn open_service(path: &Path) -> Result<SyncService, CliError> {
    let config = EngineConfig::from_env()?;
    let store = Store::open(path).await?;
    let connector = SupabaseConnector::new(config.item_timeout);
    Ok(SyncService::start(store.clone(), Vault::new(store), Arc::new(connector), config).await?)
}

/// Unlock the vault when the active service key is sealed in it
pub async fn unlock_for_sync(service: &SyncService) -> Result<(), CliError> {
    let Some(config) = service.get_sync_config().await? else {
        return Err(CliError::SyncNotConfigured);
    };
    if !config.service_key_sealed {
        return Ok(());
    }
    unlock_vault(service).await
}

/// Verify the master password, which keeps the vault open for this process
pub async fn unlock_vault(service: &SyncService) -> Result<(), CliError> {
    let password = read_master_password("Master password: ")?;
    if !service.verify_master_password(&password).await? {
        return Err(CliError::Command("Master password is incorrect".to_string()));
    }
    Ok(())
}

/// Master password from `SHOPSYNC_MASTER_PASSWORD`, else one line of stdin
pub fn read_master_password(prompt: &str) -> Result<String, CliError> {
    if let Some(password) = env::var(MASTER_PASSWORD_ENV)
        .ok()
        .filter(|value| !value.is_empty())
    {
        return Ok(password);
    }
    read_secret_line(prompt)
}

pub fn read_secret_line(prompt: &str) -> Result<String, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        eprint!("{prompt}");
        io::stderr().flush()?;
    }

    let mut line = String::new();
    stdin.lock().read_line(&mut line)?;
    let secret = line.trim_end_matches(['\r', '\n']).to_string();
    if secret.is_empty() {
        return Err(CliError::EmptyPassword);
    }
    Ok(secret)
}

pub fn print_json<T: serde::Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn format_sync_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_stats(stats: &QueueStats) -> String {
    format!(
        "pending: {}  syncing: {}  synced: {}  failed: {}",
        stats.pending, stats.syncing, stats.synced, stats.failed
    )
}

pub fn format_config(config: &SyncConfig) -> Vec<String> {
    let key_state = if config.service_key_sealed {
        "sealed in vault"
    } else if config.service_key.is_empty() {
        "missing"
    } else {
        "stored in plaintext"
    };
    vec![
        format!("url:          {}", config.url),
        format!("anon key:     {}", mask_key(&config.anon_key)),
        format!("service key:  {key_state}"),
        format!(
            "sync:         {}",
            if config.sync_enabled { "enabled" } else { "disabled" }
        ),
        format!("interval:     {}s", config.sync_interval),
    ]
}

pub fn format_session_lines(sessions: &[SyncSession]) -> Vec<String> {
    sessions
        .iter()
        .map(|session| {
            let finished = session
                .finished_at
                .map_or_else(|| "running".to_string(), format_sync_timestamp);
            format!(
                "#{} {} {} -> {} | {} queued, {} synced, {} failed | {}",
                session.id,
                session.kind.as_str(),
                format_sync_timestamp(session.started_at),
                finished,
                session.total_queued,
                session.total_synced,
                session.total_failed,
                session.status.as_str()
            )
        })
        .collect()
}

pub fn format_queue_lines(items: &[QueueItem]) -> Vec<String> {
    items
        .iter()
        .map(|item| {
            let mut line = format!(
                "#{} {} {} {} #{} (retries: {})",
                item.id,
                item.status.as_str(),
                item.operation.as_str(),
                item.table_name.as_str(),
                item.record_id,
                item.retry_count
            );
            if let Some(error) = &item.error_message {
                line.push_str(" - ");
                line.push_str(error);
            }
            line
        })
        .collect()
}

/// Keep the first and last four characters of a key
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}
