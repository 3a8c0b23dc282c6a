//! shopsync-core - local-first sync engine for the shop back-office app
//!
//! Business records live in a local libSQL store. Every write enqueues a
//! durable outbox item that the sync engine replays against a hosted
//! PostgREST-style backend, while remote changes are pulled back without
//! re-entering the outbox. The backend service key stays sealed in a vault
//! behind a master password.

pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod migration;
pub mod models;
pub mod outbox;
pub mod pull;
pub mod records;
pub mod remote;
pub mod sync;
pub mod util;
pub mod vault;

#[cfg(test)]
mod fixtures;

pub use commands::SyncService;
pub use config::EngineConfig;
pub use db::Store;
pub use error::{Error, Result};
pub use models::{QueueStats, RecordPayload, RemoteTarget, SyncConfig, Table};
pub use remote::{RemoteAdapter, RemoteConnector, SupabaseConnector};
pub use vault::Vault;
