//! Database layer for shopsync

mod connection;
mod migrations;
mod record_repository;
mod session_repository;
mod sync_config_repository;

pub use connection::{Database, Store};
pub use record_repository::{LibSqlRecordRepository, RecordRepository};
pub use session_repository::{
    get_state, set_state, LibSqlSessionRepository, SessionRepository, PULL_CURSOR_KEY,
};
pub use sync_config_repository::{LibSqlSyncConfigRepository, SyncConfigRepository};
