//! Sync session audit trail and key/value sync state

use libsql::Connection;

use crate::error::{Error, Result};
use crate::models::{CycleKind, SessionStatus, SyncSession};
use crate::util::now_millis;

/// Key of the highest remote `updated_at` applied by the pull engine
pub const PULL_CURSOR_KEY: &str = "pull_cursor";

/// Trait for session storage operations (async)
#[allow(async_fn_in_trait)]
pub trait SessionRepository {
    /// Open a `running` session and return its id
    async fn start(&self, kind: CycleKind) -> Result<i64>;

    /// Record final totals and status of a session
    async fn finish(&self, id: i64, queued: i64, synced: i64, failed: i64) -> Result<SyncSession>;

    /// Most recent sessions first
    async fn list_recent(&self, limit: u32) -> Result<Vec<SyncSession>>;

    /// Keep the newest `keep` finished sessions, returning how many were removed
    async fn prune(&self, keep: u32) -> Result<u64>;

    /// Remove every finished session
    async fn clear_finished(&self) -> Result<u64>;

    /// Close sessions a crashed process left `running` as `failed`
    async fn close_interrupted(&self) -> Result<u64>;
}

/// libSQL implementation of `SessionRepository`
pub struct LibSqlSessionRepository<'a> {
    conn: &'a Connection,
}

const SESSION_COLUMNS: &str =
    "id, kind, started_at, finished_at, total_queued, total_synced, total_failed, status";

impl<'a> LibSqlSessionRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_session(row: &libsql::Row) -> Result<SyncSession> {
        let kind: String = row.get(1)?;
        let status: String = row.get(7)?;
        Ok(SyncSession {
            id: row.get(0)?,
            kind: kind.parse()?,
            started_at: row.get(2)?,
            finished_at: row.get(3)?,
            total_queued: row.get(4)?,
            total_synced: row.get(5)?,
            total_failed: row.get(6)?,
            status: status.parse()?,
        })
    }

    async fn get(&self, id: i64) -> Result<SyncSession> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {SESSION_COLUMNS} FROM sync_sessions WHERE id = ?"),
                [id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Self::parse_session(&row),
            None => Err(Error::NotFound(format!("sync session {id}"))),
        }
    }
}

impl SessionRepository for LibSqlSessionRepository<'_> {
    async fn start(&self, kind: CycleKind) -> Result<i64> {
        self.conn
            .execute(
                "INSERT INTO sync_sessions (kind, started_at, status) VALUES (?, ?, 'running')",
                libsql::params![kind.as_str(), now_millis()],
            )
            .await?;
        Ok(self.conn.last_insert_rowid())
    }

    async fn finish(&self, id: i64, queued: i64, synced: i64, failed: i64) -> Result<SyncSession> {
        let status = SessionStatus::from_totals(synced, failed);
        self.conn
            .execute(
                "UPDATE sync_sessions
                 SET finished_at = ?, total_queued = ?, total_synced = ?, total_failed = ?, status = ?
                 WHERE id = ?",
                libsql::params![now_millis(), queued, synced, failed, status.as_str(), id],
            )
            .await?;
        self.get(id).await
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<SyncSession>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {SESSION_COLUMNS} FROM sync_sessions
                     ORDER BY started_at DESC, id DESC LIMIT ?"
                ),
                [i64::from(limit)],
            )
            .await?;

        let mut sessions = Vec::new();
        while let Some(row) = rows.next().await? {
            sessions.push(Self::parse_session(&row)?);
        }
        Ok(sessions)
    }

    async fn prune(&self, keep: u32) -> Result<u64> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM sync_sessions
                 WHERE status != 'running' AND id NOT IN (
                     SELECT id FROM sync_sessions ORDER BY id DESC LIMIT ?
                 )",
                [i64::from(keep)],
            )
            .await?;
        Ok(removed)
    }

    async fn clear_finished(&self) -> Result<u64> {
        let removed = self
            .conn
            .execute("DELETE FROM sync_sessions WHERE status != 'running'", ())
            .await?;
        Ok(removed)
    }

    async fn close_interrupted(&self) -> Result<u64> {
        let closed = self
            .conn
            .execute(
                "UPDATE sync_sessions SET status = 'failed', finished_at = ?
                 WHERE status = 'running'",
                [now_millis()],
            )
            .await?;
        Ok(closed)
    }
}

/// Read a value from the `sync_state` table
pub async fn get_state(conn: &Connection, key: &str) -> Result<Option<String>> {
    let mut rows = conn
        .query("SELECT value FROM sync_state WHERE key = ?", [key])
        .await?;
    match rows.next().await? {
        Some(row) => Ok(Some(row.get(0)?)),
        None => Ok(None),
    }
}

/// Write a value into the `sync_state` table
pub async fn set_state(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO sync_state (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        [key, value],
    )
    .await?;
    Ok(())
}
