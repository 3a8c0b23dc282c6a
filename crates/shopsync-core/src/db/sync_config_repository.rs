//! Remote configuration repository implementation

use libsql::Connection;

use crate::error::{Error, Result};
use crate::models::{RemoteTarget, SyncConfig, DEFAULT_SYNC_INTERVAL_SECS};
use crate::util::now_millis;

/// Trait for sync configuration storage operations (async)
#[allow(async_fn_in_trait)]
pub trait SyncConfigRepository {
    /// Load the active configuration, if any
    async fn active(&self) -> Result<Option<SyncConfig>>;

    /// Replace the active configuration with a new row.
    ///
    /// The interval and enabled flag carry over from the previous row. When
    /// `sealed` is set the service key column stays empty.
    async fn replace(&self, target: &RemoteTarget, sealed: bool) -> Result<SyncConfig>;

    /// Change the interval of the active configuration
    async fn set_interval(&self, seconds: u64) -> Result<()>;

    /// Drop the plaintext service key of the active row once it lives in the vault
    async fn mark_sealed(&self) -> Result<()>;
}

/// libSQL implementation of `SyncConfigRepository`
pub struct LibSqlSyncConfigRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlSyncConfigRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_config(row: &libsql::Row) -> Result<SyncConfig> {
        let interval: i64 = row.get(6)?;
        Ok(SyncConfig {
            id: Some(row.get(0)?),
            url: row.get(1)?,
            anon_key: row.get(2)?,
            service_key: row.get(3)?,
            service_key_sealed: row.get::<i64>(4)? != 0,
            sync_enabled: row.get::<i64>(5)? != 0,
            sync_interval: u64::try_from(interval).unwrap_or(DEFAULT_SYNC_INTERVAL_SECS),
        })
    }
}

impl SyncConfigRepository for LibSqlSyncConfigRepository<'_> {
    async fn active(&self) -> Result<Option<SyncConfig>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, url, anon_key, service_key, service_key_sealed, sync_enabled, sync_interval
                 FROM sync_config WHERE is_active = 1
                 ORDER BY id DESC LIMIT 1",
                (),
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_config(&row)?)),
            None => Ok(None),
        }
    }

    async fn replace(&self, target: &RemoteTarget, sealed: bool) -> Result<SyncConfig> {
        let previous = self.active().await?;
        let sync_interval = previous
            .as_ref()
            .map_or(DEFAULT_SYNC_INTERVAL_SECS, |config| config.sync_interval);
        let sync_enabled = previous.as_ref().map_or(true, |config| config.sync_enabled);
        let service_key = if sealed {
            String::new()
        } else {
            target.service_key.clone()
        };
        let now = now_millis();

        self.conn
            .execute("UPDATE sync_config SET is_active = 0 WHERE is_active = 1", ())
            .await?;
        self.conn
            .execute(
                "INSERT INTO sync_config
                    (url, anon_key, service_key, service_key_sealed, is_active,
                     sync_enabled, sync_interval, created_at, updated_at)
                 VALUES (?, ?, ?, ?, 1, ?, ?, ?, ?)",
                libsql::params![
                    target.url.clone(),
                    target.anon_key.clone(),
                    service_key.clone(),
                    i64::from(sealed),
                    i64::from(sync_enabled),
                    i64::try_from(sync_interval).unwrap_or(i64::MAX),
                    now,
                    now
                ],
            )
            .await?;

        Ok(SyncConfig {
            id: Some(self.conn.last_insert_rowid()),
            url: target.url.clone(),
            anon_key: target.anon_key.clone(),
            service_key,
            service_key_sealed: sealed,
            sync_enabled,
            sync_interval,
        })
    }

    async fn set_interval(&self, seconds: u64) -> Result<()> {
        if seconds == 0 {
            return Err(Error::Validation(
                "sync interval must be at least one second".to_string(),
            ));
        }
        let seconds = i64::try_from(seconds)
            .map_err(|_| Error::Validation("sync interval is too large".to_string()))?;

        let updated = self
            .conn
            .execute(
                "UPDATE sync_config SET sync_interval = ?, updated_at = ? WHERE is_active = 1",
                [seconds, now_millis()],
            )
            .await?;
        if updated == 0 {
            return Err(Error::NotFound("no sync configuration saved".to_string()));
        }
        Ok(())
    }

    async fn mark_sealed(&self) -> Result<()> {
        self.conn
            .execute(
                "UPDATE sync_config
                 SET service_key = '', service_key_sealed = 1, updated_at = ?
                 WHERE is_active = 1",
                [now_millis()],
            )
            .await?;
        Ok(())
    }
}
