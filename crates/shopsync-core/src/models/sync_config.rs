//! Remote backend configuration model

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::error::{Error, Result};
use crate::util::{is_http_url, normalize_text_option};

/// Default push interval in seconds
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 30;

/// Active remote backend configuration.
///
/// The service key never leaves the process through serialization. When the
/// vault holds it, `service_key` is empty and `service_key_sealed` is set.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    pub id: Option<i64>,
    pub url: String,
    pub anon_key: String,
    #[serde(skip_serializing, default)]
    pub service_key: String,
    #[serde(default)]
    pub service_key_sealed: bool,
    pub sync_enabled: bool,
    /// Seconds between scheduled incremental cycles
    pub sync_interval: u64,
}

impl std::fmt::Debug for SyncConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SyncConfig")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("anon_key", &self.anon_key)
            .field("service_key", &"[REDACTED]")
            .field("service_key_sealed", &self.service_key_sealed)
            .field("sync_enabled", &self.sync_enabled)
            .field("sync_interval", &self.sync_interval)
            .finish()
    }
}

/// Connection parameters of one remote backend instance
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    pub url: String,
    pub anon_key: String,
    pub service_key: String,
}

impl RemoteTarget {
    /// Validate and normalize user-supplied connection parameters.
    pub fn new(
        url: impl Into<String>,
        anon_key: impl Into<String>,
        service_key: impl Into<String>,
    ) -> Result<Self> {
        let url = normalize_text_option(Some(url.into()))
            .ok_or_else(|| Error::Validation("remote URL must not be empty".to_string()))?;
        if !is_http_url(&url) {
            return Err(Error::Validation(
                "remote URL must include http:// or https://".to_string(),
            ));
        }
        let anon_key = normalize_text_option(Some(anon_key.into()))
            .ok_or_else(|| Error::Validation("anon key must not be empty".to_string()))?;
        let service_key = normalize_text_option(Some(service_key.into()))
            .ok_or_else(|| Error::Validation("service key must not be empty".to_string()))?;

        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            anon_key,
            service_key,
        })
    }
}

impl Drop for RemoteTarget {
    fn drop(&mut self) {
        self.service_key.zeroize();
    }
}

impl std::fmt::Debug for RemoteTarget {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RemoteTarget")
            .field("url", &self.url)
            .field("anon_key", &self.anon_key)
            .field("service_key", &"[REDACTED]")
            .finish()
    }
}
