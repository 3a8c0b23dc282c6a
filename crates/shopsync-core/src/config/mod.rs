//! Engine tuning knobs.
//!
//! Defaults suit a desktop client on a home connection. Each knob can be
//! overridden through a `SHOPSYNC_*` environment variable.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::normalize_text_option;

pub const ENV_BATCH_SIZE: &str = "SHOPSYNC_BATCH_SIZE";
pub const ENV_PUSH_CONCURRENCY: &str = "SHOPSYNC_PUSH_CONCURRENCY";
pub const ENV_ITEM_TIMEOUT_SECS: &str = "SHOPSYNC_ITEM_TIMEOUT_SECS";
pub const ENV_TIMER_TICK_SECS: &str = "SHOPSYNC_TIMER_TICK_SECS";
pub const ENV_HISTORY_RETENTION: &str = "SHOPSYNC_HISTORY_RETENTION";

/// Runtime parameters of the sync engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Queue items fetched per dequeue
    pub batch_size: u32,
    /// Record lanes pushed at once
    pub push_concurrency: usize,
    /// Upper bound on one push; a slower item is marked failed
    pub item_timeout: Duration,
    /// How often the background timer checks whether a cycle is due
    pub timer_tick: Duration,
    /// Synced items and sessions kept after each cycle
    pub history_retention: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            push_concurrency: 4,
            item_timeout: Duration::from_secs(30),
            timer_tick: Duration::from_secs(5),
            history_retention: 100,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(value) = parse_var(&lookup, ENV_BATCH_SIZE)? {
            config.batch_size = value;
        }
        if let Some(value) = parse_var(&lookup, ENV_PUSH_CONCURRENCY)? {
            config.push_concurrency = value;
        }
        if let Some(value) = parse_var(&lookup, ENV_ITEM_TIMEOUT_SECS)? {
            config.item_timeout = Duration::from_secs(value);
        }
        if let Some(value) = parse_var(&lookup, ENV_TIMER_TICK_SECS)? {
            config.timer_tick = Duration::from_secs(value);
        }
        if let Some(value) = parse_var(&lookup, ENV_HISTORY_RETENTION)? {
            config.history_retention = value;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Validation("batch size must be positive".to_string()));
        }
        if self.push_concurrency == 0 {
            return Err(Error::Validation(
                "push concurrency must be positive".to_string(),
            ));
        }
        if self.item_timeout.is_zero() || self.timer_tick.is_zero() {
            return Err(Error::Validation(
                "timeouts and ticks must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    let Some(raw) = normalize_text_option(lookup(key)) else {
        return Ok(None);
    };
    raw.parse()
        .map(Some)
        .map_err(|_| Error::Validation(format!("{key} has invalid value '{raw}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_without_overrides() {
        let config = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.push_concurrency, 4);
        assert_eq!(config.item_timeout, Duration::from_secs(30));
    }

    #[test]
    fn overrides_apply() {
        let config = EngineConfig::from_lookup(lookup(&[
            (ENV_BATCH_SIZE, "10"),
            (ENV_PUSH_CONCURRENCY, " 8 "),
            (ENV_ITEM_TIMEOUT_SECS, "3"),
            (ENV_HISTORY_RETENTION, "25"),
        ]))
        .unwrap();

        assert_eq!(config.batch_size, 10);
        assert_eq!(config.push_concurrency, 8);
        assert_eq!(config.item_timeout, Duration::from_secs(3));
        assert_eq!(config.timer_tick, Duration::from_secs(5));
        assert_eq!(config.history_retention, 25);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(EngineConfig::from_lookup(lookup(&[(ENV_BATCH_SIZE, "lots")])).is_err());
        assert!(EngineConfig::from_lookup(lookup(&[(ENV_PUSH_CONCURRENCY, "0")])).is_err());
        assert!(EngineConfig::from_lookup(lookup(&[(ENV_ITEM_TIMEOUT_SECS, "-1")])).is_err());
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = EngineConfig::from_lookup(lookup(&[(ENV_BATCH_SIZE, "  ")])).unwrap();
        assert_eq!(config.batch_size, 50);
    }
}
