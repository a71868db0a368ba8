use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigError;

/// Timing and persistence settings for an [`crate::autosave::Autosave`].
///
/// Deserializes from host settings with every field optional:
///
/// ```
/// use tether_core::config::AutosaveConfig;
///
/// let config = AutosaveConfig::from_json(r#"{ "debounce_ms": 500, "durable_key": "draft:42" }"#).unwrap();
/// assert_eq!(config.debounce_ms, 500);
/// assert_eq!(config.interval_ms, AutosaveConfig::DEFAULT_INTERVAL_MS);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutosaveConfig {
    /// Quiet period after the last change before saving
    pub debounce_ms: u64,
    /// Safety-net period at which a stale value is saved regardless of ongoing edits
    pub interval_ms: u64,
    /// Key under which saved values are mirrored into the durable local store
    pub durable_key: Option<String>,
    /// Broadcast a notice for successful automatic saves, not only for failures
    pub announce: bool,
}

impl AutosaveConfig {
    pub const DEFAULT_DEBOUNCE_MS: u64 = 2_000;
    pub const DEFAULT_INTERVAL_MS: u64 = 30_000;

    pub fn new() -> Self {
        Self { debounce_ms: Self::DEFAULT_DEBOUNCE_MS, interval_ms: Self::DEFAULT_INTERVAL_MS, durable_key: None, announce: false }
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce_ms = duration_ms(debounce);
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval_ms = duration_ms(interval);
        self
    }

    pub fn with_durable_key(mut self, key: impl Into<String>) -> Self {
        self.durable_key = Some(key.into());
        self
    }

    pub fn with_announce(mut self, announce: bool) -> Self {
        self.announce = announce;
        self
    }

    pub fn debounce(&self) -> Duration { Duration::from_millis(self.debounce_ms) }

    pub fn interval(&self) -> Duration { Duration::from_millis(self.interval_ms) }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.debounce_ms == 0 {
            return Err(ConfigError::ZeroDuration("debounce_ms"));
        }
        if self.interval_ms == 0 {
            return Err(ConfigError::ZeroDuration("interval_ms"));
        }
        if self.debounce_ms > self.interval_ms {
            warn!("autosave debounce ({}ms) exceeds interval ({}ms); the interval will drive saves", self.debounce_ms, self.interval_ms);
        }
        Ok(())
    }
}

impl Default for AutosaveConfig {
    fn default() -> Self { Self::new() }
}

fn duration_ms(duration: Duration) -> u64 { u64::try_from(duration.as_millis()).unwrap_or(u64::MAX) }
