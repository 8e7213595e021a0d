//! Configuration for tailing an event log.
//!
//! [`TailConfig`] can be built in code with the `with_*` methods or loaded
//! from any serde format; missing fields take their defaults.
//!
//! ```
//! use eve_tail::TailConfig;
//! use std::time::Duration;
//!
//! let config = TailConfig::default()
//!     .with_path("/var/log/suricata/eve.json")
//!     .with_poll_interval(Duration::from_millis(100))
//!     .with_backlog_max_records(50);
//! assert!(config.validate().is_ok());
//! ```

use crate::decoder::DEFAULT_MAX_PENDING_BYTES;
use crate::error::{Error, Result};
use crate::resolver::{EVE_PATH_ENV, resolve_path};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TailConfig {
    /// Explicit log path; takes precedence over everything else.
    pub path: Option<PathBuf>,
    /// A `file://` URL naming the log.
    pub url: Option<String>,
    /// Environment variable holding a path override, checked at start and
    /// while waiting for the file. `None` disables the lookup.
    pub env_var: Option<String>,
    /// Sleep between polls when no new data is available.
    pub poll_interval_seconds: f64,
    /// Sleep between checks while the file does not exist.
    pub wait_interval_seconds: f64,
    /// Pause after a failed open or read before retrying.
    pub retry_pause_seconds: f64,
    /// Most recent records replayed at start and after rotation.
    pub backlog_max_records: usize,
    /// Cap on text held for a record that has not completed yet.
    pub max_pending_bytes: usize,
    /// Use filesystem notifications to wake the poll loop early.
    pub watch_events: bool,
}

impl Default for TailConfig {
    fn default() -> Self {
        Self {
            path: None,
            url: None,
            env_var: Some(EVE_PATH_ENV.to_owned()),
            poll_interval_seconds: 0.2,
            wait_interval_seconds: 1.0,
            retry_pause_seconds: 1.0,
            backlog_max_records: 200,
            max_pending_bytes: DEFAULT_MAX_PENDING_BYTES,
            watch_events: true,
        }
    }
}

impl TailConfig {
    /// Parse a JSON configuration document.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_url<S: Into<String>>(mut self, url: S) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_env_var(mut self, env_var: Option<String>) -> Self {
        self.env_var = env_var;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_seconds = interval.as_secs_f64();
        self
    }

    pub fn with_wait_interval(mut self, interval: Duration) -> Self {
        self.wait_interval_seconds = interval.as_secs_f64();
        self
    }

    pub fn with_retry_pause(mut self, pause: Duration) -> Self {
        self.retry_pause_seconds = pause.as_secs_f64();
        self
    }

    pub fn with_backlog_max_records(mut self, max_records: usize) -> Self {
        self.backlog_max_records = max_records;
        self
    }

    pub fn with_max_pending_bytes(mut self, max_bytes: usize) -> Self {
        self.max_pending_bytes = max_bytes;
        self
    }

    pub fn with_watch_events(mut self, enabled: bool) -> Self {
        self.watch_events = enabled;
        self
    }

    /// Check that every value is usable.
    pub fn validate(&self) -> Result<()> {
        for (field, seconds) in [
            ("poll_interval_seconds", self.poll_interval_seconds),
            ("wait_interval_seconds", self.wait_interval_seconds),
            ("retry_pause_seconds", self.retry_pause_seconds),
        ] {
            if !seconds.is_finite() || seconds <= 0.0 {
                return Err(Error::InvalidConfig {
                    field: field.to_owned(),
                    reason: format!("must be a positive number of seconds, got {}", seconds),
                });
            }
        }

        if self.max_pending_bytes == 0 {
            return Err(Error::InvalidConfig {
                field: "max_pending_bytes".to_owned(),
                reason: "must be greater than zero".to_owned(),
            });
        }

        Ok(())
    }

    /// Resolve the log location from the configured sources.
    pub fn resolve_path(&self) -> PathBuf {
        let env_value = self
            .env_var
            .as_deref()
            .and_then(std::env::var_os);
        resolve_path(self.path.as_deref(), self.url.as_deref(), env_value.as_deref())
    }

    // The accessors below assume `validate` has passed.

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.poll_interval_seconds)
    }

    pub fn wait_interval(&self) -> Duration {
        Duration::from_secs_f64(self.wait_interval_seconds)
    }

    pub fn retry_pause(&self) -> Duration {
        Duration::from_secs_f64(self.retry_pause_seconds)
    }
}
