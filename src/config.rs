//! Scanner configuration, loadable from TOML and overridable from the CLI.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScanError};
use crate::ports::DEFAULT_MAX_RANGE;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScannerConfig {
    /// Deadline for the whole probe, connect included.
    pub connect_timeout_ms: u64,
    /// How long to wait for banner bytes after the handshake.
    pub banner_timeout_ms: u64,
    /// Probes allowed in flight at once.
    pub concurrency: usize,
    /// Largest inclusive range accepted by one scan.
    pub max_range: u32,
    /// Banner bytes kept per port.
    pub banner_cap: usize,
    /// Payload written after connecting; empty disables it.
    pub greeting: String,
    /// Extra attempts for ports that came back filtered.
    pub retries: u8,
    /// Results kept in the shared result store.
    pub result_capacity: usize,
    /// Sessions retained by the tracker.
    pub max_sessions: usize,
    /// Age after which finished sessions are dropped.
    pub session_ttl_secs: Option<u64>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 2_000,
            banner_timeout_ms: 500,
            concurrency: 100,
            max_range: DEFAULT_MAX_RANGE,
            banner_cap: 4_096,
            greeting: String::from("Hello\r\n"),
            retries: 0,
            result_capacity: 200,
            max_sessions: 100,
            session_ttl_secs: None,
        }
    }
}

impl ScannerConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ScanError::Config(format!("failed to read config file {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| ScanError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let zero = |name: &str| -> Result<()> {
            Err(ScanError::Config(format!("{name} must be greater than zero")))
        };
        if self.connect_timeout_ms == 0 {
            return zero("connect_timeout_ms");
        }
        if self.banner_timeout_ms == 0 {
            return zero("banner_timeout_ms");
        }
        if self.concurrency == 0 {
            return zero("concurrency");
        }
        if self.max_range == 0 {
            return zero("max_range");
        }
        if self.banner_cap == 0 {
            return zero("banner_cap");
        }
        if self.result_capacity == 0 {
            return zero("result_capacity");
        }
        if self.max_sessions == 0 {
            return zero("max_sessions");
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn banner_timeout(&self) -> Duration {
        Duration::from_millis(self.banner_timeout_ms)
    }

    pub fn session_ttl(&self) -> Option<Duration> {
        self.session_ttl_secs.map(Duration::from_secs)
    }
}
