//! Engine configuration.
//!
//! Loaded from TOML; every field has a default so an empty file is valid.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default port of the first engine session.
pub const DEFAULT_BASE_PORT: u16 = 6311;
/// Default highest port a session may be bound to (inclusive).
pub const DEFAULT_MAX_PORT: u16 = u16::MAX;
/// Default host engines listen on.
pub const DEFAULT_HOST: &str = "localhost";

#[cfg(windows)]
const DEFAULT_R_HOME: &str = r"C:\Program Files\R\R-3.2.2";
#[cfg(not(windows))]
const DEFAULT_R_HOME: &str = "/usr/lib/R";

/// Configuration shared by every session a registry creates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// R installation directory.
    pub r_home: PathBuf,
    /// Explicit interpreter path; overrides the lookup under `r_home`.
    pub r_binary: Option<PathBuf>,
    /// Host the engines listen on.
    pub host: String,
    /// Port of the first session.
    pub base_port: u16,
    /// Highest port a session may use (inclusive).
    pub max_port: u16,
    /// Inherit the engine's console output instead of discarding it.
    pub show_window: bool,
    /// Maximal size of client-to-server payloads, in kilobytes.
    pub max_input_buffer_kb: Option<u32>,
    /// Script evaluated on every new session.
    pub init_script: Option<PathBuf>,
    /// Append the engine traceback to recovered error messages.
    pub include_traceback: bool,
    /// Connect retry policy used while a new engine starts up.
    pub readiness: ReadinessConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let r_home = std::env::var_os("R_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_R_HOME));
        Self {
            r_home,
            r_binary: None,
            host: DEFAULT_HOST.to_string(),
            base_port: DEFAULT_BASE_PORT,
            max_port: DEFAULT_MAX_PORT,
            show_window: false,
            max_input_buffer_kb: None,
            init_script: None,
            include_traceback: cfg!(debug_assertions),
            readiness: ReadinessConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Launch options for a new engine bound to `port`.
    pub fn launch_options(&self, port: u16) -> LaunchOptions {
        LaunchOptions {
            show_window: self.show_window,
            max_input_buffer_kb: self.max_input_buffer_kb.filter(|kb| *kb > 0),
            port,
        }
    }
}

/// Timing of the connect loop that waits for a new engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    /// Wait before the first connect attempt.
    pub initial_delay_ms: u64,
    /// Wait after the first refused attempt.
    pub retry_interval_ms: u64,
    /// Upper bound for the doubling retry interval.
    pub max_retry_interval_ms: u64,
    /// Give up once this much time has passed since spawn.
    pub timeout_ms: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 250,
            retry_interval_ms: 100,
            max_retry_interval_ms: 1_000,
            timeout_ms: 30_000,
        }
    }
}

impl ReadinessConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn max_retry_interval(&self) -> Duration {
        Duration::from_millis(self.max_retry_interval_ms.max(self.retry_interval_ms))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Per-launch settings for one engine process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchOptions {
    pub show_window: bool,
    /// `None` means no config artifact is written.
    pub max_input_buffer_kb: Option<u32>,
    pub port: u16,
}
