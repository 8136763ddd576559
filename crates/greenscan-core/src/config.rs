//! Configuration module for Greenscan.
//!
//! Provides typed configuration structs that map to the YAML configuration
//! file, with loading, validation and defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration for the Greenscan engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub retry: RetryConfig,
    pub connectivity: ConnectivityConfig,
    pub backend: BackendConfig,
    pub usage: UsageConfig,
    pub logging: LoggingConfig,
}

/// Retry/backoff executor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum retries after the initial attempt.
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds.
    pub initial_delay_ms: u64,
    /// Cap on any single backoff delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Multiplier applied to the delay after each attempt.
    pub backoff_factor: u32,
}

/// Connectivity monitor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectivityConfig {
    /// Milliseconds an online signal must hold before a drain is triggered,
    /// so a flapping connection does not cause wasted attempts.
    pub debounce_ms: u64,
}

/// Remote backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the Greenscan API.
    pub base_url: String,
    /// Per-request timeout in seconds, distinct from backoff delays.
    pub timeout_secs: u64,
}

/// Usage counter reconciler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageConfig {
    /// Seconds a cached counter stays fresh before a remote refresh is
    /// preferred.
    pub freshness_secs: u64,
    /// Fallback period limit when no counter has ever been seen.
    pub default_limit: u32,
    /// Closed periods kept in the archived history.
    pub history_len: usize,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/greenscan/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("greenscan")
            .join("config.yaml")
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 10_000,
            backoff_factor: 2,
        }
    }
}

impl RetryConfig {
    /// Initial delay as a [`Duration`].
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    /// Delay cap as a [`Duration`].
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self { debounce_ms: 2_000 }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.greenscan.app".to_string(),
            timeout_secs: 20,
        }
    }
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self {
            freshness_secs: 300,
            default_limit: 30,
            history_len: 12,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
