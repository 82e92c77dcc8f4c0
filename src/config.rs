//! Configuration management for dirpoll
//!
//! Values come from built-in defaults, an optional TOML file and
//! `DIRPOLL_*` environment variables, in that order. Command-line flags are
//! applied on top by the binary.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Global configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirPollConfig {
    /// Poller configuration
    pub monitor: MonitorConfig,
    /// Event output configuration
    pub output: OutputConfig,
}

/// How the very first scan of a directory is treated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialScan {
    /// Record the first scan as the baseline without emitting events
    #[default]
    Baseline,
    /// Diff the first scan against an empty directory, reporting every
    /// existing file as created
    ReportExisting,
}

impl FromStr for InitialScan {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "baseline" => Ok(InitialScan::Baseline),
            "report_existing" => Ok(InitialScan::ReportExisting),
            other => Err(format!("unknown initial scan mode: {}", other)),
        }
    }
}

/// Configuration for the directory poller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Pause between two scans in milliseconds
    pub delay_ms: u64,
    /// Upper bound on how long `stop()` waits for the poller
    pub stop_timeout_secs: u64,
    pub initial_scan: InitialScan,
}

/// Configuration for event delivery in the binary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Route events through a batching drain instead of printing on the poller thread
    pub batch_events: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            delay_ms: 5000,
            stop_timeout_secs: 10,
            initial_scan: InitialScan::Baseline,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { batch_events: true }
    }
}

impl MonitorConfig {
    /// Get poll delay duration
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Get stop timeout duration
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}

impl DirPollConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Load configuration from file if given, else defaults; environment overrides apply to both
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    fn apply_env(&mut self) {
        if let Ok(val) = std::env::var("DIRPOLL_DELAY_MS") {
            if let Ok(ms) = val.parse::<u64>() {
                self.monitor.delay_ms = ms;
            }
        }

        if let Ok(val) = std::env::var("DIRPOLL_STOP_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                self.monitor.stop_timeout_secs = secs;
            }
        }

        if let Ok(val) = std::env::var("DIRPOLL_INITIAL_SCAN") {
            match val.parse::<InitialScan>() {
                Ok(mode) => self.monitor.initial_scan = mode,
                Err(err) => tracing::warn!("Ignoring DIRPOLL_INITIAL_SCAN: {}", err),
            }
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.monitor.delay_ms == 0 {
            return Err("delay_ms must be greater than 0".to_string());
        }

        if self.monitor.stop_timeout_secs == 0 {
            return Err("stop_timeout_secs must be greater than 0".to_string());
        }

        Ok(())
    }
}
