use std::path::{Path, PathBuf};
use clap::{Parser, ValueEnum};
use crate::config::{DirPollConfig, InitialScan};

#[derive(Parser)]
#[command(name = "dirpoll")]
#[command(version)]
#[command(about = "Poll a directory and report created, modified and deleted files")]
#[command(long_about = "dirpoll scans a directory at a fixed interval, compares each scan with the previous one by size and modification time, and prints the files that were created, modified or deleted.")]
pub struct Cli {
    /// Directory to watch for changes
    #[arg(value_name = "PATH", help = "Path to watch (defaults to current directory)")]
    pub path: Option<PathBuf>,

    /// Polling interval in milliseconds
    #[arg(short, long, value_name = "MS", help = "Polling interval in ms (default 5000)")]
    pub delay: Option<u64>,

    /// Configuration file
    #[arg(short, long, value_name = "FILE", help = "TOML configuration file")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "text", help = "Output format")]
    pub output: OutputFormat,

    /// Report files already present at startup as created
    #[arg(long, help = "Report existing files as created on the first scan")]
    pub report_existing: bool,

    /// Print on the poller thread instead of through the batching drain
    #[arg(long, help = "Deliver events without batching")]
    pub no_batch: bool,

    /// Show only specific file types
    #[arg(long, value_delimiter = ',', help = "File extensions to report (e.g., rs,py,js)")]
    pub extensions: Option<Vec<String>>,

    /// Disable colors in output
    #[arg(long, help = "Disable colored output")]
    pub no_color: bool,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Plain text output with timestamps
    Text,
    /// JSON output for scripting
    Json,
    /// Compact single-line format
    Compact,
}

impl Cli {
    pub fn get_watch_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        })
    }

    pub fn should_watch_extension(&self, path: &Path) -> bool {
        if let Some(ref extensions) = self.extensions {
            if let Some(ext) = path.extension().and_then(|s| s.to_str()) {
                extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
            } else {
                false
            }
        } else {
            true // Report all files if no extensions specified
        }
    }

    /// Merge command-line flags over the loaded configuration
    pub fn apply_to(&self, config: &mut DirPollConfig) {
        if let Some(delay) = self.delay {
            config.monitor.delay_ms = delay;
        }
        if self.report_existing {
            config.monitor.initial_scan = InitialScan::ReportExisting;
        }
        if self.no_batch {
            config.output.batch_events = false;
        }
    }

    pub fn setup_logging(&self) {
        let level = if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        };

        tracing_subscriber::fmt()
            .with_max_level(level)
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .init();
    }

    pub fn validate(&self) -> Result<(), String> {
        let path = self.get_watch_path();

        if !path.exists() {
            return Err(format!("Path does not exist: {}", path.display()));
        }

        if !path.is_dir() {
            return Err(format!("Path is not a directory: {}", path.display()));
        }

        if self.delay == Some(0) {
            return Err("Delay must be greater than 0".to_string());
        }

        Ok(())
    }
}
