use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the monitor, the drain and the lifecycle controller.
///
/// Failures inside user-supplied listeners and recognizers are not part of
/// this type: they are logged by the poller and never reach the caller.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// The target directory is missing, not a directory, or unreadable.
    #[error("invalid directory {}: {reason}", .path.display())]
    Configuration { path: PathBuf, reason: String },

    /// Start while running, stop while stopped, or a transition the
    /// lifecycle table does not contain.
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// Listing the directory failed in the middle of a scan.
    #[error("failed to scan {}: {source}", .path.display())]
    TransientScan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl MonitorError {
    pub fn configuration(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Configuration {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }

    pub fn is_illegal_state(&self) -> bool {
        matches!(self, Self::IllegalState(_))
    }
}

pub type Result<T, E = MonitorError> = std::result::Result<T, E>;
