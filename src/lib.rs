pub mod cli;
pub mod config;
pub mod core;
pub mod error;

pub use crate::core::*;
pub use config::{DirPollConfig, InitialScan, MonitorConfig, OutputConfig};
pub use error::MonitorError;
