//! Core functionality module
//!
//! Contains snapshot capture, change recognition, the poller and its
//! lifecycle, and the batching drain

pub mod snapshot;
pub mod events;
pub mod recognizer;
pub mod lifecycle;
pub mod listener;
pub mod monitor;
pub mod drain;

// Re-export main types
pub use snapshot::{capture, validate_directory, DirectorySnapshot, FileRecord};
pub use events::{ChangeEvent, ChangeKind};
pub use recognizer::{FileActivity, Recognizer};
pub use lifecycle::{Lifecycle, RunEvent, RunState, StateMachine};
pub use listener::{listener_fn, DirectoryListener, FnListener};
pub use monitor::{DirectoryMonitor, DEFAULT_DELAY, DEFAULT_STOP_TIMEOUT};
pub use drain::BatchingQueueDrain;
