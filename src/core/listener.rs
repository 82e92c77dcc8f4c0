//! Consumers of change events and the closure adapter.

use anyhow::Result;
use super::events::ChangeEvent;

/// Observer of the changes a monitor detects.
///
/// Listeners are called from the poller thread. An error or a panic from a
/// listener is logged and dropped; it never stops the poller and the batch
/// is not redelivered.
pub trait DirectoryListener: Send + Sync {
    fn on_event(&self, event: &ChangeEvent) -> Result<()>;

    /// Receive everything one recognizer produced in one cycle.
    ///
    /// `source` is the recognizer's name. The default forwards every event to
    /// [`on_event`](Self::on_event); a failed event is logged and the rest of
    /// the batch is still delivered. Returns an error if any event failed.
    fn on_events(&self, source: &str, events: &[ChangeEvent]) -> Result<()> {
        let mut failed = 0;
        for event in events {
            if let Err(err) = self.on_event(event) {
                tracing::warn!("Listener failed on {} from {}: {:#}", event.path().display(), source, err);
                failed += 1;
            }
        }

        if failed > 0 {
            anyhow::bail!("{} of {} events from {} failed", failed, events.len(), source);
        }
        Ok(())
    }
}

/// Adapts a closure into a [`DirectoryListener`].
pub struct FnListener<F> {
    callback: F,
}

impl<F> DirectoryListener for FnListener<F>
where
    F: Fn(&ChangeEvent) -> Result<()> + Send + Sync,
{
    fn on_event(&self, event: &ChangeEvent) -> Result<()> {
        (self.callback)(event)
    }
}

pub fn listener_fn<F>(callback: F) -> FnListener<F>
where
    F: Fn(&ChangeEvent) -> Result<()> + Send + Sync,
{
    FnListener { callback }
}
