//! Batching consumer that empties a queue in one chunk per wake-up.
//!
//! Producers push from any thread without blocking. The drain worker sleeps
//! until at least one item is queued, then takes every item queued at that
//! moment and hands them to the callback as one batch. A slow callback
//! therefore sees larger batches; memory is not bounded under sustained
//! overproduction.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use anyhow::Result as AnyResult;
use crossbeam_channel::{select, unbounded, Receiver, Sender};
use crate::error::{MonitorError, Result};
use super::events::ChangeEvent;
use super::lifecycle::{Lifecycle, RunEvent};
use super::listener::DirectoryListener;

type BatchCallback<T> = Box<dyn FnMut(Vec<T>) + Send>;

struct DrainWorker {
    handle: JoinHandle<()>,
    shutdown: Sender<()>,
    done: Receiver<()>,
}

pub struct BatchingQueueDrain<T: Send + 'static> {
    queue_tx: Sender<T>,
    queue_rx: Receiver<T>,
    callback: Arc<Mutex<BatchCallback<T>>>,
    lifecycle: Lifecycle,
    worker: Mutex<Option<DrainWorker>>,
    stop_timeout: Duration,
}

impl<T: Send + 'static> BatchingQueueDrain<T> {
    pub fn new<F>(callback: F) -> Self
    where
        F: FnMut(Vec<T>) + Send + 'static,
    {
        let (queue_tx, queue_rx) = unbounded();
        Self {
            queue_tx,
            queue_rx,
            callback: Arc::new(Mutex::new(Box::new(callback))),
            lifecycle: Lifecycle::start_stop(),
            worker: Mutex::new(None),
            stop_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Queue an item. Never blocks; items pushed while stopped wait for the
    /// next `start`.
    pub fn push(&self, item: T) {
        // Both ends live in `self`, so the channel cannot be disconnected.
        let _ = self.queue_tx.send(item);
    }

    /// Number of items waiting to be drained.
    pub fn pending(&self) -> usize {
        self.queue_rx.len()
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle.is_running()
    }

    pub fn start(&self) -> Result<()> {
        let mut slot = self.worker.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if !self.lifecycle.can_transition(RunEvent::Start) {
            return Err(MonitorError::IllegalState("batch drain is already running".to_string()));
        }

        let (shutdown_tx, shutdown_rx) = unbounded::<()>();
        let (done_tx, done_rx) = unbounded::<()>();
        let queue = self.queue_rx.clone();
        let callback = self.callback.clone();

        let handle = thread::Builder::new()
            .name("batch-drain".to_string())
            .spawn(move || {
                drain_loop(queue, shutdown_rx, callback);
                drop(done_tx);
            })
            .map_err(|err| MonitorError::IllegalState(format!("failed to spawn drain worker: {}", err)))?;

        self.lifecycle.transition(RunEvent::Start)?;
        *slot = Some(DrainWorker {
            handle,
            shutdown: shutdown_tx,
            done: done_rx,
        });
        Ok(())
    }

    pub fn stop(&self) -> Result<()> {
        let mut slot = self.worker.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if !self.lifecycle.can_transition(RunEvent::Stop) {
            return Err(MonitorError::IllegalState("batch drain is not running".to_string()));
        }

        if let Some(worker) = slot.take() {
            drop(worker.shutdown);
            join_with_timeout(worker.handle, &worker.done, self.stop_timeout, "batch drain");
        }

        self.lifecycle.transition(RunEvent::Stop)?;
        Ok(())
    }
}

impl<T: Send + 'static> Drop for BatchingQueueDrain<T> {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.stop();
        }
    }
}

/// Feeding a drain from a monitor decouples the poller from the consumer.
impl DirectoryListener for BatchingQueueDrain<ChangeEvent> {
    fn on_event(&self, event: &ChangeEvent) -> AnyResult<()> {
        self.push(event.clone());
        Ok(())
    }
}

fn drain_loop<T>(queue: Receiver<T>, shutdown: Receiver<()>, callback: Arc<Mutex<BatchCallback<T>>>) {
    loop {
        let first = select! {
            recv(queue) -> item => item.ok(),
            recv(shutdown) -> _ => None,
        };
        let first = match first {
            Some(item) => item,
            None => break,
        };

        // Only what is queued right now; later pushes go to the next batch.
        let queued = queue.len();
        let mut batch = Vec::with_capacity(queued + 1);
        batch.push(first);
        batch.extend(queue.try_iter().take(queued));

        let size = batch.len();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut callback = callback.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            (*callback)(batch);
        }));
        if outcome.is_err() {
            tracing::warn!("Batch callback panicked on a batch of {} items", size);
        }

        if shutdown_requested(&shutdown) {
            break;
        }
    }
}

/// True once the shutdown sender has been dropped.
pub(crate) fn shutdown_requested(shutdown: &Receiver<()>) -> bool {
    matches!(shutdown.try_recv(), Err(crossbeam_channel::TryRecvError::Disconnected))
}

/// Wait for a worker that signals completion by dropping `done`'s sender.
///
/// On timeout the thread is detached and left to finish on its own.
pub(crate) fn join_with_timeout(handle: JoinHandle<()>, done: &Receiver<()>, timeout: Duration, what: &str) {
    match done.recv_timeout(timeout) {
        Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
            tracing::warn!("{} worker did not stop within {:?}; detaching it", what, timeout);
        }
        _ => {
            if handle.join().is_err() {
                tracing::warn!("{} worker panicked", what);
            }
        }
    }
}
