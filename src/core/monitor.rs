//! The polling directory monitor.
//!
//! A dedicated thread captures the directory, runs every registered
//! recognizer against the previous capture and hands the results to every
//! registered listener, then waits for the configured delay. Recognizers and
//! listeners may be added or removed from any thread at any time; the poller
//! copies both registries once per cycle, so changes take effect on the next
//! cycle.

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use crate::config::{InitialScan, MonitorConfig};
use crate::error::{MonitorError, Result};
use super::drain::{join_with_timeout, shutdown_requested};
use super::events::ChangeEvent;
use super::lifecycle::{Lifecycle, RunEvent};
use super::listener::DirectoryListener;
use super::recognizer::{FileActivity, Recognizer};
use super::snapshot::{capture, validate_directory, DirectorySnapshot};

/// Poll interval used when none is configured
pub const DEFAULT_DELAY: Duration = Duration::from_millis(5000);
/// How long `stop()` waits for the poller before detaching it
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

struct PollWorker {
    handle: JoinHandle<()>,
    shutdown: Sender<()>,
    done: Receiver<()>,
}

/// State shared between the monitor handle and its poller thread.
struct Shared {
    directory: RwLock<PathBuf>,
    delay_ms: AtomicU64,
    initial_scan: InitialScan,
    recognizers: RwLock<Vec<Arc<dyn FileActivity>>>,
    listeners: RwLock<Vec<Arc<dyn DirectoryListener>>>,
    previous: Mutex<Option<DirectorySnapshot>>,
    /// Bumped by every start and stop; a poller only publishes while its
    /// own generation is current.
    generation: AtomicU64,
    /// Serializes scan cycles, including those of a detached poller.
    cycle: Mutex<()>,
}

pub struct DirectoryMonitor {
    shared: Arc<Shared>,
    lifecycle: Lifecycle,
    worker: Mutex<Option<PollWorker>>,
    stop_timeout: Duration,
}

impl std::fmt::Debug for DirectoryMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryMonitor")
            .field("stop_timeout", &self.stop_timeout)
            .finish_non_exhaustive()
    }
}

impl DirectoryMonitor {
    /// Create a stopped monitor with the default delay.
    pub fn new<P: AsRef<Path>>(directory: P) -> Result<Self> {
        Self::with_config(directory, &MonitorConfig::default())
    }

    pub fn with_config<P: AsRef<Path>>(directory: P, config: &MonitorConfig) -> Result<Self> {
        let directory = absolute(directory.as_ref());
        validate_directory(&directory)?;

        Ok(Self {
            shared: Arc::new(Shared {
                directory: RwLock::new(directory),
                delay_ms: AtomicU64::new(config.delay_ms.max(1)),
                initial_scan: config.initial_scan,
                recognizers: RwLock::new(Vec::new()),
                listeners: RwLock::new(Vec::new()),
                previous: Mutex::new(None),
                generation: AtomicU64::new(0),
                cycle: Mutex::new(()),
            }),
            lifecycle: Lifecycle::start_stop(),
            worker: Mutex::new(None),
            stop_timeout: config.stop_timeout(),
        })
    }

    pub fn directory(&self) -> PathBuf {
        self.shared.directory()
    }

    /// Point the monitor at another directory. Only allowed while stopped;
    /// the next scan starts from a fresh baseline.
    pub fn set_directory<P: AsRef<Path>>(&self, directory: P) -> Result<()> {
        let _slot = lock(&self.worker);
        if self.lifecycle.is_running() {
            return Err(MonitorError::IllegalState(
                "cannot change directory while the monitor is running".to_string(),
            ));
        }

        let directory = absolute(directory.as_ref());
        validate_directory(&directory)?;
        *write(&self.shared.directory) = directory;
        *lock(&self.shared.previous) = None;
        Ok(())
    }

    pub fn delay(&self) -> Duration {
        self.shared.delay()
    }

    /// Takes effect after the current wait. Clamped to at least 1 ms.
    pub fn set_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX).max(1);
        self.shared.delay_ms.store(millis, Ordering::Relaxed);
    }

    pub fn add_file_activity(&self, activity: Arc<dyn FileActivity>) {
        write(&self.shared.recognizers).push(activity);
    }

    /// Register the created, deleted and changed recognizers.
    pub fn add_builtin_activities(&self) {
        let mut recognizers = write(&self.shared.recognizers);
        for recognizer in Recognizer::ALL {
            recognizers.push(Arc::new(recognizer));
        }
    }

    /// Remove a recognizer previously added through the same `Arc`.
    pub fn remove_file_activity(&self, activity: &Arc<dyn FileActivity>) -> bool {
        remove_same(&mut write(&self.shared.recognizers), activity)
    }

    pub fn file_activity_count(&self) -> usize {
        read(&self.shared.recognizers).len()
    }

    pub fn add_directory_listener(&self, listener: Arc<dyn DirectoryListener>) {
        write(&self.shared.listeners).push(listener);
    }

    /// Remove a listener previously added through the same `Arc`.
    pub fn remove_directory_listener(&self, listener: &Arc<dyn DirectoryListener>) -> bool {
        remove_same(&mut write(&self.shared.listeners), listener)
    }

    pub fn directory_listener_count(&self) -> usize {
        read(&self.shared.listeners).len()
    }

    /// The snapshot the next scan will be compared against.
    pub fn latest_snapshot(&self) -> Option<DirectorySnapshot> {
        lock(&self.shared.previous).clone()
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle.is_running()
    }

    /// Spawn the poller. The directory is validated first; if it is no
    /// longer usable the monitor stays stopped.
    pub fn start(&self) -> Result<()> {
        let mut slot = lock(&self.worker);
        if !self.lifecycle.can_transition(RunEvent::Start) {
            return Err(MonitorError::IllegalState("monitor is already running".to_string()));
        }

        let directory = self.shared.directory();
        validate_directory(&directory)?;

        let (shutdown_tx, shutdown_rx) = unbounded::<()>();
        let (done_tx, done_rx) = unbounded::<()>();
        let shared = self.shared.clone();
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let handle = thread::Builder::new()
            .name("directory-poller".to_string())
            .spawn(move || {
                poll_loop(&shared, &shutdown_rx, generation);
                drop(done_tx);
            })
            .map_err(|err| MonitorError::IllegalState(format!("failed to spawn poller: {}", err)))?;

        self.lifecycle.transition(RunEvent::Start)?;
        *slot = Some(PollWorker {
            handle,
            shutdown: shutdown_tx,
            done: done_rx,
        });

        tracing::info!("Monitoring {} every {:?}", directory.display(), self.delay());
        Ok(())
    }

    /// Signal the poller and wait for it, at most for the stop timeout.
    ///
    /// A poller stuck in a recognizer or listener is detached rather than
    /// waited on; the monitor still reports stopped. A detached poller drops
    /// whatever its current cycle finds instead of delivering it.
    pub fn stop(&self) -> Result<()> {
        let mut slot = lock(&self.worker);
        if !self.lifecycle.can_transition(RunEvent::Stop) {
            return Err(MonitorError::IllegalState("monitor is not running".to_string()));
        }

        if let Some(worker) = slot.take() {
            self.shared.generation.fetch_add(1, Ordering::SeqCst);
            drop(worker.shutdown);
            join_with_timeout(worker.handle, &worker.done, self.stop_timeout, "directory poller");
        }

        self.lifecycle.transition(RunEvent::Stop)?;
        tracing::info!("Stopped monitoring {}", self.shared.directory().display());
        Ok(())
    }

    /// Run one capture/diff/dispatch cycle on the calling thread and return
    /// the number of events produced, whether or not listeners accepted
    /// them. Only allowed while stopped.
    pub fn scan_once(&self) -> Result<usize> {
        let _slot = lock(&self.worker);
        if self.lifecycle.is_running() {
            return Err(MonitorError::IllegalState(
                "cannot scan manually while the poller is running".to_string(),
            ));
        }
        self.shared.run_cycle(None)
    }
}

impl Drop for DirectoryMonitor {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.stop();
        }
    }
}

impl Shared {
    fn directory(&self) -> PathBuf {
        read(&self.directory).clone()
    }

    fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms.load(Ordering::Relaxed))
    }

    /// `None` is a manual scan, which is always current.
    fn is_current(&self, generation: Option<u64>) -> bool {
        generation.map_or(true, |generation| self.generation.load(Ordering::SeqCst) == generation)
    }

    fn run_cycle(&self, generation: Option<u64>) -> Result<usize> {
        let _cycle = lock(&self.cycle);
        let directory = self.directory();
        let current = capture(&directory)?;

        let previous = lock(&self.previous).clone();
        let baseline = match previous {
            Some(previous) => previous,
            None => match self.initial_scan {
                InitialScan::Baseline => {
                    if self.is_current(generation) {
                        tracing::debug!("Baseline of {} holds {} files", directory.display(), current.len());
                        *lock(&self.previous) = Some(current);
                    }
                    return Ok(0);
                }
                InitialScan::ReportExisting => DirectorySnapshot::empty(&directory),
            },
        };

        let recognizers = read(&self.recognizers).clone();
        let listeners = read(&self.listeners).clone();
        let mut reports = Vec::with_capacity(recognizers.len());

        for recognizer in &recognizers {
            let events = match panic::catch_unwind(AssertUnwindSafe(|| recognizer.diff(&baseline, &current))) {
                Ok(events) => events,
                Err(_) => {
                    tracing::warn!("Recognizer {} panicked; skipping it this cycle", recognizer.name());
                    continue;
                }
            };

            if events.is_empty() {
                continue;
            }

            tracing::debug!("{} reported {} events", recognizer.name(), events.len());
            reports.push((recognizer, events));
        }

        if !self.is_current(generation) {
            tracing::debug!("Poller for {} was stopped; dropping this cycle", directory.display());
            return Ok(0);
        }

        let mut produced = 0;
        for (recognizer, events) in &reports {
            dispatch(&listeners, recognizer.name(), events);
            produced += events.len();
        }

        *lock(&self.previous) = Some(current);
        Ok(produced)
    }
}

fn poll_loop(shared: &Shared, shutdown: &Receiver<()>, generation: u64) {
    loop {
        if shutdown_requested(shutdown) {
            break;
        }

        if let Err(err) = shared.run_cycle(Some(generation)) {
            tracing::warn!("Scan skipped: {}", err);
        }

        match shutdown.recv_timeout(shared.delay()) {
            Err(RecvTimeoutError::Timeout) => continue,
            _ => break,
        }
    }
    tracing::debug!("Poller for {} exiting", shared.directory().display());
}

fn dispatch(listeners: &[Arc<dyn DirectoryListener>], source: &str, events: &[ChangeEvent]) {
    for listener in listeners {
        match panic::catch_unwind(AssertUnwindSafe(|| listener.on_events(source, events))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::warn!("Listener failed on {} events from {}: {:#}", events.len(), source, err);
            }
            Err(_) => {
                tracing::warn!("Listener panicked on {} events from {}", events.len(), source);
            }
        }
    }
}

fn remove_same<T: ?Sized>(items: &mut Vec<Arc<T>>, target: &Arc<T>) -> bool {
    let target = Arc::as_ptr(target).cast::<()>();
    match items.iter().position(|item| Arc::as_ptr(item).cast::<()>() == target) {
        Some(index) => {
            items.remove(index);
            true
        }
        None => false,
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
