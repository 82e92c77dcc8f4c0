use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use dirpoll::{
    BatchingQueueDrain, ChangeEvent, ChangeKind, DirectoryListener, DirectoryMonitor, DirectorySnapshot,
    FileActivity, InitialScan, MonitorConfig,
};

#[derive(Default)]
struct Collector {
    events: Mutex<Vec<ChangeEvent>>,
}

impl DirectoryListener for Collector {
    fn on_event(&self, event: &ChangeEvent) -> anyhow::Result<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

impl Collector {
    fn count(&self, kind: ChangeKind) -> usize {
        self.events.lock().unwrap().iter().filter(|e| e.kind() == kind).count()
    }
}

fn fast_monitor(path: &std::path::Path, delay_ms: u64) -> DirectoryMonitor {
    let config = MonitorConfig {
        delay_ms,
        ..MonitorConfig::default()
    };
    let monitor = DirectoryMonitor::with_config(path, &config).expect("Failed to create monitor");
    monitor.add_builtin_activities();
    monitor
}

/// Write outside the scanned level, then rename in, so a scan never sees a half-written file.
fn place(dir: &std::path::Path, name: &str, contents: &str) {
    let staging = dir.join(".staging");
    fs::create_dir_all(&staging).expect("Failed to create staging dir");
    let staged = staging.join(name);
    fs::write(&staged, contents).expect("Failed to write test file");
    fs::rename(&staged, dir.join(name)).expect("Failed to move test file");
}

fn wait_until<F: Fn() -> bool>(timeout: Duration, condition: F) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

#[test]
fn test_created_file_reaches_every_listener() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let monitor = fast_monitor(temp_dir.path(), 100);

    let first = Arc::new(Collector::default());
    let second = Arc::new(Collector::default());
    monitor.add_directory_listener(first.clone());
    monitor.add_directory_listener(second.clone());

    monitor.start().expect("Failed to start monitor");
    assert!(wait_until(Duration::from_secs(2), || monitor.latest_snapshot().is_some()));

    place(temp_dir.path(), "a.txt", "0123456789");

    assert!(wait_until(Duration::from_secs(2), || {
        first.count(ChangeKind::Created) == 1 && second.count(ChangeKind::Created) == 1
    }));

    // A few more cycles must not report the same file again
    thread::sleep(Duration::from_millis(300));
    monitor.stop().expect("Failed to stop monitor");

    for collector in [&first, &second] {
        assert_eq!(collector.count(ChangeKind::Created), 1);
        let events = collector.events.lock().unwrap();
        assert!(events[0].path().ends_with("a.txt"));
        assert_eq!(events[0].after().map(|r| r.length()), Some(10));
    }
}

#[test]
fn test_modification_and_deletion_are_reported() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let file = temp_dir.path().join("data.bin");
    fs::write(&file, "short").expect("Failed to write test file");

    let monitor = fast_monitor(temp_dir.path(), 50);
    let collector = Arc::new(Collector::default());
    monitor.add_directory_listener(collector.clone());
    monitor.start().expect("Failed to start monitor");
    assert!(wait_until(Duration::from_secs(2), || monitor.latest_snapshot().is_some()));

    fs::write(&file, "a much longer payload").expect("Failed to modify test file");
    assert!(wait_until(Duration::from_secs(2), || collector.count(ChangeKind::Modified) >= 1));

    fs::remove_file(&file).expect("Failed to delete test file");
    assert!(wait_until(Duration::from_secs(2), || collector.count(ChangeKind::Deleted) == 1));

    monitor.stop().expect("Failed to stop monitor");
    assert_eq!(collector.count(ChangeKind::Created), 0);
}

#[test]
fn test_report_existing_mode_announces_present_files() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    fs::write(temp_dir.path().join("one"), "1").unwrap();
    fs::write(temp_dir.path().join("two"), "2").unwrap();

    let config = MonitorConfig {
        delay_ms: 50,
        initial_scan: InitialScan::ReportExisting,
        ..MonitorConfig::default()
    };
    let monitor = DirectoryMonitor::with_config(temp_dir.path(), &config).unwrap();
    monitor.add_builtin_activities();
    let collector = Arc::new(Collector::default());
    monitor.add_directory_listener(collector.clone());

    monitor.start().unwrap();
    assert!(wait_until(Duration::from_secs(2), || collector.count(ChangeKind::Created) == 2));
    monitor.stop().unwrap();
}

#[test]
fn test_monitor_feeds_batching_drain() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let monitor = fast_monitor(temp_dir.path(), 50);

    let batches = Arc::new(Mutex::new(Vec::<Vec<ChangeEvent>>::new()));
    let sink = batches.clone();
    let drain = Arc::new(BatchingQueueDrain::new(move |batch: Vec<ChangeEvent>| {
        sink.lock().unwrap().push(batch);
    }));
    drain.start().unwrap();
    monitor.add_directory_listener(drain.clone());

    monitor.start().unwrap();
    assert!(wait_until(Duration::from_secs(2), || monitor.latest_snapshot().is_some()));

    for i in 0..5 {
        place(temp_dir.path(), &format!("f{}.txt", i), "x");
    }

    let total = || batches.lock().unwrap().iter().map(Vec::len).sum::<usize>();
    assert!(wait_until(Duration::from_secs(2), || total() == 5));

    monitor.stop().unwrap();
    drain.stop().unwrap();
    assert_eq!(total(), 5);
}

#[test]
fn test_listener_added_while_running_gets_later_events() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let monitor = fast_monitor(temp_dir.path(), 50);
    monitor.start().unwrap();
    assert!(wait_until(Duration::from_secs(2), || monitor.latest_snapshot().is_some()));

    let late = Arc::new(Collector::default());
    monitor.add_directory_listener(late.clone());
    place(temp_dir.path(), "late.txt", "x");

    assert!(wait_until(Duration::from_secs(2), || late.count(ChangeKind::Created) == 1));
    monitor.stop().unwrap();
}

/// Sleeps once, the first time it sees `trigger` in a capture.
struct Stalling {
    trigger: &'static str,
    stall: Duration,
    stalled: AtomicBool,
}

impl FileActivity for Stalling {
    fn name(&self) -> &str {
        "stalling"
    }

    fn diff(&self, _before: &DirectorySnapshot, after: &DirectorySnapshot) -> Vec<ChangeEvent> {
        let seen = after.records().any(|record| record.path().ends_with(self.trigger));
        if seen && !self.stalled.swap(true, Ordering::SeqCst) {
            thread::sleep(self.stall);
        }
        Vec::new()
    }
}

#[test]
fn test_timed_out_stop_then_restart_reports_once() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = MonitorConfig {
        delay_ms: 50,
        stop_timeout_secs: 1,
        ..MonitorConfig::default()
    };
    let monitor = DirectoryMonitor::with_config(temp_dir.path(), &config).unwrap();
    monitor.add_builtin_activities();
    let stalling = Arc::new(Stalling {
        trigger: "x.txt",
        stall: Duration::from_millis(2500),
        stalled: AtomicBool::new(false),
    });
    monitor.add_file_activity(stalling.clone());
    let collector = Arc::new(Collector::default());
    monitor.add_directory_listener(collector.clone());

    monitor.start().unwrap();
    assert!(wait_until(Duration::from_secs(2), || monitor.latest_snapshot().is_some()));

    place(temp_dir.path(), "x.txt", "x");
    assert!(wait_until(Duration::from_secs(2), || stalling.stalled.load(Ordering::SeqCst)));

    let started = Instant::now();
    monitor.stop().expect("A timed-out stop still succeeds");
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(900), "stop returned after {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(2), "stop returned after {:?}", elapsed);
    assert!(!monitor.is_running());

    // The detached poller is still inside the stalled cycle
    monitor.start().expect("Restart after a timed-out stop");
    assert!(wait_until(Duration::from_secs(5), || collector.count(ChangeKind::Created) >= 1));

    thread::sleep(Duration::from_millis(500));
    monitor.stop().unwrap();
    assert_eq!(collector.count(ChangeKind::Created), 1);
}
