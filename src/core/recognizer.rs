//! Diffing strategies that turn two snapshots into change events.
//!
//! Each strategy is a pure function over plain data: it never mutates its
//! inputs and always returns the same events for the same pair of
//! snapshots. Events from one strategy come out in path order.

use std::fmt;
use super::events::ChangeEvent;
use super::snapshot::DirectorySnapshot;

/// Capability shared by every recognizer the monitor can drive.
///
/// Implementations must be cheap to call from the poller thread and must not
/// block; a slow recognizer delays the whole cycle and shutdown.
pub trait FileActivity: Send + Sync {
    /// Name used in logs and passed to listeners as the event source.
    fn name(&self) -> &str;

    /// Compare two captures of the same directory. Callers must not pass
    /// snapshots of different directories; the built-in recognizers report
    /// nothing for such a pair.
    fn diff(&self, before: &DirectorySnapshot, after: &DirectorySnapshot) -> Vec<ChangeEvent>;
}

/// The built-in recognizers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Recognizer {
    /// Files present only in the newer snapshot
    Created,
    /// Files present only in the older snapshot
    Deleted,
    /// Files present in both whose size or modification time changed
    Changed,
}

impl Recognizer {
    pub const ALL: [Recognizer; 3] = [Recognizer::Created, Recognizer::Deleted, Recognizer::Changed];

    pub fn diff(&self, before: &DirectorySnapshot, after: &DirectorySnapshot) -> Vec<ChangeEvent> {
        if before.directory() != after.directory() {
            tracing::warn!(
                "Not comparing snapshots of different directories: {} and {}",
                before.directory().display(),
                after.directory().display()
            );
            return Vec::new();
        }

        match self {
            Recognizer::Created => created(before, after),
            Recognizer::Deleted => deleted(before, after),
            Recognizer::Changed => changed(before, after),
        }
    }
}

impl FileActivity for Recognizer {
    fn name(&self) -> &str {
        match self {
            Recognizer::Created => "created",
            Recognizer::Deleted => "deleted",
            Recognizer::Changed => "changed",
        }
    }

    fn diff(&self, before: &DirectorySnapshot, after: &DirectorySnapshot) -> Vec<ChangeEvent> {
        Recognizer::diff(self, before, after)
    }
}

impl fmt::Display for Recognizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(FileActivity::name(self))
    }
}

pub fn created(before: &DirectorySnapshot, after: &DirectorySnapshot) -> Vec<ChangeEvent> {
    after
        .records()
        .filter(|record| !before.contains(record.path()))
        .cloned()
        .map(ChangeEvent::created)
        .collect()
}

pub fn deleted(before: &DirectorySnapshot, after: &DirectorySnapshot) -> Vec<ChangeEvent> {
    before
        .records()
        .filter(|record| !after.contains(record.path()))
        .cloned()
        .map(ChangeEvent::deleted)
        .collect()
}

pub fn changed(before: &DirectorySnapshot, after: &DirectorySnapshot) -> Vec<ChangeEvent> {
    after
        .records()
        .filter_map(|current| {
            let previous = before.get(current.path())?;
            previous
                .differs_from(current)
                .then(|| ChangeEvent::modified(previous.clone(), current.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::events::ChangeKind;
    use crate::core::snapshot::FileRecord;
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};

    const DIR: &str = "/watched";

    fn snapshot(files: &[(&str, u64, i64)]) -> DirectorySnapshot {
        DirectorySnapshot::from_records(
            DIR,
            files
                .iter()
                .map(|(name, len, mtime)| FileRecord::new(Path::new(DIR).join(name), *len, *mtime)),
        )
    }

    fn sample_pairs() -> Vec<(DirectorySnapshot, DirectorySnapshot)> {
        vec![
            (snapshot(&[]), snapshot(&[])),
            (snapshot(&[]), snapshot(&[("a.txt", 10, 100)])),
            (snapshot(&[("a.txt", 10, 100)]), snapshot(&[])),
            (snapshot(&[("a.txt", 10, 100)]), snapshot(&[("a.txt", 12, 200)])),
            (
                snapshot(&[("a.txt", 1, 1), ("b.txt", 2, 2), ("c.txt", 3, 3)]),
                snapshot(&[("b.txt", 2, 5), ("c.txt", 3, 3), ("d.txt", 4, 4), ("e.txt", 0, 0)]),
            ),
            (
                snapshot(&[("x", 5, 5), ("y", 6, 6)]),
                snapshot(&[("x", 5, 5), ("y", 6, 6)]),
            ),
        ]
    }

    #[test]
    fn test_scenario_created() {
        let before = snapshot(&[]);
        let after = snapshot(&[("a.txt", 10, 100)]);

        let events = Recognizer::Created.diff(&before, &after);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), ChangeKind::Created);
        assert_eq!(events[0].path(), Path::new("/watched/a.txt"));
        assert!(Recognizer::Deleted.diff(&before, &after).is_empty());
        assert!(Recognizer::Changed.diff(&before, &after).is_empty());
    }

    #[test]
    fn test_scenario_modified() {
        let before = snapshot(&[("a.txt", 10, 100)]);
        let after = snapshot(&[("a.txt", 12, 200)]);

        let events = Recognizer::Changed.diff(&before, &after);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), ChangeKind::Modified);
        assert_eq!(events[0].before().map(FileRecord::length), Some(10));
        assert_eq!(events[0].after().map(FileRecord::length), Some(12));
        assert!(Recognizer::Created.diff(&before, &after).is_empty());
        assert!(Recognizer::Deleted.diff(&before, &after).is_empty());
    }

    #[test]
    fn test_scenario_deleted() {
        let before = snapshot(&[("a.txt", 10, 100)]);
        let after = snapshot(&[]);

        let events = Recognizer::Deleted.diff(&before, &after);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), ChangeKind::Deleted);
        assert_eq!(events[0].path(), Path::new("/watched/a.txt"));
        assert!(events[0].after().is_none());
    }

    #[test]
    fn test_mtime_only_change_is_modified() {
        let before = snapshot(&[("a.txt", 10, 100)]);
        let after = snapshot(&[("a.txt", 10, 101)]);
        assert_eq!(Recognizer::Changed.diff(&before, &after).len(), 1);
    }

    #[test]
    fn test_identical_snapshots_yield_nothing() {
        for (before, _) in sample_pairs() {
            for recognizer in Recognizer::ALL {
                assert!(recognizer.diff(&before, &before).is_empty(), "{} on {:?}", recognizer, before);
            }
        }
    }

    #[test]
    fn test_at_most_one_event_per_path() {
        for (before, after) in sample_pairs() {
            let mut seen: HashMap<PathBuf, usize> = HashMap::new();
            for recognizer in Recognizer::ALL {
                for event in recognizer.diff(&before, &after) {
                    *seen.entry(event.path().to_path_buf()).or_default() += 1;
                }
            }
            assert!(seen.values().all(|count| *count == 1), "{:?}", seen);
        }
    }

    #[test]
    fn test_rerun_is_identical() {
        for (before, after) in sample_pairs() {
            for recognizer in Recognizer::ALL {
                assert_eq!(recognizer.diff(&before, &after), recognizer.diff(&before, &after));
            }
        }
    }

    #[test]
    fn test_mixed_diff_is_path_ordered() {
        let before = snapshot(&[("a.txt", 1, 1), ("b.txt", 2, 2)]);
        let after = snapshot(&[("e.txt", 0, 0), ("d.txt", 4, 4), ("b.txt", 2, 2)]);

        let created: Vec<_> = Recognizer::Created
            .diff(&before, &after)
            .iter()
            .map(|e| e.path().to_path_buf())
            .collect();
        assert_eq!(created, vec![PathBuf::from("/watched/d.txt"), PathBuf::from("/watched/e.txt")]);

        let deleted = Recognizer::Deleted.diff(&before, &after);
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].path(), Path::new("/watched/a.txt"));
    }

    #[test]
    fn test_names() {
        assert_eq!(FileActivity::name(&Recognizer::Created), "created");
        assert_eq!(Recognizer::Changed.to_string(), "changed");
    }

    #[test]
    fn test_snapshots_of_different_directories_yield_nothing() {
        let before = snapshot(&[("a.txt", 1, 1)]);
        let after = DirectorySnapshot::from_records(
            "/elsewhere",
            [FileRecord::new("/elsewhere/b.txt", 2, 2)],
        );

        for recognizer in Recognizer::ALL {
            assert!(recognizer.diff(&before, &after).is_empty());
        }
    }
}
