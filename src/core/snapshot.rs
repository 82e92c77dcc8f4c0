//! Point-in-time captures of a directory's file metadata.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use serde::{Deserialize, Serialize};
use crate::error::{MonitorError, Result};

/// Metadata of one file as seen by a single scan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileRecord {
    path: PathBuf,
    length: u64,
    /// Milliseconds since the Unix epoch
    last_modified: i64,
}

impl FileRecord {
    pub fn new(path: impl Into<PathBuf>, length: u64, last_modified: i64) -> Self {
        Self {
            path: path.into(),
            length,
            last_modified,
        }
    }

    pub fn from_metadata(path: PathBuf, metadata: &fs::Metadata) -> Self {
        let last_modified = metadata
            .modified()
            .ok()
            .map(epoch_millis)
            .unwrap_or(0);
        Self::new(path, metadata.len(), last_modified)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn last_modified(&self) -> i64 {
        self.last_modified
    }

    /// True when size or modification time differ.
    pub fn differs_from(&self, other: &FileRecord) -> bool {
        self.length != other.length || self.last_modified != other.last_modified
    }
}

/// Every regular file of one directory at one instant, keyed by absolute path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectorySnapshot {
    directory: PathBuf,
    records: BTreeMap<PathBuf, FileRecord>,
}

impl DirectorySnapshot {
    pub fn empty(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            records: BTreeMap::new(),
        }
    }

    pub fn from_records<I>(directory: impl Into<PathBuf>, records: I) -> Self
    where
        I: IntoIterator<Item = FileRecord>,
    {
        let records = records
            .into_iter()
            .map(|record| (record.path.clone(), record))
            .collect();
        Self {
            directory: directory.into(),
            records,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn get(&self, path: &Path) -> Option<&FileRecord> {
        self.records.get(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.records.contains_key(path)
    }

    /// Records in path order.
    pub fn records(&self) -> impl Iterator<Item = &FileRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Check that `directory` exists, is a directory and can be listed.
pub fn validate_directory(directory: &Path) -> Result<()> {
    let metadata = fs::metadata(directory).map_err(|err| {
        MonitorError::configuration(directory, format!("cannot be accessed: {}", err))
    })?;

    if !metadata.is_dir() {
        return Err(MonitorError::configuration(directory, "is not a directory"));
    }

    fs::read_dir(directory)
        .map_err(|err| MonitorError::configuration(directory, format!("is not readable: {}", err)))?;

    Ok(())
}

/// Scan `directory` (non-recursively) and record every regular file in it.
///
/// Entries that vanish or cannot be stat'ed between listing and reading their
/// metadata are skipped, so the result is a best-effort partial snapshot.
/// Only a failure to list the directory itself is reported.
pub fn capture(directory: &Path) -> Result<DirectorySnapshot> {
    let entries = fs::read_dir(directory).map_err(|source| MonitorError::TransientScan {
        path: directory.to_path_buf(),
        source,
    })?;

    let mut snapshot = DirectorySnapshot::empty(directory);

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!("Skipping unreadable entry in {}: {}", directory.display(), err);
                continue;
            }
        };

        let path = entry.path();
        let metadata = match fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(err) => {
                // Usually a file removed between listing and stat
                tracing::debug!("Skipping {}: {}", path.display(), err);
                continue;
            }
        };

        if !metadata.is_file() {
            continue;
        }

        let record = FileRecord::from_metadata(path.clone(), &metadata);
        snapshot.records.insert(path, record);
    }

    Ok(snapshot)
}

fn epoch_millis(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_millis() as i64,
        Err(before_epoch) => -(before_epoch.duration().as_millis() as i64),
    }
}
