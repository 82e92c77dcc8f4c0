//! Change events reported to listeners.

use std::fmt;
use std::path::Path;
use serde::{Deserialize, Serialize};
use super::snapshot::FileRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

impl ChangeKind {
    /// Single-letter tag used by the compact output format
    pub fn short(&self) -> &'static str {
        match self {
            ChangeKind::Created => "C",
            ChangeKind::Modified => "M",
            ChangeKind::Deleted => "D",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Created => write!(f, "CREATED"),
            ChangeKind::Modified => write!(f, "MODIFIED"),
            ChangeKind::Deleted => write!(f, "DELETED"),
        }
    }
}

/// A single change detected between two snapshots.
///
/// The constructors are the only way to build one, which keeps the record
/// slots consistent with the kind: a created file has no `before`, a deleted
/// file has no `after`, and a modification carries both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    kind: ChangeKind,
    before: Option<FileRecord>,
    after: Option<FileRecord>,
}

impl ChangeEvent {
    pub fn created(after: FileRecord) -> Self {
        Self {
            kind: ChangeKind::Created,
            before: None,
            after: Some(after),
        }
    }

    pub fn deleted(before: FileRecord) -> Self {
        Self {
            kind: ChangeKind::Deleted,
            before: Some(before),
            after: None,
        }
    }

    pub fn modified(before: FileRecord, after: FileRecord) -> Self {
        Self {
            kind: ChangeKind::Modified,
            before: Some(before),
            after: Some(after),
        }
    }

    pub fn kind(&self) -> ChangeKind {
        self.kind
    }

    pub fn before(&self) -> Option<&FileRecord> {
        self.before.as_ref()
    }

    pub fn after(&self) -> Option<&FileRecord> {
        self.after.as_ref()
    }

    /// Path of the affected file, taken from whichever record is present.
    pub fn path(&self) -> &Path {
        self.after
            .as_ref()
            .or(self.before.as_ref())
            .map(FileRecord::path)
            .unwrap_or_else(|| Path::new(""))
    }

    /// The most recent record known for the file.
    pub fn latest(&self) -> Option<&FileRecord> {
        self.after.as_ref().or(self.before.as_ref())
    }
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.path().display())
    }
}
