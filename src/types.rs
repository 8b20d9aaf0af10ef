//! Core data types used throughout foldersync
//!
//! ## Overview
//!
//! - **Mutations**: [`ActionKind`], [`ActionRecord`] - one record per change applied to the replica
//! - **Failures**: [`FileOperation`], [`EntryFailure`] - recoverable per-entry errors
//! - **Results**: [`CycleReport`] - everything a reconciliation cycle did
//! - **Logging**: [`SyncEvent`] - what the logging capability receives
//!
//! The `Display` implementations of [`ActionRecord`] and [`SyncEvent`] are the
//! exact log message texts written to the log file and standard output.

use crate::error::SyncError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Kind of mutation applied to the replica
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    /// A directory was created in the replica
    DirectoryCreated,
    /// A file was copied into the replica for the first time
    FileCopied,
    /// An existing replica file was overwritten because its content drifted
    FileUpdated,
    /// An extraneous replica file was deleted
    FileRemoved,
    /// An extraneous replica directory tree was deleted
    DirectoryRemoved,
}

/// A single logged mutation produced during a cycle
///
/// # Examples
///
/// ```rust
/// # use foldersync::types::{ActionKind, ActionRecord};
/// # use std::path::Path;
/// let record = ActionRecord::replica_only(
///     ActionKind::FileRemoved,
///     Path::new("b.txt"),
///     Path::new("/replica/b.txt"),
/// );
/// assert_eq!(record.to_string(), "File removed: /replica/b.txt");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    /// What happened
    pub kind: ActionKind,
    /// Path relative to the tree roots (empty for the replica root)
    pub relative_path: PathBuf,
    /// Source file, for copies and updates
    pub source: Option<PathBuf>,
    /// Replica path that was mutated
    pub target: PathBuf,
    /// When the mutation completed
    pub timestamp: DateTime<Utc>,
}

impl ActionRecord {
    /// Record a copy or update from `source` to `target`
    pub fn transfer(kind: ActionKind, relative: &Path, source: &Path, target: &Path) -> Self {
        Self {
            kind,
            relative_path: relative.to_path_buf(),
            source: Some(source.to_path_buf()),
            target: target.to_path_buf(),
            timestamp: Utc::now(),
        }
    }

    /// Record a directory creation or a removal touching only the replica
    pub fn replica_only(kind: ActionKind, relative: &Path, target: &Path) -> Self {
        Self {
            kind,
            relative_path: relative.to_path_buf(),
            source: None,
            target: target.to_path_buf(),
            timestamp: Utc::now(),
        }
    }

    /// Record a directory creation
    pub fn directory_created(relative: &Path, target: &Path) -> Self {
        Self::replica_only(ActionKind::DirectoryCreated, relative, target)
    }
}

impl fmt::Display for ActionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let target = self.target.display();
        match self.kind {
            ActionKind::DirectoryCreated => write!(f, "Directory created: {}", target),
            ActionKind::FileCopied | ActionKind::FileUpdated => {
                let verb = if self.kind == ActionKind::FileCopied {
                    "copied"
                } else {
                    "updated"
                };
                write!(f, "File {}: ", verb)?;
                if let Some(src) = &self.source {
                    write!(f, "{} -> ", src.display())?;
                }
                write!(f, "{}", target)
            }
            ActionKind::FileRemoved => write!(f, "File removed: {}", target),
            ActionKind::DirectoryRemoved => write!(f, "Directory removed: {}", target),
        }
    }
}

/// Operation that was attempted when an entry failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileOperation {
    /// Listing or stat-ing a tree entry
    List,
    /// Computing a content fingerprint
    Fingerprint,
    /// Copying a new file into the replica
    Copy,
    /// Overwriting a drifted replica file
    Update,
    /// Creating a replica directory
    CreateDirectory,
    /// Deleting a replica file
    RemoveFile,
    /// Deleting a replica directory tree
    RemoveDirectory,
}

impl fmt::Display for FileOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            FileOperation::List => "list",
            FileOperation::Fingerprint => "hash",
            FileOperation::Copy => "copy",
            FileOperation::Update => "update",
            FileOperation::CreateDirectory => "create directory",
            FileOperation::RemoveFile => "remove file",
            FileOperation::RemoveDirectory => "remove directory",
        };
        f.write_str(verb)
    }
}

/// A recoverable failure for one entry during a cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryFailure {
    /// Path of the entry that failed
    pub path: PathBuf,
    /// Operation that was attempted
    pub operation: FileOperation,
    /// Error text
    pub message: String,
}

impl EntryFailure {
    /// Build a failure record from a reconciler error
    pub fn from_error(err: &SyncError) -> Self {
        match err {
            SyncError::FileAccess { path, operation, source } => Self {
                path: path.clone(),
                operation: *operation,
                message: source.to_string(),
            },
            SyncError::WalkDir(e) => Self {
                path: e.path().map(Path::to_path_buf).unwrap_or_default(),
                operation: FileOperation::List,
                message: e.to_string(),
            },
            other => Self {
                path: PathBuf::new(),
                operation: FileOperation::List,
                message: other.to_string(),
            },
        }
    }
}

impl fmt::Display for EntryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Failed to {} {}: {}", self.operation, self.path.display(), self.message)
    }
}

/// Everything one reconciliation cycle did
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    /// When the cycle started
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration of the cycle
    pub duration_ms: u64,
    /// Mutations in the order they completed
    pub actions: Vec<ActionRecord>,
    /// Recoverable per-entry failures
    pub failures: Vec<EntryFailure>,
    /// Source directories visited
    pub directories_scanned: usize,
    /// Source files visited
    pub files_scanned: usize,
    /// Bytes written into the replica by copies and updates
    pub bytes_copied: u64,
}

impl CycleReport {
    /// Number of mutation records emitted
    pub fn mutation_count(&self) -> usize {
        self.actions.len()
    }

    /// Number of records of a given kind
    pub fn count(&self, kind: ActionKind) -> usize {
        self.actions.iter().filter(|a| a.kind == kind).count()
    }

    /// True when the cycle changed nothing and hit no errors
    pub fn is_clean(&self) -> bool {
        self.actions.is_empty() && self.failures.is_empty()
    }
}

/// An event delivered to the logging capability
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// A cycle is about to reconcile
    CycleStarted,
    /// A mutation was applied
    Action(ActionRecord),
    /// A recoverable entry failure
    EntryFailed(EntryFailure),
    /// A cycle finished and the scheduler will sleep
    CycleFinished,
    /// A fatal error stopped the scheduler
    Aborted(String),
}

impl fmt::Display for SyncEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncEvent::CycleStarted => f.write_str("Starting synchronization..."),
            SyncEvent::Action(record) => record.fmt(f),
            SyncEvent::EntryFailed(failure) => failure.fmt(f),
            SyncEvent::CycleFinished => {
                f.write_str("Synchronization complete. Waiting for next interval...")
            }
            SyncEvent::Aborted(reason) => write!(f, "Synchronization aborted: {}", reason),
        }
    }
}
