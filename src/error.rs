//! Error types for foldersync
//!
//! Errors fall into two groups. Fatal errors (missing source root, unusable
//! replica root, unopenable log file) stop the scheduler and terminate the
//! process. Per-entry errors ([`SyncError::FileAccess`]) are recoverable: the
//! reconciler logs them, records them in the cycle report and moves on.

use crate::types::FileOperation;
use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the foldersync library
pub type Result<T> = std::result::Result<T, SyncError>;

/// Main error type for all foldersync operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// I/O errors outside of a specific tree entry
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Walk directory error from walkdir crate
    #[error("Walk directory error: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// Source root does not exist
    #[error("Source directory not found: {0:?}")]
    SourceNotFound(PathBuf),

    /// Source root exists but is not a directory
    #[error("Source is not a directory: {0:?}")]
    SourceNotDirectory(PathBuf),

    /// Replica root could not be created or replaced
    #[error("Replica directory unusable: {path:?}: {source}")]
    ReplicaRoot {
        /// Replica root path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Log file could not be opened for appending
    #[error("Cannot open log file {path:?}: {source}")]
    LogFile {
        /// Log file path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A single entry could not be read, copied or removed
    #[error("Failed to {operation} {path:?}: {source}")]
    FileAccess {
        /// Path of the entry that failed
        path: PathBuf,
        /// Operation that was attempted
        operation: FileOperation,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Logging subsystem could not be installed
    #[error("Logging setup failed: {0}")]
    Logging(String),
}

impl SyncError {
    /// Create a per-entry access error
    pub fn file_access(
        path: impl Into<PathBuf>,
        operation: FileOperation,
        source: std::io::Error,
    ) -> Self {
        SyncError::FileAccess {
            path: path.into(),
            operation,
            source,
        }
    }

    /// Create an invalid configuration error with a custom message
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        SyncError::InvalidConfiguration(msg.into())
    }

    /// Check if this error is recoverable within a cycle
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SyncError::FileAccess { .. } | SyncError::WalkDir(_))
    }

    /// Check if this error must terminate the process
    pub fn is_fatal(&self) -> bool {
        !self.is_recoverable()
    }

    /// Check if the underlying I/O error means the entry vanished
    pub fn is_not_found(&self) -> bool {
        match self {
            SyncError::Io(e) | SyncError::FileAccess { source: e, .. } => {
                e.kind() == std::io::ErrorKind::NotFound
            }
            SyncError::WalkDir(e) => e
                .io_error()
                .is_some_and(|io| io.kind() == std::io::ErrorKind::NotFound),
            _ => false,
        }
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            SyncError::SourceNotFound(path) => {
                format!("Source directory {:?} does not exist. Check the first argument.", path)
            }
            SyncError::SourceNotDirectory(path) => {
                format!("Source {:?} is a file. The source must be a directory.", path)
            }
            SyncError::LogFile { path, source } => {
                format!(
                    "Cannot write the log file {:?} ({}). Check that its directory exists and is writable.",
                    path, source
                )
            }
            _ => self.to_string(),
        }
    }
}
