//! Runtime configuration
//!
//! [`SyncConfig`] gathers everything the binary needs to build a
//! [`Scheduler`]: the two tree roots, the interval, the log file and the
//! tuning knobs of the reconciler.

use crate::error::{Result, SyncError};
use crate::reconcile::Reconciler;
use crate::scheduler::Scheduler;
use crate::sink::EventSink;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Configuration for a mirroring run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Authoritative tree
    pub source: PathBuf,
    /// Tree kept identical to `source`
    pub replica: PathBuf,
    /// Pause between the end of one cycle and the start of the next
    pub interval: Duration,
    /// Append-only log file
    pub log_file: PathBuf,
    /// Threads for file compare/copy jobs
    pub parallel_workers: usize,
    /// Reuse digests of files whose size and mtime did not change
    pub digest_cache: bool,
}

impl SyncConfig {
    /// Create a configuration with default tuning
    pub fn new(
        source: impl Into<PathBuf>,
        replica: impl Into<PathBuf>,
        interval: Duration,
        log_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source: source.into(),
            replica: replica.into(),
            interval,
            log_file: log_file.into(),
            parallel_workers: num_cpus::get(),
            digest_cache: false,
        }
    }

    /// Check the configuration before anything touches the filesystem
    ///
    /// # Errors
    ///
    /// - [`SyncError::SourceNotFound`] / [`SyncError::SourceNotDirectory`]
    /// - [`SyncError::InvalidConfiguration`] if the roots are the same or
    ///   one contains the other
    pub fn validate(&self) -> Result<()> {
        if !self.source.exists() {
            return Err(SyncError::SourceNotFound(self.source.clone()));
        }
        if !self.source.is_dir() {
            return Err(SyncError::SourceNotDirectory(self.source.clone()));
        }
        if self.parallel_workers == 0 {
            return Err(SyncError::invalid_configuration("parallel_workers must be at least 1"));
        }

        let source = self.source.canonicalize()?;
        let replica = resolve_lexically(&self.replica)?;
        if replica.starts_with(&source) || source.starts_with(&replica) {
            return Err(SyncError::invalid_configuration(format!(
                "source {:?} and replica {:?} must not contain each other",
                self.source, self.replica
            )));
        }
        Ok(())
    }

    /// Build the scheduler described by this configuration
    pub fn scheduler(&self, sink: Arc<dyn EventSink>) -> Scheduler {
        let reconciler = Reconciler::new(&self.source, &self.replica, sink.clone())
            .with_parallel_workers(self.parallel_workers)
            .with_digest_cache(self.digest_cache);
        Scheduler::new(reconciler, sink, self.interval)
    }
}

/// Absolute form of a path that may not exist yet
///
/// The longest existing ancestor is canonicalised and the remaining
/// components are appended unchanged.
fn resolve_lexically(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut existing = absolute.as_path();
    let mut rest = Vec::new();
    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name.to_os_string());
                existing = parent;
            }
            _ => return Ok(absolute),
        }
    }

    let mut resolved = existing.canonicalize()?;
    for name in rest.into_iter().rev() {
        resolved.push(name);
    }
    Ok(resolved)
}
