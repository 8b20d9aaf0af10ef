//! Tree differ and applier
//!
//! [`Reconciler::reconcile`] brings the replica tree into line with the source
//! tree in a single cycle. Side effects happen during the walk; there is no
//! separate diff phase.
//!
//! ## Phase 1: source, top-down
//!
//! Every source directory (including the root) is created in the replica if
//! missing. Every source file is copied when the replica lacks it, or
//! overwritten when the two [`Fingerprint`]s differ. Copies preserve the
//! source's permissions and timestamps. A replica file that cannot be hashed
//! counts as different, and a read-only one is deleted before it is rewritten.
//!
//! ## Phase 2: replica, bottom-up
//!
//! Children are visited before their parents. A replica file whose source
//! counterpart is not a file is deleted; a replica directory whose source
//! counterpart is not a directory is deleted together with its subtree.
//!
//! ## Type conflicts
//!
//! When the same relative path is a file on one side and a directory on the
//! other, phase 1 removes the replica entry and re-creates it with the
//! source's type, so the conflict is resolved within the same cycle.
//!
//! ## Failures
//!
//! A missing or non-directory source root and an unusable replica root are
//! fatal and returned as errors. Everything else is per entry: the failure is
//! reported through the [`EventSink`], recorded in the [`CycleReport`], and
//! the walk continues. Entries that vanish between listing and use are
//! skipped silently (debug log only); the next cycle picks up whatever state
//! they settle in.
//!
//! ## Symbolic links
//!
//! Links are never followed while walking. A source link to a regular file is
//! copied as a file. Links to directories and dangling links are skipped. In
//! the replica, a link is treated like a file entry.
//!
//! ## Special files
//!
//! FIFOs, sockets and device nodes in the source are reported as per-entry
//! failures and never opened. In the replica they are removed like any other
//! entry the source does not mirror.
//!
//! ## Case sensitivity
//!
//! Relative paths are compared byte for byte. On case-insensitive
//! filesystems, entries whose names differ only in case are not reconciled
//! against each other.

use crate::error::{Result, SyncError};
use crate::fingerprint::{DigestCache, Fingerprint};
use crate::sink::EventSink;
use crate::types::{ActionKind, ActionRecord, CycleReport, EntryFailure, FileOperation, SyncEvent};
use crate::utils::{self, EntryKind};
use chrono::Utc;
use parking_lot::Mutex;
use rayon::prelude::*;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument, trace, warn};
use walkdir::WalkDir;

/// One source file to bring into the replica
#[derive(Debug, Clone)]
struct FileJob {
    relative: PathBuf,
    source: PathBuf,
    target: PathBuf,
}

/// Collects the outcome of a cycle and forwards it to the sink as it happens
struct CycleRecorder<'a> {
    sink: &'a dyn EventSink,
    actions: Mutex<Vec<ActionRecord>>,
    failures: Mutex<Vec<EntryFailure>>,
    bytes_copied: AtomicU64,
}

impl<'a> CycleRecorder<'a> {
    fn new(sink: &'a dyn EventSink) -> Self {
        Self {
            sink,
            actions: Mutex::new(Vec::new()),
            failures: Mutex::new(Vec::new()),
            bytes_copied: AtomicU64::new(0),
        }
    }

    fn action(&self, record: ActionRecord) {
        self.sink.emit(&SyncEvent::Action(record.clone()));
        self.actions.lock().push(record);
    }

    fn failure(&self, err: SyncError) {
        if err.is_not_found() {
            debug!("Entry vanished during cycle, skipping: {}", err);
            return;
        }
        let failure = EntryFailure::from_error(&err);
        self.sink.emit(&SyncEvent::EntryFailed(failure.clone()));
        self.failures.lock().push(failure);
    }

    fn add_bytes(&self, bytes: u64) {
        self.bytes_copied.fetch_add(bytes, Ordering::Relaxed);
    }
}

/// One-way tree synchronizer from a source root to a replica root
///
/// # Examples
///
/// ```rust,no_run
/// use foldersync::{Reconciler, TracingSink};
/// use std::sync::Arc;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let reconciler = Reconciler::new("./source", "./replica", Arc::new(TracingSink::new()))
///     .with_parallel_workers(4);
/// let report = reconciler.reconcile()?;
/// println!("{} changes applied", report.mutation_count());
/// # Ok(())
/// # }
/// ```
pub struct Reconciler {
    source_root: PathBuf,
    replica_root: PathBuf,
    sink: Arc<dyn EventSink>,
    parallel_workers: usize,
    digest_cache: Option<DigestCache>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("source_root", &self.source_root)
            .field("replica_root", &self.replica_root)
            .field("parallel_workers", &self.parallel_workers)
            .field("digest_cache", &self.digest_cache.is_some())
            .finish()
    }
}

impl Reconciler {
    /// Create a sequential reconciler without a digest cache
    pub fn new(
        source_root: impl Into<PathBuf>,
        replica_root: impl Into<PathBuf>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            source_root: source_root.into(),
            replica_root: replica_root.into(),
            sink,
            parallel_workers: 1,
            digest_cache: None,
        }
    }

    /// Set the number of threads used for file compare/copy jobs (minimum 1)
    ///
    /// Directory creation always happens first and deletions only start after
    /// every file job has finished, whatever the worker count.
    pub fn with_parallel_workers(mut self, workers: usize) -> Self {
        self.parallel_workers = workers.max(1);
        self
    }

    /// Enable or disable the `(path, size, mtime)` digest cache
    pub fn with_digest_cache(mut self, enabled: bool) -> Self {
        self.digest_cache = enabled.then(DigestCache::new);
        self
    }

    /// Source tree root
    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    /// Replica tree root
    pub fn replica_root(&self) -> &Path {
        &self.replica_root
    }

    /// Run one reconciliation cycle
    ///
    /// Every mutation is reported to the sink as it is applied and also
    /// returned in the [`CycleReport`].
    ///
    /// # Errors
    ///
    /// - [`SyncError::SourceNotFound`] / [`SyncError::SourceNotDirectory`] if
    ///   the source root is unusable
    /// - [`SyncError::ReplicaRoot`] if the replica root cannot be created
    ///
    /// Per-entry problems are never returned; see [`CycleReport::failures`].
    #[instrument(skip(self))]
    pub fn reconcile(&self) -> Result<CycleReport> {
        let started_at = Utc::now();
        let start = Instant::now();

        self.check_source_root()?;
        let recorder = CycleRecorder::new(self.sink.as_ref());
        self.prepare_replica_root(&recorder)?;

        let (directories_scanned, jobs) = self.mirror_directories(&recorder);
        let files_scanned = jobs.len();
        self.sync_files(&jobs, &recorder);
        self.prune_replica(&recorder);

        if let Some(cache) = &self.digest_cache {
            cache.retain_seen();
        }

        let report = CycleReport {
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
            actions: recorder.actions.into_inner(),
            failures: recorder.failures.into_inner(),
            directories_scanned,
            files_scanned,
            bytes_copied: recorder.bytes_copied.into_inner(),
        };

        debug!(
            "Reconciled {} directories and {} files in {}ms: {} changes, {} failures, {} bytes copied",
            report.directories_scanned,
            report.files_scanned,
            report.duration_ms,
            report.mutation_count(),
            report.failures.len(),
            report.bytes_copied
        );

        Ok(report)
    }

    fn check_source_root(&self) -> Result<()> {
        match fs::metadata(&self.source_root) {
            Ok(metadata) if metadata.is_dir() => Ok(()),
            Ok(_) => Err(SyncError::SourceNotDirectory(self.source_root.clone())),
            Err(e) if utils::is_not_found(&e) => {
                Err(SyncError::SourceNotFound(self.source_root.clone()))
            }
            Err(e) => Err(SyncError::Io(e)),
        }
    }

    /// Make sure the replica root is a directory, creating or replacing it
    fn prepare_replica_root(&self, recorder: &CycleRecorder<'_>) -> Result<()> {
        let root = &self.replica_root;
        let replica_error = |source: io::Error| SyncError::ReplicaRoot {
            path: root.clone(),
            source,
        };

        // The root itself may be a link to a directory
        match fs::metadata(root) {
            Ok(metadata) if metadata.is_dir() => return Ok(()),
            Ok(_) => {
                fs::remove_file(root).map_err(replica_error)?;
                recorder.action(ActionRecord::replica_only(
                    ActionKind::FileRemoved,
                    Path::new(""),
                    root,
                ));
            }
            Err(e) if utils::is_not_found(&e) => {}
            Err(e) => return Err(replica_error(e)),
        }

        fs::create_dir_all(root).map_err(replica_error)?;
        recorder.action(ActionRecord::directory_created(Path::new(""), root));
        Ok(())
    }

    /// Phase 1, directories: walk the source top-down, creating replica
    /// directories and collecting the file jobs
    fn mirror_directories(&self, recorder: &CycleRecorder<'_>) -> (usize, Vec<FileJob>) {
        let mut directories = 0;
        let mut jobs = Vec::new();

        let mut walker = WalkDir::new(&self.source_root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();

        while let Some(next) = walker.next() {
            let entry = match next {
                Ok(entry) => entry,
                Err(e) => {
                    recorder.failure(SyncError::WalkDir(e));
                    continue;
                }
            };

            let relative = match utils::make_relative(entry.path(), &self.source_root) {
                Ok(relative) => relative,
                Err(e) => {
                    warn!("Skipping {:?}: {}", entry.path(), e);
                    continue;
                }
            };
            let target = self.replica_root.join(&relative);
            let file_type = entry.file_type();

            if file_type.is_dir() {
                directories += 1;
                if entry.depth() == 0 {
                    continue;
                }
                if let Err(e) = self.ensure_directory(&relative, &target, recorder) {
                    debug!("Skipping source subtree {:?} for this cycle", entry.path());
                    recorder.failure(e);
                    walker.skip_current_dir();
                }
                continue;
            }

            if file_type.is_symlink() {
                match fs::metadata(entry.path()) {
                    Ok(metadata) if metadata.is_file() => {}
                    Ok(metadata) if metadata.is_dir() => {
                        debug!("Skipping symlink to directory: {:?}", entry.path());
                        continue;
                    }
                    Ok(_) => {
                        debug!("Skipping symlink to special file: {:?}", entry.path());
                        continue;
                    }
                    Err(_) => {
                        debug!("Skipping dangling symlink: {:?}", entry.path());
                        continue;
                    }
                }
            } else if !file_type.is_file() {
                // Opening a FIFO for reading blocks until a writer shows up
                recorder.failure(SyncError::file_access(
                    entry.path(),
                    FileOperation::Copy,
                    io::Error::new(io::ErrorKind::Unsupported, "not a regular file"),
                ));
                continue;
            }

            jobs.push(FileJob {
                relative,
                source: entry.into_path(),
                target,
            });
        }

        (directories, jobs)
    }

    fn ensure_directory(
        &self,
        relative: &Path,
        target: &Path,
        recorder: &CycleRecorder<'_>,
    ) -> Result<()> {
        let existing = utils::entry_kind(target)
            .map_err(|e| SyncError::file_access(target, FileOperation::List, e))?;

        match existing {
            Some(EntryKind::Directory) => return Ok(()),
            Some(_) => {
                fs::remove_file(target)
                    .map_err(|e| SyncError::file_access(target, FileOperation::RemoveFile, e))?;
                self.forget(target);
                recorder.action(ActionRecord::replica_only(
                    ActionKind::FileRemoved,
                    relative,
                    target,
                ));
            }
            None => {}
        }

        fs::create_dir_all(target)
            .map_err(|e| SyncError::file_access(target, FileOperation::CreateDirectory, e))?;
        recorder.action(ActionRecord::directory_created(relative, target));
        Ok(())
    }

    /// Phase 1, files: run every job, in parallel when configured
    fn sync_files(&self, jobs: &[FileJob], recorder: &CycleRecorder<'_>) {
        let run = |job: &FileJob| {
            if let Err(e) = self.sync_file(job, recorder) {
                recorder.failure(e);
            }
        };

        if self.parallel_workers <= 1 || jobs.len() < 2 {
            jobs.iter().for_each(run);
            return;
        }

        match rayon::ThreadPoolBuilder::new()
            .num_threads(self.parallel_workers)
            .build()
        {
            Ok(pool) => pool.install(|| jobs.par_iter().for_each(run)),
            Err(e) => {
                warn!("Falling back to sequential file sync: {}", e);
                jobs.iter().for_each(run);
            }
        }
    }

    fn sync_file(&self, job: &FileJob, recorder: &CycleRecorder<'_>) -> Result<()> {
        let existing = utils::entry_kind(&job.target)
            .map_err(|e| SyncError::file_access(&job.target, FileOperation::List, e))?;

        match existing {
            None => self.transfer(job, ActionKind::FileCopied, recorder),
            Some(EntryKind::Directory) => {
                fs::remove_dir_all(&job.target).map_err(|e| {
                    SyncError::file_access(&job.target, FileOperation::RemoveDirectory, e)
                })?;
                recorder.action(ActionRecord::replica_only(
                    ActionKind::DirectoryRemoved,
                    &job.relative,
                    &job.target,
                ));
                self.transfer(job, ActionKind::FileCopied, recorder)
            }
            Some(EntryKind::Symlink | EntryKind::Other) => {
                // Copying onto a link writes through it, onto a FIFO blocks
                fs::remove_file(&job.target).map_err(|e| {
                    SyncError::file_access(&job.target, FileOperation::RemoveFile, e)
                })?;
                recorder.action(ActionRecord::replica_only(
                    ActionKind::FileRemoved,
                    &job.relative,
                    &job.target,
                ));
                self.transfer(job, ActionKind::FileCopied, recorder)
            }
            Some(EntryKind::File) => {
                let source_key = self.fingerprint(&job.source)?;
                let replica_key = match self.fingerprint(&job.target) {
                    Ok(key) => Some(key),
                    Err(e) => {
                        debug!("Replacing replica file that cannot be hashed: {}", e);
                        None
                    }
                };
                if replica_key == Some(source_key) {
                    trace!("Unchanged: {:?}", job.relative);
                    Ok(())
                } else {
                    self.transfer(job, ActionKind::FileUpdated, recorder)
                }
            }
        }
    }

    fn transfer(&self, job: &FileJob, kind: ActionKind, recorder: &CycleRecorder<'_>) -> Result<()> {
        let operation = match kind {
            ActionKind::FileUpdated => FileOperation::Update,
            _ => FileOperation::Copy,
        };

        let bytes = match utils::copy_with_metadata(&job.source, &job.target) {
            // The replica copy carries the source's permission bits
            Err(e)
                if e.kind() == io::ErrorKind::PermissionDenied
                    && utils::is_read_only_file(&job.target) =>
            {
                debug!("Replacing read-only replica file {:?}", job.target);
                fs::remove_file(&job.target)
                    .and_then(|()| utils::copy_with_metadata(&job.source, &job.target))
            }
            other => other,
        }
        .map_err(|e| SyncError::file_access(&job.source, operation, e))?;
        self.forget(&job.target);

        recorder.add_bytes(bytes);
        recorder.action(ActionRecord::transfer(kind, &job.relative, &job.source, &job.target));
        Ok(())
    }

    /// Phase 2: walk the replica bottom-up and delete what the source lacks
    fn prune_replica(&self, recorder: &CycleRecorder<'_>) {
        let walker = WalkDir::new(&self.replica_root)
            .min_depth(1)
            .follow_links(false)
            .contents_first(true)
            .sort_by_file_name();

        for next in walker {
            let entry = match next {
                Ok(entry) => entry,
                Err(e) => {
                    recorder.failure(SyncError::WalkDir(e));
                    continue;
                }
            };

            let relative = match utils::make_relative(entry.path(), &self.replica_root) {
                Ok(relative) => relative,
                Err(e) => {
                    warn!("Skipping {:?}: {}", entry.path(), e);
                    continue;
                }
            };
            let source_kind = mirrored_kind(&self.source_root.join(&relative));
            self.prune_entry(
                &relative,
                entry.path(),
                entry.file_type().is_dir(),
                source_kind,
                recorder,
            );
        }
    }

    /// Delete one replica entry unless the source has the same kind of entry
    /// at the same relative path
    fn prune_entry(
        &self,
        relative: &Path,
        target: &Path,
        is_dir: bool,
        source_kind: io::Result<Option<EntryKind>>,
        recorder: &CycleRecorder<'_>,
    ) {
        // Never delete on an inconclusive source lookup
        let source_kind = match source_kind {
            Ok(kind) => kind,
            Err(e) => {
                let source = self.source_root.join(relative);
                recorder.failure(SyncError::file_access(source, FileOperation::List, e));
                return;
            }
        };

        if is_dir {
            if source_kind == Some(EntryKind::Directory) {
                return;
            }
            match fs::remove_dir_all(target) {
                Ok(()) => recorder.action(ActionRecord::replica_only(
                    ActionKind::DirectoryRemoved,
                    relative,
                    target,
                )),
                Err(e) => recorder.failure(SyncError::file_access(
                    target,
                    FileOperation::RemoveDirectory,
                    e,
                )),
            }
        } else {
            if source_kind == Some(EntryKind::File) {
                return;
            }
            match fs::remove_file(target) {
                Ok(()) => {
                    self.forget(target);
                    recorder.action(ActionRecord::replica_only(
                        ActionKind::FileRemoved,
                        relative,
                        target,
                    ));
                }
                Err(e) => recorder.failure(SyncError::file_access(
                    target,
                    FileOperation::RemoveFile,
                    e,
                )),
            }
        }
    }

    fn fingerprint(&self, path: &Path) -> Result<Fingerprint> {
        let result = match &self.digest_cache {
            Some(cache) => cache.fingerprint(path),
            None => Fingerprint::of_file(path),
        };
        result.map_err(|e| SyncError::file_access(path, FileOperation::Fingerprint, e))
    }

    fn forget(&self, path: &Path) {
        if let Some(cache) = &self.digest_cache {
            cache.invalidate(path);
        }
    }
}

/// How an entry on disk is treated by the mirror
///
/// Links to regular files count as files. Links to directories stay
/// `Symlink`, which phase 2 matches against neither files nor directories.
/// Dangling links and links to special files count as absent.
fn mirrored_kind(path: &Path) -> io::Result<Option<EntryKind>> {
    match utils::entry_kind(path)? {
        Some(EntryKind::Symlink) => match fs::metadata(path) {
            Ok(metadata) if metadata.is_file() => Ok(Some(EntryKind::File)),
            Ok(metadata) if metadata.is_dir() => Ok(Some(EntryKind::Symlink)),
            Ok(_) => Ok(None),
            Err(e) if utils::is_not_found(&e) => Ok(None),
            Err(e) => Err(e),
        },
        other => Ok(other),
    }
}
