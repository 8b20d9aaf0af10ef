//! Filesystem helpers for foldersync
//!
//! Thin wrappers over `std::fs` that the reconciler builds on:
//!
//! - Classifying a path without following symbolic links
//! - Copying a file while preserving its timestamps (permissions are
//!   carried by `std::fs::copy` itself)
//! - Converting absolute paths to paths relative to a tree root
//!
//! All functions are thread-safe and can be called from the parallel file
//! workers without synchronization.

use crate::error::{Result, SyncError};
use filetime::FileTime;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::trace;

/// What a path currently is on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Regular file
    File,
    /// Directory
    Directory,
    /// Symbolic link (not followed)
    Symlink,
    /// FIFO, socket or device node
    Other,
}

/// Classify a path without following symbolic links
///
/// Returns `Ok(None)` when nothing exists at `path`.
pub fn entry_kind(path: &Path) -> io::Result<Option<EntryKind>> {
    match fs::symlink_metadata(path) {
        Ok(metadata) => {
            let file_type = metadata.file_type();
            let kind = if file_type.is_dir() {
                EntryKind::Directory
            } else if file_type.is_symlink() {
                EntryKind::Symlink
            } else if file_type.is_file() {
                EntryKind::File
            } else {
                EntryKind::Other
            };
            Ok(Some(kind))
        }
        Err(e) if is_not_found(&e) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Whether an I/O error means the entry does not exist (any more)
pub fn is_not_found(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::NotFound
}

/// Whether a regular file at `path` has no write permission at all
pub fn is_read_only_file(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|m| m.is_file() && m.permissions().readonly())
        .unwrap_or(false)
}

/// Copy a file's content, permissions and timestamps
///
/// Content and permission bits come from `std::fs::copy`; access and
/// modification times are then set to the source's. An existing file at
/// `dst` is overwritten.
///
/// # Returns
///
/// The number of bytes copied.
pub fn copy_with_metadata(src: &Path, dst: &Path) -> io::Result<u64> {
    let bytes = fs::copy(src, dst)?;
    let metadata = fs::metadata(src)?;
    let atime = FileTime::from_last_access_time(&metadata);
    let mtime = FileTime::from_last_modification_time(&metadata);
    filetime::set_file_times(dst, atime, mtime)?;
    trace!("Copied {} bytes {:?} -> {:?}", bytes, src, dst);
    Ok(bytes)
}

/// Make a path relative to a base path
///
/// Tries a lexical strip first so symbolic links keep their own path, and
/// falls back to canonicalising both sides when the lexical strip fails.
///
/// # Errors
///
/// - [`SyncError::InvalidConfiguration`] if `path` is not under `base`
/// - [`SyncError::Io`] if canonicalisation fails
///
/// # Example
///
/// ```rust,ignore
/// let relative = make_relative(Path::new("/src/dir/a.txt"), Path::new("/src"))?;
/// assert_eq!(relative, PathBuf::from("dir/a.txt"));
/// ```
pub fn make_relative(path: &Path, base: &Path) -> Result<PathBuf> {
    if let Ok(relative) = path.strip_prefix(base) {
        return Ok(relative.to_path_buf());
    }

    let path_canon = path.canonicalize()?;
    let base_canon = base.canonicalize()?;

    path_canon
        .strip_prefix(&base_canon)
        .map(Path::to_path_buf)
        .map_err(|_| {
            SyncError::invalid_configuration(format!(
                "Path {:?} is not inside {:?}",
                path_canon, base_canon
            ))
        })
}
