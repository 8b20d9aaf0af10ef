//! Content fingerprints used to decide whether two files are the same
//!
//! A [`Fingerprint`] is the SHA-256 digest of a file's full byte stream,
//! computed by streaming fixed-size chunks so large files never sit in memory.
//! Two files are considered identical iff their fingerprints are equal; size
//! and timestamps are not consulted, so same-timestamp content drift is caught.
//!
//! Hashing every file on every cycle is the main cost for large trees. The
//! optional [`DigestCache`] remembers `(path, size, mtime) -> fingerprint` and
//! reuses an entry only while both size and modification time are unchanged.

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::trace;

/// Read buffer size for streaming digests
const CHUNK_SIZE: usize = 8192;

/// SHA-256 content digest of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Hash a file's content, streaming it in 8 KiB chunks
    ///
    /// # Errors
    ///
    /// Any I/O error from opening or reading the file.
    pub fn of_file(path: &Path) -> io::Result<Self> {
        let mut file = File::open(path)?;
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; CHUNK_SIZE];

        loop {
            let bytes_read = file.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(Self(hasher.finalize().into()))
    }

    /// Hash in-memory data
    pub fn of_bytes(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// Hex representation (64 characters)
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[derive(Debug, Clone, Copy)]
struct CachedDigest {
    size: u64,
    modified: SystemTime,
    fingerprint: Fingerprint,
}

/// Cache of fingerprints keyed by absolute path
///
/// An entry is valid only while the file's size and modification time match
/// the values recorded when it was hashed. Paths not looked up since the last
/// [`DigestCache::retain_seen`] are dropped by it.
#[derive(Debug, Default)]
pub struct DigestCache {
    entries: Mutex<HashMap<PathBuf, CachedDigest>>,
    seen: Mutex<HashSet<PathBuf>>,
}

impl DigestCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Fingerprint `path`, reusing the cached digest when metadata is unchanged
    pub fn fingerprint(&self, path: &Path) -> io::Result<Fingerprint> {
        let metadata = fs::metadata(path)?;
        let size = metadata.len();
        let modified = metadata.modified()?;
        self.seen.lock().insert(path.to_path_buf());

        if let Some(cached) = self.entries.lock().get(path) {
            if cached.size == size && cached.modified == modified {
                trace!("Digest cache hit: {:?}", path);
                return Ok(cached.fingerprint);
            }
        }

        let fingerprint = Fingerprint::of_file(path)?;
        self.entries.lock().insert(
            path.to_path_buf(),
            CachedDigest { size, modified, fingerprint },
        );
        Ok(fingerprint)
    }

    /// Forget a path, e.g. after it was overwritten or removed
    pub fn invalidate(&self, path: &Path) {
        self.entries.lock().remove(path);
    }

    /// Drop every entry not looked up since the previous call
    pub fn retain_seen(&self) {
        let seen = std::mem::take(&mut *self.seen.lock());
        self.entries.lock().retain(|path, _| seen.contains(path));
    }

    /// Number of cached digests
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the cache holds no digests
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::FileTime;
    use tempfile::TempDir;

    #[test]
    fn test_file_matches_bytes() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.txt");
        fs::write(&path, b"hello").unwrap();

        let from_file = Fingerprint::of_file(&path).unwrap();
        assert_eq!(from_file, Fingerprint::of_bytes(b"hello"));
        assert_ne!(from_file, Fingerprint::of_bytes(b"world"));
        assert_eq!(from_file.to_hex().len(), 64);
    }

    #[test]
    fn test_large_file_spans_chunks() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("big.bin");
        let data: Vec<u8> = (0..CHUNK_SIZE * 3 + 17).map(|i| (i % 251) as u8).collect();
        fs::write(&path, &data).unwrap();

        assert_eq!(Fingerprint::of_file(&path).unwrap(), Fingerprint::of_bytes(&data));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let err = Fingerprint::of_file(Path::new("/definitely/not/here")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_cache_reuses_until_metadata_changes() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.txt");
        fs::write(&path, b"first").unwrap();
        let stamp = FileTime::from_unix_time(1_600_000_000, 0);
        filetime::set_file_mtime(&path, stamp).unwrap();

        let cache = DigestCache::new();
        let first = cache.fingerprint(&path).unwrap();
        assert_eq!(first, Fingerprint::of_bytes(b"first"));

        // Same size and mtime: the cached digest is served
        fs::write(&path, b"other").unwrap();
        filetime::set_file_mtime(&path, stamp).unwrap();
        assert_eq!(cache.fingerprint(&path).unwrap(), first);

        // Size change invalidates
        fs::write(&path, b"longer content").unwrap();
        filetime::set_file_mtime(&path, stamp).unwrap();
        assert_eq!(
            cache.fingerprint(&path).unwrap(),
            Fingerprint::of_bytes(b"longer content")
        );
    }

    #[test]
    fn test_cache_retain_seen() {
        let temp_dir = TempDir::new().unwrap();
        let a = temp_dir.path().join("a.txt");
        let b = temp_dir.path().join("b.txt");
        fs::write(&a, b"a").unwrap();
        fs::write(&b, b"b").unwrap();

        let cache = DigestCache::new();
        cache.fingerprint(&a).unwrap();
        cache.fingerprint(&b).unwrap();
        cache.retain_seen();
        assert_eq!(cache.len(), 2);

        cache.fingerprint(&a).unwrap();
        cache.retain_seen();
        assert_eq!(cache.len(), 1);

        cache.invalidate(&a);
        assert!(cache.is_empty());
    }
}
