use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::FingerprintError;

/// Identity of a file's content at a point in time.
///
/// If length or modification time change, any cached digest is stale.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FileStamp {
    len: u64,
    modified: Option<SystemTime>,
}

impl FileStamp {
    fn read(path: &Path) -> std::io::Result<Self> {
        let meta = std::fs::metadata(path)?;
        Ok(Self {
            len: meta.len(),
            modified: meta.modified().ok(),
        })
    }
}

/// In-memory digest cache keyed by path + length + mtime.
///
/// The upload pipeline hashes a file once before upload (dedupe check and
/// verification baseline) and once after copy (inside the mover, against the
/// new path). The cache exists so no third hash of the unchanged source ever
/// happens within a run. Never persisted.
#[derive(Debug, Default)]
pub struct FingerprintCache {
    entries: HashMap<PathBuf, (FileStamp, String)>,
}

impl FingerprintCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached digest for `path` if the file is unchanged.
    pub fn lookup(&self, path: &Path) -> Option<&str> {
        let (stamp, digest) = self.entries.get(path)?;
        let current = FileStamp::read(path).ok()?;
        if current == *stamp {
            Some(digest.as_str())
        } else {
            None
        }
    }

    /// Records a freshly computed digest for `path`.
    pub fn record(&mut self, path: &Path, digest: String) {
        if let Ok(stamp) = FileStamp::read(path) {
            self.entries.insert(path.to_path_buf(), (stamp, digest));
        }
    }

    /// Drops the entry for `path` (e.g. after the file was moved away).
    pub fn forget(&mut self, path: &Path) {
        self.entries.remove(path);
    }

    /// Returns the fingerprint of `path`, computing it only on a cache miss.
    pub fn fingerprint(&mut self, path: &Path) -> Result<String, FingerprintError> {
        if let Some(digest) = self.lookup(path) {
            return Ok(digest.to_string());
        }
        let digest = crate::fingerprint_file(path)?;
        self.record(path, digest.clone());
        Ok(digest)
    }
}
