//! Streaming content fingerprints for dedupe and copy verification.
//!
//! A fingerprint is the hex-encoded SHA-256 of a file's bytes. Files are read
//! in fixed-size blocks so multi-gigabyte videos never sit in memory.

mod cache;

pub use cache::FingerprintCache;

use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

/// Block size for streaming reads: 64 KiB.
const READ_BLOCK_SIZE: usize = 64 * 1024;

/// Errors produced while fingerprinting.
#[derive(Debug, thiserror::Error)]
pub enum FingerprintError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a regular file: {0}")]
    NotAFile(std::path::PathBuf),
}

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn fingerprint_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Computes the content fingerprint of an entire file.
///
/// Reads the file in 64 KiB blocks. Lock and permission errors surface as
/// [`FingerprintError::Io`]; the caller decides whether to retry.
pub fn fingerprint_file(path: &Path) -> Result<String, FingerprintError> {
    if !path.is_file() {
        return Err(FingerprintError::NotAFile(path.to_path_buf()));
    }

    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_BLOCK_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(dir: &Path, name: &str, data: &[u8]) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(data).unwrap();
        path
    }

    #[test]
    fn fingerprint_bytes_deterministic() {
        let a = fingerprint_bytes(b"clip content");
        let b = fingerprint_bytes(b"clip content");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64); // SHA-256 = 64 hex chars.
    }

    #[test]
    fn fingerprint_bytes_differs_on_content() {
        assert_ne!(fingerprint_bytes(b"take one"), fingerprint_bytes(b"take two"));
    }

    #[test]
    fn file_fingerprint_matches_bytes() {
        let dir = TempDir::new().unwrap();
        let data = b"recorded footage bytes";
        let path = write_file(dir.path(), "clip.mp4", data);

        assert_eq!(fingerprint_file(&path).unwrap(), fingerprint_bytes(data));
    }

    #[test]
    fn file_fingerprint_spans_multiple_blocks() {
        let dir = TempDir::new().unwrap();
        // 3 blocks plus a partial tail.
        let data = vec![0xA7u8; READ_BLOCK_SIZE * 3 + 17];
        let path = write_file(dir.path(), "big.mp4", &data);

        assert_eq!(fingerprint_file(&path).unwrap(), fingerprint_bytes(&data));
    }

    #[test]
    fn missing_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let result = fingerprint_file(&dir.path().join("gone.mp4"));
        assert!(matches!(result, Err(FingerprintError::NotAFile(_))));
    }

    #[test]
    fn directory_is_rejected() {
        let dir = TempDir::new().unwrap();
        let result = fingerprint_file(dir.path());
        assert!(matches!(result, Err(FingerprintError::NotAFile(_))));
    }
}
