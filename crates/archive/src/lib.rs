//! Safe transition of an uploaded file from the watch folder to the archive.
//!
//! The move is copy → verify → delete: the source is never removed until the
//! destination's content fingerprint matches. At every observable point the
//! file is fully present at the source, fully present at the destination, or
//! transiently both — never neither.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

/// Errors produced while archiving a file.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("source file missing: {0}")]
    SourceMissing(PathBuf),

    #[error("destination fingerprint mismatch (expected {expected}, got {actual})")]
    IntegrityMismatch { expected: String, actual: String },

    #[error("source still locked after {attempts} delete attempts: {path}")]
    Locked { path: PathBuf, attempts: u32 },

    #[error(transparent)]
    Fingerprint(#[from] clipship_fingerprint::FingerprintError),
}

/// Bounded exponential backoff for delete attempts on a locked source file.
///
/// Antivirus scanners, indexers and slow disks hold short-lived locks on
/// freshly written files; retrying with growing delays rides those out.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delete attempts before giving up.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Cap on the per-attempt delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt` (0-based; attempt 0 waits the initial
    /// delay, each later attempt doubles it, capped at `max_delay`).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.min(31);
        let delay = self.initial_delay.saturating_mul(1u32 << exp);
        delay.min(self.max_delay)
    }
}

/// Moves `source` into `archive_dir` after verifying the copied bytes match
/// `expected_hash`. Returns the final destination path.
///
/// Collision handling: if the destination name is taken, a timestamp suffix
/// is appended (a second file with the same name is a distinct edited
/// re-upload, never an overwrite).
///
/// Blocking: sleeps between delete retries. Call from `spawn_blocking` in
/// async contexts.
pub fn commit(
    source: &Path,
    archive_dir: &Path,
    expected_hash: &str,
    retry: &RetryPolicy,
) -> Result<PathBuf, ArchiveError> {
    if !source.is_file() {
        return Err(ArchiveError::SourceMissing(source.to_path_buf()));
    }

    std::fs::create_dir_all(archive_dir)?;
    let dest = destination_path(source, archive_dir);

    debug!(source = %source.display(), dest = %dest.display(), "copying to archive");
    std::fs::copy(source, &dest)?;

    // Verify the destination before the source may be touched.
    let actual = clipship_fingerprint::fingerprint_file(&dest)?;
    if actual != expected_hash {
        // Remove the bad copy so no partial state is visible downstream.
        if let Err(e) = std::fs::remove_file(&dest) {
            warn!(dest = %dest.display(), error = %e, "failed to remove unverified copy");
        }
        return Err(ArchiveError::IntegrityMismatch {
            expected: expected_hash.to_string(),
            actual,
        });
    }

    delete_with_retry(source, retry)?;

    Ok(dest)
}

/// Picks a non-colliding destination path inside `archive_dir`.
fn destination_path(source: &Path, archive_dir: &Path) -> PathBuf {
    let file_name = source
        .file_name()
        .unwrap_or_else(|| std::ffi::OsStr::new("archived"));
    let candidate = archive_dir.join(file_name);
    if !candidate.exists() {
        return candidate;
    }

    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = source
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");

    let suffixed = archive_dir.join(format!("{stem}_{timestamp}{ext}"));
    if !suffixed.exists() {
        return suffixed;
    }

    // Same-second collision: disambiguate with a counter.
    let mut n = 1u32;
    loop {
        let numbered = archive_dir.join(format!("{stem}_{timestamp}_{n}{ext}"));
        if !numbered.exists() {
            return numbered;
        }
        n += 1;
    }
}

/// Deletes `source`, retrying lock/access errors with exponential backoff.
/// Any non-lock error aborts immediately.
fn delete_with_retry(source: &Path, retry: &RetryPolicy) -> Result<(), ArchiveError> {
    for attempt in 0..retry.max_attempts {
        match std::fs::remove_file(source) {
            Ok(()) => {
                if attempt > 0 {
                    debug!(
                        source = %source.display(),
                        attempts = attempt + 1,
                        "source deleted after retries"
                    );
                }
                return Ok(());
            }
            Err(e) if is_lock_error(&e) => {
                if attempt + 1 == retry.max_attempts {
                    return Err(ArchiveError::Locked {
                        path: source.to_path_buf(),
                        attempts: retry.max_attempts,
                    });
                }
                let delay = retry.delay_for_attempt(attempt);
                warn!(
                    source = %source.display(),
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "source locked, retrying delete"
                );
                std::thread::sleep(delay);
            }
            Err(e) => return Err(ArchiveError::Io(e)),
        }
    }

    Err(ArchiveError::Locked {
        path: source.to_path_buf(),
        attempts: retry.max_attempts,
    })
}

/// Lock-ish errors worth retrying: another process holds the file open or a
/// scanner has it temporarily protected.
fn is_lock_error(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::PermissionDenied | std::io::ErrorKind::WouldBlock
    )
}
