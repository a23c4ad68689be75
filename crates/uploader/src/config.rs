//! Pipeline configuration and the retry backoff schedule.

use std::path::PathBuf;
use std::time::Duration;

use clipship_archive::RetryPolicy;
use clipship_remote::Privacy;

/// Provider cap on a single video: 256 GiB.
pub const MAX_FILE_SIZE: u64 = 256 * 1024 * 1024 * 1024;

/// Files at or below this size upload as one unit: 100 MiB.
pub const SINGLE_CHUNK_THRESHOLD: u64 = 100 * 1024 * 1024;

/// Chunk size for resumable uploads: 10 MiB.
pub const CHUNK_SIZE: usize = 10 * 1024 * 1024;

/// Upload attempts per file before the failure becomes terminal.
pub const MAX_RETRIES: u32 = 3;

/// First retry delay; doubles per retry.
pub const RETRY_BASE: Duration = Duration::from_secs(60);

/// Cap on a single retry delay.
pub const RETRY_CAP: Duration = Duration::from_secs(3600);

/// Default archive subfolder name inside the watch folder.
pub const ARCHIVE_DIR_NAME: &str = "Uploaded";

/// Default interval between watch-folder passes.
pub const POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Settings for one upload pipeline instance.
#[derive(Debug, Clone)]
pub struct UploaderConfig {
    /// Folder scanned for candidate video files.
    pub watch_dir: PathBuf,
    /// Archive subfolder name, created inside the watch folder.
    pub archive_dir_name: String,
    /// Lowercase extensions treated as video files.
    pub video_extensions: Vec<String>,
    /// Collection (playlist) uploads are filed into, if any.
    pub collection_id: Option<String>,
    /// Privacy applied to every upload.
    pub privacy: Privacy,
    /// Provider category applied to every upload.
    pub category: String,
    /// Move files whose content is already uploaded straight to the archive.
    pub archive_duplicates: bool,
    /// Also file dedupe-skipped videos into the collection.
    pub add_duplicates_to_collection: bool,
    pub max_retries: u32,
    pub retry_base: Duration,
    pub retry_cap: Duration,
    pub max_file_size: u64,
    pub single_chunk_threshold: u64,
    pub chunk_size: usize,
    /// Interval between periodic passes of the worker loop.
    pub poll_interval: Duration,
    /// Lock-retry policy for the archive move.
    pub file_retry: RetryPolicy,
}

impl UploaderConfig {
    /// Defaults for a given watch folder.
    pub fn new(watch_dir: impl Into<PathBuf>) -> Self {
        Self {
            watch_dir: watch_dir.into(),
            archive_dir_name: ARCHIVE_DIR_NAME.to_string(),
            video_extensions: vec!["mp4".into(), "mov".into(), "avi".into()],
            collection_id: None,
            privacy: Privacy::default(),
            category: String::new(),
            archive_duplicates: true,
            add_duplicates_to_collection: false,
            max_retries: MAX_RETRIES,
            retry_base: RETRY_BASE,
            retry_cap: RETRY_CAP,
            max_file_size: MAX_FILE_SIZE,
            single_chunk_threshold: SINGLE_CHUNK_THRESHOLD,
            chunk_size: CHUNK_SIZE,
            poll_interval: POLL_INTERVAL,
            file_retry: RetryPolicy::default(),
        }
    }

    /// Full path of the archive folder.
    pub fn archive_dir(&self) -> PathBuf {
        self.watch_dir.join(&self.archive_dir_name)
    }
}

/// Delay before retry number `retry_count` (1-based): `base × 2^(n−1)`,
/// capped. With the defaults: 1, 2, 4 minutes.
pub fn retry_backoff(base: Duration, cap: Duration, retry_count: u32) -> Duration {
    let exp = retry_count.saturating_sub(1).min(31);
    base.saturating_mul(1u32 << exp).min(cap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_ladder_is_one_two_four_minutes() {
        assert_eq!(
            retry_backoff(RETRY_BASE, RETRY_CAP, 1),
            Duration::from_secs(60)
        );
        assert_eq!(
            retry_backoff(RETRY_BASE, RETRY_CAP, 2),
            Duration::from_secs(120)
        );
        assert_eq!(
            retry_backoff(RETRY_BASE, RETRY_CAP, 3),
            Duration::from_secs(240)
        );
    }

    #[test]
    fn backoff_caps_at_one_hour() {
        assert_eq!(
            retry_backoff(RETRY_BASE, RETRY_CAP, 10),
            Duration::from_secs(3600)
        );
        assert_eq!(
            retry_backoff(RETRY_BASE, RETRY_CAP, 31),
            Duration::from_secs(3600)
        );
    }

    #[test]
    fn archive_dir_lives_inside_watch_dir() {
        let config = UploaderConfig::new("/videos");
        assert_eq!(config.archive_dir(), PathBuf::from("/videos/Uploaded"));
    }

    #[test]
    fn default_limits() {
        let config = UploaderConfig::new("/videos");
        assert_eq!(config.max_file_size, 256 * 1024 * 1024 * 1024);
        assert_eq!(config.single_chunk_threshold, 100 * 1024 * 1024);
        assert_eq!(config.chunk_size, 10 * 1024 * 1024);
        assert_eq!(config.max_retries, 3);
        assert!(config.archive_duplicates);
        assert!(!config.add_duplicates_to_collection);
    }
}
