//! Persistent state for the upload pipeline.
//!
//! Three independent JSON documents live in one state directory:
//!
//! - `upload_history.json` — content hash → uploaded video record
//! - `upload_lifecycle.json` — file path → in-flight upload state
//! - `quota.json` — last quota-hit timestamp
//!
//! Every write is atomic (same-directory temp file + rename), so a crash
//! mid-write leaves either the previous or the new fully-valid version on
//! disk. Loads are schema-validated by the typed serde decode; a document
//! that fails to parse is renamed aside and replaced with an empty default
//! rather than aborting startup.

mod documents;

pub use documents::{
    HistoryDoc, LifecycleDoc, LifecycleEntry, QuotaDoc, UploadRecord, UploadState,
};

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

/// Document name for the upload history store.
pub const HISTORY_STORE: &str = "upload_history";
/// Document name for the upload lifecycle store.
pub const LIFECYCLE_STORE: &str = "upload_lifecycle";
/// Document name for the quota cooldown store.
pub const QUOTA_STORE: &str = "quota";

/// Errors produced while persisting a document.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A directory of independently-written JSON state documents.
///
/// Cheap to clone; each clone addresses the same directory. Writes to one
/// document never block or depend on writes to another, but within one
/// document the caller must keep single-writer discipline (concurrent
/// temp-file/rename sequences to the same path are unsafe).
#[derive(Debug, Clone)]
pub struct StateDir {
    dir: PathBuf,
}

impl StateDir {
    /// Opens (and creates if needed) the state directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Returns the on-disk path of a document.
    pub fn document_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    /// Loads a document, falling back to the default value when the file is
    /// missing or invalid.
    ///
    /// An unparseable document is renamed aside to
    /// `{name}.json.corrupt.{unix_ts}` so the operator can inspect it, then
    /// replaced by the default on the next save. Never fatal to startup.
    pub fn load<T: DeserializeOwned + Default>(&self, name: &str) -> T {
        let path = self.document_path(name);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(document = name, "no existing document, starting empty");
                return T::default();
            }
            Err(e) => {
                warn!(document = name, error = %e, "failed to read document, starting empty");
                return T::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(value) => value,
            Err(e) => {
                warn!(document = name, error = %e, "document failed validation");
                self.backup_corrupt(&path, name);
                T::default()
            }
        }
    }

    /// Atomically writes a document: temp file in the same directory, flush
    /// and sync, then rename over the target.
    pub fn save<T: Serialize>(&self, name: &str, value: &T) -> Result<(), StoreError> {
        let path = self.document_path(name);
        let tmp = self.dir.join(format!("{name}.json.tmp"));

        {
            let mut file = std::fs::File::create(&tmp)?;
            let json = serde_json::to_string_pretty(value)?;
            file.write_all(json.as_bytes())?;
            file.flush()?;
            file.sync_all()?;
        }

        std::fs::rename(&tmp, &path)?;
        debug!(document = name, "document saved");
        Ok(())
    }

    fn backup_corrupt(&self, path: &Path, name: &str) {
        let ts = chrono::Utc::now().timestamp();
        let backup = self.dir.join(format!("{name}.json.corrupt.{ts}"));
        match std::fs::rename(path, &backup) {
            Ok(()) => warn!(
                document = name,
                backup = %backup.display(),
                "corrupt document moved aside"
            ),
            Err(e) => warn!(document = name, error = %e, "could not back up corrupt document"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn sample_history() -> HistoryDoc {
        let mut history = HistoryDoc::new();
        history.insert(
            "ab".repeat(32),
            UploadRecord {
                filename: "clip.mp4".into(),
                uploaded_at: Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap(),
                video_id: "vid-123".into(),
            },
        );
        history
    }

    #[test]
    fn load_missing_returns_default() {
        let dir = TempDir::new().unwrap();
        let store = StateDir::open(dir.path()).unwrap();
        let history: HistoryDoc = store.load(HISTORY_STORE);
        assert!(history.is_empty());
    }

    #[test]
    fn save_load_roundtrip_history() {
        let dir = TempDir::new().unwrap();
        let store = StateDir::open(dir.path()).unwrap();

        let history = sample_history();
        store.save(HISTORY_STORE, &history).unwrap();

        let loaded: HistoryDoc = store.load(HISTORY_STORE);
        assert_eq!(loaded, history);
    }

    #[test]
    fn save_load_roundtrip_lifecycle() {
        let dir = TempDir::new().unwrap();
        let store = StateDir::open(dir.path()).unwrap();

        let mut lifecycle = LifecycleDoc::new();
        lifecycle.insert(
            "/videos/clip.mp4".into(),
            LifecycleEntry {
                state: UploadState::Uploading,
                last_transition: Utc.with_ymd_and_hms(2026, 3, 14, 9, 30, 0).unwrap(),
                retry_count: 1,
                next_retry: Some(Utc.with_ymd_and_hms(2026, 3, 14, 9, 32, 0).unwrap()),
                error: Some("connection reset".into()),
                bytes_uploaded: 10 * 1024 * 1024,
                session_token: Some("sess-opaque-token".into()),
            },
        );
        store.save(LIFECYCLE_STORE, &lifecycle).unwrap();

        let loaded: LifecycleDoc = store.load(LIFECYCLE_STORE);
        assert_eq!(loaded, lifecycle);
    }

    #[test]
    fn save_load_roundtrip_quota() {
        let dir = TempDir::new().unwrap();
        let store = StateDir::open(dir.path()).unwrap();

        let quota = QuotaDoc {
            last_quota_hit: Some(Utc.with_ymd_and_hms(2026, 3, 13, 22, 0, 0).unwrap()),
        };
        store.save(QUOTA_STORE, &quota).unwrap();

        let loaded: QuotaDoc = store.load(QUOTA_STORE);
        assert_eq!(loaded, quota);
    }

    #[test]
    fn save_overwrites_previous_version() {
        let dir = TempDir::new().unwrap();
        let store = StateDir::open(dir.path()).unwrap();

        store.save(HISTORY_STORE, &sample_history()).unwrap();
        let empty = HistoryDoc::new();
        store.save(HISTORY_STORE, &empty).unwrap();

        let loaded: HistoryDoc = store.load(HISTORY_STORE);
        assert!(loaded.is_empty());
        // No leftover temp file.
        assert!(!store.document_path(HISTORY_STORE).with_extension("json.tmp").exists());
    }

    #[test]
    fn corrupt_document_is_backed_up_and_defaulted() {
        let dir = TempDir::new().unwrap();
        let store = StateDir::open(dir.path()).unwrap();

        std::fs::write(store.document_path(HISTORY_STORE), b"{ not json").unwrap();

        let loaded: HistoryDoc = store.load(HISTORY_STORE);
        assert!(loaded.is_empty());

        // Original moved aside with a timestamp suffix.
        assert!(!store.document_path(HISTORY_STORE).exists());
        let backups: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.file_name()
                    .to_string_lossy()
                    .starts_with("upload_history.json.corrupt.")
            })
            .collect();
        assert_eq!(backups.len(), 1);
    }

    #[test]
    fn wrong_shape_is_treated_as_corrupt() {
        let dir = TempDir::new().unwrap();
        let store = StateDir::open(dir.path()).unwrap();

        // Valid JSON, wrong structure: record fields missing.
        std::fs::write(
            store.document_path(HISTORY_STORE),
            br#"{"aabb": {"filename": "clip.mp4"}}"#,
        )
        .unwrap();

        let loaded: HistoryDoc = store.load(HISTORY_STORE);
        assert!(loaded.is_empty());
        assert!(!store.document_path(HISTORY_STORE).exists());
    }

    #[test]
    fn unknown_state_tag_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = StateDir::open(dir.path()).unwrap();

        std::fs::write(
            store.document_path(LIFECYCLE_STORE),
            br#"{"/v/clip.mp4": {"state": "exploded", "last_transition": "2026-03-14T09:30:00Z", "retry_count": 0, "bytes_uploaded": 0}}"#,
        )
        .unwrap();

        let loaded: LifecycleDoc = store.load(LIFECYCLE_STORE);
        assert!(loaded.is_empty());
    }

    #[test]
    fn documents_are_independent() {
        let dir = TempDir::new().unwrap();
        let store = StateDir::open(dir.path()).unwrap();

        store.save(HISTORY_STORE, &sample_history()).unwrap();
        std::fs::write(store.document_path(QUOTA_STORE), b"garbage").unwrap();

        // A corrupt quota document does not affect history.
        let history: HistoryDoc = store.load(HISTORY_STORE);
        assert_eq!(history.len(), 1);
        let quota: QuotaDoc = store.load(QUOTA_STORE);
        assert!(quota.last_quota_hit.is_none());
    }
}
