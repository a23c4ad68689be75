//! The upload state machine.
//!
//! One file moves through `pending → uploading → {succeeded, failed,
//! quota_blocked}`. Transitions are persisted before and after every
//! external call so a crash resumes from the last checkpoint: an interrupted
//! `uploading` entry is reset to `pending` on startup with its session token
//! and acknowledged byte count intact, and the next attempt continues the
//! remote session instead of restarting from byte 0.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use clipship_fingerprint::{FingerprintCache, FingerprintError};
use clipship_remote::{MediaHost, VideoMetadata};
use clipship_store::{
    HISTORY_STORE, HistoryDoc, LIFECYCLE_STORE, LifecycleDoc, LifecycleEntry, StateDir,
    UploadRecord, UploadState,
};

use crate::chunk::ChunkReader;
use crate::config::{UploaderConfig, retry_backoff};
use crate::error::UploadError;
use crate::governor::QuotaGovernor;

/// What happened to one candidate file during a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// Upload completed; the collection error, if any, was surfaced.
    Uploaded {
        video_id: String,
        collection_error: Option<String>,
    },
    /// Content hash already in history; nothing was uploaded.
    DuplicateSkipped,
    /// Nothing to do this pass (backoff pending, terminal failure retained,
    /// or the file is not readable yet).
    Waiting,
    /// File exceeds the provider size cap. Terminal, never retried.
    TooLarge,
    /// Provider quota exhausted; the pass halts.
    QuotaBlocked,
    /// Upload attempt failed. `terminal` once the retry budget is spent.
    Failed { terminal: bool },
}

/// Aggregate result of one orchestrator pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub uploaded: u32,
    pub duplicates: u32,
    pub failed: u32,
    pub waiting: u32,
    pub quota_blocked: bool,
    /// Collection (playlist) problems needing operator attention.
    pub collection_errors: Vec<String>,
}

impl PassSummary {
    /// True when the pass did nothing worth reporting.
    pub fn is_quiet(&self) -> bool {
        self.uploaded == 0
            && self.duplicates == 0
            && self.failed == 0
            && !self.quota_blocked
            && self.collection_errors.is_empty()
    }
}

/// Drives candidate files through the upload lifecycle.
///
/// Owns the only authoritative in-memory copy of the lifecycle map and is
/// its sole writer. One instance is held by the single upload worker; the
/// "currently uploading" file is simply the one inside [`run_pass`].
pub struct Orchestrator {
    host: Arc<dyn MediaHost>,
    config: UploaderConfig,
    store: StateDir,
    history: HistoryDoc,
    lifecycle: LifecycleDoc,
    governor: QuotaGovernor,
    cache: FingerprintCache,
    session_uploads: u64,
}

impl Orchestrator {
    /// Loads persisted state and recovers uploads interrupted by a crash.
    pub fn new(host: Arc<dyn MediaHost>, config: UploaderConfig, store: StateDir) -> Self {
        let history: HistoryDoc = store.load(HISTORY_STORE);
        let lifecycle: LifecycleDoc = store.load(LIFECYCLE_STORE);
        let governor = QuotaGovernor::load(&store);

        let mut orchestrator = Self {
            host,
            config,
            store,
            history,
            lifecycle,
            governor,
            cache: FingerprintCache::new(),
            session_uploads: 0,
        };
        orchestrator.recover_interrupted();
        orchestrator
    }

    pub fn config(&self) -> &UploaderConfig {
        &self.config
    }

    pub fn governor(&self) -> &QuotaGovernor {
        &self.governor
    }

    pub fn governor_mut(&mut self) -> &mut QuotaGovernor {
        &mut self.governor
    }

    /// Files uploaded across all runs (history size).
    pub fn total_uploads(&self) -> usize {
        self.history.len()
    }

    /// Files uploaded by this process.
    pub fn session_uploads(&self) -> u64 {
        self.session_uploads
    }

    /// Current lifecycle entry for a path, if any.
    pub fn lifecycle_entry(&self, path: &Path) -> Option<&LifecycleEntry> {
        self.lifecycle.get(path.to_string_lossy().as_ref())
    }

    /// Resets entries left in `uploading` by a crashed process to `pending`,
    /// keeping retry counts and resume fields intact.
    fn recover_interrupted(&mut self) {
        let now = Utc::now();
        let mut reset = 0u32;
        for entry in self.lifecycle.values_mut() {
            if entry.state == UploadState::Uploading {
                entry.state = UploadState::Pending;
                entry.last_transition = now;
                reset += 1;
            }
        }
        if reset > 0 {
            info!(count = reset, "reset interrupted uploads to pending");
            self.persist_lifecycle();
        }
    }

    /// Processes candidates sequentially. Stops early on cancellation (between
    /// files) or on a quota hit (remaining candidates would hit it too).
    pub async fn run_pass(
        &mut self,
        candidates: &[PathBuf],
        cancel: &CancellationToken,
    ) -> PassSummary {
        let mut summary = PassSummary::default();

        for path in candidates {
            if cancel.is_cancelled() {
                debug!("pass cancelled between files");
                break;
            }

            match self.process_file(path).await {
                FileOutcome::Uploaded {
                    video_id,
                    collection_error,
                } => {
                    summary.uploaded += 1;
                    debug!(file = %path.display(), video_id = %video_id, "pass: uploaded");
                    if let Some(err) = collection_error {
                        summary.collection_errors.push(err);
                    }
                }
                FileOutcome::DuplicateSkipped => summary.duplicates += 1,
                FileOutcome::Waiting => summary.waiting += 1,
                FileOutcome::TooLarge | FileOutcome::Failed { .. } => summary.failed += 1,
                FileOutcome::QuotaBlocked => {
                    summary.quota_blocked = true;
                    break;
                }
            }
        }

        summary
    }

    /// Runs one candidate through the per-file algorithm.
    pub async fn process_file(&mut self, path: &Path) -> FileOutcome {
        let now = Utc::now();
        let key = path.to_string_lossy().into_owned();

        // A candidate that vanished (moved or deleted by the user) takes its
        // stale lifecycle entry with it.
        let Ok(meta) = std::fs::metadata(path) else {
            if self.lifecycle.remove(&key).is_some() {
                self.persist_lifecycle();
            }
            return FileOutcome::Waiting;
        };
        let size = meta.len();

        // Terminal failures are retained for the operator; never reprocessed.
        if let Some(entry) = self.lifecycle.get(&key)
            && entry.state == UploadState::Failed
            && entry.retry_count >= self.config.max_retries
        {
            return FileOutcome::Waiting;
        }

        // 1. Provider size cap: terminal failure, no retry scheduled.
        if size > self.config.max_file_size {
            let message = format!(
                "file size {size} exceeds the {} byte upload limit",
                self.config.max_file_size
            );
            warn!(file = %path.display(), size, "{message}");
            let max_retries = self.config.max_retries;
            self.update_entry(&key, |e| {
                e.state = UploadState::Failed;
                e.retry_count = max_retries;
                e.next_retry = None;
                e.error = Some(message);
            });
            return FileOutcome::TooLarge;
        }

        // 2. Dedupe by content hash.
        let digest = match self.fingerprint(path).await {
            Ok(d) => d,
            Err(e) => {
                // Probably still being written or briefly locked; the next
                // pass will try again.
                warn!(file = %path.display(), error = %e, "candidate not readable yet");
                return FileOutcome::Waiting;
            }
        };
        if self.history.contains_key(&digest) {
            return self.handle_duplicate(path, &key, &digest).await;
        }

        // 3. Quota cooldown gate: no network I/O while blocked.
        if self.governor.is_blocked(now) {
            let already_marked = self
                .lifecycle
                .get(&key)
                .is_some_and(|e| e.state == UploadState::QuotaBlocked);
            if !already_marked {
                self.update_entry(&key, |e| {
                    e.state = UploadState::QuotaBlocked;
                    e.next_retry = None;
                });
            }
            return FileOutcome::QuotaBlocked;
        }

        // 4. Backoff wait.
        if let Some(entry) = self.lifecycle.get(&key)
            && let Some(next_retry) = entry.next_retry
            && now < next_retry
        {
            return FileOutcome::Waiting;
        }

        // 5. Checkpoint the uploading transition before any remote call.
        self.update_entry(&key, |e| {
            e.state = UploadState::Uploading;
            e.next_retry = None;
        });

        // 6. Transfer, then classify the result.
        match self.transfer(path, size, &key).await {
            Ok(video_id) => self.complete_upload(path, &key, &digest, video_id).await,
            Err(e) if e.is_quota() => {
                if let Err(store_err) = self.governor.record_hit(Utc::now()) {
                    error!(error = %store_err, "failed to persist quota hit");
                }
                let message = e.to_string();
                self.update_entry(&key, |entry| {
                    entry.state = UploadState::QuotaBlocked;
                    entry.next_retry = None;
                    entry.error = Some(message);
                });
                FileOutcome::QuotaBlocked
            }
            Err(e) if e.is_retryable() => self.schedule_retry(path, &key, &e),
            Err(e) => {
                // Auth or fatal remote error: operator attention required.
                error!(file = %path.display(), error = %e, "upload rejected, not retrying");
                let message = e.to_string();
                let max_retries = self.config.max_retries;
                self.update_entry(&key, |entry| {
                    entry.state = UploadState::Failed;
                    entry.retry_count = max_retries;
                    entry.next_retry = None;
                    entry.error = Some(message);
                });
                FileOutcome::Failed { terminal: true }
            }
        }
    }

    /// Uploads the file's bytes, resuming a previous session when one is
    /// recorded, and returns the remote video id.
    async fn transfer(&mut self, path: &Path, size: u64, key: &str) -> Result<String, UploadError> {
        let (existing_token, recorded_offset) = match self.lifecycle.get(key) {
            Some(e) => (e.session_token.clone(), e.bytes_uploaded),
            None => (None, 0),
        };

        let (token, offset) = match existing_token {
            Some(token) => {
                debug!(
                    file = %path.display(),
                    offset = recorded_offset,
                    "resuming upload session"
                );
                (token, recorded_offset)
            }
            None => {
                let metadata = self.video_metadata(path);
                let token = self.host.create_session(&metadata, size).await?;
                let checkpoint = token.clone();
                self.update_entry(key, |e| {
                    e.session_token = Some(checkpoint);
                    e.bytes_uploaded = 0;
                });
                (token, 0)
            }
        };

        if size <= self.config.single_chunk_threshold && offset == 0 {
            // Small file: one unit, no chunk bookkeeping.
            let source = path.to_path_buf();
            let data = tokio::task::spawn_blocking(move || std::fs::read(&source))
                .await
                .map_err(|e| UploadError::Task(e.to_string()))??;
            let accepted = self.host.upload_chunk(&token, 0, &data).await?;
            self.update_entry(key, |e| e.bytes_uploaded = accepted);
        } else {
            self.transfer_chunks(path, key, &token, offset).await?;
        }

        Ok(self.host.finalize(&token).await?)
    }

    /// Streams fixed-size chunks from `offset`, checkpointing the lifecycle
    /// entry after every acknowledged chunk.
    async fn transfer_chunks(
        &mut self,
        path: &Path,
        key: &str,
        token: &str,
        offset: u64,
    ) -> Result<(), UploadError> {
        let chunk_size = self.config.chunk_size;
        let source = path.to_path_buf();
        let mut reader = tokio::task::spawn_blocking(move || ChunkReader::new(&source, chunk_size))
            .await
            .map_err(|e| UploadError::Task(e.to_string()))??;
        if offset > 0 {
            reader.seek_to(offset)?;
        }

        loop {
            let step = tokio::task::spawn_blocking({
                let mut r = reader;
                move || {
                    let item = r.next_chunk();
                    (r, item)
                }
            })
            .await
            .map_err(|e| UploadError::Task(e.to_string()))?;
            reader = step.0;

            let Some((chunk_offset, data)) = step.1? else {
                break;
            };

            let accepted = self.host.upload_chunk(token, chunk_offset, &data).await?;
            self.update_entry(key, |e| e.bytes_uploaded = accepted);
        }

        Ok(())
    }

    /// Success path: archive the file, record history, drop the lifecycle
    /// entry, then file the video into the collection.
    async fn complete_upload(
        &mut self,
        path: &Path,
        key: &str,
        digest: &str,
        video_id: String,
    ) -> FileOutcome {
        info!(file = %path.display(), video_id = %video_id, "upload complete");

        self.archive_file(path, digest).await;

        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| key.to_string());
        self.history.insert(
            digest.to_string(),
            UploadRecord {
                filename,
                uploaded_at: Utc::now(),
                video_id: video_id.clone(),
            },
        );
        self.lifecycle.remove(key);
        self.persist_history();
        self.persist_lifecycle();
        self.session_uploads += 1;

        let collection_error = match &self.config.collection_id {
            Some(collection_id) => self.file_into_collection(&video_id, collection_id).await,
            None => None,
        };

        FileOutcome::Uploaded {
            video_id,
            collection_error,
        }
    }

    /// Adds a video to the configured collection. Failures are surfaced, not
    /// retried: the upload itself already succeeded and is recorded, so a
    /// retry would re-upload a duplicate.
    async fn file_into_collection(
        &self,
        video_id: &str,
        collection_id: &str,
    ) -> Option<String> {
        match self.host.add_to_collection(video_id, collection_id).await {
            Ok(()) => {
                debug!(video_id, collection = collection_id, "added to collection");
                None
            }
            Err(e) => {
                error!(
                    video_id,
                    collection = collection_id,
                    error = %e,
                    "could not file video into collection"
                );
                Some(e.to_string())
            }
        }
    }

    /// Known content: skip the upload, optionally archive the file and file
    /// the recorded video into the collection.
    async fn handle_duplicate(&mut self, path: &Path, key: &str, digest: &str) -> FileOutcome {
        let Some(record) = self.history.get(digest).cloned() else {
            return FileOutcome::Waiting;
        };
        debug!(
            file = %path.display(),
            video_id = %record.video_id,
            "content already uploaded, skipping"
        );

        if self.config.add_duplicates_to_collection
            && let Some(collection_id) = self.config.collection_id.clone()
        {
            let _ = self
                .file_into_collection(&record.video_id, &collection_id)
                .await;
        }

        if self.config.archive_duplicates {
            self.archive_file(path, digest).await;
        }

        if self.lifecycle.remove(key).is_some() {
            self.persist_lifecycle();
        }
        FileOutcome::DuplicateSkipped
    }

    /// Safe move into the archive folder. A failure here leaves the file in
    /// the watch folder: the upload still counts, dedupe skips it next pass,
    /// and the move gets retried then.
    async fn archive_file(&mut self, path: &Path, digest: &str) {
        let source = path.to_path_buf();
        let archive_dir = self.config.archive_dir();
        let expected = digest.to_string();
        let retry = self.config.file_retry.clone();

        let result = tokio::task::spawn_blocking(move || {
            clipship_archive::commit(&source, &archive_dir, &expected, &retry)
        })
        .await;

        match result {
            Ok(Ok(dest)) => {
                self.cache.forget(path);
                debug!(dest = %dest.display(), "archived");
            }
            Ok(Err(e)) => {
                warn!(file = %path.display(), error = %e, "archive move failed, file left in watch folder");
            }
            Err(e) => {
                warn!(file = %path.display(), error = %e, "archive task failed, file left in watch folder");
            }
        }
    }

    /// Books a transient failure: schedules the next attempt with exponential
    /// backoff, or goes terminal once the retry budget is spent. The session
    /// token and acknowledged bytes survive for resumption.
    fn schedule_retry(&mut self, path: &Path, key: &str, err: &UploadError) -> FileOutcome {
        let now = Utc::now();
        let max_retries = self.config.max_retries;
        let base = self.config.retry_base;
        let cap = self.config.retry_cap;
        let message = err.to_string();

        let mut terminal = false;
        let mut next_attempt = 0u32;
        self.update_entry(key, |e| {
            e.retry_count += 1;
            e.error = Some(message);
            if e.retry_count < max_retries {
                let delay = retry_backoff(base, cap, e.retry_count);
                e.next_retry = Some(
                    now + TimeDelta::from_std(delay).unwrap_or_else(|_| TimeDelta::seconds(60)),
                );
                e.state = UploadState::Pending;
                next_attempt = e.retry_count + 1;
            } else {
                e.next_retry = None;
                e.state = UploadState::Failed;
                terminal = true;
            }
        });

        if terminal {
            error!(
                file = %path.display(),
                attempts = max_retries,
                error = %err,
                "upload failed permanently, operator attention required"
            );
        } else {
            warn!(
                file = %path.display(),
                next_attempt,
                max_attempts = max_retries,
                error = %err,
                "upload failed, retry scheduled"
            );
        }
        FileOutcome::Failed { terminal }
    }

    /// Mutates (or creates) the lifecycle entry for `key`, stamps the
    /// transition time, and persists the document.
    fn update_entry<F: FnOnce(&mut LifecycleEntry)>(&mut self, key: &str, mutate: F) {
        let now = Utc::now();
        let entry = self
            .lifecycle
            .entry(key.to_string())
            .or_insert_with(|| LifecycleEntry::new(UploadState::Pending, now));
        mutate(entry);
        entry.last_transition = now;
        self.persist_lifecycle();
    }

    /// Fingerprints a file, reusing the cached digest for unchanged files.
    async fn fingerprint(&mut self, path: &Path) -> Result<String, FingerprintError> {
        if let Some(digest) = self.cache.lookup(path) {
            return Ok(digest.to_string());
        }
        let source = path.to_path_buf();
        let digest =
            tokio::task::spawn_blocking(move || clipship_fingerprint::fingerprint_file(&source))
                .await
                .map_err(|e| FingerprintError::Io(std::io::Error::other(e.to_string())))??;
        self.cache.record(path, digest.clone());
        Ok(digest)
    }

    fn video_metadata(&self, path: &Path) -> VideoMetadata {
        let title = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "untitled".to_string());
        VideoMetadata {
            title,
            description: String::new(),
            category: self.config.category.clone(),
            privacy: self.config.privacy,
        }
    }

    /// A failed save never drops state: the in-memory copy stays
    /// authoritative and the next transition retries the write.
    fn persist_lifecycle(&self) {
        if let Err(e) = self.store.save(LIFECYCLE_STORE, &self.lifecycle) {
            error!(error = %e, "failed to persist lifecycle document");
        }
    }

    fn persist_history(&self) {
        if let Err(e) = self.store.save(HISTORY_STORE, &self.history) {
            error!(error = %e, "failed to persist history document");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipship_remote::{MemoryHost, Privacy};

    fn orchestrator(dir: &Path) -> Orchestrator {
        let mut config = UploaderConfig::new(dir.join("watch"));
        config.privacy = Privacy::Unlisted;
        config.category = "Gaming".into();
        let store = StateDir::open(dir.join("state")).unwrap();
        Orchestrator::new(Arc::new(MemoryHost::new()), config, store)
    }

    #[test]
    fn metadata_title_is_the_file_stem() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(dir.path());

        let meta = orchestrator.video_metadata(Path::new("/watch/Match 3 Finale.mp4"));
        assert_eq!(meta.title, "Match 3 Finale");
        assert_eq!(meta.privacy, Privacy::Unlisted);
        assert_eq!(meta.category, "Gaming");
    }

    #[test]
    fn pass_summary_quietness() {
        assert!(PassSummary::default().is_quiet());

        let waiting_only = PassSummary {
            waiting: 4,
            ..Default::default()
        };
        assert!(waiting_only.is_quiet());

        let uploaded = PassSummary {
            uploaded: 1,
            ..Default::default()
        };
        assert!(!uploaded.is_quiet());

        let blocked = PassSummary {
            quota_blocked: true,
            ..Default::default()
        };
        assert!(!blocked.is_quiet());
    }
}
