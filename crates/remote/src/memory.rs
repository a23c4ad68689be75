//! In-memory loopback host for tests and dry runs.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use crate::{HostFuture, MediaHost, RemoteError, VideoMetadata};

/// A video the loopback host has accepted end-to-end.
#[derive(Debug, Clone)]
pub struct AcceptedVideo {
    pub video_id: String,
    pub metadata: VideoMetadata,
    pub bytes: Vec<u8>,
}

#[derive(Debug)]
struct OpenSession {
    metadata: VideoMetadata,
    total_size: u64,
    received: Vec<u8>,
}

#[derive(Debug, Default)]
struct HostState {
    sessions: HashMap<String, OpenSession>,
    accepted: Vec<AcceptedVideo>,
    collections: HashMap<String, Vec<String>>,
    deleted_collections: HashSet<String>,
    scripted_errors: VecDeque<RemoteError>,
    chunk_calls: u64,
    next_video: u64,
}

/// [`MediaHost`] that keeps everything in memory.
///
/// Used by the test suites and the daemon's loopback mode. Errors can be
/// scripted with [`fail_next`](Self::fail_next): each queued error is
/// returned by the next host call, in order, before any real work happens.
#[derive(Debug, Default)]
pub struct MemoryHost {
    state: Mutex<HostState>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an error to be returned by the next host call.
    pub fn fail_next(&self, error: RemoteError) {
        self.state.lock().unwrap().scripted_errors.push_back(error);
    }

    /// Marks a collection as deleted so `add_to_collection` reports it
    /// missing.
    pub fn delete_collection(&self, collection_id: &str) {
        let mut s = self.state.lock().unwrap();
        s.deleted_collections.insert(collection_id.to_string());
        s.collections.remove(collection_id);
    }

    /// Videos accepted end-to-end (finalized), in completion order.
    pub fn accepted(&self) -> Vec<AcceptedVideo> {
        self.state.lock().unwrap().accepted.clone()
    }

    /// Video ids filed into `collection_id`.
    pub fn collection(&self, collection_id: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .collections
            .get(collection_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Total `upload_chunk` calls served (scripted failures included).
    pub fn chunk_calls(&self) -> u64 {
        self.state.lock().unwrap().chunk_calls
    }

    /// Number of sessions still open (created but not finalized).
    pub fn open_sessions(&self) -> usize {
        self.state.lock().unwrap().sessions.len()
    }

    fn take_scripted(state: &mut HostState) -> Option<RemoteError> {
        state.scripted_errors.pop_front()
    }
}

impl MediaHost for MemoryHost {
    fn create_session<'a>(
        &'a self,
        metadata: &'a VideoMetadata,
        total_size: u64,
    ) -> HostFuture<'a, String> {
        Box::pin(async move {
            let mut s = self.state.lock().unwrap();
            if let Some(err) = Self::take_scripted(&mut s) {
                return Err(err);
            }
            let token = uuid::Uuid::new_v4().to_string();
            s.sessions.insert(
                token.clone(),
                OpenSession {
                    metadata: metadata.clone(),
                    total_size,
                    received: Vec::new(),
                },
            );
            Ok(token)
        })
    }

    fn upload_chunk<'a>(
        &'a self,
        session_token: &'a str,
        offset: u64,
        data: &'a [u8],
    ) -> HostFuture<'a, u64> {
        Box::pin(async move {
            let mut s = self.state.lock().unwrap();
            s.chunk_calls += 1;
            if let Some(err) = Self::take_scripted(&mut s) {
                return Err(err);
            }
            let session = s
                .sessions
                .get_mut(session_token)
                .ok_or_else(|| RemoteError::Fatal(format!("unknown session {session_token}")))?;

            let received = session.received.len() as u64;
            if offset != received {
                // Out-of-order chunk; tell the caller where to resume.
                return Err(RemoteError::Retryable(format!(
                    "offset {offset} does not match received {received}"
                )));
            }
            if received + data.len() as u64 > session.total_size {
                return Err(RemoteError::Fatal("chunk exceeds declared size".into()));
            }

            session.received.extend_from_slice(data);
            Ok(session.received.len() as u64)
        })
    }

    fn finalize<'a>(&'a self, session_token: &'a str) -> HostFuture<'a, String> {
        Box::pin(async move {
            let mut s = self.state.lock().unwrap();
            if let Some(err) = Self::take_scripted(&mut s) {
                return Err(err);
            }
            let session = s
                .sessions
                .remove(session_token)
                .ok_or_else(|| RemoteError::Fatal(format!("unknown session {session_token}")))?;

            if (session.received.len() as u64) != session.total_size {
                // Leave nothing dangling; the caller must start over.
                return Err(RemoteError::Fatal(format!(
                    "finalized at {} of {} bytes",
                    session.received.len(),
                    session.total_size
                )));
            }

            let video_id = format!("vid-{:06}", s.next_video);
            s.next_video += 1;
            s.accepted.push(AcceptedVideo {
                video_id: video_id.clone(),
                metadata: session.metadata,
                bytes: session.received,
            });
            Ok(video_id)
        })
    }

    fn add_to_collection<'a>(
        &'a self,
        video_id: &'a str,
        collection_id: &'a str,
    ) -> HostFuture<'a, ()> {
        Box::pin(async move {
            let mut s = self.state.lock().unwrap();
            if let Some(err) = Self::take_scripted(&mut s) {
                return Err(err);
            }
            if s.deleted_collections.contains(collection_id) {
                return Err(RemoteError::CollectionNotFound(collection_id.to_string()));
            }
            s.collections
                .entry(collection_id.to_string())
                .or_default()
                .push(video_id.to_string());
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn full_session_roundtrip() {
        let host = MemoryHost::new();
        let meta = VideoMetadata::titled("clip");
        let token = host.create_session(&meta, 10).await.unwrap();

        assert_eq!(host.upload_chunk(&token, 0, b"01234").await.unwrap(), 5);
        assert_eq!(host.upload_chunk(&token, 5, b"56789").await.unwrap(), 10);

        let video_id = host.finalize(&token).await.unwrap();
        assert_eq!(video_id, "vid-000000");

        let accepted = host.accepted();
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].bytes, b"0123456789");
        assert_eq!(accepted[0].metadata.title, "clip");
        assert_eq!(host.open_sessions(), 0);
    }

    #[tokio::test]
    async fn offset_mismatch_is_retryable() {
        let host = MemoryHost::new();
        let token = host
            .create_session(&VideoMetadata::titled("clip"), 10)
            .await
            .unwrap();

        let err = host.upload_chunk(&token, 5, b"56789").await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn finalize_incomplete_fails() {
        let host = MemoryHost::new();
        let token = host
            .create_session(&VideoMetadata::titled("clip"), 10)
            .await
            .unwrap();
        host.upload_chunk(&token, 0, b"0123").await.unwrap();

        let err = host.finalize(&token).await.unwrap_err();
        assert!(matches!(err, RemoteError::Fatal(_)));
    }

    #[tokio::test]
    async fn scripted_errors_fire_in_order() {
        let host = MemoryHost::new();
        host.fail_next(RemoteError::QuotaExceeded);
        host.fail_next(RemoteError::Retryable("flaky".into()));

        let meta = VideoMetadata::titled("clip");
        assert!(host.create_session(&meta, 1).await.unwrap_err().is_quota());
        assert!(
            host.create_session(&meta, 1)
                .await
                .unwrap_err()
                .is_retryable()
        );
        // Queue drained; third call succeeds.
        assert!(host.create_session(&meta, 1).await.is_ok());
    }

    #[tokio::test]
    async fn deleted_collection_reports_not_found() {
        let host = MemoryHost::new();
        host.delete_collection("pl-gone");

        let err = host
            .add_to_collection("vid-000000", "pl-gone")
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::CollectionNotFound(_)));

        host.add_to_collection("vid-000001", "pl-live").await.unwrap();
        assert_eq!(host.collection("pl-live"), vec!["vid-000001".to_string()]);
    }
}
