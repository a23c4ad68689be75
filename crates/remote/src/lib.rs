//! The remote media host as an opaque capability.
//!
//! The upload pipeline drives any implementation of [`MediaHost`]: create a
//! resumable session, push chunks, finalize, optionally file the video into a
//! collection. Authentication, token refresh and the provider wire protocol
//! all live behind the trait. Errors arrive pre-categorized; callers branch
//! on [`RemoteError`] variants, never on provider-specific codes or message
//! text.

mod memory;

pub use memory::MemoryHost;

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

/// Boxed future returned by [`MediaHost`] methods.
///
/// Keeps the trait object-safe and the pipeline decoupled from any concrete
/// transport, at the cost of one allocation per call.
pub type HostFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RemoteError>> + Send + 'a>>;

/// Remote failures, categorized for the pipeline's branching.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RemoteError {
    /// Credentials rejected or expired. Requires operator intervention.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Provider upload quota exhausted. Starts the cooldown window.
    #[error("upload quota exceeded")]
    QuotaExceeded,

    /// Transient condition worth retrying with backoff.
    #[error("retryable remote error: {0}")]
    Retryable(String),

    /// Permanent rejection of this request. No retry.
    #[error("fatal remote error: {0}")]
    Fatal(String),

    /// The target collection no longer exists. Surfaced, never retried.
    #[error("collection not found: {0}")]
    CollectionNotFound(String),
}

impl RemoteError {
    /// True for the quota category (routes to the cooldown governor).
    pub fn is_quota(&self) -> bool {
        matches!(self, RemoteError::QuotaExceeded)
    }

    /// True when the pipeline should count this against per-file retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RemoteError::Retryable(_))
    }
}

/// Visibility of an uploaded video.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Privacy {
    #[default]
    Private,
    Unlisted,
    Public,
}

/// Already-resolved upload parameters for one video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMetadata {
    /// Video title, conventionally the file stem.
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Provider category, passed through as resolved by the caller.
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub privacy: Privacy,
}

impl VideoMetadata {
    /// Metadata with just a title and defaults for the rest.
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            category: String::new(),
            privacy: Privacy::default(),
        }
    }
}

/// Capability to upload videos to the remote host.
///
/// Implementations must be safe to call from the single upload worker; the
/// pipeline never issues concurrent calls against one session.
pub trait MediaHost: Send + Sync {
    /// Opens a resumable upload session and returns its opaque token.
    ///
    /// The pipeline stores the token verbatim and never parses it.
    fn create_session<'a>(
        &'a self,
        metadata: &'a VideoMetadata,
        total_size: u64,
    ) -> HostFuture<'a, String>;

    /// Uploads one chunk at `offset` and returns the acknowledged offset
    /// (the first byte the host has not yet received).
    fn upload_chunk<'a>(
        &'a self,
        session_token: &'a str,
        offset: u64,
        data: &'a [u8],
    ) -> HostFuture<'a, u64>;

    /// Completes the session and returns the remote video id.
    fn finalize<'a>(&'a self, session_token: &'a str) -> HostFuture<'a, String>;

    /// Files an uploaded video into a collection (playlist).
    fn add_to_collection<'a>(
        &'a self,
        video_id: &'a str,
        collection_id: &'a str,
    ) -> HostFuture<'a, ()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_categories() {
        assert!(RemoteError::QuotaExceeded.is_quota());
        assert!(!RemoteError::QuotaExceeded.is_retryable());
        assert!(RemoteError::Retryable("reset".into()).is_retryable());
        assert!(!RemoteError::Auth("expired".into()).is_retryable());
        assert!(!RemoteError::Fatal("rejected".into()).is_quota());
    }

    #[test]
    fn privacy_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&Privacy::Unlisted).unwrap(),
            r#""unlisted""#
        );
        assert_eq!(Privacy::default(), Privacy::Private);
    }

    #[test]
    fn metadata_titled_defaults() {
        let m = VideoMetadata::titled("session_2026-03-14");
        assert_eq!(m.title, "session_2026-03-14");
        assert_eq!(m.privacy, Privacy::Private);
        assert!(m.category.is_empty());
    }
}
