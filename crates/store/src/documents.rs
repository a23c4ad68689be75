//! Typed shapes of the three persisted documents.
//!
//! The serde derives are the schema: a document that deserializes is
//! structurally valid (required fields present, coarse types correct,
//! recognized state tags).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One uploaded file, keyed in [`HistoryDoc`] by its content hash.
///
/// Created on successful upload, never mutated, never deleted by the
/// pipeline (the operator may edit the file by hand).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRecord {
    pub filename: String,
    pub uploaded_at: DateTime<Utc>,
    pub video_id: String,
}

/// Content hash → upload record. A hash appears at most once.
pub type HistoryDoc = BTreeMap<String, UploadRecord>;

/// Lifecycle state of an in-flight or recently-failed upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadState {
    Pending,
    Uploading,
    Failed,
    QuotaBlocked,
}

/// Per-file upload progress, keyed in [`LifecycleDoc`] by absolute path.
///
/// Written only by the orchestrator. Removed on terminal success; terminal
/// failures are retained for operator visibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEntry {
    pub state: UploadState,
    pub last_transition: DateTime<Utc>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_retry: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub bytes_uploaded: u64,
    /// Opaque resumable-session handle from the remote host, stored verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
}

impl LifecycleEntry {
    /// A fresh entry in the given state, transitioned now.
    pub fn new(state: UploadState, now: DateTime<Utc>) -> Self {
        Self {
            state,
            last_transition: now,
            retry_count: 0,
            next_retry: None,
            error: None,
            bytes_uploaded: 0,
            session_token: None,
        }
    }
}

/// File path → lifecycle entry.
pub type LifecycleDoc = BTreeMap<String, LifecycleEntry>;

/// Process-wide quota cooldown singleton.
///
/// Expiry is derived from the timestamp on every check; there is no second
/// "in cooldown" flag to fall out of sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaDoc {
    #[serde(default)]
    pub last_quota_hit: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn state_tags_serialize_snake_case() {
        assert_eq!(
            serde_json::to_string(&UploadState::QuotaBlocked).unwrap(),
            r#""quota_blocked""#
        );
        assert_eq!(
            serde_json::to_string(&UploadState::Pending).unwrap(),
            r#""pending""#
        );
    }

    #[test]
    fn lifecycle_entry_optional_fields_default() {
        // Minimal shape a hand-edited or older document might carry.
        let json = r#"{"state": "pending", "last_transition": "2026-03-14T09:30:00Z"}"#;
        let entry: LifecycleEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.state, UploadState::Pending);
        assert_eq!(entry.retry_count, 0);
        assert_eq!(entry.bytes_uploaded, 0);
        assert!(entry.next_retry.is_none());
        assert!(entry.session_token.is_none());
    }

    #[test]
    fn lifecycle_entry_omits_empty_optionals() {
        let entry = LifecycleEntry::new(
            UploadState::Pending,
            Utc.with_ymd_and_hms(2026, 3, 14, 9, 30, 0).unwrap(),
        );
        let json = serde_json::to_string(&entry).unwrap();
        assert!(!json.contains("next_retry"));
        assert!(!json.contains("session_token"));
        assert!(!json.contains("error"));
    }

    #[test]
    fn empty_quota_doc_roundtrips() {
        let quota: QuotaDoc = serde_json::from_str("{}").unwrap();
        assert!(quota.last_quota_hit.is_none());
    }
}
