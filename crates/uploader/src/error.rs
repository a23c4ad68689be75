//! Transfer failure classification.

use clipship_remote::RemoteError;

/// Failures during one upload attempt.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Local read failure while feeding the transfer (locked file, vanished
    /// file, bad disk). Treated like a transient and retried with backoff.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("blocking task failed: {0}")]
    Task(String),
}

impl UploadError {
    /// True when the failure is the provider's quota category.
    pub fn is_quota(&self) -> bool {
        matches!(self, UploadError::Remote(e) if e.is_quota())
    }

    /// True when the failure should count against the per-file retry budget.
    /// Auth and fatal remote errors are excluded: they need an operator.
    pub fn is_retryable(&self) -> bool {
        match self {
            UploadError::Remote(e) => e.is_retryable(),
            UploadError::Io(_) | UploadError::Task(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(UploadError::Remote(RemoteError::QuotaExceeded).is_quota());
        assert!(!UploadError::Remote(RemoteError::QuotaExceeded).is_retryable());
        assert!(UploadError::Remote(RemoteError::Retryable("x".into())).is_retryable());
        assert!(!UploadError::Remote(RemoteError::Auth("expired".into())).is_retryable());
        assert!(!UploadError::Remote(RemoteError::Fatal("no".into())).is_retryable());
        assert!(UploadError::Io(std::io::Error::other("disk")).is_retryable());
        assert!(UploadError::Task("join".into()).is_retryable());
    }
}
