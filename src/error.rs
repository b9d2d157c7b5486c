//! Error kinds surfaced by ingestion, deletion, and the task queue.

use thiserror::Error;

use crate::notify::Severity;

#[derive(Debug, Error)]
pub enum IndexingError {
    /// The source file exists but could not be decoded as a PDF.
    #[error("cannot decode {path}: {reason}")]
    Decode { path: String, reason: String },

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("document already in tasklist for {action}: {file_ref}")]
    AlreadyQueued { file_ref: String, action: String },

    #[error("document is indexing, wait till end of indexing: {0}")]
    AlreadyIndexing(String),

    /// An on-disk file is absent although a row (or request) implies it exists.
    #[error("file not found: {0}")]
    ArtifactMissing(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("indexing of {0} was cancelled")]
    Cancelled(String),

    #[error("task for {file_ref} timed out after {secs}s")]
    Timeout { file_ref: String, secs: u64 },

    /// A file reference that would resolve outside the storage root.
    #[error("invalid file reference: {0:?}")]
    InvalidRef(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl IndexingError {
    /// Severity used when the error is reported to the notification channel.
    /// Dedup rejections are warnings, everything else is a failure.
    pub fn severity(&self) -> Severity {
        match self {
            IndexingError::AlreadyQueued { .. } | IndexingError::AlreadyIndexing(_) => {
                Severity::Warning
            }
            _ => Severity::Danger,
        }
    }
}

pub type Result<T, E = IndexingError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejections_are_warnings() {
        let err = IndexingError::AlreadyQueued {
            file_ref: "a.pdf".into(),
            action: "indexing".into(),
        };
        assert_eq!(err.severity(), Severity::Warning);
        assert_eq!(
            err.to_string(),
            "document already in tasklist for indexing: a.pdf"
        );
        assert_eq!(
            IndexingError::AlreadyIndexing("a.pdf".into()).severity(),
            Severity::Warning
        );
    }

    #[test]
    fn failures_are_danger() {
        let err = IndexingError::Decode {
            path: "x.pdf".into(),
            reason: "bad header".into(),
        };
        assert_eq!(err.severity(), Severity::Danger);
        assert_eq!(
            IndexingError::NotFound("x.pdf".into()).severity(),
            Severity::Danger
        );
        let err = IndexingError::InvalidRef("../x.pdf".into());
        assert_eq!(err.severity(), Severity::Danger);
        assert_eq!(err.to_string(), "invalid file reference: \"../x.pdf\"");
    }
}
