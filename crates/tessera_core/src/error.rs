//! Error types for Tessera core.

use crate::ids::Id;
use std::path::PathBuf;
use tessera_storage::FsError;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in segment store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the filesystem failed.
    ///
    /// The store's prior on-disk state is intact and the operation can be
    /// retried.
    #[error("I/O failure: {message}")]
    Io {
        /// Description of the failure.
        message: String,
    },

    /// The expected segment file does not exist.
    #[error("segment not found: {}", path.display())]
    NotFound {
        /// Path of the missing file.
        path: PathBuf,
    },

    /// Segment bytes are present but cannot be decoded.
    #[error("corrupt segment: {message}")]
    CorruptSegment {
        /// Description of the corruption.
        message: String,
    },

    /// A batch overlaps identifiers already present in the segment.
    #[error("identifier collision: [{first}, {last}] overlaps existing coverage")]
    IdentifierCollision {
        /// First identifier of the rejected batch.
        first: Id,
        /// Last identifier of the rejected batch.
        last: Id,
    },

    /// A record batch violates its construction rules.
    #[error("invalid record batch: {message}")]
    InvalidBatch {
        /// Description of the violation.
        message: String,
    },

    /// The store no longer accepts requests.
    #[error("store is closed")]
    Closed,
}

impl StoreError {
    /// Creates an I/O failure error.
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Creates a corrupt segment error.
    pub fn corrupt_segment(message: impl Into<String>) -> Self {
        Self::CorruptSegment {
            message: message.into(),
        }
    }

    /// Creates an invalid batch error.
    pub fn invalid_batch(message: impl Into<String>) -> Self {
        Self::InvalidBatch {
            message: message.into(),
        }
    }

    /// Returns true if retrying the operation may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}

impl From<FsError> for StoreError {
    fn from(err: FsError) -> Self {
        match err {
            FsError::NotFound { path } => Self::NotFound { path },
            other => Self::io(other.to_string()),
        }
    }
}
