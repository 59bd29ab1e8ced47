//! Error types for engine operations.

use std::io;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Status reported by the engine for a failed operation.
///
/// The access layer maps these onto its per-operation error kinds; it never
/// needs more than "not found" versus "some other failure", but the detail is
/// kept for diagnostics.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The addressed key holds no value.
    #[error("no such key")]
    NotFound,

    /// The engine session was closed.
    #[error("engine is closed")]
    Closed,

    /// A staging or commit call reached a batch that is already resolved.
    #[error("write batch is no longer open")]
    BatchClosed,

    /// A pre-hashed key does not have the configured digest width.
    #[error("pre-hashed key is {actual} bytes, store digest width is {expected}")]
    HashWidth {
        /// Configured digest width.
        expected: usize,
        /// Width of the supplied key.
        actual: usize,
    },

    /// Another session holds the directory lock.
    #[error("store is locked by another session")]
    Locked,

    /// A value lock could not be taken without blocking.
    #[error("value is locked: {message}")]
    Busy {
        /// What was locked.
        message: String,
    },

    /// The path cannot hold a store.
    #[error("invalid store path: {message}")]
    InvalidPath {
        /// Why the path was rejected.
        message: String,
    },

    /// A persisted log record failed validation.
    #[error("log corrupted at offset {offset}: {message}")]
    Corrupted {
        /// Offset of the offending record.
        offset: u64,
        /// Description of the damage.
        message: String,
    },

    /// The live table disagrees with the persisted log.
    #[error("integrity mismatch: {message}")]
    Mismatch {
        /// Description of the disagreement.
        message: String,
    },

    /// A single value or record is too large for the log format.
    #[error("record too large: {len} bytes")]
    TooLarge {
        /// Size of the rejected payload.
        len: usize,
    },

    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] cedrus_storage::StorageError),

    /// I/O error outside the storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl EngineError {
    /// Creates a corruption error.
    pub fn corrupted(offset: u64, message: impl Into<String>) -> Self {
        Self::Corrupted {
            offset,
            message: message.into(),
        }
    }

    /// Creates an integrity mismatch error.
    pub fn mismatch(message: impl Into<String>) -> Self {
        Self::Mismatch {
            message: message.into(),
        }
    }

    /// Creates a busy error.
    pub fn busy(message: impl Into<String>) -> Self {
        Self::Busy {
            message: message.into(),
        }
    }

    /// Creates an invalid path error.
    pub fn invalid_path(message: impl Into<String>) -> Self {
        Self::InvalidPath {
            message: message.into(),
        }
    }

    /// Returns true if this is the "no such key" status.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}
