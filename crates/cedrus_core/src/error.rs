//! Error types for store operations.

use cedrus_engine::EngineError;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, Error>;

/// The store operation an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// [`Store::put`](crate::Store::put)
    Put,
    /// [`Store::put_by_hash`](crate::Store::put_by_hash)
    PutByHash,
    /// [`Store::get`](crate::Store::get)
    Get,
    /// [`Store::get_mut`](crate::Store::get_mut)
    GetMut,
    /// [`Store::delete`](crate::Store::delete)
    Delete,
    /// [`Store::replace`](crate::Store::replace)
    Replace,
    /// [`Store::get_by_hash`](crate::Store::get_by_hash)
    GetByHash,
    /// [`Store::get_by_hash_mut`](crate::Store::get_by_hash_mut)
    GetByHashMut,
    /// [`Store::delete_by_hash`](crate::Store::delete_by_hash)
    DeleteByHash,
    /// [`WriteBatch::put`](crate::WriteBatch::put)
    BatchPut,
    /// [`WriteBatch::put_by_hash`](crate::WriteBatch::put_by_hash)
    BatchPutByHash,
    /// [`WriteBatch::delete`](crate::WriteBatch::delete)
    BatchDelete,
    /// [`WriteBatch::delete_by_hash`](crate::WriteBatch::delete_by_hash)
    BatchDeleteByHash,
    /// [`WriteBatch::commit`](crate::WriteBatch::commit)
    BatchWrite,
    /// [`Store::check_integrity`](crate::Store::check_integrity)
    Integrity,
    /// [`Store::open`](crate::Store::open)
    Open,
    /// [`Store::close`](crate::Store::close)
    Close,
    /// [`Store::flush`](crate::Store::flush)
    Flush,
    /// [`Store::new_write_batch`](crate::Store::new_write_batch)
    BatchBegin,
}

impl ErrorKind {
    /// Returns the operation name used in messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Put => "put",
            Self::PutByHash => "put_by_hash",
            Self::Get => "get",
            Self::GetMut => "get_mut",
            Self::Delete => "delete",
            Self::Replace => "replace",
            Self::GetByHash => "get_by_hash",
            Self::GetByHashMut => "get_by_hash_mut",
            Self::DeleteByHash => "delete_by_hash",
            Self::BatchPut => "batch put",
            Self::BatchPutByHash => "batch put_by_hash",
            Self::BatchDelete => "batch delete",
            Self::BatchDeleteByHash => "batch delete_by_hash",
            Self::BatchWrite => "batch write",
            Self::Integrity => "integrity check",
            Self::Open => "open",
            Self::Close => "close",
            Self::Flush => "flush",
            Self::BatchBegin => "batch begin",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by the store.
#[derive(Debug, Error)]
pub enum Error {
    /// The store could not be opened.
    ///
    /// Returned by every open path, including stores that are not on disk.
    #[error("failed to open store{}: {source}", location(path.as_deref()))]
    Open {
        /// Requested store path, or `None` for an in-memory or backend store.
        path: Option<PathBuf>,
        /// Engine cause.
        #[source]
        source: EngineError,
    },

    /// An engine call failed.
    #[error("{kind} failed: {source}")]
    Operation {
        /// Failing operation.
        kind: ErrorKind,
        /// Engine cause.
        #[source]
        source: EngineError,
    },

    /// A handle was used after it had been released.
    #[error("{kind} failed: handle already released")]
    HandleReleased {
        /// Failing operation.
        kind: ErrorKind,
    },

    /// The calling thread already holds an open write batch on this store.
    #[error("a write batch is already open on this store for the current thread")]
    BatchInProgress,
}

fn location(path: Option<&Path>) -> String {
    path.map(|p| format!(" at {}", p.display()))
        .unwrap_or_default()
}

impl Error {
    pub(crate) fn open(path: Option<&Path>, source: EngineError) -> Self {
        Self::Open {
            path: path.map(Path::to_path_buf),
            source,
        }
    }

    pub(crate) fn op(kind: ErrorKind, source: EngineError) -> Self {
        Self::Operation { kind, source }
    }

    /// Returns the operation this error came from.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Open { .. } => ErrorKind::Open,
            Self::Operation { kind, .. } | Self::HandleReleased { kind } => *kind,
            Self::BatchInProgress => ErrorKind::BatchBegin,
        }
    }

    /// Returns the engine cause, if the engine reported one.
    #[must_use]
    pub fn engine_error(&self) -> Option<&EngineError> {
        match self {
            Self::Open { source, .. } | Self::Operation { source, .. } => Some(source),
            Self::HandleReleased { .. } | Self::BatchInProgress => None,
        }
    }

    /// Returns true if the addressed key held no value.
    ///
    /// Lets callers treat deleting an absent key as success.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.engine_error().is_some_and(EngineError::is_not_found)
    }
}

/// Attaches an operation kind to engine results.
pub(crate) trait ResultExt<T> {
    fn kind(self, kind: ErrorKind) -> StoreResult<T>;
}

impl<T> ResultExt<T> for Result<T, EngineError> {
    fn kind(self, kind: ErrorKind) -> StoreResult<T> {
        self.map_err(|source| Error::op(kind, source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_detected_through_any_kind() {
        let err = Error::op(ErrorKind::Delete, EngineError::NotFound);
        assert!(err.is_not_found());
        assert_eq!(err.kind(), ErrorKind::Delete);
        assert_eq!(err.to_string(), "delete failed: no such key");
    }

    #[test]
    fn other_failures_are_not_not_found() {
        let err = Error::op(ErrorKind::Put, EngineError::Closed);
        assert!(!err.is_not_found());
        assert!(!Error::BatchInProgress.is_not_found());
        assert!(!Error::HandleReleased {
            kind: ErrorKind::Replace
        }
        .is_not_found());
    }

    #[test]
    fn open_error_carries_path() {
        let err = Error::Open {
            path: Some(PathBuf::from("/nowhere")),
            source: EngineError::Locked,
        };
        assert_eq!(err.kind(), ErrorKind::Open);
        assert!(err.to_string().contains("/nowhere"));
    }

    #[test]
    fn open_error_without_path() {
        let err = Error::open(None, EngineError::Closed);
        assert_eq!(err.kind(), ErrorKind::Open);
        assert!(err.to_string().starts_with("failed to open store: "));
    }

    #[test]
    fn batch_in_progress_reports_batch_begin() {
        assert_eq!(Error::BatchInProgress.kind(), ErrorKind::BatchBegin);
    }
}
