//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A read reached past the end of the stored bytes.
    #[error("read past end of storage: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// Requested offset.
        offset: u64,
        /// Requested length.
        len: usize,
        /// Bytes currently stored.
        size: u64,
    },

    /// A shrink was asked to grow the store.
    #[error("cannot shrink storage of {size} bytes to {requested} bytes")]
    InvalidShrink {
        /// Requested length.
        requested: u64,
        /// Bytes currently stored.
        size: u64,
    },
}
