//! # Cedrus Storage
//!
//! Append-only byte stores that sit underneath the CedrusDB engine log.
//!
//! A backend never interprets what it holds. The engine frames, checksums and
//! replays records; the backend only appends bytes, hands them back, makes
//! them durable, and cuts a torn tail off after a crash.
//!
//! ## Available Backends
//!
//! - [`FileBackend`] - a single file on the local file system
//! - [`InMemoryBackend`] - a shared in-process buffer, for tests and ephemeral stores
//!
//! ## Example
//!
//! ```rust
//! use cedrus_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"hello").unwrap();
//! assert_eq!(backend.read_at(offset, 5).unwrap(), b"hello");
//! assert_eq!(backend.read_all().unwrap(), b"hello");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
