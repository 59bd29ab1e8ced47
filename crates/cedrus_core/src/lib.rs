//! # Cedrus Core
//!
//! The access layer of CedrusDB, an embedded key-value store.
//!
//! This crate provides:
//! - [`Store`], a session on one store with single-key put, get and delete
//!   in raw-key and pre-hashed modes
//! - [`ReadHandle`] and [`WriteHandle`], which hold a value's lock until
//!   released exactly once
//! - [`WriteBatch`], multi-key writes applied atomically
//! - [`StoreStats`], counters covering handle and batch lifecycles
//!
//! The engine underneath is reached only through the
//! [`Engine`](cedrus_engine::Engine) trait; [`LogEngine`] is the default.
//!
//! ## Example
//!
//! ```rust
//! use cedrus_core::{Config, Store};
//!
//! let store = Store::open_in_memory(&Config::default()).unwrap();
//! store.put(b"hello", b"world").unwrap();
//!
//! let mut batch = store.new_write_batch().unwrap();
//! batch.put(b"a", b"1").unwrap();
//! batch.delete(b"hello").unwrap();
//! batch.commit().unwrap();
//!
//! assert!(store.get(b"hello").unwrap_err().is_not_found());
//! let handle = store.get(b"a").unwrap();
//! assert_eq!(handle.bytes(), Some(&b"1"[..]));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod batch;
mod error;
mod handle;
mod release;
mod stats;
mod store;

pub use batch::{BatchState, WriteBatch};
pub use error::{Error, ErrorKind, StoreResult};
pub use handle::{ReadHandle, ValueView, WriteHandle};
pub use stats::{StatsSnapshot, StoreStats};
pub use store::Store;

pub use cedrus_engine::{
    hash_key, Config, Digest, Engine, EngineBatch, EngineError, LogEngine, PutOutcome, HASH_WIDTH,
};
