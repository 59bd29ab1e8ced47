//! # Cedrus Engine
//!
//! The storage engine behind CedrusDB.
//!
//! This crate defines the boundary the access layer programs against
//! ([`Engine`], [`EngineBatch`]) and ships one implementation of it,
//! [`LogEngine`]: an in-memory table of per-key locked slots with every
//! mutation journaled to a [`StorageBackend`](cedrus_storage::StorageBackend).
//!
//! Keys are addressed by a fixed-width digest of the raw key bytes. See
//! [`hash_key`] and [`HASH_WIDTH`].
//!
//! ## Example
//!
//! ```rust
//! use cedrus_engine::{Config, Engine, EngineBatch, Key, LogEngine};
//!
//! let engine = LogEngine::open_in_memory(&Config::default()).unwrap();
//!
//! let mut batch = engine.begin_batch().unwrap();
//! batch.put(Key::Raw(b"a"), b"1").unwrap();
//! batch.put(Key::Raw(b"b"), b"2").unwrap();
//! batch.commit().unwrap();
//!
//! assert_eq!(engine.len(), 2);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod dir;
mod engine;
mod error;
pub mod journal;
mod key;
mod log_engine;
mod table;

pub use config::Config;
pub use dir::StoreDir;
pub use engine::{Engine, EngineBatch, PutOutcome};
pub use error::{EngineError, EngineResult};
pub use key::{check_hash_width, hash_key, Digest, Key, HASH_WIDTH};
pub use log_engine::{LogBatch, LogEngine};
pub use table::{ReadGuard, WriteGuard};
