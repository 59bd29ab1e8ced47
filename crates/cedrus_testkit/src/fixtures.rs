//! Test fixtures and store helpers.
//!
//! Provides convenience functions for setting up test stores on temporary
//! directories, in memory, or over an [`InstrumentedEngine`].

use crate::instrumented::{EngineCounters, InstrumentedEngine};
use cedrus_core::{Config, Store};
use cedrus_storage::InMemoryBackend;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// A file-backed test store with automatic cleanup.
pub struct TestStore {
    /// The store instance.
    pub store: Store,
    /// The temporary directory (kept alive to prevent cleanup).
    dir: TempDir,
}

impl TestStore {
    /// Creates an empty store in a fresh temporary directory.
    pub fn new() -> Self {
        Self::with_config(&Config::default())
    }

    /// Creates an empty store with `config`.
    pub fn with_config(config: &Config) -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let store = Store::open(dir.path(), config, true).expect("Failed to open test store");
        Self { store, dir }
    }

    /// Returns the store directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Closes the store and opens the same directory again.
    pub fn reopen(self) -> Self {
        let Self { mut store, dir } = self;
        store.close().expect("Failed to close test store");
        drop(store);
        let store =
            Store::open(dir.path(), &Config::default(), false).expect("Failed to reopen test store");
        Self { store, dir }
    }

    /// Closes the store, keeping the directory alive.
    pub fn into_dir(self) -> TempDir {
        let Self { mut store, dir } = self;
        store.close().expect("Failed to close test store");
        dir
    }
}

impl Default for TestStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestStore {
    type Target = Store;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

impl std::ops::DerefMut for TestStore {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.store
    }
}

/// Runs a test against a fresh file-backed store.
///
/// # Example
///
/// ```rust
/// use cedrus_testkit::with_temp_store;
///
/// with_temp_store(|store| {
///     store.put(b"k", b"v").unwrap();
///     assert_eq!(store.len(), 1);
/// });
/// ```
pub fn with_temp_store<F, R>(f: F) -> R
where
    F: FnOnce(&Store) -> R,
{
    let test_store = TestStore::new();
    f(&test_store.store)
}

/// Runs a test against a fresh in-memory store.
pub fn with_memory_store<F, R>(f: F) -> R
where
    F: FnOnce(&Store) -> R,
{
    let store = Store::open_in_memory(&Config::default()).expect("Failed to open in-memory store");
    f(&store)
}

/// Opens a store over a fresh shared [`InMemoryBackend`].
///
/// The returned backend sees every write the store makes, so a test can
/// damage the log under a live store or reopen it from the same bytes.
pub fn backend_store() -> (Store, InMemoryBackend) {
    let backend = InMemoryBackend::new();
    let store = Store::open_with_backend(Box::new(backend.clone()), &Config::default())
        .expect("Failed to open backend store");
    (store, backend)
}

/// Opens an in-memory store over an [`InstrumentedEngine`].
///
/// Returns the engine counters alongside, since the engine itself moves into
/// the store.
pub fn instrumented_store() -> (Store<InstrumentedEngine>, Arc<EngineCounters>) {
    let engine = InstrumentedEngine::in_memory();
    let counters = engine.counters();
    (Store::with_engine(engine), counters)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Returns the key used for entry `i` of [`populated_store`].
    pub fn key(i: usize) -> Vec<u8> {
        format!("key-{i:05}").into_bytes()
    }

    /// Returns the value stored for entry `i` of [`populated_store`].
    pub fn value(i: usize) -> Vec<u8> {
        format!("value-{i}").into_bytes()
    }

    /// Creates a file-backed store holding `count` entries.
    pub fn populated_store(count: usize) -> TestStore {
        let store = TestStore::new();
        for i in 0..count {
            store.put(&key(i), &value(i)).expect("Failed to populate store");
        }
        store
    }
}
