//! The store session.

use crate::batch::{BatchTicket, WriteBatch};
use crate::error::{Error, ErrorKind, ResultExt, StoreResult};
use crate::handle::{ReadHandle, WriteHandle};
use crate::stats::{StatsSnapshot, StoreStats};
use cedrus_engine::{
    check_hash_width, hash_key, Config, Digest, Engine, EngineError, EngineResult, Key, LogEngine,
    PutOutcome,
};
use cedrus_storage::StorageBackend;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

/// An open session on one key-value store.
///
/// Every read hands back a handle that holds the value's lock; see
/// [`ReadHandle`] and [`WriteHandle`]. Multi-key writes go through a
/// [`WriteBatch`].
///
/// Each operation exists in two key modes: raw keys, which the engine
/// hashes, and `*_by_hash` variants taking a digest computed with
/// [`hash_key`](Store::hash_key). Both modes address the same value.
///
/// # Example
///
/// ```rust
/// use cedrus_core::{Config, PutOutcome, Store};
///
/// let dir = tempfile::tempdir().unwrap();
/// let store = Store::open(dir.path(), &Config::default(), true).unwrap();
///
/// assert_eq!(store.put(b"hello", b"world").unwrap(), PutOutcome::Inserted);
/// let handle = store.get(b"hello").unwrap();
/// assert_eq!(handle.bytes(), Some(&b"world"[..]));
/// ```
pub struct Store<E: Engine = LogEngine> {
    engine: Option<E>,
    stats: Arc<StoreStats>,
    id: u64,
    path: Option<PathBuf>,
}

impl Store<LogEngine> {
    /// Opens or creates the store at `path`.
    ///
    /// With `truncate` set, any existing contents are destroyed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Open`] if the path cannot hold a store, another
    /// session has it open, or its log is damaged.
    pub fn open(path: impl AsRef<Path>, config: &Config, truncate: bool) -> StoreResult<Self> {
        let path = path.as_ref();
        let mut store = Self::opened(Some(path), LogEngine::open(path, config, truncate))?;
        store.path = Some(path.to_path_buf());
        Ok(store)
    }

    /// Opens an empty store that lives only in memory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Open`], with no path, if the engine cannot start.
    pub fn open_in_memory(config: &Config) -> StoreResult<Self> {
        Self::opened(None, LogEngine::open_in_memory(config))
    }

    /// Opens a store whose log lives on `backend`, replaying its contents.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Open`], with no path, if the log is damaged or the
    /// backend cannot be read. The backend is left as it was.
    pub fn open_with_backend(
        backend: Box<dyn StorageBackend>,
        config: &Config,
    ) -> StoreResult<Self> {
        Self::opened(None, LogEngine::with_backend(backend, config))
    }

    fn opened(path: Option<&Path>, engine: EngineResult<LogEngine>) -> StoreResult<Self> {
        match engine {
            Ok(engine) => Ok(Self::with_engine(engine)),
            Err(source) => {
                warn!(
                    target: "cedrus::store",
                    path = ?path,
                    error = %source,
                    "failed to open store"
                );
                Err(Error::open(path, source))
            }
        }
    }
}

impl<E: Engine> Store<E> {
    /// Wraps an open engine session.
    pub fn with_engine(engine: E) -> Self {
        let id = NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed);
        debug!(target: "cedrus::store", store = id, "store session opened");
        Self {
            engine: Some(engine),
            stats: Arc::new(StoreStats::new()),
            id,
            path: None,
        }
    }

    /// Returns the store directory, or `None` if the store is not on disk.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns the engine, or `None` once closed.
    #[must_use]
    pub fn engine(&self) -> Option<&E> {
        self.engine.as_ref()
    }

    /// Computes the digest [`put_by_hash`](Self::put_by_hash) and friends
    /// expect for `key`.
    #[must_use]
    pub fn hash_key(&self, key: &[u8]) -> Digest {
        hash_key(key)
    }

    /// Inserts or overwrites the value at `key`.
    ///
    /// # Deadlock
    ///
    /// Blocks forever if the calling thread holds a handle on the same key.
    pub fn put(&self, key: &[u8], value: &[u8]) -> StoreResult<PutOutcome> {
        self.put_with(ErrorKind::Put, Key::Raw(key), value)
    }

    /// Inserts or overwrites the value addressed by `hash`.
    ///
    /// # Deadlock
    ///
    /// Blocks forever if the calling thread holds a handle on the same key.
    pub fn put_by_hash(&self, hash: &[u8], value: &[u8]) -> StoreResult<PutOutcome> {
        self.put_with(ErrorKind::PutByHash, Key::Hashed(hash), value)
    }

    /// Takes the shared lock on the value at `key`.
    ///
    /// Blocks while a [`WriteHandle`] on the key is alive.
    pub fn get(&self, key: &[u8]) -> StoreResult<ReadHandle<E>> {
        self.get_with(ErrorKind::Get, Key::Raw(key))
    }

    /// Takes the shared lock on the value addressed by `hash`.
    pub fn get_by_hash(&self, hash: &[u8]) -> StoreResult<ReadHandle<E>> {
        self.get_with(ErrorKind::GetByHash, Key::Hashed(hash))
    }

    /// Takes the exclusive lock on the value at `key`.
    ///
    /// Blocks while any other handle on the key is alive.
    pub fn get_mut(&self, key: &[u8]) -> StoreResult<WriteHandle<E>> {
        self.get_mut_with(ErrorKind::GetMut, Key::Raw(key))
    }

    /// Takes the exclusive lock on the value addressed by `hash`.
    pub fn get_by_hash_mut(&self, hash: &[u8]) -> StoreResult<WriteHandle<E>> {
        self.get_mut_with(ErrorKind::GetByHashMut, Key::Hashed(hash))
    }

    /// Removes the value at `key`.
    ///
    /// Deleting an absent key is an error; see [`Error::is_not_found`].
    ///
    /// # Deadlock
    ///
    /// Blocks forever if the calling thread holds a handle on the same key.
    pub fn delete(&self, key: &[u8]) -> StoreResult<()> {
        self.delete_with(ErrorKind::Delete, Key::Raw(key))
    }

    /// Removes the value addressed by `hash`.
    ///
    /// # Deadlock
    ///
    /// Blocks forever if the calling thread holds a handle on the same key.
    pub fn delete_by_hash(&self, hash: &[u8]) -> StoreResult<()> {
        self.delete_with(ErrorKind::DeleteByHash, Key::Hashed(hash))
    }

    /// Overwrites the value held by `handle` and releases its lock.
    ///
    /// The handle is consumed whether or not the write succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HandleReleased`] if `handle` was already released.
    pub fn replace(&self, mut handle: WriteHandle<E>, value: &[u8]) -> StoreResult<()> {
        let kind = ErrorKind::Replace;
        let Some(guard) = handle.take_guard() else {
            warn!(target: "cedrus::handle", "replace through a released handle");
            return self.track(Err(Error::HandleReleased { kind }));
        };
        let result = self
            .live(kind)
            .and_then(|engine| engine.replace(guard, value).kind(kind));
        if result.is_ok() {
            self.stats.record_replace();
        }
        self.track(result)
    }

    /// Begins a write batch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BatchInProgress`] if the calling thread already has
    /// an unresolved batch on this store. Blocks while another thread's
    /// batch is open.
    pub fn new_write_batch(&self) -> StoreResult<WriteBatch<'_, E>> {
        let engine = self.live(ErrorKind::BatchBegin)?;
        let Some(ticket) = BatchTicket::acquire(self.id) else {
            warn!(
                target: "cedrus::batch",
                store = self.id,
                "write batch already open on this thread"
            );
            return self.track(Err(Error::BatchInProgress));
        };
        let inner = self.track(engine.begin_batch().kind(ErrorKind::BatchBegin))?;
        Ok(WriteBatch::new(inner, ticket, &self.stats))
    }

    /// Validates the persisted log against the live store.
    ///
    /// Must not run concurrently with any other call on this store.
    pub fn check_integrity(&self) -> StoreResult<()> {
        let kind = ErrorKind::Integrity;
        let result = self
            .live(kind)
            .and_then(|engine| engine.check_integrity().kind(kind));
        if let Err(e) = &result {
            warn!(target: "cedrus::store", error = %e, "integrity check failed");
        }
        self.track(result)
    }

    /// Makes every completed write durable.
    pub fn flush(&self) -> StoreResult<()> {
        let kind = ErrorKind::Flush;
        let result = self.live(kind).and_then(|engine| engine.flush().kind(kind));
        self.track(result)
    }

    /// Returns the number of stored values, or 0 once closed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.engine.as_ref().map_or(0, Engine::len)
    }

    /// Returns true if no values are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the live counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Returns true once [`close`](Self::close) has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.engine.is_none()
    }

    /// Ends the session, flushing the engine.
    ///
    /// Closing an already closed store is logged and ignored. Handles still
    /// alive keep their values readable but every store call fails.
    pub fn close(&mut self) -> StoreResult<()> {
        let Some(engine) = self.engine.take() else {
            warn!(target: "cedrus::store", store = self.id, "attempt to double close");
            self.stats.record_double_close();
            return Ok(());
        };
        let result = engine.close().kind(ErrorKind::Close);
        info!(
            target: "cedrus::store",
            store = self.id,
            outstanding_handles = self.stats.handles_outstanding(),
            "store closed"
        );
        self.track(result)
    }

    fn live(&self, kind: ErrorKind) -> StoreResult<&E> {
        self.engine
            .as_ref()
            .ok_or(Error::Operation {
                kind,
                source: EngineError::Closed,
            })
    }

    fn check_key(key: Key<'_>, kind: ErrorKind) -> StoreResult<()> {
        match key {
            Key::Hashed(hash) if cfg!(debug_assertions) => check_hash_width(hash).kind(kind),
            _ => Ok(()),
        }
    }

    fn track<T>(&self, result: StoreResult<T>) -> StoreResult<T> {
        if result.is_err() {
            self.stats.record_error();
        }
        result
    }

    fn put_with(&self, kind: ErrorKind, key: Key<'_>, value: &[u8]) -> StoreResult<PutOutcome> {
        let result = self.live(kind).and_then(|engine| {
            Self::check_key(key, kind)?;
            engine.put(key, value).kind(kind)
        });
        if result.is_ok() {
            self.stats.record_put();
        }
        self.track(result)
    }

    fn get_with(&self, kind: ErrorKind, key: Key<'_>) -> StoreResult<ReadHandle<E>> {
        let result = self.live(kind).and_then(|engine| {
            Self::check_key(key, kind)?;
            engine.get(key).kind(kind)
        });
        let guard = self.track(result)?;
        self.stats.record_get();
        Ok(ReadHandle::new(guard, Arc::clone(&self.stats)))
    }

    fn get_mut_with(&self, kind: ErrorKind, key: Key<'_>) -> StoreResult<WriteHandle<E>> {
        let result = self.live(kind).and_then(|engine| {
            Self::check_key(key, kind)?;
            engine.get_mut(key).kind(kind)
        });
        let guard = self.track(result)?;
        self.stats.record_get();
        Ok(WriteHandle::new(guard, Arc::clone(&self.stats)))
    }

    fn delete_with(&self, kind: ErrorKind, key: Key<'_>) -> StoreResult<()> {
        let result = self.live(kind).and_then(|engine| {
            Self::check_key(key, kind)?;
            engine.delete(key).kind(kind)
        });
        if result.is_ok() {
            self.stats.record_delete();
        }
        self.track(result)
    }
}

impl<E: Engine> Drop for Store<E> {
    fn drop(&mut self) {
        if self.engine.is_some() {
            if let Err(e) = self.close() {
                warn!(target: "cedrus::store", error = %e, "failed to close store on drop");
            }
        }
    }
}

impl<E: Engine> fmt::Debug for Store<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
