//! Atomic write batches.
//!
//! A [`WriteBatch`] stages puts and deletes and applies them all at once on
//! [`commit`](WriteBatch::commit). It holds the engine's batch writer lock
//! from creation until it is resolved, so only one batch per store makes
//! progress at a time.
//!
//! The writer lock is not reentrant. A thread that opened a batch and opens a
//! second one on the same store before resolving the first would block on
//! itself forever; the store detects that case per thread and returns
//! [`Error::BatchInProgress`](crate::Error::BatchInProgress) instead.

use crate::error::{Error, ErrorKind, StoreResult};
use crate::stats::StoreStats;
use cedrus_engine::{check_hash_width, Engine, EngineBatch, EngineError, Key, LogEngine};
use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;
use tracing::{debug, warn};

thread_local! {
    /// Stores on which the current thread has an open batch.
    static OPEN_BATCHES: RefCell<HashSet<u64>> = RefCell::new(HashSet::new());
}

/// Marks a store as having an open batch on the current thread.
pub(crate) struct BatchTicket {
    store_id: u64,
    _thread_bound: PhantomData<*const ()>,
}

impl BatchTicket {
    /// Returns `None` if the current thread already holds a ticket for
    /// `store_id`.
    pub(crate) fn acquire(store_id: u64) -> Option<Self> {
        let fresh = OPEN_BATCHES.with(|open| open.borrow_mut().insert(store_id));
        fresh.then_some(Self {
            store_id,
            _thread_bound: PhantomData,
        })
    }
}

impl Drop for BatchTicket {
    fn drop(&mut self) {
        OPEN_BATCHES.with(|open| {
            open.borrow_mut().remove(&self.store_id);
        });
    }
}

/// Lifecycle state of a [`WriteBatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    /// Accepting staged operations.
    Open,
    /// Applied.
    Committed,
    /// Discarded, explicitly, after a failure, or on drop.
    Aborted,
}

/// A set of writes applied atomically.
///
/// Staging a delete checks the key against the store and against the ops
/// already staged in this batch, so a put followed by a delete of the same
/// key is valid. The first staging failure aborts the batch.
///
/// # Deadlock
///
/// Commit takes the write lock of every key the batch touches. Committing
/// while the same thread holds a handle on one of those keys never returns.
pub struct WriteBatch<'s, E: Engine + 's = LogEngine> {
    inner: Option<E::Batch<'s>>,
    ticket: Option<BatchTicket>,
    state: BatchState,
    stats: &'s StoreStats,
}

impl<'s, E: Engine + 's> WriteBatch<'s, E> {
    pub(crate) fn new(inner: E::Batch<'s>, ticket: BatchTicket, stats: &'s StoreStats) -> Self {
        stats.record_batch_begun();
        Self {
            inner: Some(inner),
            ticket: Some(ticket),
            state: BatchState::Open,
            stats,
        }
    }

    /// Stages an insert-or-overwrite of `key`.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.stage(ErrorKind::BatchPut, Key::Raw(key), Some(value))
    }

    /// Stages an insert-or-overwrite of the value addressed by `hash`.
    pub fn put_by_hash(&mut self, hash: &[u8], value: &[u8]) -> StoreResult<()> {
        self.stage(ErrorKind::BatchPutByHash, Key::Hashed(hash), Some(value))
    }

    /// Stages a removal of `key`.
    ///
    /// Fails, aborting the batch, if the key is absent from both the store
    /// and this batch.
    pub fn delete(&mut self, key: &[u8]) -> StoreResult<()> {
        self.stage(ErrorKind::BatchDelete, Key::Raw(key), None)
    }

    /// Stages a removal of the value addressed by `hash`.
    pub fn delete_by_hash(&mut self, hash: &[u8]) -> StoreResult<()> {
        self.stage(ErrorKind::BatchDeleteByHash, Key::Hashed(hash), None)
    }

    /// Applies every staged operation, or none of them.
    ///
    /// The batch is resolved whatever the outcome: `Committed` on success,
    /// `Aborted` on failure.
    pub fn commit(&mut self) -> StoreResult<()> {
        let Some(inner) = self.inner.take() else {
            return Err(self.resolved(ErrorKind::BatchWrite));
        };
        let staged = inner.len();
        let result = inner.commit();
        self.ticket = None;

        match result {
            Ok(()) => {
                self.state = BatchState::Committed;
                self.stats.record_batch_committed();
                debug!(target: "cedrus::batch", ops = staged, "write batch committed");
                Ok(())
            }
            Err(source) => {
                self.state = BatchState::Aborted;
                self.stats.record_batch_aborted();
                self.stats.record_error();
                debug!(target: "cedrus::batch", error = %source, "write batch failed to commit");
                Err(Error::op(ErrorKind::BatchWrite, source))
            }
        }
    }

    /// Discards the staged operations.
    ///
    /// Aborting a batch that is already resolved is logged and ignored.
    pub fn abort(&mut self) {
        if self.inner.is_none() {
            warn!(
                target: "cedrus::batch",
                state = ?self.state,
                "attempt to abort a resolved write batch"
            );
            self.stats.record_double_release();
            return;
        }
        self.discard();
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub fn state(&self) -> BatchState {
        self.state
    }

    /// Returns the number of staged operations, or 0 once resolved.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.as_ref().map_or(0, |inner| inner.len())
    }

    /// Returns true if nothing is staged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn stage(&mut self, kind: ErrorKind, key: Key<'_>, value: Option<&[u8]>) -> StoreResult<()> {
        let Some(inner) = self.inner.as_mut() else {
            return Err(self.resolved(kind));
        };

        let result = match key {
            Key::Hashed(hash) if cfg!(debug_assertions) => check_hash_width(hash),
            _ => Ok(()),
        }
        .and_then(|()| match value {
            Some(value) => inner.put(key, value),
            None => inner.delete(key),
        });

        match result {
            Ok(()) => {
                self.stats.record_batch_op();
                Ok(())
            }
            Err(source) => {
                debug!(
                    target: "cedrus::batch",
                    op = %kind,
                    error = %source,
                    "staging failed, aborting write batch"
                );
                self.discard();
                self.stats.record_error();
                Err(Error::op(kind, source))
            }
        }
    }

    /// Aborts the engine batch, then frees the thread's batch slot.
    fn discard(&mut self) {
        if let Some(inner) = self.inner.take() {
            inner.abort();
            self.state = BatchState::Aborted;
            self.stats.record_batch_aborted();
        }
        self.ticket = None;
    }

    fn resolved(&self, kind: ErrorKind) -> Error {
        warn!(
            target: "cedrus::batch",
            op = %kind,
            state = ?self.state,
            "call on a resolved write batch"
        );
        self.stats.record_error();
        Error::op(kind, EngineError::BatchClosed)
    }
}

impl<'s, E: Engine + 's> Drop for WriteBatch<'s, E> {
    fn drop(&mut self) {
        if self.inner.is_some() {
            debug!(target: "cedrus::batch", ops = self.len(), "dropping open write batch, aborting");
            self.discard();
        }
    }
}

impl<'s, E: Engine + 's> fmt::Debug for WriteBatch<'s, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteBatch")
            .field("state", &self.state)
            .field("ops", &self.len())
            .finish()
    }
}
