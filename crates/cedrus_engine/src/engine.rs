//! The engine boundary.
//!
//! The access layer talks to storage only through [`Engine`] and
//! [`EngineBatch`]. Everything behind these traits (durability, indexing,
//! on-disk format) belongs to the implementation.

use crate::error::EngineResult;
use crate::key::Key;
use std::ops::Deref;

/// Result of a successful put.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// The key held no value before.
    Inserted,
    /// An existing value was overwritten.
    Updated,
}

/// An embedded key-value engine.
///
/// # Locking
///
/// Each stored value has its own reader/writer lock. [`get`](Engine::get)
/// returns a guard holding the shared lock and [`get_mut`](Engine::get_mut)
/// one holding the exclusive lock; the lock is held until the guard is
/// dropped or, for a write guard, consumed by [`replace`](Engine::replace).
/// Every other call takes and releases the locks it needs internally and
/// blocks while a conflicting guard is alive.
///
/// # Batch writer lock
///
/// [`begin_batch`](Engine::begin_batch) takes an engine-wide writer lock that
/// is held until the batch is committed or aborted. The lock is not
/// reentrant: a thread that begins a second batch while its first is still
/// open blocks forever.
pub trait Engine: Send + Sync {
    /// Guard over a value held under its shared lock.
    type ReadGuard: Deref<Target = [u8]>;

    /// Guard over a value held under its exclusive lock.
    type WriteGuard: Deref<Target = [u8]>;

    /// A batch of staged mutations.
    type Batch<'a>: EngineBatch
    where
        Self: 'a;

    /// Inserts or overwrites the value at `key`.
    fn put(&self, key: Key<'_>, value: &[u8]) -> EngineResult<PutOutcome>;

    /// Takes the shared lock on the value at `key`.
    fn get(&self, key: Key<'_>) -> EngineResult<Self::ReadGuard>;

    /// Takes the exclusive lock on the value at `key`.
    fn get_mut(&self, key: Key<'_>) -> EngineResult<Self::WriteGuard>;

    /// Removes the value at `key`. Fails with `NotFound` if there is none.
    fn delete(&self, key: Key<'_>) -> EngineResult<()>;

    /// Overwrites the value held by `guard` and releases its lock.
    ///
    /// The guard is consumed whether or not the write succeeds.
    fn replace(&self, guard: Self::WriteGuard, value: &[u8]) -> EngineResult<()>;

    /// Begins a write batch, taking the batch writer lock.
    fn begin_batch(&self) -> EngineResult<Self::Batch<'_>>;

    /// Validates persisted structures against the live state.
    ///
    /// Not safe to run concurrently with any other call on the same engine.
    fn check_integrity(&self) -> EngineResult<()>;

    /// Returns the number of live keys.
    fn len(&self) -> usize;

    /// Makes every completed write durable.
    fn flush(&self) -> EngineResult<()>;

    /// Flushes and ends the session. Later calls fail with `Closed`.
    fn close(&self) -> EngineResult<()>;
}

/// A set of mutations staged against an [`Engine`] and applied atomically.
pub trait EngineBatch {
    /// Stages an insert-or-overwrite.
    fn put(&mut self, key: Key<'_>, value: &[u8]) -> EngineResult<()>;

    /// Stages a removal. Fails with `NotFound` if the key is absent from both
    /// the store and this batch.
    fn delete(&mut self, key: Key<'_>) -> EngineResult<()>;

    /// Returns the number of staged operations.
    fn len(&self) -> usize;

    /// Applies every staged operation or none of them, then releases the
    /// batch writer lock.
    fn commit(self) -> EngineResult<()>;

    /// Discards the staged operations and releases the batch writer lock.
    fn abort(self);
}
