//! The in-memory slot table and the guards handed out over its slots.
//!
//! Each live key maps to one slot: a reader/writer lock around the value.
//! A slot is present in the table exactly when its value is `Some`, except
//! while a deleter holds the slot's write lock between clearing the value
//! and unmapping the slot. Readers that race such a delete find `None` and
//! report the key as absent.
//!
//! Lock order is slot locks (ascending digest) before the table lock. The
//! table lock is never held while waiting on a slot.

use crate::key::Digest;
use parking_lot::{ArcRwLockReadGuard, ArcRwLockWriteGuard, RawRwLock, RwLock};
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;

/// Contents of one slot.
#[derive(Debug)]
pub(crate) struct Entry {
    pub(crate) digest: Digest,
    pub(crate) value: Option<Vec<u8>>,
}

/// A value behind its per-key lock.
pub(crate) type Slot = RwLock<Entry>;

/// Digest-addressed map of live slots.
#[derive(Debug)]
pub(crate) struct SlotTable {
    pub(crate) map: RwLock<HashMap<Digest, Arc<Slot>>>,
}

impl SlotTable {
    pub(crate) fn new(values: HashMap<Digest, Vec<u8>>, capacity: usize) -> Self {
        let mut map = HashMap::with_capacity(capacity.max(values.len()));
        for (digest, value) in values {
            map.insert(digest.clone(), new_slot(digest, value));
        }
        Self {
            map: RwLock::new(map),
        }
    }

    /// Returns the slot mapped at `digest`, releasing the table lock before
    /// the caller touches the slot.
    pub(crate) fn lookup(&self, digest: &[u8]) -> Option<Arc<Slot>> {
        self.map.read().get(digest).map(Arc::clone)
    }

    pub(crate) fn contains(&self, digest: &[u8]) -> bool {
        self.map.read().contains_key(digest)
    }

    pub(crate) fn len(&self) -> usize {
        self.map.read().len()
    }
}

pub(crate) fn new_slot(digest: Digest, value: Vec<u8>) -> Arc<Slot> {
    Arc::new(RwLock::new(Entry {
        digest,
        value: Some(value),
    }))
}

/// A value held under its slot's shared lock.
///
/// Dropping the guard releases the lock.
pub struct ReadGuard(pub(crate) ArcRwLockReadGuard<RawRwLock, Entry>);

impl Deref for ReadGuard {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.0.value.as_deref().unwrap_or_default()
    }
}

impl std::fmt::Debug for ReadGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadGuard").field("len", &self.len()).finish()
    }
}

/// A value held under its slot's exclusive lock.
///
/// The bytes are read-only through the guard; the engine's `replace`
/// consumes the guard to swap the value.
pub struct WriteGuard(pub(crate) ArcRwLockWriteGuard<RawRwLock, Entry>);

impl WriteGuard {
    /// Returns the digest addressing the held value.
    #[must_use]
    pub fn digest(&self) -> &[u8] {
        &self.0.digest
    }
}

impl Deref for WriteGuard {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.0.value.as_deref().unwrap_or_default()
    }
}

impl std::fmt::Debug for WriteGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteGuard").field("len", &self.len()).finish()
    }
}
