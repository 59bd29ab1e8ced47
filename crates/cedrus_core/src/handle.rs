//! Handles over stored values.
//!
//! A handle holds the engine's lock on one value: [`ReadHandle`] the shared
//! lock, [`WriteHandle`] the exclusive one. The lock is held until the handle
//! is released, consumed by [`Store::replace`](crate::Store::replace), or
//! dropped. Handles are tied to the acquiring thread.

use crate::release::ReleaseSlot;
use crate::stats::StoreStats;
use cedrus_engine::{Engine, LogEngine};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// A borrowed view of a handle's bytes.
///
/// Has no release operation and cannot outlive the handle it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueView<'h> {
    bytes: &'h [u8],
}

impl<'h> ValueView<'h> {
    /// Returns the viewed bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &'h [u8] {
        self.bytes
    }
}

impl Deref for ValueView<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.bytes
    }
}

impl AsRef<[u8]> for ValueView<'_> {
    fn as_ref(&self) -> &[u8] {
        self.bytes
    }
}

/// A value held under its shared lock.
///
/// Any number of read handles on one key may be alive at once; a writer on
/// that key blocks until all are released.
pub struct ReadHandle<E: Engine = LogEngine> {
    slot: ReleaseSlot<E::ReadGuard>,
}

impl<E: Engine> ReadHandle<E> {
    pub(crate) fn new(guard: E::ReadGuard, stats: Arc<StoreStats>) -> Self {
        Self {
            slot: ReleaseSlot::new(guard, stats, "read"),
        }
    }

    /// Returns the value bytes, or `None` once released.
    #[must_use]
    pub fn bytes(&self) -> Option<&[u8]> {
        self.slot.get().map(|guard| &**guard)
    }

    /// Returns a borrowed view of the value, or `None` once released.
    #[must_use]
    pub fn view(&self) -> Option<ValueView<'_>> {
        self.bytes().map(|bytes| ValueView { bytes })
    }

    /// Releases the lock. Calling this again is logged and ignored.
    pub fn release(&mut self) {
        self.slot.release();
    }

    /// Returns true once the lock has been released.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.slot.is_released()
    }
}

impl<E: Engine> fmt::Debug for ReadHandle<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        debug_handle(f, "ReadHandle", &self.slot)
    }
}

/// A value held under its exclusive lock.
///
/// The bytes are read-only here; overwrite them with
/// [`Store::replace`](crate::Store::replace), which consumes the handle.
pub struct WriteHandle<E: Engine = LogEngine> {
    slot: ReleaseSlot<E::WriteGuard>,
}

impl<E: Engine> WriteHandle<E> {
    pub(crate) fn new(guard: E::WriteGuard, stats: Arc<StoreStats>) -> Self {
        Self {
            slot: ReleaseSlot::new(guard, stats, "write"),
        }
    }

    /// Returns the value bytes, or `None` once released.
    #[must_use]
    pub fn bytes(&self) -> Option<&[u8]> {
        self.slot.get().map(|guard| &**guard)
    }

    /// Returns a borrowed view of the value, or `None` once released.
    #[must_use]
    pub fn view(&self) -> Option<ValueView<'_>> {
        self.bytes().map(|bytes| ValueView { bytes })
    }

    /// Releases the lock without writing. Calling this again is logged and
    /// ignored.
    pub fn release(&mut self) {
        self.slot.release();
    }

    /// Returns true once the lock has been released or consumed.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.slot.is_released()
    }

    pub(crate) fn take_guard(&mut self) -> Option<E::WriteGuard> {
        self.slot.take()
    }
}

impl<E: Engine> fmt::Debug for WriteHandle<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        debug_handle(f, "WriteHandle", &self.slot)
    }
}

fn debug_handle<T: Deref<Target = [u8]>>(
    f: &mut fmt::Formatter<'_>,
    name: &str,
    slot: &ReleaseSlot<T>,
) -> fmt::Result {
    let mut s = f.debug_struct(name);
    s.field("lock", &slot.what());
    if slot.is_released() {
        s.field("released", &true);
    } else {
        s.field("len", &slot.get().map_or(0, |guard| guard.len()));
    }
    s.finish()
}
