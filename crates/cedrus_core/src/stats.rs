//! Store statistics.
//!
//! Besides operation counters, the store counts every handle and batch it
//! hands out and how each one ended. Misuse that is reported through the log
//! rather than returned (double release, double abort, double close) is
//! counted here too, so tests can assert on it.
//!
//! # Usage
//!
//! ```rust
//! use cedrus_core::{Config, Store};
//!
//! let store = Store::open_in_memory(&Config::default()).unwrap();
//! store.put(b"k", b"v").unwrap();
//! let mut handle = store.get(b"k").unwrap();
//! handle.release();
//! handle.release();
//!
//! let stats = store.stats();
//! assert_eq!(stats.handles_acquired, 1);
//! assert_eq!(stats.handles_released, 1);
//! assert_eq!(stats.double_releases, 1);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters for one store.
///
/// All counters are atomic and monotonically increasing.
#[derive(Debug, Default)]
pub struct StoreStats {
    puts: AtomicU64,
    gets: AtomicU64,
    deletes: AtomicU64,
    replaces: AtomicU64,
    errors: AtomicU64,

    handles_acquired: AtomicU64,
    handles_released: AtomicU64,
    drop_releases: AtomicU64,
    double_releases: AtomicU64,

    batches_begun: AtomicU64,
    batches_committed: AtomicU64,
    batches_aborted: AtomicU64,
    batch_ops_staged: AtomicU64,

    double_closes: AtomicU64,
}

impl StoreStats {
    /// Creates a zeroed stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_put(&self) {
        self.puts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_get(&self) {
        self.gets.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_replace(&self) {
        self.replaces.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_handle_acquired(&self) {
        self.handles_acquired.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a handle release; `on_drop` marks a release done by scope exit.
    pub(crate) fn record_handle_released(&self, on_drop: bool) {
        self.handles_released.fetch_add(1, Ordering::Relaxed);
        if on_drop {
            self.drop_releases.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_double_release(&self) {
        self.double_releases.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_batch_begun(&self) {
        self.batches_begun.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_batch_committed(&self) {
        self.batches_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_batch_aborted(&self) {
        self.batches_aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_batch_op(&self) {
        self.batch_ops_staged.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_double_close(&self) {
        self.double_closes.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of handles still held.
    pub fn handles_outstanding(&self) -> u64 {
        self.handles_acquired
            .load(Ordering::Relaxed)
            .saturating_sub(self.handles_released.load(Ordering::Relaxed))
    }

    /// Returns a snapshot of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            puts: load(&self.puts),
            gets: load(&self.gets),
            deletes: load(&self.deletes),
            replaces: load(&self.replaces),
            errors: load(&self.errors),
            handles_acquired: load(&self.handles_acquired),
            handles_released: load(&self.handles_released),
            drop_releases: load(&self.drop_releases),
            double_releases: load(&self.double_releases),
            batches_begun: load(&self.batches_begun),
            batches_committed: load(&self.batches_committed),
            batches_aborted: load(&self.batches_aborted),
            batch_ops_staged: load(&self.batch_ops_staged),
            double_closes: load(&self.double_closes),
        }
    }
}

/// A point-in-time copy of [`StoreStats`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Successful single puts, either key mode.
    pub puts: u64,
    /// Successful gets, shared or exclusive, either key mode.
    pub gets: u64,
    /// Successful single deletes, either key mode.
    pub deletes: u64,
    /// Successful replaces.
    pub replaces: u64,
    /// Errors returned to callers.
    pub errors: u64,
    /// Handles handed out.
    pub handles_acquired: u64,
    /// Handles released, by any path.
    pub handles_released: u64,
    /// Handles released by scope exit rather than explicitly.
    pub drop_releases: u64,
    /// Release calls on an already released handle.
    pub double_releases: u64,
    /// Write batches created.
    pub batches_begun: u64,
    /// Write batches committed.
    pub batches_committed: u64,
    /// Write batches aborted, explicitly, on error, or on drop.
    pub batches_aborted: u64,
    /// Operations staged across all batches.
    pub batch_ops_staged: u64,
    /// Close calls on an already closed store.
    pub double_closes: u64,
}
