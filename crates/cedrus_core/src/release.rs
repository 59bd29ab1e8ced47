//! Exactly-once release of engine guards.
//!
//! A [`ReleaseSlot`] owns one engine guard until the first release event:
//! an explicit [`release`](ReleaseSlot::release), consumption by a mutating
//! call ([`take`](ReleaseSlot::take)), or drop. Every later release attempt is
//! logged and counted instead of reaching the engine.

use crate::stats::StoreStats;
use std::sync::Arc;
use tracing::{debug, warn};

pub(crate) struct ReleaseSlot<T> {
    inner: Option<T>,
    stats: Arc<StoreStats>,
    what: &'static str,
}

impl<T> ReleaseSlot<T> {
    pub(crate) fn new(inner: T, stats: Arc<StoreStats>, what: &'static str) -> Self {
        stats.record_handle_acquired();
        Self {
            inner: Some(inner),
            stats,
            what,
        }
    }

    pub(crate) fn get(&self) -> Option<&T> {
        if self.inner.is_none() {
            warn!(target: "cedrus::handle", handle = self.what, "access through a released handle");
        }
        self.inner.as_ref()
    }

    /// Hands the guard to a consuming call. Counts as the release.
    pub(crate) fn take(&mut self) -> Option<T> {
        let inner = self.inner.take();
        if inner.is_some() {
            self.stats.record_handle_released(false);
        }
        inner
    }

    pub(crate) fn release(&mut self) {
        match self.inner.take() {
            Some(inner) => {
                drop(inner);
                self.stats.record_handle_released(false);
            }
            None => {
                warn!(target: "cedrus::handle", handle = self.what, "attempt to double release");
                self.stats.record_double_release();
            }
        }
    }

    pub(crate) fn is_released(&self) -> bool {
        self.inner.is_none()
    }

    pub(crate) fn what(&self) -> &'static str {
        self.what
    }
}

impl<T> Drop for ReleaseSlot<T> {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            debug!(target: "cedrus::handle", handle = self.what, "releasing handle at end of scope");
            drop(inner);
            self.stats.record_handle_released(true);
        }
    }
}
