//! An engine wrapper that counts guards and gates commits.
//!
//! [`InstrumentedEngine`] forwards every call to an inner [`Engine`] and
//! records each guard it hands out and each guard that comes back, so a test
//! can assert that the access layer released every lock exactly once. A
//! commit hook runs on the committing thread before the inner commit, which
//! lets a test hold a commit at a known point with a [`CommitGate`].

use cedrus_engine::{Engine, EngineBatch, EngineResult, Key, LogEngine, PutOutcome};
use parking_lot::{Condvar, Mutex, RwLock};
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Callback run before a batch commit reaches the inner engine.
pub type CommitHook = Arc<dyn Fn() + Send + Sync>;

/// Guard and batch counters of an [`InstrumentedEngine`].
#[derive(Debug, Default)]
pub struct EngineCounters {
    read_acquired: AtomicU64,
    read_released: AtomicU64,
    write_acquired: AtomicU64,
    write_released: AtomicU64,
    batches_begun: AtomicU64,
    batches_committed: AtomicU64,
    batches_aborted: AtomicU64,
}

impl EngineCounters {
    /// Returns a snapshot of the counters.
    pub fn snapshot(&self) -> GuardCounts {
        let load = |c: &AtomicU64| c.load(Ordering::SeqCst);
        GuardCounts {
            read_acquired: load(&self.read_acquired),
            read_released: load(&self.read_released),
            write_acquired: load(&self.write_acquired),
            write_released: load(&self.write_released),
            batches_begun: load(&self.batches_begun),
            batches_committed: load(&self.batches_committed),
            batches_aborted: load(&self.batches_aborted),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

/// Point-in-time copy of [`EngineCounters`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GuardCounts {
    /// Shared guards handed out.
    pub read_acquired: u64,
    /// Shared guards returned.
    pub read_released: u64,
    /// Exclusive guards handed out.
    pub write_acquired: u64,
    /// Exclusive guards returned, by drop or by replace.
    pub write_released: u64,
    /// Batches begun.
    pub batches_begun: u64,
    /// Batches committed successfully.
    pub batches_committed: u64,
    /// Batches aborted, or whose commit failed.
    pub batches_aborted: u64,
}

impl GuardCounts {
    /// Returns the number of guards not yet returned.
    pub fn outstanding(&self) -> u64 {
        (self.read_acquired + self.write_acquired)
            .saturating_sub(self.read_released + self.write_released)
    }
}

/// A guard that reports its release to the counters.
pub struct CountedGuard<G> {
    guard: Option<G>,
    released: Arc<EngineCounters>,
    exclusive: bool,
}

impl<G> CountedGuard<G> {
    fn new(guard: G, counters: &Arc<EngineCounters>, exclusive: bool) -> Self {
        EngineCounters::bump(if exclusive {
            &counters.write_acquired
        } else {
            &counters.read_acquired
        });
        Self {
            guard: Some(guard),
            released: Arc::clone(counters),
            exclusive,
        }
    }

    fn into_inner(mut self) -> Option<G> {
        let guard = self.guard.take();
        self.record_release();
        guard
    }

    fn record_release(&self) {
        EngineCounters::bump(if self.exclusive {
            &self.released.write_released
        } else {
            &self.released.read_released
        });
    }
}

impl<G: Deref<Target = [u8]>> Deref for CountedGuard<G> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.guard.as_deref().unwrap_or_default()
    }
}

impl<G> Drop for CountedGuard<G> {
    fn drop(&mut self) {
        if self.guard.take().is_some() {
            self.record_release();
        }
    }
}

/// An [`Engine`] that counts guards and runs a hook before each commit.
pub struct InstrumentedEngine<E = LogEngine> {
    inner: E,
    counters: Arc<EngineCounters>,
    commit_hook: RwLock<Option<CommitHook>>,
}

impl InstrumentedEngine<LogEngine> {
    /// Wraps a fresh in-memory [`LogEngine`].
    ///
    /// # Panics
    ///
    /// Panics if the in-memory engine cannot be opened.
    pub fn in_memory() -> Self {
        let inner = LogEngine::open_in_memory(&cedrus_engine::Config::default())
            .expect("Failed to open in-memory engine");
        Self::new(inner)
    }
}

impl<E: Engine> InstrumentedEngine<E> {
    /// Wraps `inner`.
    pub fn new(inner: E) -> Self {
        Self {
            inner,
            counters: Arc::new(EngineCounters::default()),
            commit_hook: RwLock::new(None),
        }
    }

    /// Returns the shared counters. They stay readable after the engine is
    /// dropped.
    pub fn counters(&self) -> Arc<EngineCounters> {
        Arc::clone(&self.counters)
    }

    /// Installs or clears the commit hook.
    pub fn set_commit_hook(&self, hook: Option<CommitHook>) {
        *self.commit_hook.write() = hook;
    }

    /// Returns the wrapped engine.
    pub fn inner(&self) -> &E {
        &self.inner
    }
}

impl<E: Engine> Engine for InstrumentedEngine<E> {
    type ReadGuard = CountedGuard<E::ReadGuard>;
    type WriteGuard = CountedGuard<E::WriteGuard>;
    type Batch<'a>
        = InstrumentedBatch<'a, E>
    where
        Self: 'a;

    fn put(&self, key: Key<'_>, value: &[u8]) -> EngineResult<PutOutcome> {
        self.inner.put(key, value)
    }

    fn get(&self, key: Key<'_>) -> EngineResult<Self::ReadGuard> {
        let guard = self.inner.get(key)?;
        Ok(CountedGuard::new(guard, &self.counters, false))
    }

    fn get_mut(&self, key: Key<'_>) -> EngineResult<Self::WriteGuard> {
        let guard = self.inner.get_mut(key)?;
        Ok(CountedGuard::new(guard, &self.counters, true))
    }

    fn delete(&self, key: Key<'_>) -> EngineResult<()> {
        self.inner.delete(key)
    }

    fn replace(&self, guard: Self::WriteGuard, value: &[u8]) -> EngineResult<()> {
        match guard.into_inner() {
            Some(inner) => self.inner.replace(inner, value),
            None => Ok(()),
        }
    }

    fn begin_batch(&self) -> EngineResult<Self::Batch<'_>> {
        let inner = self.inner.begin_batch()?;
        EngineCounters::bump(&self.counters.batches_begun);
        Ok(InstrumentedBatch {
            inner,
            engine: self,
        })
    }

    fn check_integrity(&self) -> EngineResult<()> {
        self.inner.check_integrity()
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn flush(&self) -> EngineResult<()> {
        self.inner.flush()
    }

    fn close(&self) -> EngineResult<()> {
        self.inner.close()
    }
}

/// Batch of an [`InstrumentedEngine`].
pub struct InstrumentedBatch<'a, E: Engine + 'a> {
    inner: E::Batch<'a>,
    engine: &'a InstrumentedEngine<E>,
}

impl<'a, E: Engine + 'a> EngineBatch for InstrumentedBatch<'a, E> {
    fn put(&mut self, key: Key<'_>, value: &[u8]) -> EngineResult<()> {
        self.inner.put(key, value)
    }

    fn delete(&mut self, key: Key<'_>) -> EngineResult<()> {
        self.inner.delete(key)
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn commit(self) -> EngineResult<()> {
        let hook = self.engine.commit_hook.read().clone();
        if let Some(hook) = hook {
            hook();
        }
        let counters = &self.engine.counters;
        let result = self.inner.commit();
        EngineCounters::bump(if result.is_ok() {
            &counters.batches_committed
        } else {
            &counters.batches_aborted
        });
        result
    }

    fn abort(self) {
        self.inner.abort();
        EngineCounters::bump(&self.engine.counters.batches_aborted);
    }
}

#[derive(Debug, Default)]
struct GateState {
    arrived: usize,
    open: bool,
}

/// Holds committing threads until the test opens it.
///
/// Install [`hook`](CommitGate::hook) as an engine's commit hook. Each commit
/// then announces its arrival and waits until [`open`](CommitGate::open) is
/// called.
#[derive(Debug, Default)]
pub struct CommitGate {
    state: Mutex<GateState>,
    changed: Condvar,
}

impl CommitGate {
    /// Creates a closed gate.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns a commit hook that passes through this gate.
    pub fn hook(self: &Arc<Self>) -> CommitHook {
        let gate = Arc::clone(self);
        Arc::new(move || gate.pass())
    }

    /// Waits until `count` commits have reached the gate. Returns false on
    /// timeout.
    pub fn wait_arrivals(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.arrived < count {
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                return state.arrived >= count;
            }
        }
        true
    }

    /// Lets every waiting and future commit through.
    pub fn open(&self) {
        self.state.lock().open = true;
        self.changed.notify_all();
    }

    fn pass(&self) {
        let mut state = self.state.lock();
        state.arrived += 1;
        self.changed.notify_all();
        while !state.open {
            self.changed.wait(&mut state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn guards_are_counted_both_ways() {
        let engine = InstrumentedEngine::in_memory();
        engine.put(Key::Raw(b"k"), b"v").unwrap();

        let read = engine.get(Key::Raw(b"k")).unwrap();
        assert_eq!(&*read, b"v");
        assert_eq!(engine.counters().snapshot().outstanding(), 1);
        drop(read);

        let write = engine.get_mut(Key::Raw(b"k")).unwrap();
        engine.replace(write, b"w").unwrap();

        let counts = engine.counters().snapshot();
        assert_eq!(counts.read_acquired, 1);
        assert_eq!(counts.read_released, 1);
        assert_eq!(counts.write_acquired, 1);
        assert_eq!(counts.write_released, 1);
        assert_eq!(counts.outstanding(), 0);
    }

    #[test]
    fn commit_hook_runs_before_commit() {
        let engine = InstrumentedEngine::in_memory();
        let seen = Arc::new(AtomicU64::new(u64::MAX));
        let probe = Arc::clone(&seen);
        engine.set_commit_hook(Some(Arc::new(move || {
            probe.store(0, Ordering::SeqCst);
        })));

        let mut batch = engine.begin_batch().unwrap();
        batch.put(Key::Raw(b"a"), b"1").unwrap();
        batch.commit().unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 0);
        let counts = engine.counters().snapshot();
        assert_eq!(counts.batches_begun, 1);
        assert_eq!(counts.batches_committed, 1);
    }

    #[test]
    fn gate_holds_commit_until_opened() {
        let engine = InstrumentedEngine::in_memory();
        let gate = CommitGate::new();
        engine.set_commit_hook(Some(gate.hook()));

        thread::scope(|s| {
            let committer = s.spawn(|| {
                let mut batch = engine.begin_batch().unwrap();
                batch.put(Key::Raw(b"a"), b"1").unwrap();
                batch.commit()
            });

            assert!(gate.wait_arrivals(1, Duration::from_secs(5)));
            assert!(engine.get(Key::Raw(b"a")).is_err());

            gate.open();
            committer.join().unwrap().unwrap();
        });

        assert_eq!(&*engine.get(Key::Raw(b"a")).unwrap(), b"1");
    }
}
