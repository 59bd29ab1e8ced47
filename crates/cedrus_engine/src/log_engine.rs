//! The journal-backed engine.

use crate::config::Config;
use crate::dir::StoreDir;
use crate::engine::{Engine, EngineBatch, PutOutcome};
use crate::error::{EngineError, EngineResult};
use crate::journal::{Journal, Op, Record};
use crate::key::{Digest, Key};
use crate::table::{new_slot, ReadGuard, SlotTable, WriteGuard};
use cedrus_storage::{FileBackend, InMemoryBackend, StorageBackend};
use parking_lot::{ArcRwLockWriteGuard, Mutex, MutexGuard, RawRwLock};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// An engine that keeps every live value in memory and journals each
/// mutation to a storage backend.
///
/// Opening replays the journal. A torn record at the end (an interrupted
/// append) is cut off; any other damage fails the open.
///
/// # Example
///
/// ```rust
/// use cedrus_engine::{Config, Engine, Key, LogEngine, PutOutcome};
///
/// let engine = LogEngine::open_in_memory(&Config::default()).unwrap();
/// assert_eq!(engine.put(Key::Raw(b"k"), b"v").unwrap(), PutOutcome::Inserted);
/// assert_eq!(&*engine.get(Key::Raw(b"k")).unwrap(), b"v");
/// ```
pub struct LogEngine {
    dir: Option<StoreDir>,
    journal: Journal,
    table: SlotTable,
    batch_writer: Mutex<()>,
    closed: AtomicBool,
}

impl LogEngine {
    /// Opens or creates the store directory at `path`.
    ///
    /// With `truncate` set, existing contents are destroyed.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidPath`] if `path` cannot hold a store
    /// - [`EngineError::Locked`] if another session has it open
    /// - [`EngineError::Corrupted`] if the journal is damaged
    /// - storage and I/O errors
    pub fn open(path: &Path, config: &Config, truncate: bool) -> EngineResult<Self> {
        let dir = StoreDir::open(path, config.create_if_missing)?;
        let backend = FileBackend::open(&dir.journal_path(), truncate)?;
        info!(
            target: "cedrus::engine",
            path = %path.display(),
            truncate,
            "opening store"
        );
        let mut engine = Self::with_backend(Box::new(backend), config)?;
        engine.dir = Some(dir);
        Ok(engine)
    }

    /// Opens a fresh store that lives only in memory.
    pub fn open_in_memory(config: &Config) -> EngineResult<Self> {
        Self::with_backend(Box::new(InMemoryBackend::new()), config)
    }

    /// Opens a store over an existing journal backend, replaying it.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Corrupted`] if the journal is damaged anywhere
    /// but a torn final record.
    pub fn with_backend(backend: Box<dyn StorageBackend>, config: &Config) -> EngineResult<Self> {
        let journal = Journal::new(backend, config.sync_on_write);
        let values = recover(&journal)?;
        debug!(target: "cedrus::engine", keys = values.len(), "journal replayed");

        Ok(Self {
            dir: None,
            journal,
            table: SlotTable::new(values, config.initial_capacity),
            batch_writer: Mutex::new(()),
            closed: AtomicBool::new(false),
        })
    }

    /// Returns the store directory, or `None` for an in-memory store.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_ref().map(StoreDir::path)
    }

    fn ensure_open(&self) -> EngineResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(EngineError::Closed)
        } else {
            Ok(())
        }
    }

    /// Applies a batch's operations under every touched slot's write lock
    /// and the table lock, so the whole batch becomes visible at once.
    fn apply_batch(&self, record: Record) -> EngineResult<()> {
        if record.ops().is_empty() {
            return Ok(());
        }
        let touched: BTreeSet<&[u8]> = record.ops().iter().map(Op::digest).collect();

        loop {
            let slots: Vec<_> = {
                let map = self.table.map.read();
                touched
                    .iter()
                    .filter_map(|d| map.get(*d).map(|slot| (*d, Arc::clone(slot))))
                    .collect()
            };
            // Ascending digest order.
            let mut guards: HashMap<&[u8], ArcRwLockWriteGuard<RawRwLock, _>> = slots
                .iter()
                .map(|(d, slot)| (*d, slot.write_arc()))
                .collect();
            let mut map = self.table.map.write();

            let coherent = touched.iter().all(|d| match (map.get(*d), guards.get(d)) {
                (Some(live), Some(guard)) => {
                    Arc::ptr_eq(live, ArcRwLockWriteGuard::rwlock(guard))
                }
                (None, None) => true,
                _ => false,
            });
            if !coherent {
                // A single-shot put or delete moved a touched key between
                // the lookup and the lock.
                drop(map);
                drop(guards);
                continue;
            }

            let mut present: HashMap<&[u8], bool> =
                touched.iter().map(|d| (*d, guards.contains_key(d))).collect();
            for op in record.ops() {
                let d = op.digest();
                match op {
                    Op::Put { .. } => {
                        present.insert(d, true);
                    }
                    Op::Delete { .. } => {
                        if !present.get(&d).copied().unwrap_or(false) {
                            return Err(EngineError::NotFound);
                        }
                        present.insert(d, false);
                    }
                }
            }

            self.journal.append(&record)?;

            let mut fresh: HashMap<&[u8], Option<&Vec<u8>>> = HashMap::new();
            for op in record.ops() {
                let d = op.digest();
                let value = match op {
                    Op::Put { value, .. } => Some(value),
                    Op::Delete { .. } => None,
                };
                match guards.get_mut(&d) {
                    Some(guard) => guard.value = value.cloned(),
                    None => {
                        fresh.insert(d, value);
                    }
                }
            }
            for (d, guard) in &guards {
                if guard.value.is_none() {
                    map.remove(*d);
                }
            }
            for (d, value) in fresh {
                if let Some(value) = value {
                    map.insert(d.into(), new_slot(d.into(), value.clone()));
                }
            }
            return Ok(());
        }
    }
}

/// Replays the journal into a digest → value map, cutting a torn tail.
fn recover(journal: &Journal) -> EngineResult<HashMap<Digest, Vec<u8>>> {
    let scan = journal.scan()?;
    if scan.torn_bytes > 0 {
        warn!(
            target: "cedrus::engine",
            offset = scan.valid_len,
            bytes = scan.torn_bytes,
            "discarding torn record at end of journal"
        );
        journal.shrink_to(scan.valid_len)?;
    }
    Ok(replay(scan.records.iter().map(|(_, record)| record)))
}

fn replay<'a>(records: impl Iterator<Item = &'a Record>) -> HashMap<Digest, Vec<u8>> {
    let mut values = HashMap::new();
    for record in records {
        for op in record.ops() {
            match op {
                Op::Put { digest, value } => {
                    values.insert(digest.clone(), value.clone());
                }
                Op::Delete { digest } => {
                    values.remove(digest);
                }
            }
        }
    }
    values
}

impl Engine for LogEngine {
    type ReadGuard = ReadGuard;
    type WriteGuard = WriteGuard;
    type Batch<'a> = LogBatch<'a>;

    fn put(&self, key: Key<'_>, value: &[u8]) -> EngineResult<PutOutcome> {
        self.ensure_open()?;
        let digest = key.digest();
        let record = Record::Single(Op::Put {
            digest: Digest::from(&*digest),
            value: value.to_vec(),
        });

        loop {
            if let Some(slot) = self.table.lookup(&digest) {
                let mut entry = slot.write();
                if entry.value.is_none() {
                    // Deleted while we waited for the lock.
                    continue;
                }
                self.journal.append(&record)?;
                entry.value = Some(value.to_vec());
                return Ok(PutOutcome::Updated);
            }

            let mut map = self.table.map.write();
            if map.contains_key(&*digest) {
                continue;
            }
            self.journal.append(&record)?;
            map.insert(
                Digest::from(&*digest),
                new_slot(Digest::from(&*digest), value.to_vec()),
            );
            return Ok(PutOutcome::Inserted);
        }
    }

    fn get(&self, key: Key<'_>) -> EngineResult<ReadGuard> {
        self.ensure_open()?;
        let slot = self
            .table
            .lookup(&key.digest())
            .ok_or(EngineError::NotFound)?;
        let guard = slot.read_arc();
        if guard.value.is_none() {
            return Err(EngineError::NotFound);
        }
        Ok(ReadGuard(guard))
    }

    fn get_mut(&self, key: Key<'_>) -> EngineResult<WriteGuard> {
        self.ensure_open()?;
        let slot = self
            .table
            .lookup(&key.digest())
            .ok_or(EngineError::NotFound)?;
        let guard = slot.write_arc();
        if guard.value.is_none() {
            return Err(EngineError::NotFound);
        }
        Ok(WriteGuard(guard))
    }

    fn delete(&self, key: Key<'_>) -> EngineResult<()> {
        self.ensure_open()?;
        let digest = key.digest();
        let slot = self.table.lookup(&digest).ok_or(EngineError::NotFound)?;
        let mut entry = slot.write();
        if entry.value.is_none() {
            return Err(EngineError::NotFound);
        }
        self.journal.append(&Record::Single(Op::Delete {
            digest: Digest::from(&*digest),
        }))?;
        entry.value = None;
        self.table.map.write().remove(&*digest);
        Ok(())
    }

    fn replace(&self, mut guard: WriteGuard, value: &[u8]) -> EngineResult<()> {
        self.ensure_open()?;
        self.journal.append(&Record::Single(Op::Put {
            digest: guard.0.digest.clone(),
            value: value.to_vec(),
        }))?;
        guard.0.value = Some(value.to_vec());
        Ok(())
    }

    fn begin_batch(&self) -> EngineResult<LogBatch<'_>> {
        self.ensure_open()?;
        let writer = self.batch_writer.lock();
        Ok(LogBatch {
            engine: self,
            _writer: writer,
            ops: Vec::new(),
            staged: HashMap::new(),
        })
    }

    fn check_integrity(&self) -> EngineResult<()> {
        self.ensure_open()?;
        let scan = self.journal.scan()?;
        if scan.torn_bytes > 0 {
            return Err(EngineError::corrupted(
                scan.valid_len,
                format!("incomplete record of {} bytes", scan.torn_bytes),
            ));
        }
        let expected = replay(scan.records.iter().map(|(_, record)| record));

        let map = self.table.map.read();
        if map.len() != expected.len() {
            return Err(EngineError::mismatch(format!(
                "{} live keys, journal replays to {}",
                map.len(),
                expected.len()
            )));
        }
        for (digest, slot) in map.iter() {
            let entry = slot
                .try_read()
                .ok_or_else(|| EngineError::busy("slot write-locked during integrity check"))?;
            let live = entry
                .value
                .as_ref()
                .ok_or_else(|| EngineError::mismatch("mapped slot holds no value"))?;
            if expected.get(digest) != Some(live) {
                return Err(EngineError::mismatch(
                    "live value differs from journal replay",
                ));
            }
        }
        debug!(target: "cedrus::engine", keys = map.len(), "integrity check passed");
        Ok(())
    }

    fn len(&self) -> usize {
        self.table.len()
    }

    fn flush(&self) -> EngineResult<()> {
        self.ensure_open()?;
        self.journal.sync()
    }

    fn close(&self) -> EngineResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.journal.sync()
    }
}

impl std::fmt::Debug for LogEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogEngine")
            .field("path", &self.path())
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// A write batch on a [`LogEngine`].
///
/// Holds the engine's batch writer lock from creation until it is committed,
/// aborted or dropped.
pub struct LogBatch<'a> {
    engine: &'a LogEngine,
    _writer: MutexGuard<'a, ()>,
    ops: Vec<Op>,
    /// Presence of each touched key after the ops staged so far.
    staged: HashMap<Digest, bool>,
}

impl EngineBatch for LogBatch<'_> {
    fn put(&mut self, key: Key<'_>, value: &[u8]) -> EngineResult<()> {
        let digest: Digest = key.digest().into_owned().into_boxed_slice();
        self.ops.push(Op::Put {
            digest: digest.clone(),
            value: value.to_vec(),
        });
        self.staged.insert(digest, true);
        Ok(())
    }

    fn delete(&mut self, key: Key<'_>) -> EngineResult<()> {
        let digest: Digest = key.digest().into_owned().into_boxed_slice();
        let present = match self.staged.get(&digest) {
            Some(present) => *present,
            None => self.engine.table.contains(&digest),
        };
        if !present {
            return Err(EngineError::NotFound);
        }
        self.ops.push(Op::Delete {
            digest: digest.clone(),
        });
        self.staged.insert(digest, false);
        Ok(())
    }

    fn len(&self) -> usize {
        self.ops.len()
    }

    fn commit(self) -> EngineResult<()> {
        self.engine.ensure_open()?;
        let count = self.ops.len();
        self.engine.apply_batch(Record::Batch(self.ops))?;
        debug!(target: "cedrus::engine", ops = count, "batch committed");
        Ok(())
    }

    fn abort(self) {
        debug!(target: "cedrus::engine", ops = self.ops.len(), "batch aborted");
    }
}

impl std::fmt::Debug for LogBatch<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogBatch")
            .field("ops", &self.ops.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::hash_key;
    use tempfile::tempdir;

    fn engine() -> LogEngine {
        LogEngine::open_in_memory(&Config::default()).unwrap()
    }

    #[test]
    fn put_reports_insert_then_update() {
        let engine = engine();
        assert_eq!(
            engine.put(Key::Raw(b"k"), b"1").unwrap(),
            PutOutcome::Inserted
        );
        assert_eq!(
            engine.put(Key::Raw(b"k"), b"2").unwrap(),
            PutOutcome::Updated
        );
        assert_eq!(&*engine.get(Key::Raw(b"k")).unwrap(), b"2");
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn empty_key_and_value_are_ordinary() {
        let engine = engine();
        engine.put(Key::Raw(b""), b"").unwrap();
        assert!(engine.get(Key::Raw(b"")).unwrap().is_empty());
        engine.delete(Key::Raw(b"")).unwrap();
    }

    #[test]
    fn delete_missing_key_is_not_found() {
        let engine = engine();
        assert!(engine.delete(Key::Raw(b"absent")).unwrap_err().is_not_found());
        assert!(engine.get(Key::Raw(b"absent")).unwrap_err().is_not_found());
        assert!(engine
            .get_mut(Key::Raw(b"absent"))
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn hashed_key_addresses_raw_key() {
        let engine = engine();
        engine.put(Key::Raw(b"k"), b"v").unwrap();
        let digest = hash_key(b"k");
        assert_eq!(&*engine.get(Key::Hashed(&digest)).unwrap(), b"v");
    }

    #[test]
    fn write_guard_blocks_readers_until_replaced() {
        let engine = engine();
        engine.put(Key::Raw(b"k"), b"old").unwrap();

        let guard = engine.get_mut(Key::Raw(b"k")).unwrap();
        let slot = engine.table.lookup(&hash_key(b"k")).unwrap();
        assert!(slot.try_read().is_none());

        engine.replace(guard, b"new").unwrap();
        assert!(slot.try_read().is_some());
        assert_eq!(&*engine.get(Key::Raw(b"k")).unwrap(), b"new");
    }

    #[test]
    fn batch_stages_against_its_own_ops() {
        let engine = engine();
        let mut batch = engine.begin_batch().unwrap();
        batch.put(Key::Raw(b"a"), b"1").unwrap();
        batch.delete(Key::Raw(b"a")).unwrap();
        assert!(batch.delete(Key::Raw(b"a")).unwrap_err().is_not_found());
        assert_eq!(batch.len(), 2);
        batch.commit().unwrap();
        assert_eq!(engine.len(), 0);
    }

    #[test]
    fn batch_commit_applies_all_ops() {
        let engine = engine();
        engine.put(Key::Raw(b"gone"), b"x").unwrap();

        let mut batch = engine.begin_batch().unwrap();
        batch.put(Key::Raw(b"a"), b"1").unwrap();
        batch.put(Key::Raw(b"b"), b"2").unwrap();
        batch.delete(Key::Raw(b"gone")).unwrap();
        batch.commit().unwrap();

        assert_eq!(&*engine.get(Key::Raw(b"a")).unwrap(), b"1");
        assert_eq!(&*engine.get(Key::Raw(b"b")).unwrap(), b"2");
        assert!(engine.get(Key::Raw(b"gone")).is_err());
        engine.check_integrity().unwrap();
    }

    #[test]
    fn commit_fails_whole_batch_when_staged_delete_went_stale() {
        let engine = engine();
        engine.put(Key::Raw(b"b"), b"x").unwrap();

        let mut batch = engine.begin_batch().unwrap();
        batch.put(Key::Raw(b"a"), b"1").unwrap();
        batch.delete(Key::Raw(b"b")).unwrap();
        engine.delete(Key::Raw(b"b")).unwrap();

        assert!(batch.commit().unwrap_err().is_not_found());
        assert!(engine.get(Key::Raw(b"a")).is_err());
        engine.check_integrity().unwrap();
    }

    #[test]
    fn aborted_batch_leaves_no_trace() {
        let engine = engine();
        let mut batch = engine.begin_batch().unwrap();
        batch.put(Key::Raw(b"a"), b"1").unwrap();
        batch.abort();

        assert_eq!(engine.len(), 0);
        assert!(engine.begin_batch().is_ok());
    }

    #[test]
    fn closed_engine_rejects_calls() {
        let engine = engine();
        engine.close().unwrap();
        engine.close().unwrap();
        assert!(matches!(
            engine.put(Key::Raw(b"k"), b"v"),
            Err(EngineError::Closed)
        ));
        assert!(matches!(engine.begin_batch(), Err(EngineError::Closed)));
    }

    #[test]
    fn reopen_replays_journal() {
        let dir = tempdir().unwrap();
        {
            let engine = LogEngine::open(dir.path(), &Config::default(), false).unwrap();
            engine.put(Key::Raw(b"a"), b"1").unwrap();
            engine.put(Key::Raw(b"b"), b"2").unwrap();
            engine.delete(Key::Raw(b"a")).unwrap();
            let mut batch = engine.begin_batch().unwrap();
            batch.put(Key::Raw(b"c"), b"3").unwrap();
            batch.commit().unwrap();
            engine.close().unwrap();
        }

        let engine = LogEngine::open(dir.path(), &Config::default(), false).unwrap();
        assert_eq!(engine.path(), Some(dir.path()));
        assert_eq!(engine.len(), 2);
        assert!(engine.get(Key::Raw(b"a")).is_err());
        assert_eq!(&*engine.get(Key::Raw(b"c")).unwrap(), b"3");
        engine.check_integrity().unwrap();
    }

    #[test]
    fn truncate_on_open_discards_contents() {
        let dir = tempdir().unwrap();
        {
            let engine = LogEngine::open(dir.path(), &Config::default(), false).unwrap();
            engine.put(Key::Raw(b"a"), b"1").unwrap();
        }
        let engine = LogEngine::open(dir.path(), &Config::default(), true).unwrap();
        assert_eq!(engine.len(), 0);
    }

    #[test]
    fn torn_tail_is_cut_on_open() {
        let backend = InMemoryBackend::new();
        {
            let engine =
                LogEngine::with_backend(Box::new(backend.clone()), &Config::default()).unwrap();
            engine.put(Key::Raw(b"a"), b"1").unwrap();
            engine.put(Key::Raw(b"b"), b"2").unwrap();
        }
        backend.modify(|buf| {
            let len = buf.len();
            buf.truncate(len - 2);
        });

        let engine =
            LogEngine::with_backend(Box::new(backend.clone()), &Config::default()).unwrap();
        assert_eq!(engine.len(), 1);
        engine.check_integrity().unwrap();
    }

    #[test]
    fn integrity_check_detects_bit_rot() {
        let backend = InMemoryBackend::new();
        let engine =
            LogEngine::with_backend(Box::new(backend.clone()), &Config::default()).unwrap();
        engine.put(Key::Raw(b"a"), b"value").unwrap();
        engine.check_integrity().unwrap();

        backend.modify(|buf| {
            let last = buf.len() - 6;
            buf[last] ^= 0xFF;
        });
        assert!(matches!(
            engine.check_integrity(),
            Err(EngineError::Corrupted { .. })
        ));
    }

    #[test]
    fn integrity_check_reports_held_write_lock() {
        let engine = engine();
        engine.put(Key::Raw(b"a"), b"1").unwrap();
        let _guard = engine.get_mut(Key::Raw(b"a")).unwrap();
        assert!(matches!(
            engine.check_integrity(),
            Err(EngineError::Busy { .. })
        ));
    }
}
