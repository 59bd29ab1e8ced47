//! Write batch atomicity and commit visibility.

use cedrus_core::{BatchState, Error, ErrorKind};
use cedrus_testkit::{init_test_logging, instrumented_store, CommitGate};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

#[test]
fn staging_failure_applies_nothing() {
    init_test_logging();
    let (store, counters) = instrumented_store();

    let mut batch = store.new_write_batch().unwrap();
    batch.put(b"A", b"1").unwrap();
    let err = batch.delete(b"B").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BatchDelete);
    assert!(err.is_not_found());
    assert_eq!(batch.state(), BatchState::Aborted);
    drop(batch);

    assert!(store.get(b"A").unwrap_err().is_not_found());
    let engine = counters.snapshot();
    assert_eq!(engine.batches_begun, 1);
    assert_eq!(engine.batches_aborted, 1);
    assert_eq!(engine.batches_committed, 0);
}

#[test]
fn reader_never_sees_half_a_batch_while_commit_is_held() {
    let (store, _counters) = instrumented_store();
    let gate = CommitGate::new();
    store.engine().unwrap().set_commit_hook(Some(gate.hook()));

    thread::scope(|s| {
        let writer = s.spawn(|| {
            let mut batch = store.new_write_batch().unwrap();
            batch.put(b"A", b"1").unwrap();
            batch.put(b"B", b"2").unwrap();
            batch.commit()
        });

        assert!(gate.wait_arrivals(1, Duration::from_secs(5)));
        assert!(store.get(b"A").unwrap_err().is_not_found());
        assert!(store.get(b"B").unwrap_err().is_not_found());

        gate.open();
        writer.join().unwrap().unwrap();
    });

    assert_eq!(store.get(b"A").unwrap().bytes(), Some(&b"1"[..]));
    assert_eq!(store.get(b"B").unwrap().bytes(), Some(&b"2"[..]));
}

#[test]
fn concurrent_reader_sees_batches_whole() {
    let (store, _counters) = instrumented_store();
    store.put(b"A", &0u32.to_le_bytes()).unwrap();
    store.put(b"B", &0u32.to_le_bytes()).unwrap();
    let done = AtomicBool::new(false);

    thread::scope(|s| {
        s.spawn(|| {
            for i in 1..=200u32 {
                let mut batch = store.new_write_batch().unwrap();
                batch.put(b"A", &i.to_le_bytes()).unwrap();
                batch.put(b"B", &i.to_le_bytes()).unwrap();
                batch.commit().unwrap();
            }
            done.store(true, Ordering::SeqCst);
        });

        // Commits lock keys in digest order; the reader must too or the two
        // deadlock.
        let (first, second) = if store.hash_key(b"A") < store.hash_key(b"B") {
            (&b"A"[..], &b"B"[..])
        } else {
            (&b"B"[..], &b"A"[..])
        };
        while !done.load(Ordering::SeqCst) {
            // Holding the first shared lock keeps every commit out, so the
            // second value must come from the same batch.
            let x = store.get(first).unwrap();
            let y = store.get(second).unwrap();
            assert_eq!(x.bytes(), y.bytes());
        }
    });
}

#[test]
fn second_batch_on_the_same_thread_is_reported() {
    let (store, counters) = instrumented_store();
    let mut first = store.new_write_batch().unwrap();
    first.put(b"A", b"1").unwrap();

    let err = store.new_write_batch().unwrap_err();
    assert!(matches!(err, Error::BatchInProgress));
    assert_eq!(counters.snapshot().batches_begun, 1);

    first.commit().unwrap();
    drop(first);
    let mut second = store.new_write_batch().unwrap();
    second.delete(b"A").unwrap();
    second.commit().unwrap();
    assert!(store.is_empty());
}

#[test]
fn other_threads_wait_for_the_open_batch() {
    let (store, _counters) = instrumented_store();
    let mut batch = store.new_write_batch().unwrap();
    batch.put(b"A", b"1").unwrap();
    let finished = AtomicBool::new(false);

    thread::scope(|s| {
        s.spawn(|| {
            let mut other = store.new_write_batch().unwrap();
            other.put(b"B", b"2").unwrap();
            other.commit().unwrap();
            finished.store(true, Ordering::SeqCst);
        });

        thread::sleep(Duration::from_millis(50));
        assert!(!finished.load(Ordering::SeqCst));
        batch.commit().unwrap();
    });

    assert!(finished.load(Ordering::SeqCst));
    assert_eq!(store.len(), 2);
}

#[test]
fn calls_on_a_committed_batch_are_rejected() {
    let (store, _counters) = instrumented_store();
    let mut batch = store.new_write_batch().unwrap();
    batch.put_by_hash(&store.hash_key(b"A"), b"1").unwrap();
    batch.commit().unwrap();

    let err = batch.delete_by_hash(&store.hash_key(b"A")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BatchDeleteByHash);
    assert!(!err.is_not_found());
    assert!(batch.commit().is_err());

    batch.abort();
    assert_eq!(batch.state(), BatchState::Committed);
    assert_eq!(store.stats().double_releases, 1);
    drop(batch);
    assert_eq!(store.get(b"A").unwrap().bytes(), Some(&b"1"[..]));
}
