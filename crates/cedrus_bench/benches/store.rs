//! Store operation benchmarks.

use cedrus_bench::{generate_entries, random_data};
use cedrus_core::{Config, Store};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

fn memory_store() -> Store {
    Store::open_in_memory(&Config::default().sync_on_write(false)).unwrap()
}

/// Benchmark single puts.
fn bench_single_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_put");

    for size in [64, 256, 1024, 4096].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let store = memory_store();
            let data = random_data(size);
            let mut i = 0u64;

            b.iter(|| {
                i += 1;
                store.put(&i.to_le_bytes(), black_box(&data)).unwrap();
            });
        });
    }
    group.finish();
}

/// Benchmark the same writes issued one by one and as one batch.
fn bench_batch_vs_single(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_vs_single");

    for count in [10, 100, 1000].iter() {
        let entries = generate_entries(*count, 256);
        group.throughput(Throughput::Elements(*count as u64));

        group.bench_with_input(BenchmarkId::new("single", count), &entries, |b, entries| {
            let store = memory_store();
            b.iter(|| {
                for (key, value) in entries {
                    store.put(key, black_box(value)).unwrap();
                }
            });
        });

        group.bench_with_input(BenchmarkId::new("batch", count), &entries, |b, entries| {
            let store = memory_store();
            b.iter(|| {
                let mut batch = store.new_write_batch().unwrap();
                for (key, value) in entries {
                    batch.put(key, black_box(value)).unwrap();
                }
                batch.commit().unwrap();
            });
        });
    }
    group.finish();
}

/// Benchmark reads through a handle.
fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("get");

    for count in [100, 10_000].iter() {
        let entries = generate_entries(*count, 256);
        let store = memory_store();
        for (key, value) in &entries {
            store.put(key, value).unwrap();
        }

        group.bench_with_input(BenchmarkId::new("raw", count), &entries, |b, entries| {
            let mut i = 0;
            b.iter(|| {
                let (key, _) = &entries[i % entries.len()];
                i += 1;
                let handle = store.get(key).unwrap();
                black_box(handle.bytes());
            });
        });

        let digests: Vec<_> = entries.iter().map(|(k, _)| store.hash_key(k)).collect();
        group.bench_with_input(BenchmarkId::new("by_hash", count), &digests, |b, digests| {
            let mut i = 0;
            b.iter(|| {
                let digest = &digests[i % digests.len()];
                i += 1;
                let handle = store.get_by_hash(digest).unwrap();
                black_box(handle.bytes());
            });
        });
    }
    group.finish();
}

/// Benchmark file-backed puts with and without per-write flush.
fn bench_file_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_put");

    for sync in [false, true] {
        group.bench_function(if sync { "flush_each" } else { "buffered" }, |b| {
            let dir = tempfile::tempdir().unwrap();
            let config = Config::default().sync_on_write(sync);
            let store = Store::open(dir.path(), &config, true).unwrap();
            let data = random_data(256);
            let mut i = 0u64;

            b.iter(|| {
                i += 1;
                store.put(&i.to_le_bytes(), black_box(&data)).unwrap();
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_single_put,
    bench_batch_vs_single,
    bench_get,
    bench_file_put
);
criterion_main!(benches);
