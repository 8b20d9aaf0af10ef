//! Performance benchmarks for foldersync
//!
//! Measures a full cycle onto an empty replica, and the steady-state cycle
//! where every file has to be fingerprinted but nothing changes.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use foldersync::{MemorySink, Reconciler};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs;
use std::hint::black_box;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn populate(root: &Path, file_count: usize) {
    let mut rng = StdRng::seed_from_u64(42);
    for i in 0..file_count {
        let dir = root.join(format!("dir_{}", i % 10));
        fs::create_dir_all(&dir).unwrap();
        let size = rng.random_range(100..4096);
        let content: Vec<u8> = (0..size).map(|_| rng.random()).collect();
        fs::write(dir.join(format!("file_{}.bin", i)), content).unwrap();
    }
}

/// Benchmark the first cycle onto an empty replica
fn bench_initial_copy(c: &mut Criterion) {
    let mut group = c.benchmark_group("initial_copy");
    group.measurement_time(Duration::from_secs(2));
    group.sample_size(20);

    for file_count in [10, 100, 500].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(file_count),
            file_count,
            |b, &file_count| {
                let source = TempDir::new().unwrap();
                populate(source.path(), file_count);

                b.iter(|| {
                    let replica = TempDir::new().unwrap();
                    let reconciler =
                        Reconciler::new(source.path(), replica.path(), Arc::new(MemorySink::new()));
                    black_box(reconciler.reconcile().unwrap());
                });
            },
        );
    }
    group.finish();
}

/// Benchmark an unchanged tree, with and without the digest cache
fn bench_steady_state(c: &mut Criterion) {
    let mut group = c.benchmark_group("steady_state");
    group.measurement_time(Duration::from_secs(2));
    group.sample_size(20);

    for (label, cache) in [("hashing", false), ("cached", true)] {
        group.bench_function(label, |b| {
            let source = TempDir::new().unwrap();
            let replica = TempDir::new().unwrap();
            populate(source.path(), 500);

            let reconciler = Reconciler::new(source.path(), replica.path(), Arc::new(MemorySink::new()))
                .with_parallel_workers(num_workers())
                .with_digest_cache(cache);
            reconciler.reconcile().unwrap();

            b.iter(|| black_box(reconciler.reconcile().unwrap()));
        });
    }
    group.finish();
}

fn num_workers() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

criterion_group!(benches, bench_initial_copy, bench_steady_state);
criterion_main!(benches);
