//! Datafile write throughput benchmark.
//!
//! Measures the cost of inserting documents into a collection as the
//! collection grows, the way `reanalysis_cost.rs` varies node count to
//! observe how a fixed-size operation scales with existing data volume.
//!
//! Run: cargo bench --bench datafile_throughput

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tempfile::TempDir;
use vocore::collection::{Collection, CollectionKind, CollectionParameters};
use vocore::tick::TickGenerator;

fn make_collection(existing_docs: usize) -> (TempDir, Collection, TickGenerator) {
    let dir = TempDir::new().unwrap();
    let col = Collection::create(
        dir.path(),
        CollectionParameters {
            cid: 1,
            name: "bench".to_string(),
            kind: CollectionKind::Document,
            wait_for_sync: false,
            maximal_size: 32 << 20,
        },
    )
    .unwrap();
    let ticks = TickGenerator::new();
    for i in 0..existing_docs {
        col.insert(
            &ticks,
            Some(format!("k{i}")),
            &serde_json::json!({"idx": i, "payload": "x".repeat(64)}),
            false,
            None,
        )
        .unwrap();
    }
    (dir, col, ticks)
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert_into_existing_collection");
    for existing in [0usize, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(existing), &existing, |b, &existing| {
            b.iter_batched(
                || make_collection(existing),
                |(dir, col, ticks)| {
                    col.insert(
                        &ticks,
                        Some("new-key".to_string()),
                        black_box(&serde_json::json!({"idx": existing, "payload": "y".repeat(64)})),
                        false,
                        None,
                    )
                    .unwrap();
                    drop(dir);
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("read_from_existing_collection");
    for existing in [100usize, 10_000] {
        let (dir, col, _ticks) = make_collection(existing);
        group.bench_with_input(BenchmarkId::from_parameter(existing), &existing, |b, _| {
            b.iter(|| {
                let _ = col.read(black_box("k0")).unwrap();
            });
        });
        drop(dir);
    }
    group.finish();
}

criterion_group!(benches, bench_insert, bench_read);
criterion_main!(benches);
