//! Shaper encode/decode roundtrip benchmark.
//!
//! Measures `to_shaped`/`from_shaped` cost for documents of varying width,
//! and the effect of shape reuse (same structural shape across many
//! documents) vs. one fresh shape per document.
//!
//! Run: cargo bench --bench shaper_roundtrip

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use vocore::shaper::Shaper;

fn wide_document(fields: usize) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for i in 0..fields {
        map.insert(format!("field_{i}"), json!(i));
    }
    serde_json::Value::Object(map)
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("to_shaped_by_width");
    for fields in [4usize, 32, 128] {
        let doc = wide_document(fields);
        group.bench_with_input(BenchmarkId::from_parameter(fields), &doc, |b, doc| {
            b.iter(|| {
                let mut shaper = Shaper::new();
                black_box(shaper.to_shaped(doc).unwrap());
            });
        });
    }
    group.finish();
}

fn bench_encode_with_shape_reuse(c: &mut Criterion) {
    let doc_shape_a = json!({"name": "x", "age": 1});
    let doc_shape_b = json!({"name": "y", "age": 2});

    c.bench_function("to_shaped_reusing_one_shape_x1000", |b| {
        b.iter(|| {
            let mut shaper = Shaper::new();
            for _ in 0..1000 {
                black_box(shaper.to_shaped(&doc_shape_a).unwrap());
            }
        });
    });

    c.bench_function("to_shaped_alternating_two_shapes_x1000", |b| {
        b.iter(|| {
            let mut shaper = Shaper::new();
            for i in 0..1000 {
                let doc = if i % 2 == 0 { &doc_shape_a } else { &doc_shape_b };
                black_box(shaper.to_shaped(doc).unwrap());
            }
        });
    });
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("from_shaped_by_width");
    for fields in [4usize, 32, 128] {
        let doc = wide_document(fields);
        let mut shaper = Shaper::new();
        let (shape_id, body) = shaper.to_shaped(&doc).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(fields), &(shape_id, body), |b, (shape_id, body)| {
            b.iter(|| {
                black_box(shaper.from_shaped(*shape_id, body).unwrap());
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_encode, bench_encode_with_shape_reuse, bench_decode);
criterion_main!(benches);
