//! Benchmarks for scoring, exact search and the top-k heap.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use quiver_core::distance::{dot_product, euclidean_distance_squared};
use quiver_core::index::TopK;
use quiver_core::{
    BruteForceIndex, Filter, Metric, SearchOptions, VectorBackend, VectorInput, VectorItem,
};
use rand::Rng;
use serde_json::json;

fn generate_random_vector(dim: usize) -> Vec<f32> {
    let mut rng = rand::thread_rng();
    (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

fn build_index(metric: Metric, dim: usize, n: usize) -> BruteForceIndex {
    let mut index = BruteForceIndex::new(metric, dim);
    let items = (0..n)
        .map(|i| {
            VectorItem::new(format!("doc-{}", i), generate_random_vector(dim))
                .with_metadata(json!({ "bucket": i % 10 }))
        })
        .collect();
    index.upsert(items).unwrap();
    index
}

fn bench_scoring(c: &mut Criterion) {
    let mut group = c.benchmark_group("scoring");

    for dim in [128, 384, 768, 1536].iter() {
        let a = generate_random_vector(*dim);
        let b = generate_random_vector(*dim);

        group.throughput(Throughput::Elements(*dim as u64));
        group.bench_with_input(BenchmarkId::new("dot", dim), dim, |bench, _| {
            bench.iter(|| dot_product(black_box(&a), black_box(&b)))
        });
        group.bench_with_input(BenchmarkId::new("l2_squared", dim), dim, |bench, _| {
            bench.iter(|| euclidean_distance_squared(black_box(&a), black_box(&b)))
        });
    }

    group.finish();
}

fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("brute_force_search");
    let dim = 384;

    for n in [1_000, 10_000].iter() {
        let index = build_index(Metric::Cosine, dim, *n);
        let query: VectorInput = generate_random_vector(dim).into();
        let options = SearchOptions::new();

        group.throughput(Throughput::Elements(*n as u64));
        group.bench_with_input(BenchmarkId::new("k10", n), n, |bench, _| {
            bench.iter(|| index.search(black_box(&query), 10, &options).unwrap())
        });
    }

    group.finish();
}

fn bench_filtered_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("filtered_search");
    let dim = 128;
    let index = build_index(Metric::Ip, dim, 10_000);
    let query: VectorInput = generate_random_vector(dim).into();

    let filter = SearchOptions::new().with_filter(Filter::field("bucket").eq(3));
    group.bench_function("where", |bench| {
        bench.iter(|| index.search(black_box(&query), 10, &filter).unwrap())
    });

    let predicate = SearchOptions::new().with_predicate(|id, _| id.ends_with('3'));
    group.bench_function("predicate", |bench| {
        bench.iter(|| index.search(black_box(&query), 10, &predicate).unwrap())
    });

    group.finish();
}

fn bench_top_k(c: &mut Criterion) {
    let mut group = c.benchmark_group("top_k");
    let scores = generate_random_vector(100_000);

    for k in [1, 10, 100].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(k), k, |bench, &k| {
            bench.iter(|| {
                let mut top = TopK::new(k, scores.len());
                for (i, &score) in scores.iter().enumerate() {
                    top.push(score, i);
                }
                top.into_sorted_vec()
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_scoring,
    bench_search,
    bench_filtered_search,
    bench_top_k
);
criterion_main!(benches);
