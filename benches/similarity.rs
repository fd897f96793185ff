// Benchmarks for the TF-IDF similarity engine
// Author: kelexine (https://github.com/kelexine)

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use promptcache::cache::compute_hash;
use promptcache::similarity::{find_similar, tokenize, SearchOptions};
use promptcache::storage::CacheEntry;
use std::hint::black_box;
use std::time::Duration;

fn synthetic_corpus(size: usize) -> Vec<(String, CacheEntry)> {
    let topics = [
        "rust", "python", "docker", "postgres", "javascript", "linux", "git", "http",
    ];
    let verbs = ["deploy", "debug", "install", "optimize", "configure", "test"];

    (0..size)
        .map(|i| {
            let prompt = format!(
                "how do i {} {} projects with {} tooling variant {}",
                verbs[i % verbs.len()],
                topics[i % topics.len()],
                topics[(i / 3) % topics.len()],
                i
            );
            (
                compute_hash("default", &prompt),
                CacheEntry::new(prompt.as_str(), "response", "default", None, None, None),
            )
        })
        .collect()
}

fn bench_tokenize(c: &mut Criterion) {
    let text = "How do I configure Docker networking for a multi-container Rust deployment?";
    c.bench_function("tokenize_short_prompt", |b| {
        b.iter(|| tokenize(black_box(text)));
    });
}

fn bench_compute_hash(c: &mut Criterion) {
    c.bench_function("compute_hash", |b| {
        b.iter(|| {
            compute_hash(
                black_box("claude-3-5-sonnet"),
                black_box("explain the borrow checker in one paragraph"),
            )
        });
    });
}

fn bench_find_similar(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_similar");
    let options = SearchOptions {
        threshold: 0.1,
        limit: 10,
    };

    for size in &[10usize, 100, 500] {
        let candidates = synthetic_corpus(*size);
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                find_similar(
                    black_box(&candidates),
                    black_box("how do i debug docker networking"),
                    &options,
                )
            });
        });
    }
    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(2))
        .warm_up_time(Duration::from_millis(500));
    targets = bench_tokenize, bench_compute_hash, bench_find_similar
}
criterion_main!(benches);
