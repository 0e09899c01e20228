//! Criterion benchmarks for the size-bounded probe cache.
//!
//! Measures `get` and `set` latency, including the eviction path, so that a
//! change to size accounting or victim selection shows up as a regression.
//!
//! Run with:
//! ```bash
//! cargo bench --package dms-core --bench cache_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dms_core::{ProbeCache, ProbeKey, ProbeResult};
use serde_json::json;

// ── Fixtures ──────────────────────────────────────────────────────────────────

fn make_key(i: usize) -> ProbeKey {
    ProbeKey::new(format!("/srv/media/library/show-{i:05}.mkv"), 1_700_000_000 + i as u64)
}

fn make_result(i: usize) -> ProbeResult {
    json!({
        "format": {
            "filename": format!("/srv/media/library/show-{i:05}.mkv"),
            "format_name": "matroska,webm",
            "duration": "1432.512000",
            "bit_rate": "4012345"
        },
        "streams": [
            { "index": 0, "codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080 },
            { "index": 1, "codec_type": "audio", "codec_name": "aac", "channels": 2 }
        ]
    })
}

fn filled(capacity: u64, entries: usize) -> ProbeCache {
    let cache = ProbeCache::new(capacity);
    for i in 0..entries {
        cache.set(make_key(i), make_result(i));
    }
    cache
}

// ── Benchmarks ────────────────────────────────────────────────────────────────

/// Benchmarks a cache hit against caches of increasing size.
fn bench_get_hit(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_get_hit");
    for entries in [100usize, 1_000, 10_000] {
        let cache = filled(u64::MAX, entries);
        let key = make_key(entries / 2);
        group.bench_with_input(BenchmarkId::new("entries", entries), &key, |b, key| {
            b.iter(|| cache.get(black_box(key)).expect("key must be cached"))
        });
    }
    group.finish();
}

/// Benchmarks `set` while the cache is well below capacity.
fn bench_set_no_eviction(c: &mut Criterion) {
    let cache = ProbeCache::new(u64::MAX);
    let result = make_result(0);
    let mut i = 0usize;
    c.bench_function("cache_set_no_eviction", |b| {
        b.iter(|| {
            i += 1;
            cache.set(black_box(make_key(i)), black_box(result.clone()));
        })
    });
}

/// Benchmarks `set` on a full cache, where every insertion evicts.
fn bench_set_with_eviction(c: &mut Criterion) {
    // Roughly 500 entries fit; every new key pushes one out.
    let cache = filled(256 * 1024, 2_000);
    let result = make_result(0);
    let mut i = 2_000usize;
    c.bench_function("cache_set_with_eviction", |b| {
        b.iter(|| {
            i += 1;
            cache.set(black_box(make_key(i)), black_box(result.clone()));
        })
    });
}

criterion_group!(
    benches,
    bench_get_hit,
    bench_set_no_eviction,
    bench_set_with_eviction
);
criterion_main!(benches);
