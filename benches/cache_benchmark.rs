use std::sync::Arc;
use std::thread;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::{seq::SliceRandom, thread_rng, Rng};
use serde_json::json;

use amadeus_hotels_mcp::ResponseCache;

fn keys(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("search_hotels_by_location:{{\"latitude\":{i}}}"))
        .collect()
}

fn single_thread_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("response_cache");

    for capacity in [100usize, 1_000, 10_000] {
        group.bench_with_input(
            BenchmarkId::new("mixed_ops", capacity),
            &capacity,
            |b, &capacity| {
                let cache = ResponseCache::new(capacity, Duration::from_secs(300));
                // Key space deliberately exceeds capacity to exercise eviction.
                let keys = keys(capacity * 2);
                let payload = json!({ "hotels": [], "total_count": 0 });
                let mut rng = thread_rng();
                b.iter(|| {
                    let key = keys.choose(&mut rng).unwrap();
                    if rng.gen_bool(0.3) {
                        cache.put(key.clone(), payload.clone());
                    } else {
                        black_box(cache.get(key));
                    }
                });
            },
        );
    }

    group.finish();
}

fn contention_benchmark(c: &mut Criterion) {
    c.bench_function("response_cache/4_threads_contended", |b| {
        b.iter(|| {
            let cache = Arc::new(ResponseCache::new(1_000, Duration::from_secs(300)));
            let keys = Arc::new(keys(1_500));
            let payload = json!({ "hotels": [], "total_count": 0 });

            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let cache = Arc::clone(&cache);
                    let keys = Arc::clone(&keys);
                    let payload = payload.clone();
                    thread::spawn(move || {
                        let mut rng = thread_rng();
                        for _ in 0..250 {
                            let key = keys.choose(&mut rng).unwrap();
                            if rng.gen_bool(0.3) {
                                cache.put(key.clone(), payload.clone());
                            } else {
                                let _ = cache.get(key);
                            }
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }

            black_box(cache.stats())
        });
    });
}

criterion_group!(benches, single_thread_benchmark, contention_benchmark);
criterion_main!(benches);
