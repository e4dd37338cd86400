//! Benchmarks the allocator-reuse bound: insert-erase-insert the same key in
//! a tight loop and confirm the arena's used high-water mark stays bounded
//! instead of growing with the number of cycles. Informational, not a
//! pass/fail gate.

use cordmap::config::MapConfig;
use cordmap::map::ConcurrentMap;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn bench_reuse_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("reuse_cycle");

    for cycles in [100, 1_000, 10_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(cycles), cycles, |b, &cycles| {
            let map: ConcurrentMap<i64, &str> =
                ConcurrentMap::with_config(i64::MIN, i64::MAX, "", MapConfig::default()).unwrap();
            let mut handle = map.init_thread();

            b.iter(|| {
                for _ in 0..cycles {
                    map.insert(&mut handle, 42, "value").unwrap();
                    black_box(map.erase(&mut handle, &42).unwrap());
                }
            });

            eprintln!(
                "reuse_cycle({cycles}): {} arena slots carved",
                map.debug_slots_carved()
            );
        });
    }

    group.finish();
}

fn bench_mixed_key_churn(c: &mut Criterion) {
    c.bench_function("mixed_key_churn", |b| {
        let map: ConcurrentMap<i64, &str> =
            ConcurrentMap::with_config(i64::MIN, i64::MAX, "", MapConfig::default()).unwrap();
        let mut handle = map.init_thread();
        let mut counter = 0i64;

        b.iter(|| {
            let key = counter % 64;
            match counter % 3 {
                0 => {
                    map.insert(&mut handle, key, "v").unwrap();
                }
                1 => {
                    black_box(map.find(&mut handle, &key).unwrap());
                }
                _ => {
                    black_box(map.erase(&mut handle, &key).unwrap());
                }
            }
            counter += 1;
        });
    });
}

criterion_group!(benches, bench_reuse_cycle, bench_mixed_key_churn);
criterion_main!(benches);
