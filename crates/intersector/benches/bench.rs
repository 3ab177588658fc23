use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use intersector::{Config, Intersector};
use std::hint::black_box;
use std::time::Duration;

// Items per input sequence
const ITEMS: u32 = 50_000;

/// Intersect `inputs` overlapping ranges, each shifted by 1000.
fn bench_overlapping_ranges(c: &mut Criterion) {
    let mut group = c.benchmark_group("intersect/overlapping_ranges");
    let intersector = Intersector::new(
        Config::default()
            .with_poll_timeout(Duration::from_millis(1))
            .with_push_backoff(Duration::from_millis(1)),
    );

    for inputs in [1_u32, 2, 4, 8, 16] {
        group.throughput(Throughput::Elements((ITEMS * inputs) as u64));
        group.bench_function(format!("items/{ITEMS}/inputs/{inputs}"), |b| {
            b.iter(|| {
                let sources = (0..inputs).map(|i| (i * 1_000)..(i * 1_000 + ITEMS));
                let run = intersector.intersect(sources).unwrap();
                black_box(run.count())
            });
        });
    }

    group.finish();
}

/// Small buffers so producers spend most of their time blocked.
fn bench_small_buffers(c: &mut Criterion) {
    let mut group = c.benchmark_group("intersect/small_buffers");

    for capacity in [16, 256, 4096] {
        let intersector = Intersector::new(
            Config::default()
                .with_buffer_capacity(capacity)
                .with_poll_timeout(Duration::from_millis(1))
                .with_push_backoff(Duration::from_millis(1)),
        );

        group.throughput(Throughput::Elements(ITEMS as u64 * 4));
        group.bench_function(format!("capacity/{capacity}"), |b| {
            b.iter(|| {
                let run = intersector.intersect((0..4).map(|_| 0..ITEMS)).unwrap();
                black_box(run.count())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_overlapping_ranges, bench_small_buffers);
criterion_main!(benches);
