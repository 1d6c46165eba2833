//! Coordinator overhead benchmarks.
//!
//! Measures the cost of recording a request, of a full intercepted
//! request (record plus unwind and recovery), and of an empty cycle.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use exitguard_membrane::{ExitCoordinator, catch_termination};

fn bench_coordinator(c: &mut Criterion) {
    let mut group = c.benchmark_group("coordinator");
    group.throughput(Throughput::Elements(1));

    // record
    {
        let coordinator = ExitCoordinator::new();
        group.bench_function("record", |b| {
            b.iter(|| black_box(coordinator.record(black_box(3))));
        });
        coordinator.reset();
    }

    // request_termination
    {
        let coordinator = ExitCoordinator::new();
        group.bench_function("intercepted_request", |b| {
            b.iter(|| {
                let caught = catch_termination::<()>(|| coordinator.request_termination(black_box(4)));
                black_box(caught.is_err())
            });
        });
    }

    // begin_cycle
    {
        let coordinator = ExitCoordinator::new();
        group.bench_function("empty_cycle", |b| {
            b.iter(|| {
                let cycle = coordinator.begin_cycle();
                black_box(cycle.first_code())
            });
        });
    }

    // contended record
    {
        let coordinator = Arc::new(ExitCoordinator::new());
        group.bench_function(BenchmarkId::new("record_threads", 4), |b| {
            b.iter_custom(|iters| {
                let start = Instant::now();
                thread::scope(|s| {
                    for t in 0..4 {
                        let coordinator = Arc::clone(&coordinator);
                        s.spawn(move || {
                            for _ in 0..iters {
                                black_box(coordinator.record(t));
                            }
                        });
                    }
                });
                let dur = start.elapsed().max(Duration::from_nanos(1));
                coordinator.reset();
                dur
            });
        });
    }

    group.finish();
}

criterion_group!(
    name = benches;
    config = Criterion::default()
        .warm_up_time(Duration::from_millis(200))
        .measurement_time(Duration::from_secs(2))
        .sample_size(100);
    targets = bench_coordinator
);
criterion_main!(benches);
