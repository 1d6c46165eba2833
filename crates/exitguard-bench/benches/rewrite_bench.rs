//! Rewriter throughput benchmarks.
//!
//! Measures rewrite cost for units that hit the reserved-prefix fast path,
//! parse without a match, and need one or many call sites patched.

use std::time::Duration;

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use exitguard_core::ExitCallRewriter;
use exitguard_fixtures::{ClassFixture, MethodFixture, exit_caller};

fn many_sites(methods: usize) -> Vec<u8> {
    let mut class = ClassFixture::new("bench/Many");
    for i in 0..methods {
        class = class.with_method(
            MethodFixture::new(&format!("m{i}"), "()V")
                .push_long(i as i64)
                .call_exit(i as i32)
                .returns(),
        );
    }
    class.build()
}

fn no_sites(methods: usize) -> Vec<u8> {
    let mut class = ClassFixture::new("bench/Quiet");
    for i in 0..methods {
        class = class.with_method(
            MethodFixture::new(&format!("m{i}"), "()V")
                .push_int(i as i32)
                .invoke_static("java/lang/Integer", "valueOf", "(I)Ljava/lang/Integer;")
                .returns(),
        );
    }
    class.build()
}

fn bench_rewrite(c: &mut Criterion) {
    let rewriter = ExitCallRewriter::default();
    let cases = [
        ("reserved", "java/lang/Runtime", exit_caller("java/lang/Runtime", 1)),
        ("unchanged", "bench/Quiet", no_sites(64)),
        ("single_site", "bench/App", exit_caller("bench/App", 1)),
        ("many_sites", "bench/Many", many_sites(64)),
    ];

    let mut group = c.benchmark_group("rewrite");
    for (label, identifier, bytes) in &cases {
        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_with_input(BenchmarkId::new(*label, bytes.len()), bytes, |b, bytes| {
            b.iter(|| {
                let outcome = rewriter.rewrite(black_box(bytes), identifier);
                black_box(outcome.map(|o| o.bytes.len()).unwrap_or(0))
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
    targets = bench_rewrite
);
criterion_main!(benches);
