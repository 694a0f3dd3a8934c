use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use metrics_engine::{EnvironmentInfo, MetricsContext, Registry};

fn context() -> MetricsContext {
    MetricsContext::builder().with_environment(EnvironmentInfo::new()).build().unwrap()
}

fn registry_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry");

    group.bench_function("cached counter lookup", |b| {
        let ctx = context();
        let metrics = ctx.group("app");
        metrics.counter("requests").unwrap();

        b.iter(|| metrics.counter(black_box("requests")).unwrap())
    });
    group.bench_function("cached group lookup", |b| {
        let ctx = context();
        ctx.group("app");

        b.iter(|| ctx.group(black_box("app")))
    });
    group.bench_function("uncached counter registration", |b| {
        b.iter_batched_ref(
            context,
            |ctx| ctx.group("app").counter("requests").unwrap(),
            BatchSize::SmallInput,
        )
    });
    group.bench_function("counter increment", |b| {
        let ctx = context();
        let counter = ctx.group("app").counter("requests").unwrap();

        b.iter(|| counter.increment(black_box(1)))
    });
    group.bench_function("disabled counter increment", |b| {
        let ctx = context();
        let counter = ctx.group("app").counter("requests").unwrap();
        ctx.completely_disable_metrics();

        b.iter(|| counter.increment(black_box(1)))
    });
    group.bench_function("snapshot (100 metrics)", |b| {
        let ctx = context();
        for g in 0..10 {
            let metrics = ctx.group(&format!("group{}", g));
            for m in 0..5 {
                metrics.counter(&format!("counter{}", m)).unwrap().increment(m);
                metrics.timer(&format!("timer{}", m)).unwrap().record_nanos(m * 1_000).unwrap();
            }
        }

        b.iter(|| ctx.snapshot())
    });
    group.bench_function("registry overhead", |b| {
        b.iter_batched(
            || (),
            |_| Registry::new(Default::default(), EnvironmentInfo::new()),
            BatchSize::NumIterations(1),
        )
    });

    group.finish();
}

criterion_group!(benches, registry_benchmark);
criterion_main!(benches);
