//! Benchmarks for registry dispatch and full dispatch cycles

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use bluccino_bench::{loaded_core, traffic};

fn bench_dispatch_fan_out(c: &mut Criterion) {
    let batch = traffic(64, 1);
    let mut group = c.benchmark_group("dispatch_fan_out");
    group.throughput(Throughput::Elements(batch.len() as u64));

    for per_class in [1usize, 4, 8] {
        let mut core = loaded_core(per_class, 0).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(per_class), &per_class, |b, _| {
            b.iter(|| {
                for msg in &batch {
                    black_box(core.dispatch(msg));
                }
            })
        });
    }
    group.finish();
}

fn bench_decorator_depth(c: &mut Criterion) {
    let batch = traffic(64, 2);
    let mut group = c.benchmark_group("decorator_depth");
    group.throughput(Throughput::Elements(batch.len() as u64));

    for depth in [0usize, 2, 8] {
        let mut core = loaded_core(1, depth).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, _| {
            b.iter(|| {
                for msg in &batch {
                    black_box(core.dispatch(msg));
                }
            })
        });
    }
    group.finish();
}

fn bench_tick(c: &mut Criterion) {
    let batch = traffic(512, 3);
    let mut core = loaded_core(2, 1).unwrap();
    let injector = core.injector();

    let mut group = c.benchmark_group("tick");
    group.throughput(Throughput::Elements(batch.len() as u64));
    group.bench_function("inject_then_drain_512", |b| {
        b.iter(|| {
            for msg in &batch {
                let _ = injector.try_push(msg.clone());
            }
            black_box(core.run_until_idle(usize::MAX))
        })
    });
    group.finish();
}

criterion_group!(benches, bench_dispatch_fan_out, bench_decorator_depth, bench_tick);
criterion_main!(benches);
