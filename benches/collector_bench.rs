//! Benchmarks for probe attachment and collector sweeps
//!
//! Targets:
//! - Attach: <5µs per probe
//! - Forced sweep over 1000 probes: <1ms

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use leakprobe::probe::{Collector, ProbeTarget};
use leakprobe::CollectorConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

fn idle_config() -> CollectorConfig {
    // Long interval so only forced sweeps run during measurement
    CollectorConfig {
        sweep_interval: Duration::from_secs(3600),
    }
}

/// Benchmark 1: Probe attachment
fn bench_attach(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("attach");
    group.throughput(Throughput::Elements(1));

    let collector = rt.block_on(async { Collector::start(&idle_config()) });

    group.bench_function("attach_and_release", |b| {
        b.iter(|| {
            let target = ProbeTarget::new("bench");
            let id = collector.attach(black_box(&target), "bench", || {});
            drop(target);
            // Keeps the probe list from growing across iterations
            collector.force_collection();
            id
        });
    });

    group.finish();
    rt.block_on(async { collector.shutdown().await.unwrap() });
}

/// Benchmark 2: Collection of released targets
fn bench_collection(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("collection");

    for count in [10usize, 100, 1000] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| {
                rt.block_on(async {
                    let collector = Collector::start(&idle_config());
                    let mut notices = Vec::with_capacity(count);
                    for i in 0..count {
                        let target = Arc::new(i);
                        notices.push(collector.watch(&target, "bench"));
                    }

                    collector.force_collection();
                    for notice in notices {
                        notice.collected().await.unwrap();
                    }
                    collector.shutdown().await.unwrap();
                })
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_attach, bench_collection);
criterion_main!(benches);
