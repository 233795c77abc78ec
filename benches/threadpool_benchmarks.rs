use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use futures::StreamExt;
use relay_pool::{task_ref, Config as PoolConfig, TaskRef, WorkerPool};
use std::hint::black_box;
use tokio::time::Duration;

const WAIT: Duration = Duration::from_secs(10);

fn create_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn checksum_task() -> TaskRef<u64, u64> {
    task_ref(|x: u64, _: &mut ()| {
        let mut acc = x;
        for i in 0..64 {
            acc = acc.wrapping_mul(31).wrapping_add(i);
        }
        Some(acc)
    })
}

fn drain(pool: &WorkerPool<u64, u64>, count: usize) {
    for _ in 0..count {
        black_box(pool.wait_output(WAIT).unwrap());
    }
}

// Benchmark 1: submit + drain overhead
fn bench_submit_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("submit_drain");
    let pool: WorkerPool<u64, u64> = WorkerPool::with_config(PoolConfig::cpu_bound());
    assert!(pool.start_default());
    let task = checksum_task();

    for size in [100usize, 1_000, 10_000] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                for i in 0..size as u64 {
                    pool.add_input_shared(task.clone(), black_box(i));
                }
                drain(&pool, size);
            });
        });
    }

    group.finish();
    pool.stop();
}

// Benchmark 2: thread scaling
fn bench_thread_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("thread_scaling");
    const TASKS: usize = 5_000;
    group.throughput(Throughput::Elements(TASKS as u64));

    for threads in [1usize, 2, 4, 8] {
        let pool: WorkerPool<u64, u64> = WorkerPool::new();
        assert!(pool.start(threads));
        let task = checksum_task();

        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, _| {
            b.iter(|| {
                for i in 0..TASKS as u64 {
                    pool.add_input_shared(task.clone(), i);
                }
                drain(&pool, TASKS);
            });
        });
        pool.stop();
    }

    group.finish();
}

// Benchmark 3: async drain through the output stream
fn bench_async_stream(c: &mut Criterion) {
    let mut group = c.benchmark_group("async_stream");
    let rt = create_runtime();
    let pool: WorkerPool<u64, u64> = WorkerPool::with_config(PoolConfig::io_bound());
    assert!(pool.start_default());
    let task = checksum_task();

    for size in [1_000usize, 10_000] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.to_async(&rt).iter(|| {
                for i in 0..size as u64 {
                    pool.add_input_shared(task.clone(), i);
                }
                let pool = &pool;
                async move {
                    let total = pool
                        .outputs()
                        .take(size)
                        .fold(0u64, |acc, v| async move { acc.wrapping_add(v) })
                        .await;
                    black_box(total);
                }
            });
        });
    }

    group.finish();
    pool.stop();
}

// Benchmark 4: single round trip latency
fn bench_round_trip_latency(c: &mut Criterion) {
    let pool: WorkerPool<u64, u64> = WorkerPool::with_config(PoolConfig::default().with_threads(2));
    assert!(pool.start_default());
    let task = checksum_task();

    c.bench_function("round_trip_latency", |b| {
        b.iter(|| {
            pool.add_input_shared(task.clone(), black_box(7));
            black_box(pool.wait_output(WAIT).unwrap());
        });
    });

    pool.stop();
}

criterion_group!(
    benches,
    bench_submit_drain,
    bench_thread_scaling,
    bench_async_stream,
    bench_round_trip_latency,
);
criterion_main!(benches);
