//! Pool throughput benchmarks
//!
//! Compares the pool's fast path against the system allocator for the
//! workload the pool is built for (many same-sized allocations), and
//! measures the cost of the coalescing path.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use blockpool::{MemoryPool, PoolConfig, MEGABYTE};

/// Allocate, touch, release, one block at a time.
fn bench_fast_path(c: &mut Criterion) {
    let mut group = c.benchmark_group("fast_path");
    group.throughput(Throughput::Elements(1));

    group.bench_function("pool_alloc_release", |b| {
        let pool = MemoryPool::with_config(MEGABYTE, 256, PoolConfig::production()).unwrap();

        b.iter(|| unsafe {
            let span = pool.allocate(256).unwrap();
            span.as_ptr().write_bytes(0x42, 256);
            black_box(span);
            pool.release(span);
        });
    });

    group.bench_function("system_alloc_release", |b| {
        b.iter(|| {
            let mut buf = vec![0u8; 256];
            buf[0] = 0x42;
            black_box(&buf);
            drop(buf);
        });
    });

    group.finish();
}

/// Burst of same-sized allocations followed by a burst of releases.
fn bench_burst(c: &mut Criterion) {
    const BURST: usize = 1024;

    let mut group = c.benchmark_group("burst");
    group.throughput(Throughput::Elements(BURST as u64));

    group.bench_function("pool_burst", |b| {
        let pool = MemoryPool::with_config(MEGABYTE, 64, PoolConfig::production()).unwrap();
        let mut spans = Vec::with_capacity(BURST);

        b.iter(|| unsafe {
            for _ in 0..BURST {
                spans.push(pool.allocate(64).unwrap());
            }
            for span in spans.drain(..) {
                pool.release(span);
            }
        });
    });

    group.bench_function("system_burst", |b| {
        let mut bufs: Vec<Vec<u8>> = Vec::with_capacity(BURST);

        b.iter(|| {
            for _ in 0..BURST {
                bufs.push(vec![0u8; 64]);
            }
            bufs.clear();
        });
    });

    group.finish();
}

/// Over-sized requests that fuse and later split runs of blocks.
fn bench_coalescing(c: &mut Criterion) {
    let mut group = c.benchmark_group("coalescing");
    group.throughput(Throughput::Elements(1));

    for span_blocks in [2usize, 8, 32] {
        group.bench_function(format!("fuse_split_{span_blocks}_blocks"), |b| {
            let pool =
                MemoryPool::with_config(MEGABYTE, 64, PoolConfig::production()).unwrap();
            let request = span_blocks * 64;

            b.iter(|| unsafe {
                let span = pool.allocate(request).unwrap();
                black_box(span);
                pool.release(span);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_fast_path, bench_burst, bench_coalescing);
criterion_main!(benches);
