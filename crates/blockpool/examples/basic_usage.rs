//! Basic usage of the block pool
//!
//! Walks through the fast path, the coalescing path, zeroed allocation and
//! reallocation, and the RAII wrapper.

use blockpool::{MemoryPool, PoolBox, PoolConfig, KILOBYTE};

fn main() {
    println!("=== blockpool basic usage ===\n");

    raw_span_example();
    coalescing_example();
    pool_box_example();
}

fn raw_span_example() {
    println!("## Raw spans");

    let pool = MemoryPool::new(4 * KILOBYTE, 64).expect("pool creation failed");
    println!(
        "  pool: {} blocks of {} bytes",
        pool.block_count(),
        pool.block_size()
    );

    unsafe {
        let span = pool.allocate(48).expect("allocation failed");
        println!("  allocated 48 bytes at {:p}", span.as_ptr());

        let zeroed = pool.zero_allocate(10, 4).expect("zero-allocation failed");
        println!("  zero-allocated 40 bytes at {:p}", zeroed.as_ptr());

        let grown = pool.reallocate(zeroed, 100).expect("reallocation failed");
        println!("  grew the zeroed span to 100 bytes at {:p}", grown.as_ptr());

        pool.release(span);
        pool.release(grown);
    }

    println!("  free blocks after cleanup: {}\n", pool.free_blocks());
}

fn coalescing_example() {
    println!("## Coalescing");

    let config = PoolConfig {
        track_stats: true,
        ..PoolConfig::default()
    };
    let pool = MemoryPool::with_config(4 * KILOBYTE, 64, config).expect("pool creation failed");

    unsafe {
        // 200 bytes do not fit one 64-byte block, so the pool fuses a run
        // of 4 address-consecutive free blocks into one span.
        let big = pool.allocate(200).expect("coalescing allocation failed");
        println!("  fused span at {:p}", big.as_ptr());
        println!("  coalescing allocations so far: {}", pool.coalesce_count());

        // Releasing splits the span back into single blocks, reinserted in
        // address order.
        pool.release(big);
    }

    let stats = pool.stats().expect("stats are enabled");
    println!(
        "  allocs: {}, releases: {}, free blocks: {}\n",
        stats.total_allocs, stats.total_releases, stats.free_blocks
    );
}

fn pool_box_example() {
    println!("## PoolBox");

    let pool = MemoryPool::new(4 * KILOBYTE, 64).expect("pool creation failed");

    let mut point = PoolBox::new_in((1.0f64, 2.0f64), &pool).expect("boxing failed");
    point.0 += 0.5;
    println!("  pooled value: {:?}", *point);

    drop(point);
    println!("  free blocks after drop: {}", pool.free_blocks());
}
