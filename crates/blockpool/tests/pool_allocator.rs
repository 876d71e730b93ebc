//! Integration tests for the block pool
//!
//! Exercises the pool end to end through its public surface: fast-path and
//! coalescing allocation, ordered release, reallocation, zeroing, and the
//! concurrent churn case.

use std::ptr::NonNull;

use blockpool::{AllocErrorKind, MemoryPool, PoolConfig, KILOBYTE, MEGABYTE};

#[test]
fn test_two_small_allocations_land_in_adjacent_blocks() {
    let pool = MemoryPool::new(1024, 64).unwrap();
    assert_eq!(pool.block_count(), 16);

    unsafe {
        let p1 = pool.allocate(4).unwrap();
        let p2 = pool.allocate(4).unwrap();
        assert_eq!(p2.as_ptr() as usize - p1.as_ptr() as usize, 64);

        pool.release(p1);
        pool.release(p2);
    }

    assert_eq!(pool.free_blocks(), 16);
    pool.integrity_check();

    // After the round trip the lowest block is the free head again.
    unsafe {
        let first = pool.allocate(4).unwrap();
        let last_base = first.as_ptr() as usize + 15 * 64;
        let spans: Vec<_> = (0..15).map(|_| pool.allocate(4).unwrap()).collect();
        assert_eq!(spans[14].as_ptr() as usize, last_base);

        pool.release(first);
        for span in spans {
            pool.release(span);
        }
    }
    pool.integrity_check();
}

#[test]
fn test_zeroing_reallocation_chain() {
    let pool = MemoryPool::new(MEGABYTE, 128).unwrap();
    assert_eq!(pool.block_count(), 8192);

    unsafe {
        // 40 elements of 2 bytes fit one 128-byte block, zeroed.
        let p = pool.zero_allocate(40, 2).unwrap();
        for i in 0..80 {
            assert_eq!(*p.as_ptr().add(i), 0);
        }

        // Still fits the block: no move.
        let same = pool.reallocate(p, 100).unwrap();
        assert_eq!(same, p);

        // Needs two blocks: moves, old bytes carried over.
        let q = pool.reallocate(p, 200).unwrap();
        assert_ne!(q, p);
        for i in 0..80 {
            assert_eq!(*q.as_ptr().add(i), 0);
        }

        pool.release(q);
    }

    assert_eq!(pool.free_blocks(), 8192);
    pool.integrity_check();
}

#[test]
fn test_exhaustion_and_out_of_order_release() {
    let pool = MemoryPool::new(1024, 64).unwrap();

    unsafe {
        let spans: Vec<_> = (0..16).map(|_| pool.allocate(64).unwrap()).collect();

        let err = pool.allocate(64).unwrap_err();
        assert_eq!(err.kind(), AllocErrorKind::Exhausted);

        // Release in an arbitrary order; ordering must hold along the way.
        for &i in &[3usize, 12, 0, 15, 7, 1, 14, 6, 2, 9, 4, 11, 8, 5, 13, 10] {
            pool.release(spans[i]);
            pool.integrity_check();
        }
    }

    assert_eq!(pool.free_blocks(), 16);
}

#[test]
fn test_coalesced_span_splits_back_to_singles() {
    let pool = MemoryPool::new(1024, 64).unwrap();

    unsafe {
        // 200 bytes fuse 4 blocks into one 256-byte span.
        let p = pool.allocate(200).unwrap();
        assert_eq!(pool.free_blocks(), 12);
        assert_eq!(pool.coalesce_count(), 1);

        pool.release(p);
    }

    assert_eq!(pool.free_blocks(), 16);
    pool.integrity_check();
}

#[test]
fn test_isolated_free_block_does_not_form_a_run() {
    let pool = MemoryPool::new(1024, 64).unwrap();

    unsafe {
        let _p1 = pool.allocate(64).unwrap();
        let p2 = pool.allocate(64).unwrap();
        let _p3 = pool.allocate(64).unwrap();
        pool.release(p2);

        // The gap left by p2 is isolated from the 13-block tail, so a
        // 4-block request must fail even though 14 blocks are free.
        assert_eq!(pool.free_blocks(), 14);
        let err = pool.allocate(14 * 64).unwrap_err();
        assert_eq!(err.kind(), AllocErrorKind::Fragmented);
    }
    pool.integrity_check();
}

#[test]
fn test_oversized_request_fails_without_scanning() {
    let pool = MemoryPool::new(1024, 64).unwrap();

    unsafe {
        for request in [1024, 2048, usize::MAX] {
            let err = pool.allocate(request).unwrap_err();
            assert_eq!(err.kind(), AllocErrorKind::ExceedsCapacity);
        }
    }
    assert_eq!(pool.free_blocks(), 16);
}

#[test]
fn test_release_of_never_returned_pointer_is_detected() {
    let config = PoolConfig {
        track_stats: true,
        ..PoolConfig::default()
    };
    let pool = MemoryPool::with_config(1024, 64, config).unwrap();

    unsafe {
        let p = pool.allocate(8).unwrap();

        // Interior pointer: never a span base.
        let interior = NonNull::new_unchecked(p.as_ptr().add(4));
        pool.release(interior);
        assert_eq!(pool.free_blocks(), 15);

        pool.release(p);
    }

    let stats = pool.stats().unwrap();
    assert_eq!(stats.failed_releases, 1);
    assert_eq!(stats.total_releases, 1);
    pool.integrity_check();
}

#[test]
fn test_balanced_round_trips_restore_initial_state() {
    let pool = MemoryPool::new(4 * KILOBYTE, 64).unwrap();
    let blocks = pool.block_count();

    unsafe {
        // Repeated paired allocate/release without coalescing must always
        // come back to the initial free-list state.
        let baseline = pool.allocate(8).unwrap();
        pool.release(baseline);

        for _ in 0..100 {
            let a = pool.allocate(16).unwrap();
            let b = pool.allocate(16).unwrap();
            pool.release(a);
            pool.release(b);

            let again = pool.allocate(8).unwrap();
            assert_eq!(again, baseline);
            pool.release(again);
        }
    }

    assert_eq!(pool.free_blocks(), blocks);
    pool.integrity_check();
}

#[test]
fn test_concurrent_churn_restores_the_pool() {
    use std::sync::Arc;
    use std::thread;

    const THREADS: usize = 8;
    const ITERATIONS: usize = 2000;

    let pool = Arc::new(MemoryPool::new(MEGABYTE, std::mem::size_of::<usize>()).unwrap());
    let blocks = pool.block_count();

    let mut handles = Vec::new();
    for worker in 0..THREADS {
        let pool = Arc::clone(&pool);
        handles.push(thread::spawn(move || {
            for i in 0..ITERATIONS {
                unsafe {
                    let span = pool.allocate(std::mem::size_of::<usize>()).unwrap();
                    let cell = span.cast::<usize>();
                    cell.as_ptr().write(worker * ITERATIONS + i);
                    assert_eq!(cell.as_ptr().read(), worker * ITERATIONS + i);
                    pool.release(span);
                }
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(pool.free_blocks(), blocks);
    pool.integrity_check();
}

#[test]
fn test_concurrent_mixed_sizes_stay_disjoint() {
    use std::sync::Arc;
    use std::thread;

    let pool = Arc::new(MemoryPool::new(256 * KILOBYTE, 64).unwrap());
    let blocks = pool.block_count();

    let mut handles = Vec::new();
    for worker in 0..4u8 {
        let pool = Arc::clone(&pool);
        handles.push(thread::spawn(move || {
            for round in 0..200 {
                unsafe {
                    let n = if round % 3 == 0 { 200 } else { 48 };
                    let Ok(span) = pool.allocate(n) else { continue };

                    // Stamp the whole span and verify nobody else wrote it.
                    span.as_ptr().write_bytes(worker, n);
                    for i in 0..n {
                        assert_eq!(*span.as_ptr().add(i), worker);
                    }
                    pool.release(span);
                }
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(pool.free_blocks(), blocks);
    pool.integrity_check();
}
