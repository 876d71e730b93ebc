//! Pool statistics

/// Point-in-time statistics snapshot for a pool.
#[derive(Debug, Clone, Copy)]
pub struct PoolStats {
    /// Successful allocations (fast path and coalescing path).
    pub total_allocs: u64,
    /// Successful releases.
    pub total_releases: u64,
    /// Failed allocation attempts.
    pub failed_allocs: u64,
    /// Rejected releases (null, unknown or doubly released pointers).
    pub failed_releases: u64,
    /// Coalescing allocations performed over the pool's lifetime.
    pub coalesce_ops: u64,
    /// Size of each block in bytes.
    pub block_size: usize,
    /// Total number of blocks in the pool.
    pub block_count: usize,
    /// Blocks currently on the free list.
    pub free_blocks: usize,
}
