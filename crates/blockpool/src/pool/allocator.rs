//! Main pool implementation
//!
//! # Safety
//!
//! The pool hands out raw spans of its owned byte region:
//! - Every span is disjoint from every other outstanding span.
//! - The bytes behind a span never move while it is outstanding.
//! - The free and allocated lists are each guarded by their own mutex; the
//!   two are never held at the same time, so allocation and release cannot
//!   deadlock against each other.
//! - Descriptor `base`/`size` fields are mutated only while the descriptor
//!   is detached from both lists, in the mutating thread's custody.
//!
//! ## Invariants
//!
//! Between any two operations:
//! - every listed descriptor covers a positive multiple of the stride,
//! - listed descriptors tile the region exactly, with no overlap,
//! - the free list is sorted by strictly ascending span address,
//! - the allocated list holds every outstanding span exactly once.

use std::alloc::{self, Layout};
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use super::config::PoolConfig;
use super::descriptor::{DescTable, ListLock, NIL};
use super::stats::PoolStats;
use crate::error::{AllocError, AllocResult};
use crate::utils::{align_up, is_aligned};
use crate::POOL_ALIGN;

/// Fixed-capacity block-pool suballocator.
///
/// A pool owns one contiguous byte region carved into `block_count` blocks
/// of `block_size` bytes each (the requested block size rounded up to a
/// multiple of 8). Requests up to one block are served from the free-list
/// head; larger requests fuse a run of address-consecutive free blocks into
/// one span and split it back apart on release.
///
/// # Example
///
/// ```rust
/// use blockpool::{MemoryPool, KILOBYTE};
///
/// let pool = MemoryPool::new(KILOBYTE, 64).unwrap();
/// assert_eq!(pool.block_size(), 64);
/// assert_eq!(pool.block_count(), 16);
///
/// // SAFETY: released before the pool is dropped.
/// unsafe {
///     let span = pool.allocate(200).unwrap(); // coalesces 4 blocks
///     assert_eq!(pool.free_blocks(), 12);
///     pool.release(span);
/// }
/// assert_eq!(pool.free_blocks(), 16);
/// ```
pub struct MemoryPool {
    /// Owned byte region, 8-byte aligned.
    region: NonNull<u8>,
    region_layout: Layout,

    /// Address of block 0. Equals the region address because the region is
    /// allocated with the pool's natural alignment.
    base: usize,

    /// Block stride in bytes, a multiple of 8.
    stride: usize,

    /// Number of blocks carved from the region. Trailing region bytes below
    /// one stride are unused.
    block_count: usize,

    /// Requested capacity in bytes.
    capacity: usize,

    /// One descriptor per block, threaded through the two lists by index.
    table: DescTable,

    /// Free-list head. Covers the `next` links of free descriptors.
    free: ListLock,

    /// Allocated-list head. Covers the links of allocated descriptors.
    alloc: ListLock,

    /// Blocks currently on the free list.
    free_count: AtomicUsize,

    /// Coalescing allocations performed. Diagnostic, always maintained.
    coalesce_ops: AtomicU64,

    /// Optional counters, maintained when `config.track_stats` is set.
    total_allocs: AtomicU64,
    total_releases: AtomicU64,
    failed_allocs: AtomicU64,
    failed_releases: AtomicU64,

    config: PoolConfig,
}

// SAFETY: MemoryPool is Send.
// - The region and descriptor table are owned and freed exactly once.
// - All shared counters are atomics.
unsafe impl Send for MemoryPool {}

// SAFETY: MemoryPool is Sync.
// - Both list heads are mutex-guarded (see the custody rules in the module
//   docs); in the elided single-threaded mode the caller asserts exclusive
//   use, as documented on `PoolConfig::single_threaded`.
// - Descriptor payload fields are only touched in detached custody.
// - The byte region itself is only written through spans the pool handed
//   out, which are pairwise disjoint.
unsafe impl Sync for MemoryPool {}

impl MemoryPool {
    /// Creates a pool of `capacity` bytes with the default configuration.
    ///
    /// `block_size` is rounded up to a multiple of 8 and becomes the pool's
    /// stride for its whole lifetime.
    ///
    /// # Errors
    ///
    /// Fails without allocating if `capacity` is zero, if `block_size` is
    /// zero or not strictly less than `capacity`, or if no whole block fits
    /// the capacity after rounding. Fails with
    /// [`AllocErrorKind::OutOfMemory`](crate::AllocErrorKind::OutOfMemory)
    /// if the system allocator refuses the region.
    pub fn new(capacity: usize, block_size: usize) -> AllocResult<Self> {
        Self::with_config(capacity, block_size, PoolConfig::default())
    }

    /// Creates a pool with an explicit [`PoolConfig`].
    ///
    /// See [`new`](Self::new) for the preconditions.
    pub fn with_config(
        capacity: usize,
        block_size: usize,
        config: PoolConfig,
    ) -> AllocResult<Self> {
        if capacity == 0 {
            return Err(AllocError::invalid_request("pool capacity must be non-zero").report());
        }
        if block_size == 0 || block_size >= capacity {
            return Err(AllocError::invalid_request(
                "block size must be positive and strictly less than capacity",
            )
            .report());
        }

        let stride = align_up(block_size, POOL_ALIGN);
        let block_count = capacity / stride;
        if block_count == 0 {
            return Err(AllocError::invalid_request(
                "capacity does not fit one aligned block",
            )
            .report());
        }
        if block_count >= NIL as usize {
            return Err(AllocError::invalid_request("too many blocks for one pool").report());
        }

        let region_layout = Layout::from_size_align(capacity, POOL_ALIGN)
            .map_err(|_| AllocError::size_overflow("region layout").report())?;

        // SAFETY: region_layout has non-zero size (capacity > 0).
        let raw = unsafe { alloc::alloc(region_layout) };
        let region =
            NonNull::new(raw).ok_or_else(|| AllocError::out_of_memory(capacity).report())?;

        if let Some(pattern) = config.alloc_pattern {
            // SAFETY: the region is owned and `capacity` bytes long.
            unsafe { ptr::write_bytes(region.as_ptr(), pattern, capacity) };
        }

        let base = region.as_ptr() as usize;
        debug_assert!(is_aligned(base, POOL_ALIGN));

        let table = DescTable::new(base, stride, block_count);
        debug_assert_eq!(table.len(), block_count);

        Ok(Self {
            region,
            region_layout,
            base,
            stride,
            block_count,
            capacity,
            table,
            free: ListLock::new(0, config.thread_safe),
            alloc: ListLock::new(NIL, config.thread_safe),
            free_count: AtomicUsize::new(block_count),
            coalesce_ops: AtomicU64::new(0),
            total_allocs: AtomicU64::new(0),
            total_releases: AtomicU64::new(0),
            failed_allocs: AtomicU64::new(0),
            failed_releases: AtomicU64::new(0),
            config,
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Returns the block stride in bytes (a multiple of 8).
    pub fn block_size(&self) -> usize {
        self.stride
    }

    /// Returns the number of blocks carved from the region.
    pub fn block_count(&self) -> usize {
        self.block_count
    }

    /// Returns the capacity the pool was created with.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of blocks currently on the free list.
    pub fn free_blocks(&self) -> usize {
        self.free_count.load(Ordering::Relaxed)
    }

    /// Returns the number of blocks currently behind outstanding spans.
    pub fn allocated_blocks(&self) -> usize {
        self.block_count - self.free_blocks()
    }

    /// Whether the free list is empty.
    pub fn is_exhausted(&self) -> bool {
        self.free_blocks() == 0
    }

    /// Whether the pointer falls inside the pool's block region.
    pub fn contains(&self, ptr: *const u8) -> bool {
        let addr = ptr as usize;
        addr >= self.base && addr < self.base + self.block_count * self.stride
    }

    /// Returns how many coalescing allocations the pool has performed.
    pub fn coalesce_count(&self) -> u64 {
        self.coalesce_ops.load(Ordering::Relaxed)
    }

    /// Returns a statistics snapshot, or `None` when counters are disabled.
    pub fn stats(&self) -> Option<PoolStats> {
        if !self.config.track_stats {
            return None;
        }

        Some(PoolStats {
            total_allocs: self.total_allocs.load(Ordering::Relaxed),
            total_releases: self.total_releases.load(Ordering::Relaxed),
            failed_allocs: self.failed_allocs.load(Ordering::Relaxed),
            failed_releases: self.failed_releases.load(Ordering::Relaxed),
            coalesce_ops: self.coalesce_count(),
            block_size: self.stride,
            block_count: self.block_count,
            free_blocks: self.free_blocks(),
        })
    }

    /// Tears the pool down. Equivalent to dropping it; outstanding spans
    /// become dangling and must not be dereferenced again.
    pub fn destroy(self) {}

    // ========================================================================
    // Allocation
    // ========================================================================

    /// Allocates a span of at least `n_bytes` bytes and returns its base.
    ///
    /// Requests up to one block take the fast path and return the free-list
    /// head. Larger requests scan the address-sorted free list for the first
    /// (lowest-address) run of enough consecutive blocks and fuse it into a
    /// single span; no compaction or second-fit retry is attempted. The
    /// returned bytes may contain junk from earlier use.
    ///
    /// # Errors
    ///
    /// Fails when `n_bytes` is at least the whole capacity (without
    /// scanning), when the free list is empty, or when no adequate run of
    /// consecutive free blocks exists. The pool is unchanged on failure.
    ///
    /// # Safety
    ///
    /// The caller must:
    /// - not dereference the span after releasing it or dropping the pool,
    /// - release the span at most once, through this pool,
    /// - on a pool configured with
    ///   [`PoolConfig::single_threaded`], never call into the pool from two
    ///   threads concurrently.
    pub unsafe fn allocate(&self, n_bytes: usize) -> AllocResult<NonNull<u8>> {
        if n_bytes >= self.capacity {
            return Err(self.failed_alloc(AllocError::exceeds_capacity(n_bytes)));
        }

        let result = if n_bytes <= self.stride {
            self.allocate_single(n_bytes)
        } else {
            self.allocate_coalesced(n_bytes)
        };

        match result {
            Ok(span) => {
                if self.config.track_stats {
                    self.total_allocs.fetch_add(1, Ordering::Relaxed);
                }
                Ok(span)
            }
            Err(err) => Err(self.failed_alloc(err)),
        }
    }

    /// Allocates `count` elements of `elem_size` bytes each, zeroed.
    ///
    /// # Errors
    ///
    /// Fails when `count * elem_size` is zero or overflows, and for every
    /// reason [`allocate`](Self::allocate) can fail.
    ///
    /// # Safety
    ///
    /// Same contract as [`allocate`](Self::allocate).
    pub unsafe fn zero_allocate(
        &self,
        count: usize,
        elem_size: usize,
    ) -> AllocResult<NonNull<u8>> {
        let total = count
            .checked_mul(elem_size)
            .ok_or_else(|| self.failed_alloc(AllocError::size_overflow("count * elem_size")))?;
        if total == 0 {
            return Err(self.failed_alloc(AllocError::invalid_request(
                "zero-sized zero-allocation",
            )));
        }

        // SAFETY: forwarded caller contract.
        let span = unsafe { self.allocate(total)? };
        // SAFETY: the span covers at least `total` bytes and is exclusively
        // ours until returned.
        unsafe { ptr::write_bytes(span.as_ptr(), 0, total) };
        Ok(span)
    }

    /// Grows the span at `ptr` to at least `n_bytes` bytes.
    ///
    /// If the existing span is already large enough, `ptr` is returned
    /// unchanged and no list is touched; the pool never downsizes. Otherwise
    /// a fresh span is allocated, the old contents are copied over, and the
    /// old span is released.
    ///
    /// # Errors
    ///
    /// Fails when `n_bytes` is zero, when `ptr` is not the base of an
    /// outstanding span, and for every reason [`allocate`](Self::allocate)
    /// can fail. On failure the original span remains valid.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by this pool and not yet released. On
    /// success with a new base, the old pointer must not be used again.
    /// The [`allocate`](Self::allocate) contract applies to the result.
    pub unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        n_bytes: usize,
    ) -> AllocResult<NonNull<u8>> {
        if n_bytes == 0 {
            return Err(self.failed_alloc(AllocError::invalid_request("zero-byte reallocation")));
        }

        let addr = ptr.as_ptr() as usize;

        // Lookup and the no-downsizing decision both belong to one critical
        // section; the size is copied out before the lock drops.
        let old_size = self
            .alloc
            .with(|head| {
                if *head == NIL {
                    return Err(AllocError::unknown_pointer("no outstanding spans"));
                }
                self.find_span(head, addr)
                    .ok_or(AllocError::unknown_pointer(
                        "pointer does not match any outstanding span",
                    ))
            })
            .map_err(|err| self.failed_alloc(err))?;

        if old_size >= n_bytes {
            return Ok(ptr);
        }

        // SAFETY: forwarded caller contract.
        let new_span = unsafe { self.allocate(n_bytes)? };
        // SAFETY: both spans are live and disjoint; the old span covers
        // `old_size` bytes.
        unsafe { ptr::copy_nonoverlapping(ptr.as_ptr(), new_span.as_ptr(), old_size) };
        // SAFETY: `ptr` is an outstanding span base owned by the caller.
        unsafe { self.release(ptr) };
        Ok(new_span)
    }

    // ========================================================================
    // Release
    // ========================================================================

    /// Returns the span at `ptr` to the pool.
    ///
    /// Single-block spans go straight back to the free list. A coalesced
    /// span is first split into single blocks. Either way the freed chain is
    /// spliced into the free list at its address-sorted position, so the
    /// bytes immediately become available for future allocations.
    ///
    /// A pointer that is not the base of an outstanding span (including an
    /// interior pointer of a coalesced span) is diagnosed as a potential
    /// double release and no list is mutated.
    ///
    /// # Safety
    ///
    /// `ptr` must not be dereferenced after this call, and the
    /// single-threaded contract of [`allocate`](Self::allocate) applies.
    pub unsafe fn release(&self, ptr: NonNull<u8>) {
        let addr = ptr.as_ptr() as usize;

        if !self.contains(ptr.as_ptr()) {
            self.failed_release(AllocError::unknown_pointer(
                "pointer is outside the pool region",
            ));
            return;
        }

        let unlinked = self.alloc.with(|head| {
            if *head == NIL {
                return Err(AllocError::unknown_pointer(
                    "no outstanding spans, possible double release",
                ));
            }
            self.unlink_span(head, addr).ok_or(AllocError::unknown_pointer(
                "pointer does not match any outstanding span, possible double release",
            ))
        });

        let idx = match unlinked {
            Ok(idx) => idx,
            Err(err) => {
                self.failed_release(err);
                return;
            }
        };

        // The descriptor is detached now; its fields are ours to mutate.
        // SAFETY: detached custody.
        let span_size = unsafe { (*self.table.ptr(idx)).size };
        debug_assert!(span_size >= self.stride && span_size % self.stride == 0);
        debug_assert_eq!(idx as usize, (addr - self.base) / self.stride);

        if let Some(pattern) = self.config.dealloc_pattern {
            // SAFETY: the span is no longer outstanding and covers
            // `span_size` bytes inside the region.
            unsafe { ptr::write_bytes(ptr.as_ptr(), pattern, span_size) };
        }

        let span_blocks = span_size / self.stride;
        let tail = if span_blocks == 1 {
            idx
        } else {
            self.split_span(idx, addr, span_blocks)
        };

        self.free
            .with(|head| self.insert_free_ordered(head, idx, tail));
        self.free_count.fetch_add(span_blocks, Ordering::Relaxed);

        if self.config.track_stats {
            self.total_releases.fetch_add(1, Ordering::Relaxed);
        }
    }

    // ========================================================================
    // Fast and coalescing paths
    // ========================================================================

    fn allocate_single(&self, n_bytes: usize) -> AllocResult<NonNull<u8>> {
        let Some(idx) = self.free.with(|head| self.pop_free_head(head)) else {
            return Err(AllocError::exhausted(n_bytes));
        };
        self.free_count.fetch_sub(1, Ordering::Relaxed);

        // SAFETY: detached custody; the base is read before the descriptor
        // goes onto the allocated list.
        let span_base = unsafe { (*self.table.ptr(idx)).base };

        self.alloc.with(|head| self.push_head(head, idx));

        // SAFETY: block bases inside the region are never null.
        Ok(unsafe { NonNull::new_unchecked(span_base as *mut u8) })
    }

    fn allocate_coalesced(&self, n_bytes: usize) -> AllocResult<NonNull<u8>> {
        let wanted = n_bytes.div_ceil(self.stride);

        let first = self.free.with(|head| {
            if *head == NIL {
                return Err(AllocError::exhausted(n_bytes));
            }
            self.take_free_run(head, wanted)
                .ok_or(AllocError::fragmented(n_bytes))
        })?;

        self.free_count.fetch_sub(wanted, Ordering::Relaxed);

        // The whole run is detached now. Fuse it: the head descriptor grows
        // to cover the run, the trailing descriptors retire in place until a
        // release of this span revives them.
        // SAFETY: detached custody for every descriptor on the run.
        let span_base = unsafe {
            let head_desc = &mut *self.table.ptr(first);
            head_desc.size = wanted * self.stride;
            let mut cur = head_desc.next;
            head_desc.next = NIL;
            while cur != NIL {
                let trailing = &mut *self.table.ptr(cur);
                let next = trailing.next;
                trailing.size = 0;
                trailing.next = NIL;
                cur = next;
            }
            head_desc.base
        };

        self.alloc.with(|head| self.push_head(head, first));
        self.coalesce_ops.fetch_add(1, Ordering::Relaxed);

        // SAFETY: block bases inside the region are never null.
        Ok(unsafe { NonNull::new_unchecked(span_base as *mut u8) })
    }

    /// Splits a freed `span_blocks`-block span back into single blocks.
    ///
    /// Revives the retired descriptors behind the span head, chains them in
    /// address order after `idx`, and returns the chain tail. Runs entirely
    /// on detached descriptors, outside both locks.
    fn split_span(&self, idx: u32, addr: usize, span_blocks: usize) -> u32 {
        // SAFETY: detached custody for the head and every revived trailing
        // descriptor; a block index plus its in-span offset stays inside the
        // table because the span tiled exactly that many blocks.
        unsafe {
            (*self.table.ptr(idx)).size = self.stride;

            let mut tail = idx;
            for i in 1..span_blocks {
                let revived = idx + i as u32;
                let desc = &mut *self.table.ptr(revived);
                debug_assert_eq!(desc.size, 0);
                desc.base = addr + i * self.stride;
                desc.size = self.stride;
                desc.next = NIL;
                (*self.table.ptr(tail)).next = revived;
                tail = revived;
            }
            tail
        }
    }

    // ========================================================================
    // List primitives (callers hold the corresponding lock)
    // ========================================================================

    fn pop_free_head(&self, head: &mut u32) -> Option<u32> {
        let idx = *head;
        if idx == NIL {
            return None;
        }
        // SAFETY: the free lock is held and `idx` is on the free list.
        unsafe {
            let desc = &mut *self.table.ptr(idx);
            *head = desc.next;
            desc.next = NIL;
        }
        Some(idx)
    }

    fn push_head(&self, head: &mut u32, idx: u32) {
        // SAFETY: the list lock is held; `idx` is in detached custody.
        unsafe { (*self.table.ptr(idx)).next = *head };
        *head = idx;
    }

    /// Scans the free list for the first run of `wanted` descriptors with
    /// strictly consecutive span bases and splices the whole run out.
    ///
    /// Because the list is address-sorted this is a single forward pass: a
    /// running count extends while each base equals the previous base plus
    /// one stride and resets whenever adjacency breaks.
    fn take_free_run(&self, head: &mut u32, wanted: usize) -> Option<u32> {
        let mut prev_of_run = NIL;
        let mut run_first = NIL;
        let mut run_len = 0usize;
        let mut expected_base = 0usize;

        let mut prev = NIL;
        let mut cur = *head;

        while cur != NIL {
            // SAFETY: the free lock is held and `cur` is on the free list.
            let (cur_base, cur_next) = unsafe {
                let desc = &*self.table.ptr(cur);
                (desc.base, desc.next)
            };

            if run_len > 0 && cur_base == expected_base {
                run_len += 1;
            } else {
                prev_of_run = prev;
                run_first = cur;
                run_len = 1;
            }
            expected_base = cur_base + self.stride;

            if run_len == wanted {
                // Splice out [run_first, cur] in one step.
                if prev_of_run == NIL {
                    *head = cur_next;
                } else {
                    // SAFETY: the free lock is held; `prev_of_run` stays on
                    // the free list.
                    unsafe { (*self.table.ptr(prev_of_run)).next = cur_next };
                }
                // SAFETY: `cur` is now in detached custody.
                unsafe { (*self.table.ptr(cur)).next = NIL };
                return Some(run_first);
            }

            prev = cur;
            cur = cur_next;
        }

        None
    }

    /// Unlinks the allocated descriptor whose span base equals `addr`.
    fn unlink_span(&self, head: &mut u32, addr: usize) -> Option<u32> {
        let mut prev = NIL;
        let mut cur = *head;

        while cur != NIL {
            // SAFETY: the allocated lock is held and `cur` is on the list.
            let (cur_base, cur_next) = unsafe {
                let desc = &*self.table.ptr(cur);
                (desc.base, desc.next)
            };

            if cur_base == addr {
                if prev == NIL {
                    *head = cur_next;
                } else {
                    // SAFETY: the allocated lock is held; `prev` stays on
                    // the list.
                    unsafe { (*self.table.ptr(prev)).next = cur_next };
                }
                // SAFETY: `cur` is now in detached custody.
                unsafe { (*self.table.ptr(cur)).next = NIL };
                return Some(cur);
            }

            prev = cur;
            cur = cur_next;
        }

        None
    }

    /// Returns the span size of the allocated descriptor based at `addr`.
    fn find_span(&self, head: &mut u32, addr: usize) -> Option<usize> {
        let mut cur = *head;
        while cur != NIL {
            // SAFETY: the allocated lock is held and `cur` is on the list.
            let (cur_base, cur_size, cur_next) = unsafe {
                let desc = &*self.table.ptr(cur);
                (desc.base, desc.size, desc.next)
            };
            if cur_base == addr {
                return Some(cur_size);
            }
            cur = cur_next;
        }
        None
    }

    /// Splices the freed chain `[first, tail]` into the free list so that
    /// the list stays sorted by ascending span base.
    fn insert_free_ordered(&self, head: &mut u32, first: u32, tail: u32) {
        // SAFETY: `first` is in detached custody.
        let first_base = unsafe { (*self.table.ptr(first)).base };

        let head_idx = *head;
        // SAFETY: the free lock is held; `head_idx` is on the free list.
        if head_idx == NIL || unsafe { (*self.table.ptr(head_idx)).base } > first_base {
            // SAFETY: `tail` is in detached custody.
            unsafe { (*self.table.ptr(tail)).next = head_idx };
            *head = first;
            return;
        }

        let mut cur = head_idx;
        loop {
            // SAFETY: the free lock is held and `cur` is on the free list.
            let cur_next = unsafe { (*self.table.ptr(cur)).next };
            // SAFETY: as above; `cur_next` is on the list when not NIL.
            if cur_next == NIL || unsafe { (*self.table.ptr(cur_next)).base } > first_base {
                // SAFETY: `tail` is detached, `cur` is on the list under the
                // held lock.
                unsafe {
                    (*self.table.ptr(tail)).next = cur_next;
                    (*self.table.ptr(cur)).next = first;
                }
                return;
            }
            cur = cur_next;
        }
    }

    // ========================================================================
    // Failure bookkeeping
    // ========================================================================

    fn failed_alloc(&self, err: AllocError) -> AllocError {
        if self.config.track_stats {
            self.failed_allocs.fetch_add(1, Ordering::Relaxed);
        }
        err.report()
    }

    fn failed_release(&self, err: AllocError) {
        if self.config.track_stats {
            self.failed_releases.fetch_add(1, Ordering::Relaxed);
        }
        let _ = err.report();
    }

    // ========================================================================
    // Integrity checking
    // ========================================================================

    /// Validates the pool's structural invariants, panicking on violation.
    ///
    /// Checks that every listed descriptor covers a positive multiple of the
    /// stride, that the free list is sorted by strictly ascending address,
    /// and that the spans on both lists tile the block region exactly with
    /// no overlap. Takes each list lock in turn, never both at once.
    /// Intended for tests and debugging; cost is linear in the block count.
    pub fn integrity_check(&self) {
        let mut spans: Vec<(usize, usize)> = Vec::with_capacity(self.block_count);

        let free_spans = self.free.with(|head| {
            let mut collected = Vec::new();
            let mut cur = *head;
            while cur != NIL {
                // SAFETY: the free lock is held and `cur` is on the list.
                let desc = unsafe { *self.table.ptr(cur) };
                collected.push((desc.base, desc.size));
                cur = desc.next;
            }
            collected
        });

        let mut last_base = None;
        for &(base, size) in &free_spans {
            assert_eq!(size, self.stride, "free descriptors are single blocks");
            if let Some(prev) = last_base {
                assert!(base > prev, "free list must ascend by span base");
            }
            last_base = Some(base);
        }
        assert_eq!(
            free_spans.len(),
            self.free_blocks(),
            "free block counter must match the free list"
        );
        spans.extend(free_spans);

        self.alloc.with(|head| {
            let mut cur = *head;
            while cur != NIL {
                // SAFETY: the allocated lock is held and `cur` is on the list.
                let desc = unsafe { *self.table.ptr(cur) };
                assert!(
                    desc.size >= self.stride && desc.size % self.stride == 0,
                    "allocated spans are whole multiples of the stride"
                );
                spans.push((desc.base, desc.size));
                cur = desc.next;
            }
        });

        spans.sort_unstable();
        let mut expected = self.base;
        for (base, size) in spans {
            assert_eq!(base, expected, "listed spans must tile the region");
            expected = base + size;
        }
        assert_eq!(
            expected,
            self.base + self.block_count * self.stride,
            "listed spans must cover the whole block region"
        );
    }
}

impl Drop for MemoryPool {
    fn drop(&mut self) {
        // SAFETY: the region was allocated with `region_layout` and is freed
        // exactly once. Outstanding spans dangle from here on; the allocate
        // contract forbids dereferencing them.
        unsafe { alloc::dealloc(self.region.as_ptr(), self.region_layout) };
    }
}

impl std::fmt::Debug for MemoryPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryPool")
            .field("capacity", &self.capacity)
            .field("block_size", &self.stride)
            .field("block_count", &self.block_count)
            .field("free_blocks", &self.free_blocks())
            .field("coalesce_ops", &self.coalesce_count())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KILOBYTE;

    #[test]
    fn test_rejects_invalid_geometry() {
        assert!(MemoryPool::new(0, 64).is_err());
        assert!(MemoryPool::new(1024, 0).is_err());
        assert!(MemoryPool::new(1024, 1024).is_err());
        assert!(MemoryPool::new(1024, 2048).is_err());
        // Rounds past the capacity: 10 bytes cannot hold one 16-byte block.
        assert!(MemoryPool::new(10, 9).is_err());
    }

    #[test]
    fn test_stride_rounds_up_to_eight() {
        let pool = MemoryPool::new(KILOBYTE, 20).unwrap();
        assert_eq!(pool.block_size(), 24);
        assert_eq!(pool.block_count(), 1024 / 24);
    }

    #[test]
    fn test_fast_path_hands_out_consecutive_blocks() {
        let pool = MemoryPool::new(KILOBYTE, 64).unwrap();

        unsafe {
            let p1 = pool.allocate(4).unwrap();
            let p2 = pool.allocate(4).unwrap();
            assert_eq!(p2.as_ptr() as usize - p1.as_ptr() as usize, 64);

            pool.release(p1);
            pool.release(p2);
        }

        assert_eq!(pool.free_blocks(), 16);
        pool.integrity_check();
    }

    #[test]
    fn test_boundary_between_paths() {
        let pool = MemoryPool::new(KILOBYTE, 64).unwrap();

        unsafe {
            // Exactly one stride stays on the fast path.
            let p = pool.allocate(64).unwrap();
            assert_eq!(pool.free_blocks(), 15);
            assert_eq!(pool.coalesce_count(), 0);
            pool.release(p);

            // One byte more coalesces exactly two blocks.
            let p = pool.allocate(65).unwrap();
            assert_eq!(pool.free_blocks(), 14);
            assert_eq!(pool.coalesce_count(), 1);
            pool.release(p);
        }

        assert_eq!(pool.free_blocks(), 16);
        pool.integrity_check();
    }

    #[test]
    fn test_coalesce_consumes_exact_multiples() {
        let pool = MemoryPool::new(KILOBYTE, 64).unwrap();

        unsafe {
            let p = pool.allocate(4 * 64).unwrap();
            assert_eq!(pool.free_blocks(), 12);
            pool.release(p);
        }
        assert_eq!(pool.free_blocks(), 16);
        pool.integrity_check();
    }

    #[test]
    fn test_release_restores_address_order() {
        let pool = MemoryPool::new(KILOBYTE, 64).unwrap();

        unsafe {
            let spans: Vec<_> = (0..16).map(|_| pool.allocate(8).unwrap()).collect();
            assert!(pool.is_exhausted());

            // Free in a scrambled order; the list must stay sorted after
            // every single release.
            for &i in &[5usize, 0, 15, 8, 1, 9, 2, 14, 3, 7, 13, 4, 10, 6, 12, 11] {
                pool.release(spans[i]);
                pool.integrity_check();
            }
        }

        assert_eq!(pool.free_blocks(), 16);
    }

    #[test]
    fn test_isolated_gap_cannot_satisfy_run() {
        let pool = MemoryPool::new(KILOBYTE, 64).unwrap();

        unsafe {
            let _p1 = pool.allocate(64).unwrap();
            let p2 = pool.allocate(64).unwrap();
            let _p3 = pool.allocate(64).unwrap();
            pool.release(p2);

            // 13 tail blocks remain contiguous, but a 14-block request needs
            // the isolated gap too, which adjacency rules out.
            assert_eq!(pool.free_blocks(), 14);
            let err = pool.allocate(14 * 64).unwrap_err();
            assert_eq!(err.kind(), crate::AllocErrorKind::Fragmented);

            // The run that skips the gap still works.
            let big = pool.allocate(13 * 64).unwrap();
            pool.release(big);
        }
        pool.integrity_check();
    }

    #[test]
    fn test_oversized_and_exhausted_requests_fail() {
        let pool = MemoryPool::new(KILOBYTE, 64).unwrap();

        unsafe {
            let err = pool.allocate(KILOBYTE).unwrap_err();
            assert_eq!(err.kind(), crate::AllocErrorKind::ExceedsCapacity);

            let spans: Vec<_> = (0..16).map(|_| pool.allocate(1).unwrap()).collect();
            let err = pool.allocate(1).unwrap_err();
            assert_eq!(err.kind(), crate::AllocErrorKind::Exhausted);

            for span in spans {
                pool.release(span);
            }
        }
        pool.integrity_check();
    }

    #[test]
    fn test_release_of_foreign_pointer_mutates_nothing() {
        let config = PoolConfig {
            track_stats: true,
            ..PoolConfig::default()
        };
        let pool = MemoryPool::with_config(KILOBYTE, 64, config).unwrap();

        unsafe {
            let p = pool.allocate(8).unwrap();

            // Interior pointer of the span: detected, nothing unlinked.
            let interior = NonNull::new_unchecked(p.as_ptr().add(8));
            pool.release(interior);
            assert_eq!(pool.free_blocks(), 15);

            // Pointer outside the region entirely.
            let mut local = 0u8;
            pool.release(NonNull::new_unchecked(&mut local));
            assert_eq!(pool.free_blocks(), 15);

            pool.release(p);

            // Double release of the same span.
            pool.release(p);
            assert_eq!(pool.free_blocks(), 16);
        }

        let stats = pool.stats().unwrap();
        assert_eq!(stats.failed_releases, 3);
        assert_eq!(stats.total_releases, 1);
        pool.integrity_check();
    }

    #[test]
    fn test_zero_allocate_zeroes_and_rejects_empty() {
        let pool = MemoryPool::new(KILOBYTE, 64).unwrap();

        unsafe {
            assert!(pool.zero_allocate(0, 8).is_err());
            assert!(pool.zero_allocate(8, 0).is_err());
            assert!(pool.zero_allocate(usize::MAX, 2).is_err());

            let p = pool.allocate(40).unwrap();
            p.as_ptr().write_bytes(0xAB, 40);
            pool.release(p);

            // The recycled block must come back zeroed.
            let q = pool.zero_allocate(40, 1).unwrap();
            assert_eq!(q, p);
            for i in 0..40 {
                assert_eq!(*q.as_ptr().add(i), 0);
            }
            pool.release(q);
        }
        pool.integrity_check();
    }

    #[test]
    fn test_reallocate_grows_and_never_shrinks() {
        let pool = MemoryPool::new(KILOBYTE, 64).unwrap();

        unsafe {
            let p = pool.zero_allocate(40, 1).unwrap();
            for i in 0..40 {
                *p.as_ptr().add(i) = i as u8;
            }

            // Fits the existing block: same pointer, nothing moves.
            assert_eq!(pool.reallocate(p, 64).unwrap(), p);
            assert_eq!(pool.free_blocks(), 15);

            // Needs two blocks: moves and preserves the old bytes.
            let q = pool.reallocate(p, 100).unwrap();
            assert_ne!(q, p);
            for i in 0..40 {
                assert_eq!(*q.as_ptr().add(i), i as u8);
            }

            assert!(pool.reallocate(q, 0).is_err());
            pool.release(q);
        }

        assert_eq!(pool.free_blocks(), 16);
        pool.integrity_check();
    }

    #[test]
    fn test_reallocate_failure_leaves_original_valid() {
        let pool = MemoryPool::new(KILOBYTE, 64).unwrap();

        unsafe {
            // Claim every block so a growing reallocation cannot succeed.
            let spans: Vec<_> = (0..16).map(|_| pool.allocate(1).unwrap()).collect();

            let err = pool.reallocate(spans[0], 200).unwrap_err();
            assert_eq!(err.kind(), crate::AllocErrorKind::Exhausted);

            // The original span is still outstanding and releasable.
            for span in spans {
                pool.release(span);
            }
        }
        assert_eq!(pool.free_blocks(), 16);
        pool.integrity_check();
    }

    #[test]
    fn test_single_threaded_mode_matches_contracts() {
        let pool =
            MemoryPool::with_config(KILOBYTE, 64, PoolConfig::single_threaded()).unwrap();

        unsafe {
            let p = pool.allocate(200).unwrap();
            assert_eq!(pool.coalesce_count(), 1);
            pool.release(p);
        }
        assert_eq!(pool.free_blocks(), 16);
        pool.integrity_check();
    }

    #[test]
    fn test_randomized_churn_preserves_invariants() {
        use rand::{seq::SliceRandom, Rng};

        let pool = MemoryPool::new(64 * KILOBYTE, 64).unwrap();
        let mut rng = rand::thread_rng();
        let mut live: Vec<NonNull<u8>> = Vec::new();

        for round in 0..200 {
            unsafe {
                for _ in 0..rng.gen_range(1..16) {
                    let n = if rng.gen_bool(0.8) {
                        rng.gen_range(1..=64)
                    } else {
                        rng.gen_range(65..=512)
                    };
                    if let Ok(span) = pool.allocate(n) {
                        live.push(span);
                    }
                }

                live.shuffle(&mut rng);
                let keep = rng.gen_range(0..=live.len());
                for span in live.drain(keep..) {
                    pool.release(span);
                }
            }

            if round % 10 == 0 {
                pool.integrity_check();
            }
        }

        unsafe {
            for span in live.drain(..) {
                pool.release(span);
            }
        }
        assert_eq!(pool.free_blocks(), pool.block_count());
        pool.integrity_check();
    }
}
