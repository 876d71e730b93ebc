//! Descriptor table and lock-governed list heads
//!
//! # Safety
//!
//! The pool keeps one descriptor per stride-sized block in a contiguous
//! table indexed by block number. Descriptors are threaded through two
//! intrusive singly linked lists by index:
//! - the free-list mutex covers the free head and the `next` links of every
//!   descriptor currently on the free list,
//! - the allocated-list mutex covers the allocated head and the links of
//!   every descriptor currently on that list.
//!
//! A descriptor detached from both lists is in the custody of exactly one
//! thread, which may mutate its `base` and `size` fields without any lock.
//! The table therefore needs interior mutability but no lock of its own.

use core::cell::UnsafeCell;

use parking_lot::Mutex;

/// Sentinel index terminating a list.
pub(crate) const NIL: u32 = u32::MAX;

/// Metadata for one contiguous span of the pool's byte region.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BlockDesc {
    /// Address of the first byte of the span.
    pub base: usize,
    /// Span size in bytes. Always a positive multiple of the pool stride
    /// while the descriptor is on a list; zero marks a retired descriptor.
    pub size: usize,
    /// Index of the next descriptor on whichever list holds this one.
    pub next: u32,
}

/// Interior-mutable slot for one descriptor.
#[repr(transparent)]
pub(crate) struct DescCell(UnsafeCell<BlockDesc>);

// SAFETY: DescCell is Sync even though UnsafeCell is not.
// - A descriptor on a list is only reached by walking from that list's head,
//   which requires holding the corresponding mutex.
// - A descriptor off both lists is owned by the single thread that detached
//   it, so its fields see no concurrent access.
// - A retired descriptor is reachable from nowhere until the thread that
//   releases the covering span revives it, again in exclusive custody.
unsafe impl Sync for DescCell {}

/// Descriptor table, one slot per stride-sized block.
pub(crate) struct DescTable {
    cells: Box<[DescCell]>,
}

impl DescTable {
    /// Builds the table for `count` blocks starting at `base`, every slot a
    /// single free block linked to its successor in ascending index order.
    pub(crate) fn new(base: usize, stride: usize, count: usize) -> Self {
        debug_assert!(count > 0);
        debug_assert!(count < NIL as usize);

        let cells = (0..count)
            .map(|i| {
                let next = if i + 1 < count { (i + 1) as u32 } else { NIL };
                DescCell(UnsafeCell::new(BlockDesc {
                    base: base + i * stride,
                    size: stride,
                    next,
                }))
            })
            .collect();

        Self { cells }
    }

    /// Raw pointer to the descriptor at `idx`.
    ///
    /// # Safety
    ///
    /// The caller must hold the mutex of the list the descriptor is on, or
    /// have the descriptor in detached custody, before dereferencing.
    #[inline]
    pub(crate) fn ptr(&self, idx: u32) -> *mut BlockDesc {
        debug_assert!((idx as usize) < self.cells.len());
        self.cells[idx as usize].0.get()
    }

    /// Number of slots in the table.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.cells.len()
    }
}

/// One list head behind its mutex, with optional lock elision.
///
/// The elided mode backs the pool's single-threaded configuration: the mutex
/// still exists but is never acquired.
pub(crate) struct ListLock {
    head: Mutex<u32>,
    elide: bool,
}

impl ListLock {
    pub(crate) fn new(first: u32, thread_safe: bool) -> Self {
        Self {
            head: Mutex::new(first),
            elide: !thread_safe,
        }
    }

    /// Runs `f` with exclusive access to the list head.
    ///
    /// In elided mode the head is accessed directly. This is sound only
    /// under the single-threaded contract stated on
    /// [`PoolConfig::single_threaded`](super::PoolConfig::single_threaded):
    /// the caller asserts that no two threads enter the pool concurrently.
    #[inline]
    pub(crate) fn with<R>(&self, f: impl FnOnce(&mut u32) -> R) -> R {
        if self.elide {
            // SAFETY: single-threaded contract; no other thread can be
            // inside any pool operation, so the head is not aliased.
            f(unsafe { &mut *self.head.data_ptr() })
        } else {
            f(&mut *self.head.lock())
        }
    }
}
