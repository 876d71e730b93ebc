//! # blockpool
//!
//! A fixed-capacity, block-structured memory suballocator for programs that
//! issue very large numbers of allocations whose sizes cluster near a single,
//! user-chosen value.
//!
//! A [`MemoryPool`] carves one contiguous byte region into equally sized
//! blocks and threads their descriptors through two intrusive lists:
//! - a *free list*, kept sorted by ascending span address so that adjacent
//!   free blocks can be fused cheaply, and
//! - an *allocated list*, holding every outstanding span exactly once.
//!
//! Requests no larger than the block stride are served from the free-list
//! head in O(1). Larger requests fuse a run of address-consecutive free
//! blocks into a single span ("coalescing"); releasing such a span splits it
//! back into single blocks and re-threads them in address order.
//!
//! ## Quick start
//!
//! ```rust
//! use blockpool::{MemoryPool, KILOBYTE};
//!
//! let pool = MemoryPool::new(4 * KILOBYTE, 64).expect("pool creation failed");
//!
//! // SAFETY: the span is released before the pool is dropped and is not
//! // accessed afterwards.
//! unsafe {
//!     let span = pool.allocate(48).expect("allocation failed");
//!     span.as_ptr().write_bytes(0x42, 48);
//!     pool.release(span);
//! }
//! ```
//!
//! ## Scope
//!
//! The pool never grows, never returns metadata to the operating system
//! before teardown, and never moves the bytes behind an outstanding span.
//! Alignment is limited to the 8-byte natural alignment of the pool base and
//! block stride. There is no cross-process sharing and no persistence.
//!
//! ## Features
//!
//! - `logging` (default): emit one `tracing` event per failed operation on
//!   the `blockpool` target, prefixed with the `allocator error` marker.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(rust_2018_idioms)]

pub mod error;
pub mod pool;
pub mod utils;

pub use crate::error::{AllocError, AllocErrorKind, AllocResult};
pub use crate::pool::{MemoryPool, PoolBox, PoolConfig, PoolStats};

/// One kilobyte, for sizing pools at the call site.
pub const KILOBYTE: usize = 1024;
/// One megabyte.
pub const MEGABYTE: usize = 1024 * KILOBYTE;
/// One gigabyte.
pub const GIGABYTE: usize = 1024 * MEGABYTE;

/// Natural alignment of the pool base and of every span the pool hands out.
pub const POOL_ALIGN: usize = 8;

/// Convenient re-exports of commonly used types.
pub mod prelude {
    //! One-stop imports for pool users.

    pub use crate::error::{AllocError, AllocErrorKind, AllocResult};
    pub use crate::pool::{MemoryPool, PoolBox, PoolConfig, PoolStats};
    pub use crate::{GIGABYTE, KILOBYTE, MEGABYTE, POOL_ALIGN};
}
