//! Smart pointer for pool-allocated values

use core::mem;
use core::ptr::{self, NonNull};

use super::MemoryPool;
use crate::error::{AllocError, AllocResult};
use crate::POOL_ALIGN;

/// RAII smart pointer for a value stored in a pool span.
///
/// Similar to `Box`, but backed by a [`MemoryPool`]: the span is returned to
/// the pool when the `PoolBox` is dropped. The borrow of the pool keeps the
/// value from outliving it.
///
/// # Example
///
/// ```rust
/// use blockpool::{MemoryPool, PoolBox, KILOBYTE};
///
/// let pool = MemoryPool::new(KILOBYTE, 64).unwrap();
/// let mut value = PoolBox::new_in([0u64; 4], &pool).unwrap();
/// value[2] = 7;
/// assert_eq!(value[2], 7);
/// drop(value);
/// assert_eq!(pool.free_blocks(), pool.block_count());
/// ```
pub struct PoolBox<'p, T> {
    ptr: NonNull<T>,
    pool: &'p MemoryPool,
}

impl<'p, T> PoolBox<'p, T> {
    /// Moves `value` into a span allocated from `pool`.
    ///
    /// # Errors
    ///
    /// Fails when `T` is zero sized, when `T` requires more than the pool's
    /// 8-byte alignment, and for every reason
    /// [`allocate`](MemoryPool::allocate) can fail.
    pub fn new_in(value: T, pool: &'p MemoryPool) -> AllocResult<Self> {
        if mem::size_of::<T>() == 0 {
            return Err(
                AllocError::invalid_request("zero-sized values cannot be pooled").report(),
            );
        }
        if mem::align_of::<T>() > POOL_ALIGN {
            return Err(AllocError::invalid_request(
                "value alignment exceeds the pool's natural alignment",
            )
            .report());
        }

        // SAFETY: the span is held until drop, which releases it exactly
        // once before the pool borrow ends.
        let span = unsafe { pool.allocate(mem::size_of::<T>())? };
        let ptr = span.cast::<T>();
        // SAFETY: the span covers size_of::<T>() bytes and block bases are
        // 8-byte aligned, which covers align_of::<T>().
        unsafe { ptr.as_ptr().write(value) };

        Ok(Self { ptr, pool })
    }

    /// Returns a reference to the contained value.
    pub fn as_ref(&self) -> &T {
        // SAFETY: the span stays valid and exclusively ours until drop.
        unsafe { self.ptr.as_ref() }
    }

    /// Returns a mutable reference to the contained value.
    pub fn as_mut(&mut self) -> &mut T {
        // SAFETY: as above, plus we hold `&mut self`.
        unsafe { self.ptr.as_mut() }
    }

    /// Consumes the box and returns the contained value.
    pub fn into_inner(self) -> T {
        // SAFETY: the value was written at construction and not yet moved.
        let value = unsafe { ptr::read(self.ptr.as_ptr()) };

        // Return the span without running the destructor a second time.
        // SAFETY: the span base came from this pool and is released once.
        unsafe { self.pool.release(self.ptr.cast()) };
        mem::forget(self);

        value
    }
}

impl<T> core::ops::Deref for PoolBox<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.as_ref()
    }
}

impl<T> core::ops::DerefMut for PoolBox<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.as_mut()
    }
}

impl<T> Drop for PoolBox<'_, T> {
    fn drop(&mut self) {
        // SAFETY: the value is live and dropped exactly once; the span base
        // came from this pool and is released exactly once.
        unsafe {
            ptr::drop_in_place(self.ptr.as_ptr());
            self.pool.release(self.ptr.cast());
        }
    }
}

impl<T: core::fmt::Debug> core::fmt::Debug for PoolBox<'_, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.as_ref().fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KILOBYTE;

    #[test]
    fn test_round_trip_and_release() {
        let pool = MemoryPool::new(KILOBYTE, 64).unwrap();

        {
            let mut boxed = PoolBox::new_in(41u64, &pool).unwrap();
            *boxed += 1;
            assert_eq!(*boxed, 42);
            assert_eq!(pool.free_blocks(), 15);
        }
        assert_eq!(pool.free_blocks(), 16);
    }

    #[test]
    fn test_into_inner_skips_drop() {
        let pool = MemoryPool::new(KILOBYTE, 64).unwrap();

        let boxed = PoolBox::new_in(String::from("pooled"), &pool).unwrap();
        let value = boxed.into_inner();
        assert_eq!(value, "pooled");
        assert_eq!(pool.free_blocks(), 16);
    }

    #[test]
    fn test_drop_runs_destructor() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        static DROPS: AtomicUsize = AtomicUsize::new(0);

        struct Probe(#[allow(dead_code)] u8);
        impl Drop for Probe {
            fn drop(&mut self) {
                DROPS.fetch_add(1, Ordering::Relaxed);
            }
        }

        let pool = MemoryPool::new(KILOBYTE, 64).unwrap();
        drop(PoolBox::new_in(Probe(0), &pool).unwrap());
        assert_eq!(DROPS.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_rejects_overaligned_values() {
        #[repr(align(32))]
        struct Wide(#[allow(dead_code)] u8);

        let pool = MemoryPool::new(KILOBYTE, 64).unwrap();
        assert!(PoolBox::new_in(Wide(0), &pool).is_err());
    }
}
