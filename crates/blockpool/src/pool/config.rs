//! Pool configuration

/// Configuration for a [`MemoryPool`](super::MemoryPool).
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    /// Guard the free and allocated lists with their mutexes.
    ///
    /// When `false` the pool elides every lock acquisition; the caller
    /// asserts that no two threads enter the pool concurrently. All other
    /// contracts are unchanged.
    pub thread_safe: bool,

    /// Maintain allocation and release counters for [`stats`].
    ///
    /// The coalesce counter is maintained regardless of this flag.
    ///
    /// [`stats`]: super::MemoryPool::stats
    pub track_stats: bool,

    /// Fill pattern written over the whole region at creation.
    pub alloc_pattern: Option<u8>,

    /// Fill pattern written over a span when it is released.
    pub dealloc_pattern: Option<u8>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            thread_safe: true,
            track_stats: cfg!(debug_assertions),
            alloc_pattern: None,
            dealloc_pattern: if cfg!(debug_assertions) { Some(0xDD) } else { None },
        }
    }
}

impl PoolConfig {
    /// Production configuration. Thread safe, no counters, no fill patterns.
    pub fn production() -> Self {
        Self {
            thread_safe: true,
            track_stats: false,
            alloc_pattern: None,
            dealloc_pattern: None,
        }
    }

    /// Debug configuration. Counters on, poison fills on.
    pub fn debug() -> Self {
        Self {
            thread_safe: true,
            track_stats: true,
            alloc_pattern: Some(0xCC),
            dealloc_pattern: Some(0xDD),
        }
    }

    /// Single-threaded configuration. Lock acquisition is elided on every
    /// path; the caller asserts that the pool is never entered concurrently.
    pub fn single_threaded() -> Self {
        Self {
            thread_safe: false,
            ..Self::default()
        }
    }
}
