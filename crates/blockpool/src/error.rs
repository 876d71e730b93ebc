//! Allocation error type and the diagnostic channel
//!
//! Every failing pool operation produces one [`AllocError`] and leaves the
//! pool untouched. Errors are reported out-of-band on the diagnostic channel
//! (a `tracing` event with the `allocator error` marker) and returned to the
//! caller through [`AllocResult`]. No operation partially commits.

use core::fmt;

/// Result alias used by every pool operation.
pub type AllocResult<T> = Result<T, AllocError>;

// ============================================================================
// Error kinds
// ============================================================================

/// Categories of allocation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AllocErrorKind {
    /// A precondition was violated (zero or inverted size on pool creation,
    /// zero-product zero-allocation, zero-byte reallocation).
    InvalidRequest,
    /// A size computation overflowed.
    SizeOverflow,
    /// The underlying system allocator refused the backing region.
    OutOfMemory,
    /// The request is at least as large as the whole pool.
    ExceedsCapacity,
    /// The free list is empty.
    Exhausted,
    /// No run of enough address-consecutive free blocks exists.
    Fragmented,
    /// The released or reallocated pointer is not the base of any
    /// outstanding span. Possible double release or foreign pointer.
    UnknownPointer,
}

impl AllocErrorKind {
    /// Returns a static string describing the error.
    pub const fn as_str(&self) -> &'static str {
        match self {
            AllocErrorKind::InvalidRequest => "invalid request",
            AllocErrorKind::SizeOverflow => "size overflow",
            AllocErrorKind::OutOfMemory => "backing region allocation failed",
            AllocErrorKind::ExceedsCapacity => "request exceeds pool capacity",
            AllocErrorKind::Exhausted => "no free blocks available",
            AllocErrorKind::Fragmented => "no contiguous run of free blocks",
            AllocErrorKind::UnknownPointer => "pointer does not match any outstanding span",
        }
    }
}

impl fmt::Display for AllocErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Main error type
// ============================================================================

/// Error produced by a failing pool operation.
///
/// Carries the failure category, the requested size where one exists, and an
/// optional static detail message. The pool is always left in the state it
/// had before the failing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocError {
    kind: AllocErrorKind,
    requested: Option<usize>,
    detail: Option<&'static str>,
}

impl AllocError {
    /// Creates an error of the given kind with no extra context.
    pub const fn new(kind: AllocErrorKind) -> Self {
        Self {
            kind,
            requested: None,
            detail: None,
        }
    }

    /// Precondition failure with a static explanation.
    pub const fn invalid_request(detail: &'static str) -> Self {
        Self {
            kind: AllocErrorKind::InvalidRequest,
            requested: None,
            detail: Some(detail),
        }
    }

    /// Size arithmetic overflowed while computing the request.
    pub const fn size_overflow(detail: &'static str) -> Self {
        Self {
            kind: AllocErrorKind::SizeOverflow,
            requested: None,
            detail: Some(detail),
        }
    }

    /// The system allocator could not provide `requested` bytes.
    pub const fn out_of_memory(requested: usize) -> Self {
        Self {
            kind: AllocErrorKind::OutOfMemory,
            requested: Some(requested),
            detail: None,
        }
    }

    /// Request of `requested` bytes is as large as the whole pool.
    pub const fn exceeds_capacity(requested: usize) -> Self {
        Self {
            kind: AllocErrorKind::ExceedsCapacity,
            requested: Some(requested),
            detail: None,
        }
    }

    /// The free list is empty.
    pub const fn exhausted(requested: usize) -> Self {
        Self {
            kind: AllocErrorKind::Exhausted,
            requested: Some(requested),
            detail: None,
        }
    }

    /// No adequate run of consecutive free blocks.
    pub const fn fragmented(requested: usize) -> Self {
        Self {
            kind: AllocErrorKind::Fragmented,
            requested: Some(requested),
            detail: None,
        }
    }

    /// Bookkeeping failure on release or reallocate.
    pub const fn unknown_pointer(detail: &'static str) -> Self {
        Self {
            kind: AllocErrorKind::UnknownPointer,
            requested: None,
            detail: Some(detail),
        }
    }

    /// Returns the failure category.
    pub const fn kind(&self) -> AllocErrorKind {
        self.kind
    }

    /// Returns the requested size, if the failure had one.
    pub const fn requested(&self) -> Option<usize> {
        self.requested
    }

    /// Emits this error on the diagnostic channel and returns it, so call
    /// sites can report and propagate in one expression.
    ///
    /// The message is prefixed with the `allocator error` marker. The exact
    /// wording past the marker is not part of the contract.
    #[must_use]
    pub fn report(self) -> Self {
        #[cfg(feature = "logging")]
        tracing::error!(target: "blockpool", "allocator error: {self}");
        self
    }
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(requested) = self.requested {
            write!(f, " (requested {requested} bytes)")?;
        }
        if let Some(detail) = self.detail {
            write!(f, ": {detail}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AllocError {}

// ============================================================================
// Tests
// ============================================================================
