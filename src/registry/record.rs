//! Allocation records - per-allocation bookkeeping
//!
//! A record never owns its allocation; the collector reconstructs the owning
//! `Box` from `ptr` and `len` when the record is swept.

/// Tracked allocation inside a registry
pub(crate) struct Record<T> {
    pub(crate) ptr: *mut T,
    pub(crate) refcount: usize,
    /// Element count; 0 marks a scalar allocation
    pub(crate) len: usize,
    /// Insertion order, used to list the newest record first
    pub(crate) seq: u64,
}

impl<T> Record<T> {
    #[inline]
    pub(crate) fn new(ptr: *mut T, len: usize, seq: u64) -> Self {
        Self {
            ptr,
            refcount: 1,
            len,
            seq,
        }
    }

    #[inline]
    pub(crate) fn address(&self) -> usize {
        self.ptr as usize
    }

    #[inline]
    pub(crate) fn is_array(&self) -> bool {
        self.len > 0
    }

    #[inline]
    pub(crate) fn is_collectible(&self) -> bool {
        self.refcount == 0
    }

    pub(crate) fn info(&self) -> RecordInfo {
        RecordInfo {
            address: self.address(),
            refcount: self.refcount,
            is_array: self.is_array(),
            len: self.len,
        }
    }
}

/// Snapshot of a record for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordInfo {
    pub address: usize,
    pub refcount: usize,
    pub is_array: bool,
    pub len: usize,
}
