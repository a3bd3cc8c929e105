//! The allocator capability every backend and decorator implements.

use std::mem;
use std::ptr::NonNull;

use crate::api::stats::AllocatorStats;

/// Minimum alignment of every region returned by an [`Allocator`].
///
/// Callers never request less; implementations may round smaller requests up.
pub const ALLOCATOR_ALIGNMENT: usize = 64;

/// Kind of memory an allocator hands out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum AllocatorMemoryType {
    /// Not reported by the allocator.
    #[default]
    Unknown,
    /// Device-local memory.
    Device,
    /// Pageable host memory.
    HostPageable,
    /// Page-locked host memory.
    HostPinned,
}

/// A memory allocator that can be selected at runtime.
///
/// Implementations must be usable from many threads at once.
pub trait Allocator: Send + Sync {
    /// Human-readable allocator name, used in logs.
    fn name(&self) -> &str;

    /// Allocate `num_bytes` aligned to at least `alignment`.
    ///
    /// Returns `None` if the request cannot be satisfied. A failed request
    /// never hands out a partial region.
    fn allocate_raw(&self, alignment: usize, num_bytes: usize) -> Option<NonNull<u8>>;

    /// Release a region.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by `allocate_raw` on this same instance
    /// and not released since. Anything else is undefined behavior.
    unsafe fn deallocate_raw(&self, ptr: NonNull<u8>);

    /// Whether this allocator keeps accurate per-allocation sizes.
    ///
    /// Global selection wraps allocators that return `false` here when full
    /// stats collection is enabled.
    fn tracks_allocation_sizes(&self) -> bool {
        false
    }

    /// Size originally requested for `ptr`, if known.
    fn requested_size(&self, _ptr: NonNull<u8>) -> Option<usize> {
        None
    }

    /// Size actually reserved for `ptr`, if known. Never smaller than the
    /// requested size.
    fn allocated_size(&self, ptr: NonNull<u8>) -> Option<usize> {
        self.requested_size(ptr)
    }

    /// Unique identifier of the live allocation at `ptr`, if assigned.
    fn allocation_id(&self, _ptr: NonNull<u8>) -> Option<u64> {
        None
    }

    /// Current usage counters. `None` means this allocator does not collect them.
    fn stats(&self) -> Option<AllocatorStats> {
        None
    }

    /// Reset monotonic counters. Returns `false` if unsupported.
    fn clear_stats(&self) -> bool {
        false
    }

    fn memory_type(&self) -> AllocatorMemoryType {
        AllocatorMemoryType::Unknown
    }
}

/// Typed convenience methods for any [`Allocator`].
pub trait AllocatorExt: Allocator {
    /// Allocate room for `count` values of `T`.
    ///
    /// Returns `None` on size overflow or allocation failure.
    fn allocate_array<T>(&self, count: usize) -> Option<NonNull<T>> {
        let bytes = mem::size_of::<T>().checked_mul(count)?;
        let alignment = mem::align_of::<T>().max(ALLOCATOR_ALIGNMENT);
        self.allocate_raw(alignment, bytes).map(|ptr| ptr.cast())
    }

    /// Release an array from [`allocate_array`](Self::allocate_array).
    ///
    /// # Safety
    ///
    /// Same contract as [`Allocator::deallocate_raw`]. Values are not dropped.
    unsafe fn deallocate_array<T>(&self, ptr: NonNull<T>) {
        self.deallocate_raw(ptr.cast());
    }
}

impl<A: Allocator + ?Sized> AllocatorExt for A {}
