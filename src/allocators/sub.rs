//! Sub-allocators: raw memory sources with allocation lifecycle visitors.
//!
//! A sub-allocator sits beneath a higher-level allocator and is called only
//! when memory is physically acquired from or returned to its source.
//! Visitors registered at construction observe those events, for side
//! effects such as locking pages, NUMA binding or poisoning.

use std::alloc::Layout;
use std::fmt;
use std::ptr::NonNull;

use crate::api::allocator::AllocatorMemoryType;

/// Visitor index used when memory has no NUMA affinity.
pub const NO_NUMA_AFFINITY: usize = usize::MAX;

/// Callback invoked with `(ptr, index, num_bytes)`.
///
/// `index` is the NUMA node or device the memory belongs to. Visitors may be
/// invoked concurrently from several threads for different regions.
pub type Visitor = Box<dyn Fn(NonNull<u8>, usize, usize) + Send + Sync>;

/// Ordered alloc and free visitors.
///
/// Alloc visitors run in registration order, free visitors in reverse
/// registration order, so a visitor pair `A, B` acquires in `A, B` order and
/// releases in `B, A` order. Nothing is promised across different instances.
#[derive(Default)]
pub struct SubAllocator {
    alloc_visitors: Vec<Visitor>,
    free_visitors: Vec<Visitor>,
}

impl SubAllocator {
    /// Create a sub-allocator with fixed visitor lists.
    pub fn new(alloc_visitors: Vec<Visitor>, free_visitors: Vec<Visitor>) -> Self {
        Self {
            alloc_visitors,
            free_visitors,
        }
    }

    /// Run every alloc visitor, first registered first.
    ///
    /// Panics from a visitor propagate to the caller.
    pub fn visit_alloc(&self, ptr: NonNull<u8>, index: usize, num_bytes: usize) {
        for visitor in &self.alloc_visitors {
            visitor(ptr, index, num_bytes);
        }
    }

    /// Run every free visitor, last registered first.
    pub fn visit_free(&self, ptr: NonNull<u8>, index: usize, num_bytes: usize) {
        for visitor in self.free_visitors.iter().rev() {
            visitor(ptr, index, num_bytes);
        }
    }

    pub fn alloc_visitor_count(&self) -> usize {
        self.alloc_visitors.len()
    }

    pub fn free_visitor_count(&self) -> usize {
        self.free_visitors.len()
    }
}

impl fmt::Debug for SubAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubAllocator")
            .field("alloc_visitors", &self.alloc_visitors.len())
            .field("free_visitors", &self.free_visitors.len())
            .finish()
    }
}

/// A raw memory source used underneath an allocator.
pub trait MemorySource: Send + Sync {
    /// Acquire memory for `layout`. `None` on failure.
    fn alloc(&self, layout: Layout) -> Option<NonNull<u8>>;

    /// Return memory to the source.
    ///
    /// # Safety
    ///
    /// `ptr` must come from `alloc` on this source with the same `layout`.
    unsafe fn free(&self, ptr: NonNull<u8>, layout: Layout);

    fn memory_type(&self) -> AllocatorMemoryType {
        AllocatorMemoryType::Unknown
    }
}
