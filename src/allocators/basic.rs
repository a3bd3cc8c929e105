//! System heap sub-allocator for host memory.

use std::alloc::{alloc, dealloc, Layout};
use std::ptr::NonNull;

use crate::allocators::sub::{MemorySource, SubAllocator, NO_NUMA_AFFINITY};
use crate::api::allocator::AllocatorMemoryType;
use crate::sync::atomics::AtomicGauge;

/// Host memory source backed by the system allocator.
///
/// Alloc visitors run after memory is acquired; free visitors run before it
/// is released. The NUMA node is only reported to visitors, placement itself
/// is left to the visitors or the operating system.
#[derive(Debug)]
pub struct BasicCpuAllocator {
    numa_node: Option<usize>,
    visitors: SubAllocator,

    /// Total bytes currently allocated
    allocated_bytes: AtomicGauge,
}

impl BasicCpuAllocator {
    /// Create a source for `numa_node` with the given visitors.
    pub fn new(numa_node: Option<usize>, visitors: SubAllocator) -> Self {
        Self {
            numa_node,
            visitors,
            allocated_bytes: AtomicGauge::new(0),
        }
    }

    pub fn numa_node(&self) -> Option<usize> {
        self.numa_node
    }

    /// Get total bytes currently allocated.
    pub fn allocated_bytes(&self) -> u64 {
        self.allocated_bytes.get()
    }

    fn visitor_index(&self) -> usize {
        self.numa_node.unwrap_or(NO_NUMA_AFFINITY)
    }

    // Zero-sized requests still get a unique region.
    fn physical_layout(layout: Layout) -> Option<Layout> {
        Layout::from_size_align(layout.size().max(1), layout.align()).ok()
    }
}

impl Default for BasicCpuAllocator {
    fn default() -> Self {
        Self::new(None, SubAllocator::default())
    }
}

impl MemorySource for BasicCpuAllocator {
    fn alloc(&self, layout: Layout) -> Option<NonNull<u8>> {
        let physical = Self::physical_layout(layout)?;

        // SAFETY: `physical` has a non-zero size.
        let ptr = NonNull::new(unsafe { alloc(physical) })?;

        self.allocated_bytes.add(layout.size() as u64);
        self.visitors.visit_alloc(ptr, self.visitor_index(), layout.size());
        Some(ptr)
    }

    unsafe fn free(&self, ptr: NonNull<u8>, layout: Layout) {
        self.visitors.visit_free(ptr, self.visitor_index(), layout.size());

        let Some(physical) = Self::physical_layout(layout) else {
            return;
        };

        #[cfg(feature = "debug")]
        {
            crate::debug::poison::poison_freed(ptr.as_ptr(), physical.size());
        }

        dealloc(ptr.as_ptr(), physical);
        self.allocated_bytes.sub(layout.size() as u64);
    }

    fn memory_type(&self) -> AllocatorMemoryType {
        AllocatorMemoryType::HostPageable
    }
}
