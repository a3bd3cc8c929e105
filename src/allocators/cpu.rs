//! Default host allocator.

use std::alloc::Layout;
use std::collections::HashMap;
use std::ptr::NonNull;

use crate::allocators::basic::BasicCpuAllocator;
use crate::allocators::sub::MemorySource;
use crate::api::allocator::{Allocator, AllocatorMemoryType, ALLOCATOR_ALIGNMENT};
use crate::api::config::AllocConfig;
use crate::api::stats::AllocatorStats;
use crate::diagnostics::{self, TA001};
use crate::sync::atomics::AtomicCounter;
use crate::sync::mutex::Mutex;
use crate::util::size::format_bytes;

#[derive(Debug, Default)]
struct CpuState {
    layouts: HashMap<usize, Layout>,
    stats: AllocatorStats,
    /// Bytes admitted under the limit whose memory is still being acquired.
    pending_bytes: u64,
}

/// Host allocator over a [`MemorySource`], used when nothing better is
/// registered for the CPU backend.
///
/// It remembers each region's layout only to release it, and does not claim
/// to track allocation sizes, so full-stats selection wraps it.
///
/// The memory source (and any visitors beneath it) runs without the internal
/// lock held, so visitors may call back into this allocator.
pub struct CpuAllocator {
    config: AllocConfig,
    source: Box<dyn MemorySource>,
    state: Mutex<CpuState>,
    large_allocation_warnings: AtomicCounter,
}

impl CpuAllocator {
    /// Allocator over the system heap with no NUMA affinity.
    pub fn new(config: AllocConfig) -> Self {
        Self::with_source(config, Box::new(BasicCpuAllocator::default()))
    }

    /// Allocator over a custom memory source.
    pub fn with_source(config: AllocConfig, source: Box<dyn MemorySource>) -> Self {
        let stats = AllocatorStats {
            bytes_limit: config.bytes_limit,
            ..AllocatorStats::default()
        };
        Self {
            config,
            source,
            state: Mutex::new(CpuState {
                layouts: HashMap::new(),
                stats,
                pending_bytes: 0,
            }),
            large_allocation_warnings: AtomicCounter::new(0),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &AllocConfig {
        &self.config
    }

    /// Number of regions currently handed out.
    pub fn live_allocations(&self) -> usize {
        self.state.lock().layouts.len()
    }

    fn warn_if_large(&self, num_bytes: usize) {
        if num_bytes <= self.config.large_allocation_warning_bytes {
            return;
        }
        if self.large_allocation_warnings.increment() < self.config.max_large_allocation_warnings {
            diagnostics::emit_with_context(
                &TA001,
                &format!("{} allocation of {}", self.name(), format_bytes(num_bytes)),
            );
        }
    }
}

impl Allocator for CpuAllocator {
    fn name(&self) -> &str {
        "cpu"
    }

    fn allocate_raw(&self, alignment: usize, num_bytes: usize) -> Option<NonNull<u8>> {
        let layout = Layout::from_size_align(num_bytes, alignment.max(ALLOCATOR_ALIGNMENT)).ok()?;
        self.warn_if_large(num_bytes);

        {
            let mut state = self.state.lock();
            if let Some(limit) = self.config.bytes_limit {
                if state.stats.bytes_in_use + state.pending_bytes + num_bytes as u64 > limit {
                    return None;
                }
            }
            state.pending_bytes += num_bytes as u64;
        }

        let result = self.source.alloc(layout);

        let mut state = self.state.lock();
        state.pending_bytes -= num_bytes as u64;
        let ptr = result?;
        state.layouts.insert(ptr.as_ptr() as usize, layout);
        state.stats.record_alloc(num_bytes as u64);
        Some(ptr)
    }

    unsafe fn deallocate_raw(&self, ptr: NonNull<u8>) {
        let layout = {
            let mut state = self.state.lock();
            let Some(layout) = state.layouts.remove(&(ptr.as_ptr() as usize)) else {
                return;
            };
            state.stats.record_dealloc(layout.size() as u64);
            layout
        };
        self.source.free(ptr, layout);
    }

    fn stats(&self) -> Option<AllocatorStats> {
        if !self.config.collect_stats {
            return None;
        }
        Some(self.state.lock().stats.clone())
    }

    fn clear_stats(&self) -> bool {
        if !self.config.collect_stats {
            return false;
        }
        self.state.lock().stats.clear();
        true
    }

    fn memory_type(&self) -> AllocatorMemoryType {
        self.source.memory_type()
    }
}
