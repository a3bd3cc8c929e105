//! # tensoralloc
//!
//! Pluggable, attribute-aware memory allocation for runtimes that serve
//! several kinds of memory behind one interface.
//!
//! ## Features
//!
//! - One [`Allocator`] capability for host, persistent ("pmem") and "ev" memory
//! - Process-wide, lazily resolved allocator per backend
//! - Transparent full statistics via [`TrackingAllocator`], switched on at runtime
//! - NUMA-aware CPU allocation through an installable [`ProcessState`]
//! - Sub-allocators with ordered alloc/free visitors for page-level side effects
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tensoralloc::{cpu_allocator, enable_cpu_allocator_full_stats, ALLOCATOR_ALIGNMENT};
//!
//! enable_cpu_allocator_full_stats(true);
//!
//! let alloc = cpu_allocator(None);
//! let ptr = alloc.allocate_raw(ALLOCATOR_ALIGNMENT, 1024).expect("out of memory");
//! println!("{}", alloc.stats().unwrap_or_default());
//! unsafe { alloc.deallocate_raw(ptr) };
//! ```
//!
//! ## Ordering requirement
//!
//! A NUMA-aware [`ProcessState`] must be installed with
//! [`FactoryRegistry::set_process_state`] before the first call to
//! [`cpu_allocator`]. Installing it later has no effect for the rest of the
//! process.

pub mod allocators;
pub mod api;
pub mod core;
pub mod diagnostics;
pub mod error;

#[cfg(feature = "debug")]
mod debug;
#[allow(dead_code)]
mod sync;
mod util;

// Re-export public API at crate root for convenience
pub use api::allocator::{Allocator, AllocatorExt, AllocatorMemoryType, ALLOCATOR_ALIGNMENT};
pub use api::attributes::AllocatorAttributes;
pub use api::config::AllocConfig;
pub use api::stats::AllocatorStats;
pub use api::tracking::{AllocRecord, TrackedSizes, TrackingAllocator, DEFAULT_RECORD_CAPACITY};

// Allocation backends
pub use allocators::basic::BasicCpuAllocator;
pub use allocators::cpu::CpuAllocator;
pub use allocators::sub::{MemorySource, SubAllocator, Visitor, NO_NUMA_AFFINITY};

// Registry and selection
pub use crate::core::global::{
    cpu_allocator, cpu_allocator_base, cpu_allocator_full_stats_enabled,
    enable_cpu_allocator_full_stats, ev_allocator, init_from_env, pmem_allocator,
    AllocatorSelection,
};
pub use crate::core::registry::{
    AllocatorFactory, AllocatorRegistry, Backend, FactoryRegistry, ProcessState,
};

pub use error::RegistryError;
