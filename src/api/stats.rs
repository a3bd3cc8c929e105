//! Allocation statistics.

use std::fmt;

/// Point-in-time usage counters reported by an allocator.
///
/// Values are returned by copy; holding a snapshot never observes later
/// allocator activity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllocatorStats {
    /// Number of successful allocations over the allocator's lifetime.
    pub num_allocs: u64,

    /// Bytes currently handed out to callers.
    pub bytes_in_use: u64,

    /// High water mark of `bytes_in_use`.
    pub peak_bytes_in_use: u64,

    /// Largest single allocation ever granted.
    pub largest_alloc_size: u64,

    /// Upper bound enforced by the backend, if it has one.
    pub bytes_limit: Option<u64>,
}

impl AllocatorStats {
    /// Create empty stats with no limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fixed-width multi-line rendering used in logs.
    pub fn debug_string(&self) -> String {
        self.to_string()
    }

    /// Record a successful allocation of `size` bytes.
    pub(crate) fn record_alloc(&mut self, size: u64) {
        self.num_allocs += 1;
        self.bytes_in_use += size;
        self.peak_bytes_in_use = self.peak_bytes_in_use.max(self.bytes_in_use);
        self.largest_alloc_size = self.largest_alloc_size.max(size);
    }

    /// Record a release of `size` bytes.
    pub(crate) fn record_dealloc(&mut self, size: u64) {
        self.bytes_in_use = self.bytes_in_use.saturating_sub(size);
    }

    /// Reset the monotonic counters, keeping the live byte count.
    pub(crate) fn clear(&mut self) {
        self.num_allocs = 0;
        self.peak_bytes_in_use = self.bytes_in_use;
        self.largest_alloc_size = 0;
    }
}

impl fmt::Display for AllocatorStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Limit:        {:>20}", self.bytes_limit.unwrap_or(0))?;
        writeln!(f, "InUse:        {:>20}", self.bytes_in_use)?;
        writeln!(f, "MaxInUse:     {:>20}", self.peak_bytes_in_use)?;
        writeln!(f, "NumAllocs:    {:>20}", self.num_allocs)?;
        writeln!(f, "MaxAllocSize: {:>20}", self.largest_alloc_size)?;
        Ok(())
    }
}
