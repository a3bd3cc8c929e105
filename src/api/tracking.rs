//! Statistics-collecting decorator over any [`Allocator`].

use std::collections::HashMap;
use std::ptr::NonNull;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crossbeam_queue::ArrayQueue;

use crate::api::allocator::{Allocator, AllocatorMemoryType};
use crate::api::stats::AllocatorStats;
use crate::diagnostics::{self, TA002};
use crate::sync::atomics::AtomicCounter;
use crate::sync::mutex::Mutex;

/// Number of allocation records a [`TrackingAllocator`] keeps by default.
pub const DEFAULT_RECORD_CAPACITY: usize = 1024;

/// One allocation or release observed by a [`TrackingAllocator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocRecord {
    /// Bytes allocated, negative for a release.
    pub alloc_bytes: i64,
    /// Wall-clock time of the event in microseconds since the Unix epoch.
    pub alloc_micros: u64,
}

/// Byte totals reported by [`TrackingAllocator::sizes`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackedSizes {
    /// Bytes allocated over the allocator's lifetime.
    pub total_bytes: u64,
    /// Highest number of bytes live at once.
    pub high_watermark: u64,
    /// Bytes live right now.
    pub still_live_bytes: u64,
}

#[derive(Debug, Clone, Copy)]
struct Chunk {
    requested_bytes: usize,
    allocated_bytes: usize,
    allocation_id: u64,
}

#[derive(Debug, Default)]
struct TrackingState {
    stats: AllocatorStats,
    total_bytes: u64,
    in_use: HashMap<usize, Chunk>,
}

impl TrackingState {
    fn record_alloc(&mut self, bytes: usize) {
        self.total_bytes += bytes as u64;
        self.stats.record_alloc(bytes as u64);
    }
}

/// Wraps an allocator and keeps full usage statistics for it.
///
/// Sizes come from the wrapped allocator when it tracks them. Otherwise, if
/// built with `track_sizes`, the decorator remembers the size of every live
/// region itself. Counters change only on successful operations.
///
/// The most recent allocation records are kept in a fixed-size ring; once it
/// is full each new record displaces the oldest one.
pub struct TrackingAllocator {
    inner: Arc<dyn Allocator>,
    track_sizes_locally: bool,
    state: Mutex<TrackingState>,
    records: Option<ArrayQueue<AllocRecord>>,
    next_allocation_id: AtomicCounter,
}

impl TrackingAllocator {
    /// Wrap `inner`. With `track_sizes` the result always reports
    /// [`tracks_allocation_sizes`](Allocator::tracks_allocation_sizes).
    pub fn new(inner: Arc<dyn Allocator>, track_sizes: bool) -> Self {
        Self::with_record_capacity(inner, track_sizes, DEFAULT_RECORD_CAPACITY)
    }

    /// Like [`new`](Self::new), keeping at most `capacity` allocation
    /// records. A capacity of zero disables the record log.
    pub fn with_record_capacity(
        inner: Arc<dyn Allocator>,
        track_sizes: bool,
        capacity: usize,
    ) -> Self {
        let track_sizes_locally = track_sizes && !inner.tracks_allocation_sizes();
        Self {
            inner,
            track_sizes_locally,
            state: Mutex::new(TrackingState::default()),
            records: (capacity > 0).then(|| ArrayQueue::new(capacity)),
            next_allocation_id: AtomicCounter::new(1),
        }
    }

    /// The wrapped allocator.
    pub fn inner(&self) -> &Arc<dyn Allocator> {
        &self.inner
    }

    /// Lifetime, peak and live byte totals.
    pub fn sizes(&self) -> TrackedSizes {
        let state = self.state.lock();
        TrackedSizes {
            total_bytes: state.total_bytes,
            high_watermark: state.stats.peak_bytes_in_use,
            still_live_bytes: state.stats.bytes_in_use,
        }
    }

    /// Drain the retained allocation records, oldest first.
    pub fn take_records(&self) -> Vec<AllocRecord> {
        let Some(queue) = &self.records else {
            return Vec::new();
        };
        let mut records = Vec::with_capacity(queue.len());
        while let Some(record) = queue.pop() {
            records.push(record);
        }
        records
    }

    /// Number of records currently retained.
    pub fn record_count(&self) -> usize {
        self.records.as_ref().map_or(0, ArrayQueue::len)
    }

    fn push_record(&self, alloc_bytes: i64) {
        let Some(queue) = &self.records else {
            return;
        };
        let alloc_micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0);
        queue.force_push(AllocRecord {
            alloc_bytes,
            alloc_micros,
        });
    }

    fn local_chunk(&self, ptr: NonNull<u8>) -> Option<Chunk> {
        self.state.lock().in_use.get(&(ptr.as_ptr() as usize)).copied()
    }
}

impl Allocator for TrackingAllocator {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn allocate_raw(&self, alignment: usize, num_bytes: usize) -> Option<NonNull<u8>> {
        let ptr = self.inner.allocate_raw(alignment, num_bytes)?;

        if self.inner.tracks_allocation_sizes() {
            let allocated = self.inner.allocated_size(ptr).unwrap_or(num_bytes);
            self.state.lock().record_alloc(allocated);
            self.push_record(allocated as i64);
        } else if self.track_sizes_locally {
            let chunk = Chunk {
                requested_bytes: num_bytes,
                allocated_bytes: num_bytes,
                allocation_id: self.next_allocation_id.increment(),
            };
            let mut state = self.state.lock();
            state.in_use.insert(ptr.as_ptr() as usize, chunk);
            state.record_alloc(num_bytes);
            drop(state);
            self.push_record(num_bytes as i64);
        } else {
            let mut state = self.state.lock();
            state.total_bytes += num_bytes as u64;
            state.stats.num_allocs += 1;
            drop(state);
            self.push_record(num_bytes as i64);
        }

        Some(ptr)
    }

    unsafe fn deallocate_raw(&self, ptr: NonNull<u8>) {
        if self.inner.tracks_allocation_sizes() {
            let allocated = self.inner.allocated_size(ptr).unwrap_or(0);
            self.state.lock().stats.record_dealloc(allocated as u64);
            self.inner.deallocate_raw(ptr);
            self.push_record(-(allocated as i64));
        } else if self.track_sizes_locally {
            // The address may be reused as soon as inner releases it.
            let released = {
                let mut state = self.state.lock();
                let chunk = state.in_use.remove(&(ptr.as_ptr() as usize));
                if let Some(chunk) = chunk {
                    state.stats.record_dealloc(chunk.allocated_bytes as u64);
                }
                chunk.map(|chunk| chunk.allocated_bytes)
            };
            self.inner.deallocate_raw(ptr);
            match released {
                Some(bytes) => self.push_record(-(bytes as i64)),
                None => diagnostics::emit_with_context(&TA002, self.inner.name()),
            }
        } else {
            self.inner.deallocate_raw(ptr);
        }
    }

    fn tracks_allocation_sizes(&self) -> bool {
        self.track_sizes_locally || self.inner.tracks_allocation_sizes()
    }

    fn requested_size(&self, ptr: NonNull<u8>) -> Option<usize> {
        if self.track_sizes_locally {
            self.local_chunk(ptr).map(|chunk| chunk.requested_bytes)
        } else {
            self.inner.requested_size(ptr)
        }
    }

    fn allocated_size(&self, ptr: NonNull<u8>) -> Option<usize> {
        if self.track_sizes_locally {
            self.local_chunk(ptr).map(|chunk| chunk.allocated_bytes)
        } else {
            self.inner.allocated_size(ptr)
        }
    }

    fn allocation_id(&self, ptr: NonNull<u8>) -> Option<u64> {
        if self.track_sizes_locally {
            self.local_chunk(ptr).map(|chunk| chunk.allocation_id)
        } else {
            self.inner.allocation_id(ptr)
        }
    }

    fn stats(&self) -> Option<AllocatorStats> {
        if !self.tracks_allocation_sizes() {
            return self.inner.stats();
        }

        let mut stats = self.state.lock().stats.clone();
        stats.bytes_limit = self.inner.stats().and_then(|inner| inner.bytes_limit);
        Some(stats)
    }

    fn clear_stats(&self) -> bool {
        if !self.tracks_allocation_sizes() {
            return self.inner.clear_stats();
        }
        self.state.lock().stats.clear();
        true
    }

    fn memory_type(&self) -> AllocatorMemoryType {
        self.inner.memory_type()
    }
}
