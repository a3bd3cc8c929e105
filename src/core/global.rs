//! Process-wide allocator selection.
//!
//! Each backend has one slot that is resolved from the registry on first use
//! and cached for the rest of the process. While full stats collection is
//! enabled, the first request that finds an untracked allocator in a slot
//! replaces it with a [`TrackingAllocator`] around it; every later request
//! returns that wrapper. Slots are never unwrapped.
//!
//! # Ordering requirement
//!
//! The NUMA-aware [`ProcessState`] is looked up once, on the first CPU
//! allocator request. A process state installed after that request is never
//! used by the selection. Install it before asking for any CPU allocator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use crate::api::allocator::Allocator;
use crate::api::config::parse_flag;
use crate::api::tracking::TrackingAllocator;
use crate::core::registry::{AllocatorRegistry, Backend, FactoryRegistry, ProcessState};
use crate::diagnostics::{self, TA101};
use crate::sync::mutex::Mutex;

/// Environment variable read by [`init_from_env`].
pub const ENV_FULL_STATS: &str = "TENSORALLOC_FULL_STATS";

/// A resolved slot. The mutex serializes the check-and-wrap upgrade.
struct CachedAllocator {
    backend: Backend,
    current: Mutex<Arc<dyn Allocator>>,
}

impl CachedAllocator {
    fn resolved(backend: Backend, allocator: Arc<dyn Allocator>) -> Self {
        log::debug!(
            target: "tensoralloc",
            "resolved {} allocator '{}'",
            backend,
            allocator.name()
        );
        Self {
            backend,
            current: Mutex::new(allocator),
        }
    }

    fn get(&self, full_stats: bool) -> Arc<dyn Allocator> {
        let mut current = self.current.lock();
        if full_stats && !current.tracks_allocation_sizes() {
            let wrapped: Arc<dyn Allocator> = Arc::new(tracking_wrapper(Arc::clone(&current)));
            *current = wrapped;
            diagnostics::emit_with_context(&TA101, self.backend.as_str());
        }
        Arc::clone(&current)
    }
}

/// Wrapper installed in a slot by the full stats upgrade.
fn tracking_wrapper(inner: Arc<dyn Allocator>) -> TrackingAllocator {
    TrackingAllocator::new(inner, true)
}

/// Lazily resolved allocators for every backend, plus the full stats flag.
///
/// The process-wide accessors in this module use one instance bound to
/// [`FactoryRegistry::singleton`]. Separate instances are independent.
///
/// Callers that kept an allocator obtained before a tracking upgrade keep
/// using the unwrapped instance; only later requests see the wrapper.
pub struct AllocatorSelection {
    registry: Arc<dyn AllocatorRegistry>,
    full_stats: AtomicBool,
    process_state: OnceLock<Option<Arc<dyn ProcessState>>>,
    cpu: OnceLock<CachedAllocator>,
    pmem: OnceLock<Option<CachedAllocator>>,
    ev: OnceLock<Option<CachedAllocator>>,
}

impl AllocatorSelection {
    /// Selection resolving through `registry`, with full stats disabled.
    pub fn new(registry: Arc<dyn AllocatorRegistry>) -> Self {
        Self {
            registry,
            full_stats: AtomicBool::new(false),
            process_state: OnceLock::new(),
            cpu: OnceLock::new(),
            pmem: OnceLock::new(),
            ev: OnceLock::new(),
        }
    }

    /// Turn full stats collection on or off for allocators requested from now on.
    pub fn enable_full_stats(&self, enable: bool) {
        self.full_stats.store(enable, Ordering::SeqCst);
    }

    pub fn full_stats_enabled(&self) -> bool {
        self.full_stats.load(Ordering::SeqCst)
    }

    /// The registry's CPU allocator, ignoring any NUMA-aware source.
    pub fn cpu_allocator_base(&self) -> Arc<dyn Allocator> {
        self.cpu
            .get_or_init(|| CachedAllocator::resolved(Backend::Cpu, self.registry.get_allocator()))
            .get(self.full_stats_enabled())
    }

    /// CPU allocator for `numa_node` (`None` for no preference).
    ///
    /// Delegates to the registry's process state if one was installed before
    /// the first call; otherwise every node shares the base CPU allocator.
    pub fn cpu_allocator(&self, numa_node: Option<usize>) -> Arc<dyn Allocator> {
        let process_state = self
            .process_state
            .get_or_init(|| self.registry.process_state());

        match process_state {
            Some(process_state) => process_state.get_cpu_allocator(numa_node),
            None => self.cpu_allocator_base(),
        }
    }

    /// Persistent memory allocator, or `None` if the registry has none.
    pub fn pmem_allocator(&self) -> Option<Arc<dyn Allocator>> {
        self.pmem
            .get_or_init(|| {
                self.registry
                    .get_pmem_allocator()
                    .map(|a| CachedAllocator::resolved(Backend::Pmem, a))
            })
            .as_ref()
            .map(|slot| slot.get(self.full_stats_enabled()))
    }

    /// "ev" memory allocator, or `None` if the registry has none.
    pub fn ev_allocator(&self) -> Option<Arc<dyn Allocator>> {
        self.ev
            .get_or_init(|| {
                self.registry
                    .get_ev_allocator()
                    .map(|a| CachedAllocator::resolved(Backend::Ev, a))
            })
            .as_ref()
            .map(|slot| slot.get(self.full_stats_enabled()))
    }

    /// Whether the slot for `backend` has been resolved (even to "unavailable").
    pub fn is_resolved(&self, backend: Backend) -> bool {
        match backend {
            Backend::Cpu => self.cpu.get().is_some(),
            Backend::Pmem => self.pmem.get().is_some(),
            Backend::Ev => self.ev.get().is_some(),
        }
    }
}

static GLOBAL: OnceLock<AllocatorSelection> = OnceLock::new();

fn global() -> &'static AllocatorSelection {
    GLOBAL.get_or_init(|| {
        let registry: Arc<dyn AllocatorRegistry> = FactoryRegistry::singleton().clone();
        AllocatorSelection::new(registry)
    })
}

/// Enable or disable full stats collection for the process-wide allocators.
pub fn enable_cpu_allocator_full_stats(enable: bool) {
    global().enable_full_stats(enable);
}

/// Whether full stats collection is enabled process-wide.
pub fn cpu_allocator_full_stats_enabled() -> bool {
    global().full_stats_enabled()
}

/// The process-wide CPU allocator, ignoring any NUMA-aware source.
pub fn cpu_allocator_base() -> Arc<dyn Allocator> {
    global().cpu_allocator_base()
}

/// The process-wide CPU allocator for `numa_node`.
///
/// See the module documentation for the process state ordering requirement.
pub fn cpu_allocator(numa_node: Option<usize>) -> Arc<dyn Allocator> {
    global().cpu_allocator(numa_node)
}

/// The process-wide persistent memory allocator, if configured.
pub fn pmem_allocator() -> Option<Arc<dyn Allocator>> {
    global().pmem_allocator()
}

/// The process-wide "ev" memory allocator, if configured.
pub fn ev_allocator() -> Option<Arc<dyn Allocator>> {
    global().ev_allocator()
}

/// Initialize full stats collection from `TENSORALLOC_FULL_STATS`.
///
/// - "1", "true", "on" -> enabled
/// - "0", "false", "off" -> disabled
///
/// Unset or unrecognized values leave the flag unchanged.
pub fn init_from_env() {
    if let Some(enable) = std::env::var(ENV_FULL_STATS).ok().as_deref().and_then(parse_flag) {
        enable_cpu_allocator_full_stats(enable);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocators::cpu::CpuAllocator;
    use crate::api::allocator::ALLOCATOR_ALIGNMENT;
    use crate::api::config::AllocConfig;
    use crate::api::tracking::DEFAULT_RECORD_CAPACITY;
    use crate::diagnostics::CollectingSink;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Barrier;
    use std::thread;

    /// Registry that builds a new allocator on every call and counts them.
    #[derive(Default)]
    struct CountingRegistry {
        cpu_builds: AtomicUsize,
        pmem_builds: AtomicUsize,
        with_pmem: bool,
        process_state: Mutex<Option<Arc<dyn ProcessState>>>,
    }

    impl CountingRegistry {
        fn with_pmem() -> Self {
            Self {
                with_pmem: true,
                ..Self::default()
            }
        }
    }

    impl AllocatorRegistry for CountingRegistry {
        fn get_allocator(&self) -> Arc<dyn Allocator> {
            self.cpu_builds.fetch_add(1, Ordering::SeqCst);
            Arc::new(CpuAllocator::new(AllocConfig::default()))
        }

        fn get_pmem_allocator(&self) -> Option<Arc<dyn Allocator>> {
            if !self.with_pmem {
                return None;
            }
            self.pmem_builds.fetch_add(1, Ordering::SeqCst);
            Some(Arc::new(CpuAllocator::new(AllocConfig::default())))
        }

        fn get_ev_allocator(&self) -> Option<Arc<dyn Allocator>> {
            None
        }

        fn process_state(&self) -> Option<Arc<dyn ProcessState>> {
            self.process_state.lock().clone()
        }
    }

    /// NUMA-aware source with one allocator per node.
    struct PerNode {
        nodes: Vec<Arc<dyn Allocator>>,
        any: Arc<dyn Allocator>,
    }

    impl PerNode {
        fn new(count: usize) -> Self {
            let make = || -> Arc<dyn Allocator> { Arc::new(CpuAllocator::new(AllocConfig::default())) };
            Self {
                nodes: (0..count).map(|_| make()).collect(),
                any: make(),
            }
        }
    }

    impl ProcessState for PerNode {
        fn get_cpu_allocator(&self, numa_node: Option<usize>) -> Arc<dyn Allocator> {
            numa_node
                .and_then(|node| self.nodes.get(node))
                .map_or_else(|| Arc::clone(&self.any), Arc::clone)
        }
    }

    fn selection(registry: &Arc<CountingRegistry>) -> AllocatorSelection {
        let registry: Arc<dyn AllocatorRegistry> = registry.clone();
        AllocatorSelection::new(registry)
    }

    #[test]
    fn test_repeated_calls_return_same_instance() {
        let registry = Arc::new(CountingRegistry::default());
        let selection = selection(&registry);

        let a = selection.cpu_allocator(None);
        let b = selection.cpu_allocator(None);
        let c = selection.cpu_allocator(Some(3));

        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a, &c));
        assert_eq!(registry.cpu_builds.load(Ordering::SeqCst), 1);
        assert!(selection.is_resolved(Backend::Cpu));
    }

    #[test]
    fn test_full_stats_upgrades_once() {
        let sink = Arc::new(CollectingSink::new());
        diagnostics::set_thread_sink(Some(sink.clone()));

        let registry = Arc::new(CountingRegistry::default());
        let selection = selection(&registry);

        let before = selection.cpu_allocator(None);
        assert!(!before.tracks_allocation_sizes());

        selection.enable_full_stats(true);
        selection.enable_full_stats(true);
        let after = selection.cpu_allocator(None);
        assert!(after.tracks_allocation_sizes());
        assert!(!Arc::ptr_eq(&before, &after));

        for _ in 0..10 {
            assert!(Arc::ptr_eq(&after, &selection.cpu_allocator(None)));
        }
        assert_eq!(registry.cpu_builds.load(Ordering::SeqCst), 1);
        diagnostics::set_thread_sink(None);
        assert_eq!(sink.contexts_for("TA101"), vec!["cpu".to_string()]);

        // The instance held from before the upgrade stays usable and untracked.
        let ptr = before.allocate_raw(ALLOCATOR_ALIGNMENT, 64).unwrap();
        unsafe { before.deallocate_raw(ptr) };
        assert!(!before.tracks_allocation_sizes());
    }

    #[test]
    fn test_upgrade_wrapper_keeps_bounded_records() {
        let inner: Arc<dyn Allocator> = Arc::new(CpuAllocator::new(AllocConfig::default()));
        let wrapper = tracking_wrapper(inner);

        for _ in 0..(DEFAULT_RECORD_CAPACITY * 4) {
            let ptr = wrapper.allocate_raw(ALLOCATOR_ALIGNMENT, 128).unwrap();
            unsafe { wrapper.deallocate_raw(ptr) };
        }

        assert!(wrapper.tracks_allocation_sizes());
        assert_eq!(wrapper.record_count(), DEFAULT_RECORD_CAPACITY);
        assert_eq!(wrapper.stats().unwrap().bytes_in_use, 0);
    }

    #[test]
    fn test_disabling_never_unwraps() {
        let registry = Arc::new(CountingRegistry::default());
        let selection = selection(&registry);

        selection.enable_full_stats(true);
        let tracked = selection.cpu_allocator(None);
        selection.enable_full_stats(false);

        let again = selection.cpu_allocator(None);
        assert!(Arc::ptr_eq(&tracked, &again));
        assert!(again.tracks_allocation_sizes());
    }

    #[test]
    fn test_tracked_allocator_reports_stats() {
        let registry = Arc::new(CountingRegistry::default());
        let selection = selection(&registry);
        selection.enable_full_stats(true);

        let alloc = selection.cpu_allocator(None);
        let ptr = alloc.allocate_raw(ALLOCATOR_ALIGNMENT, 4096).unwrap();
        let stats = alloc.stats().unwrap();
        assert_eq!(stats.num_allocs, 1);
        assert_eq!(stats.bytes_in_use, 4096);

        unsafe { alloc.deallocate_raw(ptr) };
        assert_eq!(alloc.stats().unwrap().bytes_in_use, 0);
    }

    #[test]
    fn test_missing_backends_are_none() {
        let registry = Arc::new(CountingRegistry::default());
        let selection = selection(&registry);
        selection.enable_full_stats(true);

        assert!(selection.pmem_allocator().is_none());
        assert!(selection.ev_allocator().is_none());
        assert!(selection.pmem_allocator().is_none());
        assert!(selection.is_resolved(Backend::Pmem));
    }

    #[test]
    fn test_pmem_follows_upgrade_rule() {
        let registry = Arc::new(CountingRegistry::with_pmem());
        let selection = selection(&registry);

        let plain = selection.pmem_allocator().unwrap();
        assert!(!plain.tracks_allocation_sizes());
        assert!(Arc::ptr_eq(&plain, &selection.pmem_allocator().unwrap()));

        selection.enable_full_stats(true);
        let tracked = selection.pmem_allocator().unwrap();
        assert!(tracked.tracks_allocation_sizes());
        assert!(Arc::ptr_eq(&tracked, &selection.pmem_allocator().unwrap()));
        assert_eq!(registry.pmem_builds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_numa_requests_go_to_process_state() {
        let registry = Arc::new(CountingRegistry::default());
        let per_node = Arc::new(PerNode::new(2));
        *registry.process_state.lock() = Some(per_node.clone() as Arc<dyn ProcessState>);
        let selection = selection(&registry);

        assert!(Arc::ptr_eq(&selection.cpu_allocator(Some(1)), &per_node.nodes[1]));
        assert!(Arc::ptr_eq(&selection.cpu_allocator(Some(0)), &per_node.nodes[0]));
        assert!(Arc::ptr_eq(&selection.cpu_allocator(None), &per_node.any));
        assert_eq!(registry.cpu_builds.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_process_state_installed_late_is_bypassed() {
        let registry = Arc::new(CountingRegistry::default());
        let selection = selection(&registry);

        let base = selection.cpu_allocator(Some(0));

        // Installing after the first CPU request has no effect on this selection.
        let per_node = Arc::new(PerNode::new(1));
        *registry.process_state.lock() = Some(per_node.clone() as Arc<dyn ProcessState>);

        let later = selection.cpu_allocator(Some(0));
        assert!(Arc::ptr_eq(&base, &later));
        assert!(!Arc::ptr_eq(&later, &per_node.nodes[0]));
    }

    #[test]
    fn test_concurrent_first_resolution() {
        let registry = Arc::new(CountingRegistry::default());
        let selection = Arc::new(selection(&registry));
        let threads = 16;
        let barrier = Arc::new(Barrier::new(threads));

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let selection = Arc::clone(&selection);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    selection.cpu_allocator(None)
                })
            })
            .collect();

        let results: Vec<_> = handles
            .into_iter()
            .map(|h| h.join().expect("Thread panicked"))
            .collect();

        assert_eq!(registry.cpu_builds.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|a| Arc::ptr_eq(a, &results[0])));
    }

    #[test]
    fn test_concurrent_upgrade_wraps_once() {
        let registry = Arc::new(CountingRegistry::default());
        let selection = Arc::new(selection(&registry));
        let untracked = selection.cpu_allocator(None);
        selection.enable_full_stats(true);

        let threads = 16;
        let barrier = Arc::new(Barrier::new(threads));
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let selection = Arc::clone(&selection);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    selection.cpu_allocator(None)
                })
            })
            .collect();

        let results: Vec<_> = handles
            .into_iter()
            .map(|h| h.join().expect("Thread panicked"))
            .collect();

        assert!(results.iter().all(|a| Arc::ptr_eq(a, &results[0])));
        assert!(results[0].tracks_allocation_sizes());
        assert!(!Arc::ptr_eq(&results[0], &untracked));
    }
}
