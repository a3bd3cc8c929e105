//! Integration tests for tensoralloc.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use tensoralloc::{
    cpu_allocator, cpu_allocator_base, cpu_allocator_full_stats_enabled,
    enable_cpu_allocator_full_stats, ev_allocator, init_from_env, pmem_allocator, AllocConfig,
    Allocator, AllocatorAttributes, AllocatorRegistry, AllocatorSelection, AllocatorStats,
    Backend, BasicCpuAllocator, CpuAllocator, FactoryRegistry, ProcessState, SubAllocator,
    TrackingAllocator, Visitor, ALLOCATOR_ALIGNMENT,
};

fn host_allocator() -> Arc<dyn Allocator> {
    Arc::new(CpuAllocator::new(AllocConfig::default()))
}

// ============ PROCESS-WIDE ACCESSORS ============
//
// Every check against the process-wide state lives in this one test so the
// order of flag changes is deterministic.

#[test]
fn test_process_wide_selection_lifecycle() {
    // Backends must be registered before their first request.
    FactoryRegistry::singleton()
        .register(Backend::Pmem, "test-pmem", 0, host_allocator)
        .unwrap();

    std::env::set_var("TENSORALLOC_FULL_STATS", "off");
    init_from_env();
    assert!(!cpu_allocator_full_stats_enabled());

    let before = cpu_allocator(None);
    assert!(!before.tracks_allocation_sizes());
    assert!(Arc::ptr_eq(&before, &cpu_allocator(None)));
    assert!(Arc::ptr_eq(&before, &cpu_allocator(Some(0))));
    assert!(Arc::ptr_eq(&before, &cpu_allocator_base()));

    assert!(ev_allocator().is_none());
    let pmem_before = pmem_allocator().unwrap();
    assert!(!pmem_before.tracks_allocation_sizes());

    enable_cpu_allocator_full_stats(true);
    enable_cpu_allocator_full_stats(true);
    assert!(cpu_allocator_full_stats_enabled());

    let after = cpu_allocator(None);
    assert!(after.tracks_allocation_sizes());
    assert!(!Arc::ptr_eq(&before, &after));
    for _ in 0..5 {
        assert!(Arc::ptr_eq(&after, &cpu_allocator(None)));
    }

    let pmem_after = pmem_allocator().unwrap();
    assert!(pmem_after.tracks_allocation_sizes());
    assert!(Arc::ptr_eq(&pmem_after, &pmem_allocator().unwrap()));
    assert!(ev_allocator().is_none());

    let ptr = after.allocate_raw(ALLOCATOR_ALIGNMENT, 2048).unwrap();
    let stats = after.stats().unwrap();
    assert_eq!(stats.num_allocs, 1);
    assert_eq!(stats.bytes_in_use, 2048);
    assert_eq!(stats.largest_alloc_size, 2048);
    unsafe { after.deallocate_raw(ptr) };

    // Many threads see the same upgraded instance.
    let handles: Vec<_> = (0..8).map(|_| thread::spawn(|| cpu_allocator(None))).collect();
    for handle in handles {
        let seen = handle.join().expect("Thread panicked");
        assert!(Arc::ptr_eq(&seen, &after));
    }

    // Tracking is never removed.
    enable_cpu_allocator_full_stats(false);
    assert!(Arc::ptr_eq(&after, &cpu_allocator(None)));

    std::env::set_var("TENSORALLOC_FULL_STATS", "true");
    init_from_env();
    assert!(cpu_allocator_full_stats_enabled());
    std::env::remove_var("TENSORALLOC_FULL_STATS");
}

// ============ VALUE TYPES ============

#[test]
fn test_attribute_rendering() {
    let attr = AllocatorAttributes::new()
        .with_on_host(true)
        .with_nic_compatible(false)
        .with_gpu_compatible(true);

    assert_eq!(
        attr.to_string(),
        "AllocatorAttributes(on_host=1 nic_compatible=0 gpu_compatible=1)"
    );
}

#[test]
fn test_stats_rendering() {
    let stats = AllocatorStats {
        num_allocs: 7,
        bytes_in_use: 10,
        peak_bytes_in_use: 20,
        largest_alloc_size: 30,
        ..Default::default()
    };

    assert_eq!(
        stats.to_string(),
        "Limit:                           0\n\
         InUse:                          10\n\
         MaxInUse:                       20\n\
         NumAllocs:                       7\n\
         MaxAllocSize:                   30\n"
    );
}

// ============ SELECTION OVER A REAL REGISTRY ============

#[test]
fn test_selection_prefers_registered_factory() {
    let builds = Arc::new(AtomicUsize::new(0));
    let registry = Arc::new(FactoryRegistry::new());
    {
        let builds = Arc::clone(&builds);
        registry
            .register(Backend::Cpu, "counted", 10, move || {
                builds.fetch_add(1, Ordering::SeqCst);
                host_allocator()
            })
            .unwrap();
    }

    let dyn_registry: Arc<dyn AllocatorRegistry> = registry.clone();
    let selection = AllocatorSelection::new(dyn_registry);

    let a = selection.cpu_allocator(None);
    let b = selection.cpu_allocator(None);
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(builds.load(Ordering::SeqCst), 1);
    assert!(selection.pmem_allocator().is_none());
}

struct NodeAllocators {
    nodes: Vec<Arc<dyn Allocator>>,
}

impl ProcessState for NodeAllocators {
    fn get_cpu_allocator(&self, numa_node: Option<usize>) -> Arc<dyn Allocator> {
        Arc::clone(&self.nodes[numa_node.unwrap_or(0)])
    }
}

#[test]
fn test_process_state_must_precede_first_cpu_request() {
    let nodes = Arc::new(NodeAllocators {
        nodes: vec![host_allocator(), host_allocator()],
    });

    // Installed in time: per-node requests are delegated.
    let early = Arc::new(FactoryRegistry::new());
    early.set_process_state(nodes.clone());
    let early_registry: Arc<dyn AllocatorRegistry> = early;
    let selection = AllocatorSelection::new(early_registry);
    assert!(Arc::ptr_eq(&selection.cpu_allocator(Some(1)), &nodes.nodes[1]));

    // Installed after the first request: silently bypassed.
    let late = Arc::new(FactoryRegistry::new());
    let late_registry: Arc<dyn AllocatorRegistry> = late.clone();
    let selection = AllocatorSelection::new(late_registry);
    let base = selection.cpu_allocator(Some(1));
    late.set_process_state(nodes.clone());
    assert!(Arc::ptr_eq(&selection.cpu_allocator(Some(1)), &base));
}

#[test]
fn test_concurrent_resolution_builds_once() {
    let builds = Arc::new(AtomicUsize::new(0));
    let registry = Arc::new(FactoryRegistry::new());
    {
        let builds = Arc::clone(&builds);
        registry
            .register(Backend::Ev, "ev", 0, move || {
                builds.fetch_add(1, Ordering::SeqCst);
                host_allocator()
            })
            .unwrap();
    }
    let dyn_registry: Arc<dyn AllocatorRegistry> = registry;
    let selection = Arc::new(AllocatorSelection::new(dyn_registry));
    selection.enable_full_stats(true);

    let threads = 12;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let selection = Arc::clone(&selection);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                selection.ev_allocator().unwrap()
            })
        })
        .collect();

    let seen: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().expect("Thread panicked"))
        .collect();

    assert_eq!(builds.load(Ordering::SeqCst), 1);
    assert!(seen.iter().all(|a| Arc::ptr_eq(a, &seen[0])));
    assert!(seen[0].tracks_allocation_sizes());
}

// ============ SUB-ALLOCATOR VISITORS UNDER AN ALLOCATOR ============

#[test]
fn test_visitors_fire_beneath_tracked_allocator() {
    let events: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let visitor = |label: &'static str| -> Visitor {
        let events = Arc::clone(&events);
        Box::new(move |_ptr: NonNull<u8>, index: usize, bytes: usize| {
            events.lock().unwrap().push(format!("{label}@{index}:{bytes}"));
        })
    };

    let visitors = SubAllocator::new(
        vec![visitor("lock"), visitor("bind")],
        vec![visitor("lock"), visitor("bind")],
    );
    let source = BasicCpuAllocator::new(Some(0), visitors);
    let inner: Arc<dyn Allocator> = Arc::new(CpuAllocator::with_source(
        AllocConfig::default(),
        Box::new(source),
    ));
    let alloc = TrackingAllocator::new(inner, true);

    let ptr = alloc.allocate_raw(ALLOCATOR_ALIGNMENT, 512).unwrap();
    unsafe { alloc.deallocate_raw(ptr) };

    assert_eq!(
        *events.lock().unwrap(),
        vec!["lock@0:512", "bind@0:512", "bind@0:512", "lock@0:512"]
    );
    assert_eq!(alloc.stats().unwrap().num_allocs, 1);
}

// ============ MULTI-THREADED TESTS ============

#[test]
fn test_multithread_tracking_consistency() {
    let alloc = Arc::new(TrackingAllocator::new(host_allocator(), true));
    let num_threads = 4;
    let per_thread_bytes: u64 = (0..50u64).map(|i| 64 * (i % 4 + 1)).sum();

    let handles: Vec<_> = (0..num_threads)
        .map(|thread_id| {
            let alloc = Arc::clone(&alloc);
            thread::spawn(move || {
                let mut ptrs = Vec::new();
                for i in 0..50 {
                    let ptr = alloc
                        .allocate_raw(ALLOCATOR_ALIGNMENT, 64 * (i % 4 + 1))
                        .unwrap_or_else(|| panic!("Thread {} alloc {} failed", thread_id, i));
                    ptrs.push(ptr);
                }
                for ptr in ptrs {
                    unsafe { alloc.deallocate_raw(ptr) };
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    let stats = alloc.stats().unwrap();
    assert_eq!(stats.num_allocs, 200);
    assert_eq!(stats.bytes_in_use, 0);
    assert_eq!(stats.largest_alloc_size, 256);
    assert!(stats.peak_bytes_in_use >= per_thread_bytes);
}
