//! Allocator factories and the registry that maps backends to them.

use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::allocators::basic::BasicCpuAllocator;
use crate::allocators::cpu::CpuAllocator;
use crate::allocators::sub::{MemorySource, SubAllocator};
use crate::api::allocator::Allocator;
use crate::api::config::AllocConfig;
use crate::diagnostics::{self, TA201};
use crate::error::RegistryError;
use crate::sync::mutex::Mutex;

/// A class of memory that allocators can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Host memory.
    Cpu,
    /// Persistent (non-volatile) memory.
    Pmem,
    /// The specialized "ev" memory class.
    Ev,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Cpu => "cpu",
            Backend::Pmem => "pmem",
            Backend::Ev => "ev",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process-wide source of NUMA-aware CPU allocators.
///
/// Installed by whatever sets up devices for the process. Global selection
/// looks it up once, on the first CPU allocator request.
pub trait ProcessState: Send + Sync {
    /// Allocator for `numa_node`, or for any node when `None`.
    fn get_cpu_allocator(&self, numa_node: Option<usize>) -> Arc<dyn Allocator>;
}

/// The contract global selection resolves allocators through.
pub trait AllocatorRegistry: Send + Sync {
    /// The CPU allocator. Always available.
    fn get_allocator(&self) -> Arc<dyn Allocator>;

    /// The persistent memory allocator, if one is configured.
    fn get_pmem_allocator(&self) -> Option<Arc<dyn Allocator>>;

    /// The "ev" memory allocator, if one is configured.
    fn get_ev_allocator(&self) -> Option<Arc<dyn Allocator>>;

    /// The NUMA-aware allocator source, if one has been installed.
    fn process_state(&self) -> Option<Arc<dyn ProcessState>>;
}

/// Creates allocators for a registered backend.
pub trait AllocatorFactory: Send + Sync {
    /// Build the allocator. Called at most once per registration.
    fn create_allocator(&self) -> Arc<dyn Allocator>;

    /// Build a raw memory source for `numa_node`.
    fn create_sub_allocator(&self, numa_node: Option<usize>) -> Box<dyn MemorySource> {
        Box::new(BasicCpuAllocator::new(numa_node, SubAllocator::default()))
    }
}

impl<F> AllocatorFactory for F
where
    F: Fn() -> Arc<dyn Allocator> + Send + Sync,
{
    fn create_allocator(&self) -> Arc<dyn Allocator> {
        self()
    }
}

struct FactoryEntry {
    backend: Backend,
    name: String,
    priority: i32,
    factory: Box<dyn AllocatorFactory>,
    allocator: OnceLock<Arc<dyn Allocator>>,
}

impl FactoryEntry {
    fn allocator(&self) -> Arc<dyn Allocator> {
        Arc::clone(self.allocator.get_or_init(|| {
            log::debug!(
                target: "tensoralloc",
                "creating {} allocator from factory '{}'",
                self.backend,
                self.name
            );
            self.factory.create_allocator()
        }))
    }
}

static REGISTRY: OnceLock<Arc<FactoryRegistry>> = OnceLock::new();

/// Registry of named, prioritized allocator factories per backend.
///
/// For each backend the highest-priority factory wins; among equal
/// priorities the first registered wins. Each factory builds its allocator
/// once, on first use.
pub struct FactoryRegistry {
    entries: Mutex<Vec<Arc<FactoryEntry>>>,
    default_cpu: OnceLock<Arc<dyn Allocator>>,
    process_state: Mutex<Option<Arc<dyn ProcessState>>>,
}

impl FactoryRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            default_cpu: OnceLock::new(),
            process_state: Mutex::new(None),
        }
    }

    /// The process-wide registry used by the global allocator accessors.
    pub fn singleton() -> &'static Arc<FactoryRegistry> {
        REGISTRY.get_or_init(|| Arc::new(FactoryRegistry::new()))
    }

    /// Register `factory` for `backend`.
    pub fn register<F>(
        &self,
        backend: Backend,
        name: &str,
        priority: i32,
        factory: F,
    ) -> Result<(), RegistryError>
    where
        F: AllocatorFactory + 'static,
    {
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }

        let mut entries = self.entries.lock();
        let duplicate = entries
            .iter()
            .any(|e| e.backend == backend && e.name == name && e.priority == priority);
        if duplicate {
            diagnostics::emit_with_context(&TA201, &format!("{backend}/{name}@{priority}"));
            return Err(RegistryError::Duplicate {
                backend,
                name: name.to_owned(),
                priority,
            });
        }

        entries.push(Arc::new(FactoryEntry {
            backend,
            name: name.to_owned(),
            priority,
            factory: Box::new(factory),
            allocator: OnceLock::new(),
        }));
        log::debug!(
            target: "tensoralloc",
            "registered {} allocator factory '{}' at priority {}",
            backend,
            name,
            priority
        );
        Ok(())
    }

    /// Names of the factories registered for `backend`, in registration order.
    pub fn factory_names(&self, backend: Backend) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.backend == backend)
            .map(|e| e.name.clone())
            .collect()
    }

    fn best_entry(&self, backend: Backend) -> Option<Arc<FactoryEntry>> {
        let entries = self.entries.lock();
        let mut best: Option<&Arc<FactoryEntry>> = None;
        for entry in entries.iter().filter(|e| e.backend == backend) {
            if best.map_or(true, |b| entry.priority > b.priority) {
                best = Some(entry);
            }
        }
        best.cloned()
    }

    /// Allocator of the winning factory for `backend`, if any is registered.
    pub fn get_allocator_for(&self, backend: Backend) -> Option<Arc<dyn Allocator>> {
        // The entry lock is released before the factory runs.
        let entry = self.best_entry(backend)?;
        Some(entry.allocator())
    }

    /// Raw host memory source for `numa_node` from the winning CPU factory.
    pub fn get_sub_allocator(&self, numa_node: Option<usize>) -> Box<dyn MemorySource> {
        match self.best_entry(Backend::Cpu) {
            Some(entry) => entry.factory.create_sub_allocator(numa_node),
            None => Box::new(BasicCpuAllocator::new(numa_node, SubAllocator::default())),
        }
    }

    /// Install the NUMA-aware allocator source.
    ///
    /// Must happen before the first CPU allocator request of any selection
    /// reading this registry; later installs are not seen by it.
    pub fn set_process_state(&self, process_state: Arc<dyn ProcessState>) {
        *self.process_state.lock() = Some(process_state);
    }

    fn default_cpu_allocator(&self) -> Arc<dyn Allocator> {
        Arc::clone(self.default_cpu.get_or_init(|| {
            let allocator: Arc<dyn Allocator> = Arc::new(CpuAllocator::new(AllocConfig::from_env()));
            allocator
        }))
    }
}

impl Default for FactoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AllocatorRegistry for FactoryRegistry {
    fn get_allocator(&self) -> Arc<dyn Allocator> {
        self.get_allocator_for(Backend::Cpu)
            .unwrap_or_else(|| self.default_cpu_allocator())
    }

    fn get_pmem_allocator(&self) -> Option<Arc<dyn Allocator>> {
        self.get_allocator_for(Backend::Pmem)
    }

    fn get_ev_allocator(&self) -> Option<Arc<dyn Allocator>> {
        self.get_allocator_for(Backend::Ev)
    }

    fn process_state(&self) -> Option<Arc<dyn ProcessState>> {
        self.process_state.lock().clone()
    }
}
