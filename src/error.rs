//! Error types for allocator registration.
//!
//! Allocation itself never returns these: a failed allocation is `None` and a
//! missing backend is `None`. Only registry bookkeeping can fail.

use crate::core::registry::Backend;

/// Errors raised while registering allocator factories.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// A factory with the same backend, name and priority is already registered.
    #[error("duplicate {backend} allocator factory '{name}' at priority {priority}")]
    Duplicate {
        backend: Backend,
        name: String,
        priority: i32,
    },

    /// Factory names must be non-empty.
    #[error("allocator factory name must not be empty")]
    EmptyName,
}
