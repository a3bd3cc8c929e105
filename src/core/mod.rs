//! Allocator resolution: the backend registry and process-wide selection.

pub mod global;
pub mod registry;
