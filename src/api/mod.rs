//! Public API for tensoralloc.
//!
//! The allocator capability, the value types passed across it, and the
//! statistics decorator.

pub mod allocator;
pub mod attributes;
pub mod config;
pub mod stats;
pub mod tracking;
