//! Allocation backends.
//!
//! This module contains the concrete allocator implementations.
//! **These are the only modules that should contain `unsafe` allocation code.**

pub mod basic;
pub mod cpu;
pub mod sub;
