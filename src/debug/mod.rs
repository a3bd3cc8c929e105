//! Debug utilities for freed memory.
//!
//! Only compiled when the `debug` feature is enabled.

pub(crate) mod poison;
