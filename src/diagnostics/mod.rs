//! Allocator diagnostics.
//!
//! Every notable event (large allocations, tracking upgrades, rejected
//! registrations) is described by a [`Diagnostic`] with a stable code and
//! reported through the `log` crate.
//!
//! ## Diagnostic Codes
//!
//! | Code  | Meaning                 |
//! |-------|-------------------------|
//! | TA0xx | Allocation paths        |
//! | TA1xx | Allocator selection     |
//! | TA2xx | Registry                |

pub mod emit;
pub mod kind;

pub use emit::{
    emit, emit_with_context, set_sink, set_thread_sink, suppress_diagnostics, CollectingSink,
    DiagnosticSink,
};
pub use kind::{Diagnostic, DiagnosticKind};
pub use kind::{TA001, TA002, TA101, TA201};
