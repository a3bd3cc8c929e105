//! Diagnostic emission backend.
//!
//! Diagnostics are reported through the `log` facade and, when installed, to
//! a process-wide [`DiagnosticSink`] and to one bound to the emitting thread.

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use crate::sync::mutex::Mutex;

use super::kind::Diagnostic;

/// Global flag to suppress diagnostic output (for testing).
static DIAGNOSTICS_SUPPRESSED: AtomicBool = AtomicBool::new(false);

/// Optional sink receiving every emitted diagnostic.
static SINK: OnceLock<Mutex<Option<Arc<dyn DiagnosticSink>>>> = OnceLock::new();

thread_local! {
    static THREAD_SINK: RefCell<Option<Arc<dyn DiagnosticSink>>> = RefCell::new(None);
}

fn sink_slot() -> &'static Mutex<Option<Arc<dyn DiagnosticSink>>> {
    SINK.get_or_init(|| Mutex::new(None))
}

/// Suppress diagnostic log output. Installed sinks still receive diagnostics.
pub fn suppress_diagnostics(suppress: bool) {
    DIAGNOSTICS_SUPPRESSED.store(suppress, Ordering::Relaxed);
}

/// Check if diagnostics are suppressed.
pub fn is_suppressed() -> bool {
    DIAGNOSTICS_SUPPRESSED.load(Ordering::Relaxed)
}

/// Install or remove the process-wide sink.
pub fn set_sink(sink: Option<Arc<dyn DiagnosticSink>>) {
    *sink_slot().lock() = sink;
}

/// Install or remove a sink for diagnostics emitted on the current thread.
pub fn set_thread_sink(sink: Option<Arc<dyn DiagnosticSink>>) {
    THREAD_SINK.with(|slot| *slot.borrow_mut() = sink);
}

/// Emit a diagnostic.
pub fn emit(diag: &Diagnostic) {
    emit_inner(diag, None);
}

/// Emit a diagnostic with additional runtime context.
pub fn emit_with_context(diag: &Diagnostic, context: &str) {
    emit_inner(diag, Some(context));
}

fn emit_inner(diag: &Diagnostic, context: Option<&str>) {
    if !is_suppressed() {
        emit_to_log(diag, context);
    }

    let sink = sink_slot().lock().clone();
    if let Some(sink) = sink {
        sink.emit(diag, context);
    }

    let thread_sink = THREAD_SINK.with(|slot| slot.borrow().clone());
    if let Some(sink) = thread_sink {
        sink.emit(diag, context);
    }
}

fn emit_to_log(diag: &Diagnostic, context: Option<&str>) {
    let level = diag.kind.level();
    if !log::log_enabled!(target: "tensoralloc", level) {
        return;
    }

    match context {
        Some(context) => log::log!(
            target: "tensoralloc",
            level,
            "[{}] {}: {} ({})",
            diag.code,
            diag.kind.prefix(),
            diag.message,
            context
        ),
        None => log::log!(
            target: "tensoralloc",
            level,
            "[{}] {}: {}",
            diag.code,
            diag.kind.prefix(),
            diag.message
        ),
    }

    if let Some(note) = diag.note {
        log::log!(target: "tensoralloc", level, "  note: {}", note);
    }
    if let Some(help) = diag.help {
        log::log!(target: "tensoralloc", level, "  help: {}", help);
    }
}

/// A diagnostic sink trait for custom output.
pub trait DiagnosticSink: Send + Sync {
    /// Handle a diagnostic.
    fn emit(&self, diag: &Diagnostic, context: Option<&str>);
}

/// A simple sink that collects diagnostics.
#[derive(Default)]
pub struct CollectingSink {
    diagnostics: Mutex<Vec<(Diagnostic, Option<String>)>>,
}

impl CollectingSink {
    /// Create a new collecting sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all collected diagnostics.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics
            .lock()
            .iter()
            .map(|(diag, _)| diag.clone())
            .collect()
    }

    /// Contexts recorded for diagnostics with `code`.
    pub fn contexts_for(&self, code: &str) -> Vec<String> {
        self.diagnostics
            .lock()
            .iter()
            .filter(|(diag, _)| diag.code == code)
            .filter_map(|(_, context)| context.clone())
            .collect()
    }

    /// Clear collected diagnostics.
    pub fn clear(&self) {
        self.diagnostics.lock().clear();
    }

    /// Check whether a diagnostic with `code` was collected.
    pub fn contains(&self, code: &str) -> bool {
        self.diagnostics.lock().iter().any(|(diag, _)| diag.code == code)
    }
}

impl DiagnosticSink for CollectingSink {
    fn emit(&self, diag: &Diagnostic, context: Option<&str>) {
        self.diagnostics
            .lock()
            .push((diag.clone(), context.map(str::to_owned)));
    }
}
