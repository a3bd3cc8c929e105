//! Diagnostic kinds and core types.

/// The severity level of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// A hard error - something is definitely wrong.
    Error,
    /// A warning - something is probably wrong or suboptimal.
    Warning,
    /// Informational event worth recording.
    Info,
}

impl DiagnosticKind {
    /// Get the display prefix for this kind.
    pub fn prefix(&self) -> &'static str {
        match self {
            DiagnosticKind::Error => "error",
            DiagnosticKind::Warning => "warning",
            DiagnosticKind::Info => "info",
        }
    }

    /// The `log` level this kind is reported at.
    pub fn level(&self) -> log::Level {
        match self {
            DiagnosticKind::Error => log::Level::Error,
            DiagnosticKind::Warning => log::Level::Warn,
            DiagnosticKind::Info => log::Level::Info,
        }
    }
}

/// A diagnostic message with code, message, and optional context.
///
/// Diagnostic codes follow the pattern:
/// - `TA0xx` - Allocation paths
/// - `TA1xx` - Allocator selection
/// - `TA2xx` - Registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Severity level.
    pub kind: DiagnosticKind,
    /// Diagnostic code (e.g., "TA001").
    pub code: &'static str,
    /// Primary message.
    pub message: &'static str,
    /// Optional additional context.
    pub note: Option<&'static str>,
    /// Optional fix suggestion.
    pub help: Option<&'static str>,
}

impl Diagnostic {
    /// Create a new error diagnostic.
    pub const fn error(code: &'static str, message: &'static str) -> Self {
        Self::with_kind(DiagnosticKind::Error, code, message)
    }

    /// Create a new warning diagnostic.
    pub const fn warning(code: &'static str, message: &'static str) -> Self {
        Self::with_kind(DiagnosticKind::Warning, code, message)
    }

    /// Create a new informational diagnostic.
    pub const fn info(code: &'static str, message: &'static str) -> Self {
        Self::with_kind(DiagnosticKind::Info, code, message)
    }

    const fn with_kind(kind: DiagnosticKind, code: &'static str, message: &'static str) -> Self {
        Self {
            kind,
            code,
            message,
            note: None,
            help: None,
        }
    }

    /// Add a note to this diagnostic.
    pub const fn with_note(mut self, note: &'static str) -> Self {
        self.note = Some(note);
        self
    }

    /// Add a help message to this diagnostic.
    pub const fn with_help(mut self, help: &'static str) -> Self {
        self.help = Some(help);
        self
    }
}

// =============================================================================
// Predefined diagnostics (TA0xx - Allocation paths)
// =============================================================================

/// TA001: A single allocation exceeded the large-allocation threshold.
pub const TA001: Diagnostic = Diagnostic::warning(
    "TA001",
    "allocation exceeds the large allocation threshold"
).with_help("raise large_allocation_warning_bytes in AllocConfig if this is expected");

/// TA002: A pointer unknown to a tracking allocator was released through it.
pub const TA002: Diagnostic = Diagnostic::warning(
    "TA002",
    "released a pointer the tracking allocator never recorded"
).with_note("the region was probably allocated before the allocator was wrapped")
 .with_help("the release is forwarded to the wrapped allocator; stats exclude it");

// =============================================================================
// Predefined diagnostics (TA1xx - Allocator selection)
// =============================================================================

/// TA101: A cached allocator was wrapped for full statistics.
pub const TA101: Diagnostic = Diagnostic::info(
    "TA101",
    "allocator wrapped in a tracking allocator for full stats"
).with_note("callers that cached the previous instance keep using it untracked");

// =============================================================================
// Predefined diagnostics (TA2xx - Registry)
// =============================================================================

/// TA201: Duplicate factory registration rejected.
pub const TA201: Diagnostic = Diagnostic::error(
    "TA201",
    "duplicate allocator factory registration"
).with_help("give each factory a unique name or priority per backend");
