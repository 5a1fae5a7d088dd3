//! Diagnostic sink abstraction.
//!
//! Every warning or error condition raised while a transaction runs is
//! reported through the [`DiagnosticSink`] carried by the configuration.
//! The default sink bridges to the `tracing` ecosystem; callers may inject
//! their own implementation to route diagnostics elsewhere, or [`NullSink`]
//! to drop them entirely.

use std::fmt;
use std::sync::Mutex;

/// Severity of a diagnostic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Recoverable oddity; the transaction continues.
    Warning,
    /// A condition that contributes to a non-OK transaction result.
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => f.write_str("warning"),
            Self::Error => f.write_str("error"),
        }
    }
}

/// Receives diagnostics emitted during a mail transaction.
///
/// Implementations must be callable from worker threads; the engine emits
/// exactly one `Error` diagnostic for every non-OK transaction result.
pub trait DiagnosticSink: Send + Sync {
    /// Handle one formatted diagnostic message.
    fn emit(&self, severity: Severity, message: &str);
}

/// Default sink: forwards each diagnostic to `tracing` at the matching level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn emit(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Warning => tracing::warn!(target: "mailwrap", "{message}"),
            Severity::Error => tracing::error!(target: "mailwrap", "{message}"),
        }
    }
}

/// Sink that discards every diagnostic.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn emit(&self, _severity: Severity, _message: &str) {}
}

/// Sink that records diagnostics in memory, oldest first.
///
/// Useful in tests asserting which diagnostics a transaction emitted.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<(Severity, String)>>,
}

impl MemorySink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded diagnostics.
    #[must_use]
    pub fn entries(&self) -> Vec<(Severity, String)> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Number of diagnostics recorded at `severity`.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.entries
            .lock()
            .map(|e| e.iter().filter(|(s, _)| *s == severity).count())
            .unwrap_or(0)
    }
}

impl DiagnosticSink for MemorySink {
    fn emit(&self, severity: Severity, message: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push((severity, message.to_string()));
        }
    }
}
