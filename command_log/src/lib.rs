//! # Command Diagnostics
//!
//! This crate implements structured diagnostics for the command engine.
//!
//! ## Philosophy
//!
//! Diagnostics are explicit and structured, not text-based or printf-style.
//! Template-compile warnings and registration failures are values pushed
//! into a sink, so tests can assert on them and UIs can render them.

use std::cell::RefCell;
use std::fmt;

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DiagnosticLevel {
    /// Debug information
    Debug,
    /// Informational messages
    Info,
    /// Warnings (degraded definitions, fallbacks)
    Warn,
    /// Errors (rejected definitions)
    Error,
}

impl fmt::Display for DiagnosticLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticLevel::Debug => write!(f, "DEBUG"),
            DiagnosticLevel::Info => write!(f, "INFO"),
            DiagnosticLevel::Warn => write!(f, "WARN"),
            DiagnosticLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// A structured diagnostic record
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Severity level
    pub level: DiagnosticLevel,
    /// Component that emitted the diagnostic (e.g. "template", "registry")
    pub component: String,
    /// Human-readable message
    pub message: String,
    /// Structured fields
    pub fields: Vec<(String, String)>,
}

impl Diagnostic {
    /// Creates a new diagnostic
    pub fn new(
        level: DiagnosticLevel,
        component: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            level,
            component: component.into(),
            message: message.into(),
            fields: Vec::new(),
        }
    }

    /// Creates a warning diagnostic
    pub fn warn(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(DiagnosticLevel::Warn, component, message)
    }

    /// Creates an error diagnostic
    pub fn error(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(DiagnosticLevel::Error, component, message)
    }

    /// Adds a field to the diagnostic
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }
}

/// Sink that receives diagnostics from the engine
pub trait DiagnosticSink {
    /// Records one diagnostic
    fn emit(&self, diagnostic: Diagnostic);
}

/// Sink that keeps all diagnostics in memory for inspection
#[derive(Debug, Default)]
pub struct MemorySink {
    records: RefCell<Vec<Diagnostic>>,
}

impl MemorySink {
    /// Creates a new empty memory sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all recorded diagnostics
    pub fn records(&self) -> Vec<Diagnostic> {
        self.records.borrow().clone()
    }

    /// Returns the number of recorded diagnostics
    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    /// Returns true if nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.records.borrow().is_empty()
    }

    /// Returns true if any diagnostic at or above the given level was recorded
    pub fn has_level(&self, level: DiagnosticLevel) -> bool {
        self.records.borrow().iter().any(|d| d.level >= level)
    }
}

impl DiagnosticSink for MemorySink {
    fn emit(&self, diagnostic: Diagnostic) {
        self.records.borrow_mut().push(diagnostic);
    }
}

/// Sink that discards every diagnostic
#[derive(Debug, Default)]
pub struct NullSink;

impl NullSink {
    /// Creates a new null sink
    pub fn new() -> Self {
        Self
    }
}

impl DiagnosticSink for NullSink {
    fn emit(&self, _diagnostic: Diagnostic) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(DiagnosticLevel::Debug < DiagnosticLevel::Info);
        assert!(DiagnosticLevel::Info < DiagnosticLevel::Warn);
        assert!(DiagnosticLevel::Warn < DiagnosticLevel::Error);
    }

    #[test]
    fn test_diagnostic_creation() {
        let diag = Diagnostic::warn("template", "unknown type");
        assert_eq!(diag.level, DiagnosticLevel::Warn);
        assert_eq!(diag.component, "template");
        assert_eq!(diag.message, "unknown type");
        assert!(diag.fields.is_empty());
    }

    #[test]
    fn test_diagnostic_with_fields() {
        let diag = Diagnostic::error("registry", "duplicate name")
            .with_field("name", "open_file")
            .with_field("existing", "true");

        assert_eq!(diag.fields.len(), 2);
        assert_eq!(diag.fields[0].0, "name");
        assert_eq!(diag.fields[1].1, "true");
    }

    #[test]
    fn test_memory_sink_records() {
        let sink = MemorySink::new();
        assert!(sink.is_empty());

        sink.emit(Diagnostic::warn("template", "first"));
        sink.emit(Diagnostic::error("registry", "second"));

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.records()[0].message, "first");
        assert!(sink.has_level(DiagnosticLevel::Warn));
        assert!(sink.has_level(DiagnosticLevel::Error));
    }

    #[test]
    fn test_null_sink_discards() {
        let sink = NullSink::new();
        sink.emit(Diagnostic::warn("template", "dropped"));
        // Nothing observable; the call must simply not panic.
    }
}
