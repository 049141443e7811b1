//! The compile log.
//!
//! All user-facing problems are appended to a `CompileLog` in the order
//! they are detected. The core never prints directly; the CLI decides how
//! to render the log. Severities follow the original compiler: `Fatal`
//! aborts the current unit of work, `Error` lets sibling statements keep
//! elaborating so one run reports as many independent problems as
//! possible, `Warning` never fails the compilation.

use crate::source::Location;
use serde::Serialize;

/// Diagnostic severity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Severity {
    Fatal,
    Error,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Fatal => write!(f, "FATAL"),
            Severity::Error => write!(f, "ERROR"),
            Severity::Warning => write!(f, "WARNING"),
        }
    }
}

/// One entry of the compile log.
#[derive(Clone, Debug, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub location: Option<Location>,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] ", self.severity)?;
        match &self.location {
            Some(loc) => write!(f, "{}: {}", loc, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Append-only diagnostic log supplied by the caller of the core.
#[derive(Debug, Default)]
pub struct CompileLog {
    entries: Vec<Diagnostic>,
}

impl CompileLog {
    pub fn new() -> Self {
        CompileLog::default()
    }

    pub fn fatal(&mut self, location: Option<Location>, message: impl Into<String>) {
        self.push(Severity::Fatal, location, message);
    }

    pub fn error(&mut self, location: Option<Location>, message: impl Into<String>) {
        self.push(Severity::Error, location, message);
    }

    pub fn warning(&mut self, location: Option<Location>, message: impl Into<String>) {
        self.push(Severity::Warning, location, message);
    }

    pub fn push(
        &mut self,
        severity: Severity,
        location: Option<Location>,
        message: impl Into<String>,
    ) {
        self.entries.push(Diagnostic {
            severity,
            location,
            message: message.into(),
        });
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when at least one fatal or error entry has been logged.
    pub fn has_errors(&self) -> bool {
        self.entries
            .iter()
            .any(|d| matches!(d.severity, Severity::Fatal | Severity::Error))
    }

    /// The log as a JSON array, for machine consumers of diagnostics.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(&self.entries)
            .expect("diagnostics serialize to JSON without error")
    }
}

impl std::fmt::Display for CompileLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{entry}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_are_detected() {
        let mut log = CompileLog::new();
        assert!(!log.has_errors());
        log.warning(None, "odd but fine");
        assert!(!log.has_errors());
        log.fatal(None, "no matching procedure definitions");
        assert!(log.has_errors());
        assert_eq!(log.entries().len(), 2);
    }

    #[test]
    fn display_includes_severity() {
        let mut log = CompileLog::new();
        log.error(None, "incompatible types");
        assert_eq!(log.to_string(), "[ERROR] incompatible types\n");
    }

    #[test]
    fn json_rendering_carries_severity_location_and_message() {
        use crate::source::SourceMap;
        use crate::span::Span;

        let mut sources = SourceMap::new();
        let file = sources.add_file("test.sc", "void main() {\n}\n");
        let mut log = CompileLog::new();
        log.error(Some(sources.location(file, Span::new(14, 15))), "incompatible types");

        let json = log.to_json();
        assert!(json.contains("\"Error\""), "severity missing: {json}");
        assert!(json.contains("\"test.sc\""), "file missing: {json}");
        assert!(json.contains("incompatible types"), "message missing: {json}");

        // Empty logs render as an empty array.
        assert_eq!(CompileLog::new().to_json(), "[]");
    }
}
