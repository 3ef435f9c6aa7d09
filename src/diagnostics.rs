//! Unified diagnostics for the WireScript front-end.
//!
//! Single diagnostic type used across tokenizing, parsing, and validation.
//! Designed to integrate with editor tooling for rich error reporting.

use serde::{Deserialize, Serialize};

/// Diagnostic severity level
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
}

/// Error taxonomy for the compile pipeline
///
/// - `Lex`: malformed token; always fatal to the call that raised it
/// - `Syntax`: invalid list nesting; fatal only at the outermost `wire` form
/// - `Schema`: unknown element type or property, or wrong value kind
/// - `Reference`: duplicate identifier, unresolved target, or cyclic component
/// - `Arity`: component invocation argument-count mismatch
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    Lex,
    Syntax,
    Schema,
    Reference,
    Arity,
}

/// Source location span, 1-based lines and columns.
///
/// `end_line`/`end_col` are exclusive: they point one past the final
/// character, matching LSP range conventions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourceSpan {
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
}

impl SourceSpan {
    pub fn new(start_line: u32, start_col: u32, end_line: u32, end_col: u32) -> Self {
        Self {
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }

    /// Span covering a single point (zero-width)
    pub fn point(line: u32, col: u32) -> Self {
        Self::new(line, col, line, col)
    }

    /// Smallest span covering both `self` and `other`
    pub fn merge(&self, other: &SourceSpan) -> SourceSpan {
        let (start_line, start_col) =
            if (self.start_line, self.start_col) <= (other.start_line, other.start_col) {
                (self.start_line, self.start_col)
            } else {
                (other.start_line, other.start_col)
            };
        let (end_line, end_col) = if (self.end_line, self.end_col) >= (other.end_line, other.end_col)
        {
            (self.end_line, self.end_col)
        } else {
            (other.end_line, other.end_col)
        };
        SourceSpan::new(start_line, start_col, end_line, end_col)
    }

    /// Does `self` start strictly before `other` in source order?
    pub fn starts_before(&self, other: &SourceSpan) -> bool {
        (self.start_line, self.start_col) < (other.start_line, other.start_col)
    }
}

/// A diagnostic message with kind, severity, and source location
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    pub severity: Severity,
    pub message: String,
    pub span: SourceSpan,
}

impl Diagnostic {
    /// Create an error diagnostic
    pub fn error(kind: ErrorKind, message: impl Into<String>, span: SourceSpan) -> Self {
        Self {
            kind,
            severity: Severity::Error,
            message: message.into(),
            span,
        }
    }

    /// Create a warning diagnostic
    pub fn warning(kind: ErrorKind, message: impl Into<String>, span: SourceSpan) -> Self {
        Self {
            kind,
            severity: Severity::Warning,
            message: message.into(),
            span,
        }
    }

    /// Check if this is an error
    pub fn is_error(&self) -> bool {
        matches!(self.severity, Severity::Error)
    }

    /// Check if this is a warning
    pub fn is_warning(&self) -> bool {
        matches!(self.severity, Severity::Warning)
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:?}: {} at {}:{}",
            self.kind, self.message, self.span.start_line, self.span.start_col
        )
    }
}

// =============================================================================
// Convenience Builders
// =============================================================================

/// Error for a duplicate identifier within a collection
pub fn duplicate_identifier_error(what: &str, name: &str, span: SourceSpan) -> Diagnostic {
    Diagnostic::error(
        ErrorKind::Reference,
        format!("duplicate {} identifier '{}'", what, name),
        span,
    )
}

/// Error for an unresolved navigation target
pub fn unresolved_target_error(what: &str, id: &str, span: SourceSpan) -> Diagnostic {
    Diagnostic::error(
        ErrorKind::Reference,
        format!("unresolved {} reference '{}'", what, id),
        span,
    )
}

/// Error for a cyclic component reference, naming the full cycle
pub fn cycle_error(members: &[String], span: SourceSpan) -> Diagnostic {
    Diagnostic::error(
        ErrorKind::Reference,
        format!("cyclic component reference: {}", members.join(" -> ")),
        span,
    )
}

/// Error for a component invocation with the wrong argument count
pub fn arity_error(name: &str, expected: usize, found: usize, span: SourceSpan) -> Diagnostic {
    Diagnostic::error(
        ErrorKind::Arity,
        format!(
            "component '{}' expects {} argument(s), found {}",
            name, expected, found
        ),
        span,
    )
}

/// Error for a missing required property
pub fn missing_prop_error(prop: &str, element: &str, span: SourceSpan) -> Diagnostic {
    Diagnostic::error(
        ErrorKind::Schema,
        format!(
            "missing required property ':{}' for element '{}'",
            prop, element
        ),
        span,
    )
}

// =============================================================================
// Tests
// =============================================================================
