//! Diagnostic - compiler-style error messages
//!
//! Generates messages with:
//! - Error code (EI001, EU001, etc.)
//! - Location, when the failing construct carries one
//! - Notes

use crate::span::Span;
use std::fmt;

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// Fatal error - prevents compilation
    Error,
    /// Warning - does not prevent compilation
    Warning,
    /// Note - additional information
    Note,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Error => "error",
            Level::Warning => "warning",
            Level::Note => "note",
        }
    }

    /// Returns the ANSI code for coloring (if terminal supports it)
    pub fn color_code(&self) -> &'static str {
        match self {
            Level::Error => "\x1b[1;31m",   // Bold Red
            Level::Warning => "\x1b[1;33m", // Bold Yellow
            Level::Note => "\x1b[1;36m",    // Bold Cyan
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Structured error code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorCode {
    /// Category (S = semantic, I = internal consistency, U = unsupported, X = input)
    pub category: char,
    /// Error number
    pub number: u16,
}

impl ErrorCode {
    pub const fn new(category: char, number: u16) -> Self {
        Self { category, number }
    }

    // Resolution failures found when re-checking a handed-over program
    pub const UNDEFINED_NAME: Self = Self::new('S', 1);
    pub const REDECLARED: Self = Self::new('S', 2);
    pub const NO_MATCHING_OVERLOAD: Self = Self::new('S', 3);
    pub const INVALID_OPERANDS: Self = Self::new('S', 4);

    // Internal-consistency failures
    pub const UNTERMINATED_BLOCK: Self = Self::new('I', 1);
    pub const MISSING_LAYOUT: Self = Self::new('I', 2);
    pub const UNRESOLVED_REFERENCE: Self = Self::new('I', 3);
    pub const UNKNOWN_TYPE_IN_CODEGEN: Self = Self::new('I', 4);
    pub const MISSING_DECLARATION: Self = Self::new('I', 5);
    pub const NO_LOWERING: Self = Self::new('I', 6);
    pub const MISSING_LOOP_TARGET: Self = Self::new('I', 7);
    pub const MALFORMED_CFG: Self = Self::new('I', 8);

    // Deliberately unimplemented forms
    pub const UNSUPPORTED: Self = Self::new('U', 1);

    // Input that could not be read
    pub const UNREADABLE_INPUT: Self = Self::new('X', 1);
    pub const MALFORMED_INPUT: Self = Self::new('X', 2);
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}{:03}", self.category, self.number)
    }
}

/// A complete diagnostic
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub level: Level,
    pub code: Option<ErrorCode>,
    pub message: String,
    /// Where the problem is, if known
    pub span: Option<Span>,
    pub notes: Vec<String>,
}

impl Diagnostic {
    fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            level,
            code: None,
            message: message.into(),
            span: None,
            notes: Vec::new(),
        }
    }

    /// Creates a new error
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Level::Error, message)
    }

    /// Creates a new warning
    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Level::Warning, message)
    }

    /// Sets the error code
    pub fn with_code(mut self, code: ErrorCode) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Adds a note
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

/// Renders a diagnostic for display
pub struct DiagnosticRenderer<'a> {
    /// Name shown in `-->` lines
    file_name: &'a str,
    use_colors: bool,
}

impl<'a> DiagnosticRenderer<'a> {
    pub fn new(file_name: &'a str) -> Self {
        Self {
            file_name,
            use_colors: true,
        }
    }

    pub fn without_colors(mut self) -> Self {
        self.use_colors = false;
        self
    }

    /// Renders the diagnostic as a string
    pub fn render(&self, diagnostic: &Diagnostic) -> String {
        let mut output = String::new();

        // Line 1: error[EI001]: message
        let reset = if self.use_colors { "\x1b[0m" } else { "" };
        let color = if self.use_colors {
            diagnostic.level.color_code()
        } else {
            ""
        };
        let bold = if self.use_colors { "\x1b[1m" } else { "" };

        output.push_str(color);
        output.push_str(diagnostic.level.as_str());

        if let Some(code) = &diagnostic.code {
            output.push('[');
            output.push_str(&code.to_string());
            output.push(']');
        }

        output.push_str(reset);
        output.push_str(bold);
        output.push_str(": ");
        output.push_str(&diagnostic.message);
        output.push_str(reset);
        output.push('\n');

        if let Some(span) = diagnostic.span {
            let blue = if self.use_colors { "\x1b[1;34m" } else { "" };
            output.push_str(&format!(" {}-->{} {}:{}\n", blue, reset, self.file_name, span));
        }

        for note in &diagnostic.notes {
            output.push_str(&format!("  = {}note{}: {}\n", bold, reset, note));
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_rendering() {
        let diagnostic = Diagnostic::error("no lowering for operation `&&`")
            .with_code(ErrorCode::NO_LOWERING)
            .with_span(Span::line(3, 5, 12))
            .with_note("this is a bug in the compiler");

        let output = DiagnosticRenderer::new("input.json")
            .without_colors()
            .render(&diagnostic);

        assert!(output.starts_with("error[EI006]: no lowering"));
        assert!(output.contains("--> input.json:3:5"));
        assert!(output.contains("= note: this is a bug in the compiler"));
    }

    #[test]
    fn test_synthetic_span_is_rendered_as_such() {
        let diagnostic = Diagnostic::warning("dump only").with_span(Span::default());
        let output = DiagnosticRenderer::new("x").without_colors().render(&diagnostic);
        assert!(output.contains("x:<synthetic>"));
    }
}
