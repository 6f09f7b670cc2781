//! tern-error - Diagnostics system for the Tern compiler backend
//!
//! This crate provides the location types carried by the AST, the
//! diagnostic renderer used by the CLI, and [`CompileError`], the single
//! error type returned by every fallible stage of the backend.
//!
//! # Example
//!
//! ```rust
//! use tern_error::{CompileError, DiagnosticRenderer, InternalError};
//!
//! let err: CompileError = InternalError::UnknownType.into();
//! let diagnostic = err.to_diagnostic();
//!
//! let renderer = DiagnosticRenderer::new("program.json").without_colors();
//! println!("{}", renderer.render(&diagnostic));
//! ```

pub mod diagnostic;
pub mod error;
pub mod span;

pub use diagnostic::{Diagnostic, DiagnosticRenderer, ErrorCode, Level};
pub use error::{CompileError, InternalError};
pub use span::{Position, Span};

/// Default Result type for backend stages
pub type Result<T> = std::result::Result<T, CompileError>;

/// Collection of diagnostics accumulated during compilation
#[derive(Debug, Default)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.items.push(diagnostic);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.items.push(Diagnostic::error(message));
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.items.push(Diagnostic::warning(message));
    }

    pub fn has_errors(&self) -> bool {
        self.items.iter().any(|d| d.level == Level::Error)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    /// Renders all diagnostics
    pub fn render(&self, renderer: &DiagnosticRenderer<'_>) -> String {
        self.items
            .iter()
            .map(|d| renderer.render(d))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}
