//! Span - Source code location
//!
//! The front end stamps every AST node with the region it was parsed from.
//! The backend never reads source text, it only carries spans through so a
//! fatal error can point back at the construct that triggered it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents a position in the source code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Position {
    /// Line (1-indexed)
    pub line: u32,
    /// Column (1-indexed)
    pub column: u32,
}

impl Position {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// Represents a region in the source code (start to end)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Span {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Span covering a single line range, mostly useful for hand-built trees
    pub fn line(line: u32, from: u32, to: u32) -> Self {
        Self::new(Position::new(line, from), Position::new(line, to))
    }

    /// Whether the span was never filled in by the front end
    pub fn is_synthetic(&self) -> bool {
        self.start.line == 0
    }

    /// Combines two spans, creating one that covers both
    pub fn merge(self, other: Span) -> Span {
        let start = if (self.start.line, self.start.column) <= (other.start.line, other.start.column) {
            self.start
        } else {
            other.start
        };
        let end = if (self.end.line, self.end.column) >= (other.end.line, other.end.column) {
            self.end
        } else {
            other.end
        };
        Span { start, end }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_synthetic() {
            write!(f, "<synthetic>")
        } else {
            write!(f, "{}:{}", self.start.line, self.start.column)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_merge() {
        let merged = Span::line(1, 1, 5).merge(Span::line(3, 2, 9));
        assert_eq!(merged.start, Position::new(1, 1));
        assert_eq!(merged.end, Position::new(3, 9));
    }

    #[test]
    fn test_default_span_is_synthetic() {
        assert!(Span::default().is_synthetic());
        assert_eq!(Span::default().to_string(), "<synthetic>");
        assert_eq!(Span::line(4, 7, 9).to_string(), "4:7");
    }
}
