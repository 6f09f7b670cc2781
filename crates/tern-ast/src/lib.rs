//! tern-ast - Resolved AST handed from the front end to the backend
//!
//! Lexing, parsing and semantic analysis happen elsewhere. What arrives here
//! is a fully resolved, type-annotated tree. It is serializable so a front
//! end in another process can hand it over as JSON.
//!
//! # Example
//!
//! ```rust
//! use tern_ast::Program;
//!
//! let program = Program::from_json(r#"{"classes":[],"globals":[],"functions":[]}"#).unwrap();
//! assert!(program.functions.is_empty());
//! ```

pub mod ast;
pub mod builtins;
pub mod operators;
pub mod types;

pub use ast::*;
pub use builtins::Builtin;
pub use operators::{ArithOp, AssignKind, BinaryOp, Comparison, Operation, PrefixOp, SuffixOp};
pub use types::Type;

use std::path::Path;
use thiserror::Error;

/// Failure to obtain a [`Program`] from serialized input
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed program: {0}")]
    Json(#[from] serde_json::Error),
}

impl Program {
    pub fn from_json(text: &str) -> Result<Self, LoadError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String, LoadError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reads a program serialized by the front end
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }
}
