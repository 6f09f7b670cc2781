//! tern-semantic - Front-end resolution pieces the backend relies on
//!
//! Name and overload resolution happen before the backend runs. This crate
//! holds the rules the front end applies so that a handed-over program can
//! be re-checked before lowering:
//! - Scoped symbol table (redeclaration rejected only within one frame)
//! - Signature and overload matching
//! - Operator resolution to a single [`tern_ast::Operation`]
//!
//! # Example
//!
//! ```rust
//! use tern_ast::Program;
//! use tern_semantic::check;
//!
//! let program = Program::default();
//! assert!(check(&program).is_empty());
//! ```

pub mod checker;
pub mod operators;
pub mod signature;
pub mod symbols;

pub use checker::{check, Checker};
pub use signature::{resolve_overload, Signature, SignatureTable};
pub use symbols::{Scope, Symbol, SymbolTable};
