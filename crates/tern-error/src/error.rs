//! Fatal errors raised by the backend
//!
//! User errors never reach the backend: the front end reports them and stops.
//! What is left are two kinds of fatal conditions. Internal-consistency
//! failures mean a bug upstream or in the backend itself. Unsupported
//! constructs are forms the backend knowingly does not lower yet.

use crate::diagnostic::{Diagnostic, ErrorCode};
use thiserror::Error;

/// Internal-consistency failure. Always a compiler bug, never a user mistake.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InternalError {
    #[error("block `{block}` of `{function}` has no terminator")]
    UnterminatedBlock { function: String, block: String },

    #[error("field `{field}` has no layout index in class `{class}`")]
    MissingLayoutIndex { class: String, field: String },

    #[error("class `{class}` has no recorded layout")]
    MissingLayout { class: String },

    #[error("`this` referenced outside of a member function in `{function}`")]
    UnresolvedReceiver { function: String },

    #[error("type <unknown> reached code generation")]
    UnknownType,

    #[error("`{construct}` found after semantic analysis")]
    Unresolved { construct: String },

    #[error("no declaration found for reachable function `{function}`")]
    MissingDeclaration { function: String },

    #[error("no lowering for operation `{operation}`")]
    NoLowering { operation: String },

    #[error("loop target of loop #{loop_id} is not registered")]
    MissingLoopTarget { loop_id: u32 },

    #[error("block `{from}` has an edge to unrecorded block `{to}`")]
    UnknownBlock { from: String, to: String },

    #[error("phi in `{to}` takes a value from `{from}`, which branches; split the edge first")]
    CriticalEdge { from: String, to: String },
}

/// Any fatal condition that aborts compilation of the current input
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("internal compiler error: {0}")]
    Internal(#[from] InternalError),

    #[error("not supported yet: {construct}")]
    Unsupported { construct: String },
}

impl CompileError {
    pub fn unsupported(construct: impl Into<String>) -> Self {
        CompileError::Unsupported {
            construct: construct.into(),
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, CompileError::Internal(_))
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            CompileError::Internal(internal) => match internal {
                InternalError::UnterminatedBlock { .. } => ErrorCode::UNTERMINATED_BLOCK,
                InternalError::MissingLayoutIndex { .. } | InternalError::MissingLayout { .. } => {
                    ErrorCode::MISSING_LAYOUT
                }
                InternalError::UnresolvedReceiver { .. } | InternalError::Unresolved { .. } => {
                    ErrorCode::UNRESOLVED_REFERENCE
                }
                InternalError::UnknownType => ErrorCode::UNKNOWN_TYPE_IN_CODEGEN,
                InternalError::MissingDeclaration { .. } => ErrorCode::MISSING_DECLARATION,
                InternalError::NoLowering { .. } => ErrorCode::NO_LOWERING,
                InternalError::MissingLoopTarget { .. } => ErrorCode::MISSING_LOOP_TARGET,
                InternalError::UnknownBlock { .. } | InternalError::CriticalEdge { .. } => {
                    ErrorCode::MALFORMED_CFG
                }
            },
            CompileError::Unsupported { .. } => ErrorCode::UNSUPPORTED,
        }
    }

    /// Converts into a renderable diagnostic
    pub fn to_diagnostic(&self) -> Diagnostic {
        let diagnostic = Diagnostic::error(self.to_string()).with_code(self.code());
        if self.is_internal() {
            diagnostic.with_note("this is a bug in the compiler, not in the program being compiled")
        } else {
            diagnostic.with_note("this construct is recognised but has no lowering yet")
        }
    }
}

impl From<CompileError> for Diagnostic {
    fn from(err: CompileError) -> Self {
        err.to_diagnostic()
    }
}
