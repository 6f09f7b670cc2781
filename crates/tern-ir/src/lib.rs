//! tern-ir - Intermediate Representation of Tern programs
//!
//! The IR is a control-flow graph per function that:
//! - Keeps every local in an explicit stack slot (no SSA yet)
//! - Ends every basic block in exactly one terminator
//! - Introduces a phi only for the conditional operator
//! - Calls runtime functions by fixed external symbols
//!
//! # Architecture
//!
//! ```text
//! Resolved AST (tern-ast)
//!         ↓
//!    [Lowering]
//!         ↓
//!   IR Module
//!   ├── Class layouts
//!   ├── Globals + literal pool
//!   ├── External declarations
//!   └── Functions
//!       └── Basic Blocks
//!           └── Instructions
//!         ↓
//!    [Liveness]
//!         ↓
//!   Interference + coalescing (tern-liveness)
//! ```

pub mod instruction;
pub mod lower;
pub mod module;
pub mod types;

pub use instruction::{BinaryOp, CompareOp, Instruction, Value};
pub use lower::{lower, LowerOptions, LoweringContext, GLOBAL_INIT};
pub use module::{BasicBlock, BlockState, External, Function, Global, Initializer, Module};
pub use types::{ClassLayout, FieldLayout, IrType};
