//! tern-liveness - register liveness for the allocator
//!
//! ```text
//! IR Function (tern-ir)
//!        ↓
//!   [FlowGraph]   registers, phi moves, scratch registers
//!        ↓
//!   [Liveness]    live-in / live-out per block
//!        ↓
//!   interference edges + coalescing candidates
//! ```

pub mod analysis;
pub mod graph;
pub mod register;

pub use analysis::{BlockLiveness, Liveness, MoveCandidate, RegisterSet};
pub use graph::{FlowBlock, FlowGraph, FlowInstruction, FlowKind};
pub use register::{Register, RegisterEdge};

use tern_error::Result;
use tern_ir::Function;

/// Builds the flow graph of `func` and analyzes it
pub fn analyze_function(func: &Function) -> Result<(FlowGraph, Liveness)> {
    let graph = FlowGraph::from_function(func)?;
    let liveness = Liveness::analyze(&graph)?;
    Ok((graph, liveness))
}
