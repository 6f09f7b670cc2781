//! Backward dataflow over a [`FlowGraph`]
//!
//! First pass: a work-list fixed point of per-block live-in/live-out.
//! Second pass: walk each block backwards from its live-out and record
//! interference edges and move candidates.

use crate::graph::{FlowBlock, FlowGraph, FlowKind};
use crate::register::{Register, RegisterEdge};
use std::collections::BTreeSet;
use std::fmt;
use tern_error::Result;
use tracing::{debug, trace};

pub type RegisterSet = BTreeSet<Register>;

/// Liveness facts of one block
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockLiveness {
    pub label: String,
    /// Registers read before any write in the block
    pub uses: RegisterSet,
    /// Registers written in the block
    pub defs: RegisterSet,
    pub live_in: RegisterSet,
    pub live_out: RegisterSet,
}

/// A register copy the allocator may merge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MoveCandidate {
    pub dest: Register,
    pub src: Register,
}

impl fmt::Display for MoveCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <- {}", self.dest, self.src)
    }
}

/// Result of liveness analysis of one function
#[derive(Debug, Clone)]
pub struct Liveness {
    blocks: Vec<BlockLiveness>,
    interference: BTreeSet<RegisterEdge>,
    coalesce: BTreeSet<MoveCandidate>,
    iterations: usize,
}

impl Liveness {
    pub fn analyze(graph: &FlowGraph) -> Result<Self> {
        let mut blocks: Vec<BlockLiveness> = graph.blocks().iter().map(use_def).collect();
        let iterations = solve(graph, &mut blocks);

        let mut interference = BTreeSet::new();
        let mut coalesce = BTreeSet::new();
        for (block, facts) in graph.blocks().iter().zip(&blocks) {
            scan_block(block, &facts.live_out, &mut interference, &mut coalesce);
        }
        interference.retain(|edge: &RegisterEdge| !edge.touches_reserved());
        coalesce.retain(|m: &MoveCandidate| !m.dest.is_reserved() && !m.src.is_reserved());

        debug!(
            blocks = blocks.len(),
            iterations,
            edges = interference.len(),
            moves = coalesce.len(),
            "liveness solved"
        );

        Ok(Self {
            blocks,
            interference,
            coalesce,
            iterations,
        })
    }

    pub fn blocks(&self) -> &[BlockLiveness] {
        &self.blocks
    }

    pub fn block(&self, label: &str) -> Option<&BlockLiveness> {
        self.blocks.iter().find(|b| b.label == label)
    }

    pub fn live_in(&self, label: &str) -> Option<&RegisterSet> {
        self.block(label).map(|b| &b.live_in)
    }

    pub fn live_out(&self, label: &str) -> Option<&RegisterSet> {
        self.block(label).map(|b| &b.live_out)
    }

    pub fn interference(&self) -> &BTreeSet<RegisterEdge> {
        &self.interference
    }

    pub fn coalesce(&self) -> &BTreeSet<MoveCandidate> {
        &self.coalesce
    }

    pub fn interferes(&self, a: Register, b: Register) -> bool {
        RegisterEdge::new(a, b).is_some_and(|edge| self.interference.contains(&edge))
    }

    /// Number of work-list pops the first pass took
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Re-applies the transfer function once to every block.
    /// `true` if no set changes.
    pub fn verify_fixed_point(&self, graph: &FlowGraph) -> bool {
        if graph.len() != self.blocks.len() {
            return false;
        }
        (0..graph.len()).all(|i| {
            let (live_in, live_out) = transfer(graph, &self.blocks, i);
            live_in == self.blocks[i].live_in && live_out == self.blocks[i].live_out
        })
    }
}

impl fmt::Display for Liveness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |regs: &RegisterSet| {
            regs.iter()
                .map(|r| r.to_string())
                .collect::<Vec<_>>()
                .join(" ")
        };
        for block in &self.blocks {
            writeln!(f, "{}:", block.label)?;
            writeln!(f, "  in:  {{{}}}", join(&block.live_in))?;
            writeln!(f, "  out: {{{}}}", join(&block.live_out))?;
        }
        writeln!(f, "interference:")?;
        for edge in &self.interference {
            writeln!(f, "  {}", edge)?;
        }
        writeln!(f, "coalesce:")?;
        for candidate in &self.coalesce {
            writeln!(f, "  {}", candidate)?;
        }
        Ok(())
    }
}

fn use_def(block: &FlowBlock) -> BlockLiveness {
    let mut uses = RegisterSet::new();
    let mut defs = RegisterSet::new();
    for inst in &block.instructions {
        uses.extend(inst.uses.iter().filter(|r| !defs.contains(*r)));
        defs.extend(inst.defs.iter().copied());
    }
    BlockLiveness {
        label: block.label.clone(),
        uses,
        defs,
        ..Default::default()
    }
}

/// live-out = union of successor live-in;
/// live-in = uses + (live-out - defs), without the pseudo-registers
fn transfer(graph: &FlowGraph, blocks: &[BlockLiveness], i: usize) -> (RegisterSet, RegisterSet) {
    let live_out: RegisterSet = graph
        .successors(i)
        .flat_map(|s| blocks[s].live_in.iter().copied())
        .collect();
    let facts = &blocks[i];
    let live_in: RegisterSet = facts
        .uses
        .iter()
        .chain(live_out.difference(&facts.defs))
        .copied()
        .filter(|r| !r.is_reserved())
        .collect();
    (live_in, live_out)
}

fn solve(graph: &FlowGraph, blocks: &mut [BlockLiveness]) -> usize {
    let preds = graph.predecessors();
    let mut worklist: BTreeSet<usize> = (0..blocks.len()).collect();
    let mut iterations = 0;

    // later blocks first, most edges run forward
    while let Some(i) = worklist.pop_last() {
        iterations += 1;
        let (live_in, live_out) = transfer(graph, blocks, i);
        trace!(block = %blocks[i].label, live_in = live_in.len(), "liveness step");

        blocks[i].live_out = live_out;
        if live_in != blocks[i].live_in {
            blocks[i].live_in = live_in;
            worklist.extend(preds[i].iter().copied());
        }
    }
    iterations
}

fn scan_block(
    block: &FlowBlock,
    live_out: &RegisterSet,
    interference: &mut BTreeSet<RegisterEdge>,
    coalesce: &mut BTreeSet<MoveCandidate>,
) {
    let mut live = live_out.clone();
    for inst in block.instructions.iter().rev() {
        if inst.is_move() {
            for used in &inst.uses {
                live.remove(used);
            }
            if let (Some(&dest), Some(&src)) = (inst.defs.first(), inst.uses.first()) {
                coalesce.insert(MoveCandidate { dest, src });
            }
        }
        live.extend(inst.defs.iter().copied());
        for &def in &inst.defs {
            interference.extend(live.iter().filter_map(|&l| RegisterEdge::new(def, l)));
        }
        for def in &inst.defs {
            live.remove(def);
        }
        live.extend(inst.uses.iter().copied());
        if let FlowKind::StoreAssist { value, assist } = inst.kind {
            interference.extend(RegisterEdge::new(value, assist));
        }
    }
}
