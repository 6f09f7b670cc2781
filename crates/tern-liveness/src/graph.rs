//! Register-level flow graph
//!
//! The analysis does not look at IR instructions directly. Each one is
//! reduced to the registers it defines and uses, and phis are replaced by
//! moves at the end of each predecessor.

use crate::register::Register;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use tern_error::{InternalError, Result};
use tern_ir::{Function, Instruction, Value};

/// What the allocator needs to know about an instruction beyond def/use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FlowKind {
    Plain,
    /// Register copy, a coalescing candidate
    Move,
    /// Store to a global through a scratch register.
    /// `value` and `assist` must not share a register.
    StoreAssist { value: Register, assist: Register },
}

/// One instruction reduced to registers
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FlowInstruction {
    pub kind: FlowKind,
    pub defs: Vec<Register>,
    pub uses: Vec<Register>,
}

impl FlowInstruction {
    pub fn plain(defs: Vec<Register>, uses: Vec<Register>) -> Self {
        Self {
            kind: FlowKind::Plain,
            defs,
            uses,
        }
    }

    pub fn copy(dest: Register, src: Register) -> Self {
        Self {
            kind: FlowKind::Move,
            defs: vec![dest],
            uses: vec![src],
        }
    }

    pub fn store_assist(value: Register, assist: Register) -> Self {
        Self {
            kind: FlowKind::StoreAssist { value, assist },
            defs: vec![assist],
            uses: vec![value],
        }
    }

    pub fn is_move(&self) -> bool {
        self.kind == FlowKind::Move
    }

    /// Every register the instruction mentions
    pub fn registers(&self) -> impl Iterator<Item = Register> + '_ {
        self.defs.iter().chain(self.uses.iter()).copied()
    }
}

impl fmt::Display for FlowInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |regs: &[Register]| {
            regs.iter()
                .map(|r| r.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        let name = match self.kind {
            FlowKind::Plain => "op",
            FlowKind::Move => "mv",
            FlowKind::StoreAssist { .. } => "sg",
        };
        write!(f, "{} [{}] <- [{}]", name, join(&self.defs), join(&self.uses))
    }
}

/// Basic block of the flow graph
#[derive(Debug, Clone)]
pub struct FlowBlock {
    pub label: String,
    pub instructions: Vec<FlowInstruction>,
    pub successors: Vec<String>,
}

impl FlowBlock {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            instructions: Vec::new(),
            successors: Vec::new(),
        }
    }

    pub fn with_instruction(mut self, inst: FlowInstruction) -> Self {
        self.instructions.push(inst);
        self
    }

    pub fn with_successor(mut self, label: impl Into<String>) -> Self {
        self.successors.push(label.into());
        self
    }
}

/// Control-flow graph over register instructions
#[derive(Debug, Clone, Default)]
pub struct FlowGraph {
    blocks: Vec<FlowBlock>,
    index: HashMap<String, usize>,
}

impl FlowGraph {
    /// Builds a graph from blocks, the first one being the entry.
    /// Fails if any block names a successor that is not in the graph.
    pub fn new(blocks: Vec<FlowBlock>) -> Result<Self> {
        let index: HashMap<String, usize> = blocks
            .iter()
            .enumerate()
            .map(|(i, b)| (b.label.clone(), i))
            .collect();

        for block in &blocks {
            for succ in &block.successors {
                if !index.contains_key(succ) {
                    return Err(InternalError::UnknownBlock {
                        from: block.label.clone(),
                        to: succ.clone(),
                    }
                    .into());
                }
            }
        }

        Ok(Self { blocks, index })
    }

    /// Reduces an IR function to registers.
    ///
    /// - temporaries become virtual registers, parameters argument registers
    /// - constant `0` and `null` read the zero register
    /// - stack slots are addressed off the stack pointer
    /// - each phi becomes a move at the end of every predecessor, which must
    ///   end in an unconditional jump (no critical edges)
    /// - a store to a global takes a fresh scratch register
    pub fn from_function(func: &Function) -> Result<Self> {
        let mut lowering = Reducer {
            next_virtual: func.temp_count(),
        };

        let mut blocks: Vec<FlowBlock> = Vec::with_capacity(func.blocks.len());
        let mut phi_moves: HashMap<String, Vec<FlowInstruction>> = HashMap::new();

        for block in &func.blocks {
            let mut flow = FlowBlock::new(block.label.clone());
            flow.successors = block.successors().into_iter().map(String::from).collect();

            for inst in &block.instructions {
                if let Instruction::Phi { dest, incoming, .. } = inst {
                    for (value, pred) in incoming {
                        let Some(pred_block) = func.get_block(pred) else {
                            return Err(InternalError::UnknownBlock {
                                from: block.label.clone(),
                                to: pred.clone(),
                            }
                            .into());
                        };
                        if !matches!(pred_block.terminator(), Some(Instruction::Jump { .. })) {
                            return Err(InternalError::CriticalEdge {
                                from: pred.clone(),
                                to: block.label.clone(),
                            }
                            .into());
                        }
                        let copy = lowering.phi_copy(Register::Virtual(*dest), value);
                        phi_moves.entry(pred.clone()).or_default().push(copy);
                    }
                    continue;
                }
                lowering.reduce(inst, &mut flow.instructions);
            }
            blocks.push(flow);
        }

        for block in &mut blocks {
            if let Some(moves) = phi_moves.remove(&block.label) {
                let at = block.instructions.len().saturating_sub(1);
                block.instructions.splice(at..at, moves);
            }
        }
        Self::new(blocks)
    }

    pub fn blocks(&self) -> &[FlowBlock] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn position(&self, label: &str) -> Option<usize> {
        self.index.get(label).copied()
    }

    pub fn block(&self, label: &str) -> Option<&FlowBlock> {
        self.position(label).map(|i| &self.blocks[i])
    }

    /// Successor indices of block `i`
    pub fn successors(&self, i: usize) -> impl Iterator<Item = usize> + '_ {
        self.blocks[i]
            .successors
            .iter()
            .filter_map(|s| self.index.get(s).copied())
    }

    /// Predecessor indices of every block
    pub fn predecessors(&self) -> Vec<BTreeSet<usize>> {
        let mut preds = vec![BTreeSet::new(); self.blocks.len()];
        for i in 0..self.blocks.len() {
            for succ in self.successors(i) {
                preds[succ].insert(i);
            }
        }
        preds
    }
}

impl fmt::Display for FlowGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for block in &self.blocks {
            writeln!(f, "{}:", block.label)?;
            for inst in &block.instructions {
                writeln!(f, "  {}", inst)?;
            }
            if !block.successors.is_empty() {
                writeln!(f, "  -> {}", block.successors.join(", "))?;
            }
        }
        Ok(())
    }
}

struct Reducer {
    next_virtual: u32,
}

impl Reducer {
    fn fresh(&mut self) -> Register {
        let reg = Register::Virtual(self.next_virtual);
        self.next_virtual += 1;
        reg
    }

    /// Register read by an operand; immediates and global addresses read none
    fn register(value: &Value) -> Option<Register> {
        match value {
            Value::Temp(id) => Some(Register::Virtual(*id)),
            Value::Param(n) => Some(Register::Argument(*n)),
            Value::Const(0) | Value::Null => Some(Register::Zero),
            Value::Const(_) | Value::Global(_) | Value::Void => None,
        }
    }

    fn uses<'a>(values: impl IntoIterator<Item = &'a Value>) -> Vec<Register> {
        values.into_iter().filter_map(Self::register).collect()
    }

    fn phi_copy(&mut self, dest: Register, value: &Value) -> FlowInstruction {
        match Self::register(value) {
            Some(src) => FlowInstruction::copy(dest, src),
            // load-immediate
            None => FlowInstruction::plain(vec![dest], vec![]),
        }
    }

    fn reduce(&mut self, inst: &Instruction, out: &mut Vec<FlowInstruction>) {
        let defs: Vec<Register> = inst.dest().map(Register::Virtual).into_iter().collect();
        match inst {
            Instruction::Alloca { .. } => {
                out.push(FlowInstruction::plain(defs, vec![Register::Sp]));
            }
            Instruction::Store {
                value,
                ptr: Value::Global(_),
                ..
            } => {
                let value = match Self::register(value) {
                    Some(reg) => reg,
                    None => {
                        let reg = self.fresh();
                        out.push(FlowInstruction::plain(vec![reg], vec![]));
                        reg
                    }
                };
                let assist = self.fresh();
                out.push(FlowInstruction::store_assist(value, assist));
            }
            _ => out.push(FlowInstruction::plain(defs, Self::uses(inst.operands()))),
        }
    }
}
