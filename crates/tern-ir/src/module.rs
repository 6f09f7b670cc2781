//! IR Module - high-level structure
//!
//! Contains the module definition, functions and basic blocks.

use crate::instruction::Instruction;
use crate::types::{ClassLayout, IrType};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;
use tern_ast::Builtin;
use tern_error::{InternalError, Result};

/// IR Module - represents a complete program
#[derive(Debug, Default)]
pub struct Module {
    /// Class layouts by name
    pub classes: BTreeMap<String, ClassLayout>,
    /// Program globals followed by the literal pool
    pub globals: Vec<Global>,
    /// Functions with a body
    pub functions: Vec<Function>,
    /// Runtime functions referenced by the program
    pub externals: Vec<External>,
    /// Literal content -> global name
    literals: HashMap<String, String>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns a string literal, returning the name of its backing global.
    /// Equal contents share one entry.
    pub fn intern_literal(&mut self, text: &str) -> String {
        if let Some(name) = self.literals.get(text) {
            return name.clone();
        }
        let name = format!("__literal__.{}", self.literals.len());
        self.globals.push(Global {
            name: name.clone(),
            ty: IrType::Array(text.len() + 5, Box::new(IrType::I8)),
            init: Initializer::Literal(text.to_string()),
        });
        self.literals.insert(text.to_string(), name.clone());
        name
    }

    /// Number of distinct literals
    pub fn literal_count(&self) -> usize {
        self.literals.len()
    }

    /// Adds a zero-initialized global
    pub fn add_global(&mut self, name: impl Into<String>, ty: IrType) {
        self.globals.push(Global {
            name: name.into(),
            ty,
            init: Initializer::Zero,
        });
    }

    pub fn get_global(&self, name: &str) -> Option<&Global> {
        self.globals.iter().find(|g| g.name == name)
    }

    /// Records a runtime function as referenced
    pub fn declare_external(&mut self, builtin: Builtin) {
        if !self.externals.iter().any(|e| e.builtin == builtin) {
            self.externals.push(External::of(builtin));
        }
    }

    /// Adds a function
    pub fn add_function(&mut self, func: Function) {
        self.functions.push(func);
    }

    /// Finds a function by name
    pub fn get_function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Finds a mutable function by name
    pub fn get_function_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.functions.iter_mut().find(|f| f.name == name)
    }

    pub fn layout(&self, class: &str) -> Option<&ClassLayout> {
        self.classes.get(class)
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for layout in self.classes.values() {
            writeln!(f, "{}", layout)?;
        }
        if !self.classes.is_empty() {
            writeln!(f)?;
        }

        for global in &self.globals {
            writeln!(f, "{}", global)?;
        }
        if !self.globals.is_empty() {
            writeln!(f)?;
        }

        for external in &self.externals {
            writeln!(f, "{}", external)?;
        }
        if !self.externals.is_empty() {
            writeln!(f)?;
        }

        for (i, func) in self.functions.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", func)?;
        }

        Ok(())
    }
}

/// Initial contents of a global
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Initializer {
    Zero,
    /// Length header, then the text, then a NUL
    Literal(String),
}

/// Global variable or literal buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Global {
    pub name: String,
    pub ty: IrType,
    pub init: Initializer,
}

impl fmt::Display for Global {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.init {
            Initializer::Zero => write!(f, "@{} = global {} zero", self.name, self.ty),
            Initializer::Literal(text) => write!(
                f,
                "@{} = global {} {{ {}, \"{}\\00\" }}",
                self.name,
                self.ty,
                text.len(),
                text.escape_default()
            ),
        }
    }
}

/// Declaration of a runtime function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct External {
    pub builtin: Builtin,
    pub name: &'static str,
    pub return_type: IrType,
    pub params: Vec<IrType>,
}

impl External {
    /// Runtime signature; receivers come last
    pub fn of(builtin: Builtin) -> Self {
        let s = IrType::string;
        let (return_type, params) = match builtin {
            Builtin::Print | Builtin::Println => (IrType::Void, vec![s()]),
            Builtin::PrintInt | Builtin::PrintlnInt => (IrType::Void, vec![IrType::I32]),
            Builtin::GetString => (s(), vec![]),
            Builtin::GetInt => (IrType::I32, vec![]),
            Builtin::ToString => (s(), vec![IrType::I32]),
            Builtin::StringLength | Builtin::StringParseInt => (IrType::I32, vec![s()]),
            Builtin::StringOrd => (IrType::I32, vec![IrType::I32, s()]),
            Builtin::StringSubstring => (s(), vec![IrType::I32, IrType::I32, s()]),
            Builtin::ArraySize => (IrType::I32, vec![s()]),
            Builtin::DefaultConstructor => (IrType::Void, vec![]),
            Builtin::StringConcatenate => (s(), vec![s(), s()]),
            Builtin::StringEqual
            | Builtin::StringNeq
            | Builtin::StringLess
            | Builtin::StringLeq
            | Builtin::StringGreater
            | Builtin::StringGeq => (IrType::I8, vec![s(), s()]),
            Builtin::Malloc => (s(), vec![IrType::I32]),
        };
        Self {
            builtin,
            name: builtin.symbol(),
            return_type,
            params,
        }
    }
}

impl fmt::Display for External {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "declare {} @{}(", self.return_type, self.name)?;
        for (i, ty) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", ty)?;
        }
        write!(f, ")")
    }
}

/// Function in IR
#[derive(Debug, Clone)]
pub struct Function {
    /// Function name
    pub name: String,
    /// Parameters (name, type)
    pub params: Vec<(String, IrType)>,
    /// Return type
    pub return_type: IrType,
    /// Basic blocks; the first one is the entry
    pub blocks: Vec<BasicBlock>,
    /// Next temporary ID
    next_temp: u32,
}

impl Function {
    pub fn new(name: impl Into<String>, return_type: IrType) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            return_type,
            blocks: vec![BasicBlock::new("entry")],
            next_temp: 0,
        }
    }

    /// Adds parameter
    pub fn add_param(&mut self, name: impl Into<String>, ty: IrType) {
        self.params.push((name.into(), ty));
    }

    /// Creates a new temporary
    pub fn new_temp(&mut self) -> u32 {
        let id = self.next_temp;
        self.next_temp += 1;
        id
    }

    /// Number of temporaries handed out so far
    pub fn temp_count(&self) -> u32 {
        self.next_temp
    }

    /// Finds block by label
    pub fn get_block(&self, label: &str) -> Option<&BasicBlock> {
        self.blocks.iter().find(|b| b.label == label)
    }

    /// Finds mutable block by label
    pub fn get_block_mut(&mut self, label: &str) -> Option<&mut BasicBlock> {
        self.blocks.iter_mut().find(|b| b.label == label)
    }

    pub fn entry(&self) -> Option<&BasicBlock> {
        self.blocks.first()
    }

    /// Returns the current block (last)
    pub fn current_block(&self) -> Option<&BasicBlock> {
        self.blocks.last()
    }

    /// Label of the current block
    pub fn current_label(&self) -> &str {
        self.blocks.last().map(|b| b.label.as_str()).unwrap_or_default()
    }

    /// Opens a new block; it becomes the current one
    pub fn new_block(&mut self, label: impl Into<String>) {
        self.blocks.push(BasicBlock::new(label));
    }

    /// Adds instruction to the current block. A no-op once that block is
    /// terminated.
    pub fn emit(&mut self, inst: Instruction) {
        if let Some(block) = self.blocks.last_mut() {
            block.push(inst);
        }
    }

    /// Predecessor labels of every block
    pub fn predecessors(&self) -> HashMap<&str, Vec<&str>> {
        let mut preds: HashMap<&str, Vec<&str>> = self
            .blocks
            .iter()
            .map(|b| (b.label.as_str(), Vec::new()))
            .collect();
        for block in &self.blocks {
            for succ in block.successors() {
                preds.entry(succ).or_default().push(block.label.as_str());
            }
        }
        preds
    }

    /// Removes blocks not reachable from the entry
    pub fn prune_unreachable(&mut self) -> usize {
        let Some(entry) = self.blocks.first() else {
            return 0;
        };

        let mut reachable: HashSet<String> = HashSet::new();
        let mut queue = VecDeque::from([entry.label.clone()]);
        while let Some(label) = queue.pop_front() {
            if !reachable.insert(label.clone()) {
                continue;
            }
            if let Some(block) = self.get_block(&label) {
                queue.extend(block.successors().into_iter().map(str::to_string));
            }
        }

        let before = self.blocks.len();
        self.blocks.retain(|b| reachable.contains(&b.label));
        before - self.blocks.len()
    }

    /// Checks that every block is terminated and every edge lands on a
    /// recorded block
    pub fn verify(&self) -> Result<()> {
        let labels: HashSet<&str> = self.blocks.iter().map(|b| b.label.as_str()).collect();
        for block in &self.blocks {
            if !block.is_terminated() {
                return Err(InternalError::UnterminatedBlock {
                    function: self.name.clone(),
                    block: block.label.clone(),
                }
                .into());
            }
            for succ in block.successors() {
                if !labels.contains(succ) {
                    return Err(InternalError::UnknownBlock {
                        from: block.label.clone(),
                        to: succ.to_string(),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "define {} @{}(", self.return_type, self.name)?;
        for (i, (name, ty)) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} %arg{} ; {}", ty, i, name)?;
        }
        writeln!(f, ") {{")?;

        for block in &self.blocks {
            writeln!(f, "{}:", block.label)?;
            for inst in &block.instructions {
                writeln!(f, "  {}", inst)?;
            }
        }

        writeln!(f, "}}")
    }
}

/// Whether a block still accepts instructions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    Open,
    /// A terminator was recorded; later appends are dropped
    Terminated,
}

/// Basic Block - sequence of instructions ending in one terminator
#[derive(Debug, Clone)]
pub struct BasicBlock {
    /// Block label
    pub label: String,
    /// Instructions
    pub instructions: Vec<Instruction>,
    state: BlockState,
}

impl BasicBlock {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            instructions: Vec::new(),
            state: BlockState::Open,
        }
    }

    pub fn state(&self) -> BlockState {
        self.state
    }

    /// Checks if the block is terminated (has a terminator instruction)
    pub fn is_terminated(&self) -> bool {
        self.state == BlockState::Terminated
    }

    /// Adds instruction. Returns `false` if the block was already
    /// terminated and the instruction was dropped.
    pub fn push(&mut self, inst: Instruction) -> bool {
        if self.is_terminated() {
            return false;
        }
        if inst.is_terminator() {
            self.state = BlockState::Terminated;
        }
        self.instructions.push(inst);
        true
    }

    pub fn terminator(&self) -> Option<&Instruction> {
        self.instructions.last().filter(|i| i.is_terminator())
    }

    /// Labels this block may jump to
    pub fn successors(&self) -> Vec<&str> {
        self.terminator().map(|t| t.successors()).unwrap_or_default()
    }
}
