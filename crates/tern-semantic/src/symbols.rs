//! Symbol table for Tern programs

use std::collections::HashMap;
use tern_ast::{LoopId, Type, VarId, Variable};
use tern_error::Span;

/// A variable binding in the table
#[derive(Debug, Clone)]
pub struct Symbol {
    pub variable: Variable,
    /// Where it was defined
    pub defined_at: Option<Span>,
}

impl Symbol {
    pub fn new(variable: Variable, span: Span) -> Self {
        Self {
            variable,
            defined_at: (!span.is_synthetic()).then_some(span),
        }
    }

    pub fn name(&self) -> &str {
        &self.variable.name
    }

    pub fn id(&self) -> VarId {
        self.variable.id
    }

    pub fn ty(&self) -> &Type {
        &self.variable.ty
    }
}

/// One frame of the scope stack
#[derive(Debug, Default)]
pub struct Scope {
    symbols: HashMap<String, Symbol>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }
}

/// Symbol table with nested scopes and the stack of enclosing loops
#[derive(Debug)]
pub struct SymbolTable {
    /// Scope stack (the last one is the current scope)
    scopes: Vec<Scope>,
    /// Loops enclosing the current statement, innermost last
    loops: Vec<LoopId>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::new()], // Global scope
            loops: Vec::new(),
        }
    }

    /// Enters a new scope
    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::new());
    }

    /// Exits the current scope
    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// Defines a symbol in the current scope.
    ///
    /// A name already bound in the current frame is rejected and the new
    /// symbol handed back. A binding in an enclosing frame is shadowed.
    pub fn define(&mut self, symbol: Symbol) -> Result<(), Symbol> {
        let Some(scope) = self.scopes.last_mut() else {
            return Err(symbol);
        };
        if scope.symbols.contains_key(symbol.name()) {
            return Err(symbol);
        }
        scope.symbols.insert(symbol.name().to_string(), symbol);
        Ok(())
    }

    /// Looks up a symbol in all scopes (from innermost to outermost)
    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.scopes.iter().rev().find_map(|scope| scope.lookup(name))
    }

    /// Looks up only in the current scope
    pub fn lookup_current_scope(&self, name: &str) -> Option<&Symbol> {
        self.scopes.last()?.lookup(name)
    }

    /// Returns the depth of the current scope
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn enter_loop(&mut self, id: LoopId) {
        self.loops.push(id);
    }

    pub fn exit_loop(&mut self) {
        self.loops.pop();
    }

    /// Innermost enclosing loop
    pub fn current_loop(&self) -> Option<LoopId> {
        self.loops.last().copied()
    }

    /// Whether `id` is one of the loops enclosing the current statement
    pub fn is_enclosing_loop(&self, id: LoopId) -> bool {
        self.loops.contains(&id)
    }
}
