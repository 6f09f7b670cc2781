//! Integration tests for the Tern middle end
//!
//! This crate drives the whole pipeline on resolved programs built with
//! [`dsl`]:
//! Resolved AST → Check → IR → Liveness

pub mod dsl;

use tern_ast::Program;
use tern_error::{CompileError, Diagnostics};
use tern_ir::{lower, Function, LowerOptions, Module};
use tern_liveness::{FlowGraph, Liveness};

/// Result of running a resolved program through the pipeline
#[derive(Debug)]
pub struct CompileResult {
    /// Whether the program lowered without errors
    pub success: bool,
    /// Diagnostics of the check phase
    pub diagnostics: Diagnostics,
    /// Fatal lowering error, if any
    pub error: Option<CompileError>,
    /// Lowered module (if successful)
    pub module: Option<Module>,
}

/// Checks and lowers a program starting at `main`
pub fn compile(program: &Program) -> CompileResult {
    compile_entry(program, "main")
}

pub fn compile_entry(program: &Program, entry: &str) -> CompileResult {
    // Phase 1: Check
    let diagnostics = tern_semantic::check(program);
    if diagnostics.has_errors() {
        return CompileResult {
            success: false,
            diagnostics,
            error: None,
            module: None,
        };
    }

    // Phase 2: IR Generation
    let options = LowerOptions {
        entry: entry.to_string(),
    };
    match lower(program, &options) {
        Ok(module) => CompileResult {
            success: true,
            diagnostics,
            error: None,
            module: Some(module),
        },
        Err(error) => CompileResult {
            success: false,
            diagnostics,
            error: Some(error),
            module: None,
        },
    }
}

/// Asserts that the program lowers, and returns the module
pub fn assert_compiles(program: &Program) -> Module {
    let result = compile(program);
    match result.module {
        Some(module) if result.success => module,
        _ => panic!(
            "Expected program to compile, but got:\n{:?}\n{:?}",
            result.diagnostics, result.error
        ),
    }
}

/// Asserts that the program lowers and its IR dump contains `expected`
pub fn assert_ir_contains(program: &Program, expected: &str) {
    let ir = assert_compiles(program).to_string();
    if !ir.contains(expected) {
        panic!(
            "Expected IR to contain '{}', but it didn't.\n\nGenerated IR:\n{}",
            expected, ir
        );
    }
}

/// Looks up a lowered function by its IR name
pub fn lowered<'m>(module: &'m Module, name: &str) -> &'m Function {
    module
        .get_function(name)
        .unwrap_or_else(|| panic!("function `{}` was not lowered:\n{}", name, module))
}

pub fn labels(func: &Function) -> Vec<&str> {
    func.blocks.iter().map(|b| b.label.as_str()).collect()
}

/// Every block is non-empty and ends in exactly one terminator
pub fn assert_all_terminated(func: &Function) {
    for block in &func.blocks {
        assert!(
            block.terminator().is_some(),
            "block `{}` of `{}` is not terminated:\n{}",
            block.label,
            func.name,
            func
        );
        let terminators = block.instructions.iter().filter(|i| i.is_terminator()).count();
        assert_eq!(
            terminators, 1,
            "block `{}` of `{}` has {} terminators",
            block.label, func.name, terminators
        );
    }
}

/// Every block except the entry has a predecessor
pub fn assert_reachable(func: &Function) {
    let preds = func.predecessors();
    for block in func.blocks.iter().skip(1) {
        let incoming = preds.get(block.label.as_str()).map_or(0, Vec::len);
        assert!(
            incoming > 0,
            "block `{}` of `{}` has no predecessor:\n{}",
            block.label,
            func.name,
            func
        );
    }
}

/// Interference is symmetric, never reflexive, and free of pseudo-registers
pub fn assert_symmetric(liveness: &Liveness) {
    for edge in liveness.interference() {
        let (a, b) = edge.endpoints();
        assert_ne!(a, b, "self edge on {}", a);
        assert!(liveness.interferes(a, b) && liveness.interferes(b, a));
        assert!(!edge.touches_reserved(), "edge {} touches a pseudo-register", edge);
    }
    for candidate in liveness.coalesce() {
        assert!(!candidate.dest.is_reserved() && !candidate.src.is_reserved());
    }
}

/// Analyzes `func` and checks the properties every result must have
pub fn analyze(func: &Function) -> (FlowGraph, Liveness) {
    let (graph, liveness) = tern_liveness::analyze_function(func)
        .unwrap_or_else(|e| panic!("liveness of `{}` failed: {}", func.name, e));
    assert_symmetric(&liveness);
    assert!(
        liveness.verify_fixed_point(&graph),
        "liveness of `{}` is not a fixed point",
        func.name
    );
    (graph, liveness)
}

#[cfg(test)]
mod pipeline_tests;
