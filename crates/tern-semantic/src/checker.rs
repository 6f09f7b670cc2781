//! Consistency checker for resolved programs
//!
//! Re-walks a handed-over program with a fresh symbol table and confirms
//! that the bindings the front end attached still hold: every local is in
//! scope, every call matches its signature, every binary expression carries
//! the operation its operand types resolve to, every `break`/`continue`
//! names an enclosing loop.

use crate::operators;
use crate::signature::SignatureTable;
use crate::symbols::{Symbol, SymbolTable};
use std::collections::HashSet;
use tern_ast::*;
use tern_error::{Diagnostic, Diagnostics, ErrorCode, Span};
use tracing::debug;

/// Checks a program, returning everything found
pub fn check(program: &Program) -> Diagnostics {
    let mut checker = Checker::new(program);
    checker.check_program();
    debug!(diagnostics = checker.diagnostics.len(), "consistency check finished");
    checker.diagnostics
}

/// Main checker
pub struct Checker<'p> {
    program: &'p Program,
    signatures: SignatureTable,
    symbols: SymbolTable,
    globals: HashSet<VarId>,
    diagnostics: Diagnostics,
    /// Class of the member function being checked
    current_class: Option<&'p str>,
}

impl<'p> Checker<'p> {
    pub fn new(program: &'p Program) -> Self {
        Self {
            program,
            signatures: SignatureTable::new(program),
            symbols: SymbolTable::new(),
            globals: program.globals.iter().map(|g| g.variable.id).collect(),
            diagnostics: Diagnostics::new(),
            current_class: None,
        }
    }

    pub fn check_program(&mut self) {
        let program = self.program;

        for global in &program.globals {
            if let Some(init) = &global.init {
                self.check_expr(init);
            }
        }

        for function in &program.functions {
            self.check_function(function);
        }

        for class in &program.classes {
            self.current_class = Some(class.name.as_str());
            for method in class.methods.iter().chain(class.constructor.iter()) {
                self.check_function(method);
            }
            self.current_class = None;
        }
    }

    fn error(&mut self, code: ErrorCode, message: String, span: Span) {
        let mut diagnostic = Diagnostic::error(message).with_code(code);
        if !span.is_synthetic() {
            diagnostic = diagnostic.with_span(span);
        }
        self.diagnostics.push(diagnostic);
    }

    fn define(&mut self, variable: &Variable, span: Span) {
        if let Err(rejected) = self.symbols.define(Symbol::new(variable.clone(), span)) {
            self.error(
                ErrorCode::REDECLARED,
                format!("`{}` is already defined in this scope", rejected.name()),
                span,
            );
        }
    }

    fn check_function(&mut self, function: &FunctionDecl) {
        self.symbols.push_scope();
        for param in &function.params {
            self.define(param, function.span);
        }
        self.symbols.push_scope();
        for stmt in &function.body {
            self.check_stmt(stmt);
        }
        self.symbols.pop_scope();
        self.symbols.pop_scope();
    }

    fn check_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Empty => {}
            Stmt::Block(stmts) => {
                self.symbols.push_scope();
                for stmt in stmts {
                    self.check_stmt(stmt);
                }
                self.symbols.pop_scope();
            }
            Stmt::Expr(expr) => self.check_expr(expr),
            Stmt::VarDecl(inits) => {
                for init in inits {
                    if let Some(expr) = &init.init {
                        self.check_expr(expr);
                        if !init.variable.ty.accepts(&expr.ty) {
                            self.error(
                                ErrorCode::INVALID_OPERANDS,
                                format!(
                                    "cannot initialize `{}: {}` with `{}`",
                                    init.variable.name, init.variable.ty, expr.ty
                                ),
                                expr.span,
                            );
                        }
                    }
                    let span = init.init.as_ref().map(|e| e.span).unwrap_or_default();
                    self.define(&init.variable, span);
                }
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                self.check_condition(condition);
                self.check_scoped(then_branch);
                if let Some(else_branch) = else_branch {
                    self.check_scoped(else_branch);
                }
            }
            Stmt::While {
                id, condition, body, ..
            } => {
                self.check_condition(condition);
                self.symbols.enter_loop(*id);
                self.check_scoped(body);
                self.symbols.exit_loop();
            }
            Stmt::For {
                id,
                init,
                condition,
                step,
                body,
                ..
            } => {
                self.symbols.push_scope();
                if let Some(init) = init {
                    self.check_stmt(init);
                }
                if let Some(condition) = condition {
                    self.check_condition(condition);
                }
                if let Some(step) = step {
                    self.check_expr(step);
                }
                self.symbols.enter_loop(*id);
                self.check_scoped(body);
                self.symbols.exit_loop();
                self.symbols.pop_scope();
            }
            Stmt::Break { target, span } | Stmt::Continue { target, span } => {
                if !self.symbols.is_enclosing_loop(*target) {
                    self.error(
                        ErrorCode::UNDEFINED_NAME,
                        format!("loop #{} does not enclose this statement", target.0),
                        *span,
                    );
                }
            }
            Stmt::Return { value, .. } => {
                if let Some(value) = value {
                    self.check_expr(value);
                }
            }
        }
    }

    fn check_scoped(&mut self, stmt: &Stmt) {
        self.symbols.push_scope();
        self.check_stmt(stmt);
        self.symbols.pop_scope();
    }

    fn check_condition(&mut self, condition: &Expr) {
        self.check_expr(condition);
        if !Type::Bool.accepts(&condition.ty) {
            self.error(
                ErrorCode::INVALID_OPERANDS,
                format!("condition has type `{}`, expected `bool`", condition.ty),
                condition.span,
            );
        }
    }

    fn check_variable(&mut self, variable: &Variable, span: Span) {
        let known = match &variable.kind {
            VarKind::Parameter | VarKind::Local => self
                .symbols
                .lookup(&variable.name)
                .is_some_and(|symbol| symbol.id() == variable.id),
            VarKind::Global => self.globals.contains(&variable.id),
            VarKind::Field { class } => self
                .program
                .class(class)
                .is_some_and(|c| c.fields.iter().any(|f| f.id == variable.id)),
        };
        if !known {
            self.error(
                ErrorCode::UNDEFINED_NAME,
                format!("`{}` does not resolve to a visible variable", variable.name),
                span,
            );
        }
    }

    fn check_call(
        &mut self,
        function: &FunctionRef,
        receiver: Option<&Type>,
        args: &[Expr],
        span: Span,
    ) {
        for arg in args {
            self.check_expr(arg);
        }
        let Some(signature) = self.signatures.get(function, receiver) else {
            self.error(
                ErrorCode::UNDEFINED_NAME,
                format!("function `{}` is not declared", function),
                span,
            );
            return;
        };
        let arg_types: Vec<Type> = args.iter().map(|a| a.ty.clone()).collect();
        if !signature.matches(&arg_types) {
            let rendered: Vec<String> = arg_types.iter().map(|t| t.to_string()).collect();
            self.error(
                ErrorCode::NO_MATCHING_OVERLOAD,
                format!("cannot call `{}` with ({})", function, rendered.join(", ")),
                span,
            );
        }
    }

    fn check_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::IntLit(_) | ExprKind::BoolLit(_) | ExprKind::StringLit(_) | ExprKind::Null => {}
            ExprKind::This => {
                if self.current_class.is_none() {
                    self.error(
                        ErrorCode::UNDEFINED_NAME,
                        "`this` outside of a class".to_string(),
                        expr.span,
                    );
                }
            }
            ExprKind::Ident(variable) => self.check_variable(variable, expr.span),
            ExprKind::Member { object, field } => {
                self.check_expr(object);
                self.check_variable(field, expr.span);
            }
            ExprKind::Call { function, args } => {
                // implicit receiver for members called from inside the class
                let receiver = function
                    .is_member()
                    .then(|| self.current_class.map(Type::class))
                    .flatten();
                self.check_call(function, receiver.as_ref(), args, expr.span);
            }
            ExprKind::MethodCall {
                receiver,
                function,
                args,
            } => {
                self.check_expr(receiver);
                self.check_call(function, Some(&receiver.ty), args, expr.span);
            }
            ExprKind::NewObject { class, .. } => {
                if self.program.class(class).is_none() {
                    self.error(
                        ErrorCode::UNDEFINED_NAME,
                        format!("class `{}` is not declared", class),
                        expr.span,
                    );
                }
            }
            ExprKind::NewArray { dimensions, .. } => {
                for dimension in dimensions {
                    self.check_expr(dimension);
                }
            }
            ExprKind::Index { base, index } => {
                self.check_expr(base);
                self.check_expr(index);
            }
            ExprKind::Prefix { operand, .. } | ExprKind::Suffix { operand, .. } => {
                self.check_expr(operand);
            }
            ExprKind::Binary {
                op,
                operation,
                lhs,
                rhs,
            } => {
                self.check_expr(lhs);
                self.check_expr(rhs);
                let expected = operators::resolve(*op, &lhs.ty, &rhs.ty);
                if expected.is_some() && expected != *operation {
                    self.error(
                        ErrorCode::INVALID_OPERANDS,
                        format!(
                            "`{}` on `{}` and `{}` is attached {:?}, expected {:?}",
                            op, lhs.ty, rhs.ty, operation, expected
                        ),
                        expr.span,
                    );
                } else if expected.is_none() && operation.is_some() {
                    self.error(
                        ErrorCode::INVALID_OPERANDS,
                        format!("`{}` is not defined on `{}` and `{}`", op, lhs.ty, rhs.ty),
                        expr.span,
                    );
                }
            }
            ExprKind::Ternary {
                condition,
                then_branch,
                else_branch,
            } => {
                self.check_condition(condition);
                self.check_expr(then_branch);
                self.check_expr(else_branch);
            }
        }
    }
}
