//! Builders for resolved programs
//!
//! Stands in for the front end: every expression comes out typed and every
//! binary operator carries the operation semantic analysis would pick.

use tern_ast::{
    BinaryOp, ClassDecl, Expr, ExprKind, FunctionDecl, FunctionRef, GlobalDecl, LoopId,
    PrefixOp, Program, Stmt, SuffixOp, Type, VarId, VarInit, VarKind, Variable, CONSTRUCTOR_NAME,
};
use tern_error::Span;
use tern_semantic::operators;

// =========================================
// Variables
// =========================================

fn variable(id: u32, name: &str, ty: Type, kind: VarKind) -> Variable {
    Variable {
        id: VarId(id),
        name: name.to_string(),
        ty,
        kind,
    }
}

pub fn local(id: u32, name: &str, ty: Type) -> Variable {
    variable(id, name, ty, VarKind::Local)
}

pub fn param(id: u32, name: &str, ty: Type) -> Variable {
    variable(id, name, ty, VarKind::Parameter)
}

pub fn global(id: u32, name: &str, ty: Type) -> Variable {
    variable(id, name, ty, VarKind::Global)
}

pub fn field(id: u32, name: &str, ty: Type, class: &str) -> Variable {
    variable(
        id,
        name,
        ty,
        VarKind::Field {
            class: class.to_string(),
        },
    )
}

// =========================================
// Expressions
// =========================================

pub fn int(n: i32) -> Expr {
    Expr::new(ExprKind::IntLit(n), Type::Int)
}

pub fn boolean(b: bool) -> Expr {
    Expr::new(ExprKind::BoolLit(b), Type::Bool)
}

pub fn string(text: &str) -> Expr {
    Expr::new(ExprKind::StringLit(text.to_string()), Type::String)
}

pub fn null() -> Expr {
    Expr::new(ExprKind::Null, Type::Null)
}

pub fn this(class: &str) -> Expr {
    Expr::new(ExprKind::This, Type::class(class))
}

pub fn ident(v: &Variable) -> Expr {
    Expr::new(ExprKind::Ident(v.clone()), v.ty.clone())
}

pub fn member(object: Expr, field: &Variable) -> Expr {
    Expr::new(
        ExprKind::Member {
            object: Box::new(object),
            field: field.clone(),
        },
        field.ty.clone(),
    )
}

/// `lhs op rhs` with the operation resolved from the operand types.
///
/// Panics when the operator does not apply to the operands.
pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    let operation = operators::resolve(op, &lhs.ty, &rhs.ty)
        .unwrap_or_else(|| panic!("`{}` does not apply to `{}` and `{}`", op, lhs.ty, rhs.ty));
    Expr::new(
        ExprKind::Binary {
            op,
            operation: Some(operation),
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        operators::result_type(operation),
    )
}

pub fn assign(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::Assign, lhs, rhs)
}

pub fn prefix(op: PrefixOp, operand: Expr) -> Expr {
    let ty = match op {
        PrefixOp::Not => Type::Bool,
        _ => Type::Int,
    };
    Expr::new(
        ExprKind::Prefix {
            op,
            operand: Box::new(operand),
        },
        ty,
    )
}

pub fn suffix(op: SuffixOp, operand: Expr) -> Expr {
    Expr::new(
        ExprKind::Suffix {
            op,
            operand: Box::new(operand),
        },
        Type::Int,
    )
}

pub fn ternary(condition: Expr, then_branch: Expr, else_branch: Expr) -> Expr {
    let ty = then_branch.ty.clone();
    Expr::new(
        ExprKind::Ternary {
            condition: Box::new(condition),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
        },
        ty,
    )
}

pub fn call(function: FunctionRef, args: Vec<Expr>, ty: Type) -> Expr {
    Expr::new(ExprKind::Call { function, args }, ty)
}

pub fn method_call(receiver: Expr, function: FunctionRef, args: Vec<Expr>, ty: Type) -> Expr {
    Expr::new(
        ExprKind::MethodCall {
            receiver: Box::new(receiver),
            function,
            args,
        },
        ty,
    )
}

pub fn new_object(class: &ClassDecl) -> Expr {
    Expr::new(
        ExprKind::NewObject {
            class: class.name.clone(),
            constructor: class.constructor_ref(),
        },
        Type::class(&class.name),
    )
}

pub fn index(base: Expr, idx: Expr) -> Expr {
    let ty = base.ty.element().cloned().unwrap_or(Type::Unknown);
    Expr::new(
        ExprKind::Index {
            base: Box::new(base),
            index: Box::new(idx),
        },
        ty,
    )
}

// =========================================
// Statements
// =========================================

pub fn expr(e: Expr) -> Stmt {
    Stmt::Expr(e)
}

pub fn declare(variable: &Variable, init: Option<Expr>) -> Stmt {
    Stmt::VarDecl(vec![VarInit {
        variable: variable.clone(),
        init,
    }])
}

pub fn block(stmts: Vec<Stmt>) -> Stmt {
    Stmt::Block(stmts)
}

pub fn if_stmt(condition: Expr, then_branch: Stmt, else_branch: Option<Stmt>) -> Stmt {
    Stmt::If {
        condition,
        then_branch: Box::new(then_branch),
        else_branch: else_branch.map(Box::new),
        span: Span::default(),
    }
}

pub fn while_loop(id: u32, condition: Expr, body: Stmt) -> Stmt {
    Stmt::While {
        id: LoopId(id),
        condition,
        body: Box::new(body),
        span: Span::default(),
    }
}

pub fn for_loop(
    id: u32,
    init: Option<Stmt>,
    condition: Option<Expr>,
    step: Option<Expr>,
    body: Stmt,
) -> Stmt {
    Stmt::For {
        id: LoopId(id),
        init: init.map(Box::new),
        condition,
        step,
        body: Box::new(body),
        span: Span::default(),
    }
}

pub fn break_to(id: u32) -> Stmt {
    Stmt::Break {
        target: LoopId(id),
        span: Span::default(),
    }
}

pub fn continue_to(id: u32) -> Stmt {
    Stmt::Continue {
        target: LoopId(id),
        span: Span::default(),
    }
}

pub fn ret(value: Option<Expr>) -> Stmt {
    Stmt::Return {
        value,
        span: Span::default(),
    }
}

// =========================================
// Declarations
// =========================================

pub fn function(name: &str, params: Vec<Variable>, return_type: Type, body: Vec<Stmt>) -> FunctionDecl {
    FunctionDecl {
        name: name.to_string(),
        class: None,
        params,
        return_type,
        body,
        span: Span::default(),
    }
}

pub fn method(
    class: &str,
    name: &str,
    params: Vec<Variable>,
    return_type: Type,
    body: Vec<Stmt>,
) -> FunctionDecl {
    FunctionDecl {
        class: Some(class.to_string()),
        ..function(name, params, return_type, body)
    }
}

pub fn constructor(class: &str, body: Vec<Stmt>) -> FunctionDecl {
    method(class, CONSTRUCTOR_NAME, vec![], Type::Void, body)
}

pub fn class(
    name: &str,
    fields: Vec<Variable>,
    methods: Vec<FunctionDecl>,
    constructor: Option<FunctionDecl>,
) -> ClassDecl {
    ClassDecl {
        name: name.to_string(),
        fields,
        methods,
        constructor,
        span: Span::default(),
    }
}

pub fn global_decl(variable: &Variable, init: Option<Expr>) -> GlobalDecl {
    GlobalDecl {
        variable: variable.clone(),
        init,
    }
}

/// Program with only top-level functions
pub fn program(functions: Vec<FunctionDecl>) -> Program {
    Program {
        functions,
        ..Default::default()
    }
}
