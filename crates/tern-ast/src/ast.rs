//! AST - resolved Abstract Syntax Tree
//!
//! This is the tree after semantic analysis: every identifier carries the
//! variable it binds to, every call the function it resolved to, every
//! binary operator its [`Operation`], every loop control statement the
//! identity of the loop it leaves, and every expression its final type.

use crate::builtins::Builtin;
use crate::operators::{BinaryOp, Operation, PrefixOp, SuffixOp};
use crate::types::Type;
use serde::{Deserialize, Serialize};
use std::fmt;
use tern_error::Span;

/// Complete program, as delivered by the front end
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Program {
    pub classes: Vec<ClassDecl>,
    /// Program-level variables, in declaration order
    pub globals: Vec<GlobalDecl>,
    /// Top-level functions
    pub functions: Vec<FunctionDecl>,
}

impl Program {
    pub fn class(&self, name: &str) -> Option<&ClassDecl> {
        self.classes.iter().find(|c| c.name == name)
    }

    /// Finds the declaration a resolved reference points at.
    /// Builtins have none.
    pub fn function(&self, reference: &FunctionRef) -> Option<&FunctionDecl> {
        match reference {
            FunctionRef::Top { name } => self.functions.iter().find(|f| &f.name == name),
            FunctionRef::Member { class, name } => {
                let class = self.class(class)?;
                class
                    .methods
                    .iter()
                    .chain(class.constructor.iter())
                    .find(|f| &f.name == name)
            }
            FunctionRef::Builtin(_) => None,
        }
    }
}

/// Unique identity of a variable across the program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VarId(pub u32);

/// Where a variable lives
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VarKind {
    Parameter,
    Local,
    /// Member of `class`; its slot comes from the class layout
    Field { class: String },
    Global,
}

/// A resolved variable
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Variable {
    pub id: VarId,
    pub name: String,
    pub ty: Type,
    pub kind: VarKind,
}

/// Identity of a function: its name plus the type that declares it
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FunctionRef {
    Top { name: String },
    Member { class: String, name: String },
    Builtin(Builtin),
}

impl FunctionRef {
    pub fn top(name: impl Into<String>) -> Self {
        FunctionRef::Top { name: name.into() }
    }

    pub fn member(class: impl Into<String>, name: impl Into<String>) -> Self {
        FunctionRef::Member {
            class: class.into(),
            name: name.into(),
        }
    }

    pub fn is_member(&self) -> bool {
        matches!(self, FunctionRef::Member { .. })
    }
}

impl fmt::Display for FunctionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionRef::Top { name } => write!(f, "{}", name),
            FunctionRef::Member { class, name } => write!(f, "{}.{}", class, name),
            FunctionRef::Builtin(builtin) => write!(f, "{}", builtin.source_name()),
        }
    }
}

/// Name of the constructor member of every class
pub const CONSTRUCTOR_NAME: &str = "__constructor__";

/// Function declaration (top-level or member)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub name: String,
    /// Declaring class, for members
    pub class: Option<String>,
    pub params: Vec<Variable>,
    pub return_type: Type,
    pub body: Vec<Stmt>,
    #[serde(default)]
    pub span: Span,
}

impl FunctionDecl {
    pub fn reference(&self) -> FunctionRef {
        match &self.class {
            Some(class) => FunctionRef::member(class.clone(), self.name.clone()),
            None => FunctionRef::top(self.name.clone()),
        }
    }
}

/// Class declaration; `fields` order is the layout order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassDecl {
    pub name: String,
    pub fields: Vec<Variable>,
    pub methods: Vec<FunctionDecl>,
    /// User constructor; `None` means the synthetic no-op one
    pub constructor: Option<FunctionDecl>,
    #[serde(default)]
    pub span: Span,
}

impl ClassDecl {
    /// Reference the front end attaches to `new Class`
    pub fn constructor_ref(&self) -> FunctionRef {
        match &self.constructor {
            Some(_) => FunctionRef::member(self.name.clone(), CONSTRUCTOR_NAME),
            None => FunctionRef::Builtin(Builtin::DefaultConstructor),
        }
    }
}

/// Program-level variable
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalDecl {
    pub variable: Variable,
    pub init: Option<Expr>,
}

/// Identity of a loop statement, referenced by `break`/`continue`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LoopId(pub u32);

/// One name of a variable declaration statement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VarInit {
    pub variable: Variable,
    pub init: Option<Expr>,
}

/// Statements
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Stmt {
    /// `;`
    Empty,

    /// `{ ... }`
    Block(Vec<Stmt>),

    /// Expression as statement
    Expr(Expr),

    /// `int a = 1, b;`
    VarDecl(Vec<VarInit>),

    /// `if (cond) then else els`
    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
        #[serde(default)]
        span: Span,
    },

    /// `while (cond) body`
    While {
        id: LoopId,
        condition: Expr,
        body: Box<Stmt>,
        #[serde(default)]
        span: Span,
    },

    /// `for (init; cond; step) body`
    For {
        id: LoopId,
        init: Option<Box<Stmt>>,
        condition: Option<Expr>,
        step: Option<Expr>,
        body: Box<Stmt>,
        #[serde(default)]
        span: Span,
    },

    /// `break` out of the loop `target`
    Break {
        target: LoopId,
        #[serde(default)]
        span: Span,
    },

    /// `continue` the loop `target`
    Continue {
        target: LoopId,
        #[serde(default)]
        span: Span,
    },

    /// `return expr`
    Return {
        value: Option<Expr>,
        #[serde(default)]
        span: Span,
    },
}

/// Expression with its static type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: Type,
    #[serde(default)]
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, ty: Type) -> Self {
        Self {
            kind,
            ty,
            span: Span::default(),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }
}

/// Expression kinds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExprKind {
    IntLit(i32),
    BoolLit(bool),
    StringLit(String),
    Null,

    /// `this` inside a member function
    This,

    /// Variable reference
    Ident(Variable),

    /// `object.field`
    Member {
        object: Box<Expr>,
        field: Variable,
    },

    /// `f(args)`; a member function called without receiver uses `this`
    Call {
        function: FunctionRef,
        args: Vec<Expr>,
    },

    /// `receiver.f(args)`
    MethodCall {
        receiver: Box<Expr>,
        function: FunctionRef,
        args: Vec<Expr>,
    },

    /// `new Class`
    NewObject {
        class: String,
        constructor: FunctionRef,
    },

    /// `new T[n][m]...`
    NewArray {
        element: Type,
        dimensions: Vec<Expr>,
    },

    /// `base[index]`
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
    },

    Prefix {
        op: PrefixOp,
        operand: Box<Expr>,
    },

    Suffix {
        op: SuffixOp,
        operand: Box<Expr>,
    },

    /// `lhs op rhs`; `operation` is `None` if analysis attached nothing
    Binary {
        op: BinaryOp,
        operation: Option<Operation>,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },

    /// `cond ? then : els`
    Ternary {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(id: u32, name: &str) -> Variable {
        Variable {
            id: VarId(id),
            name: name.to_string(),
            ty: Type::Int,
            kind: VarKind::Field {
                class: "Point".to_string(),
            },
        }
    }

    fn method(name: &str) -> FunctionDecl {
        FunctionDecl {
            name: name.to_string(),
            class: Some("Point".to_string()),
            params: vec![],
            return_type: Type::Void,
            body: vec![],
            span: Span::default(),
        }
    }

    #[test]
    fn test_member_lookup_includes_constructor() {
        let program = Program {
            classes: vec![ClassDecl {
                name: "Point".to_string(),
                fields: vec![field(0, "x"), field(1, "y")],
                methods: vec![method("norm")],
                constructor: Some(method(CONSTRUCTOR_NAME)),
                span: Span::default(),
            }],
            ..Default::default()
        };

        assert!(program.function(&FunctionRef::member("Point", "norm")).is_some());
        assert!(program
            .function(&FunctionRef::member("Point", CONSTRUCTOR_NAME))
            .is_some());
        assert!(program.function(&FunctionRef::member("Point", "missing")).is_none());
        assert_eq!(
            program.classes[0].constructor_ref(),
            FunctionRef::member("Point", CONSTRUCTOR_NAME)
        );
    }

    #[test]
    fn test_class_without_constructor_uses_default() {
        let class = ClassDecl {
            name: "Empty".to_string(),
            fields: vec![],
            methods: vec![],
            constructor: None,
            span: Span::default(),
        };
        assert_eq!(
            class.constructor_ref(),
            FunctionRef::Builtin(Builtin::DefaultConstructor)
        );
    }

    #[test]
    fn test_function_ref_display() {
        assert_eq!(FunctionRef::member("List", "push").to_string(), "List.push");
        assert_eq!(FunctionRef::Builtin(Builtin::StringOrd).to_string(), "ord");
    }
}
