//! Operators and the operations the front end resolves them to
//!
//! A source operator is ambiguous on its own: `+` may add integers or
//! concatenate strings, `==` may compare integers, booleans, strings or
//! pointers. Semantic analysis picks exactly one [`Operation`] for every
//! binary expression from the operator and both operand types, and the
//! backend dispatches on that alone.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Binary operator as written in the source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    /// `>>`, arithmetic
    Shr,
    /// `>>>`, logical
    UShr,
    BitAnd,
    BitOr,
    BitXor,
    LogicAnd,
    LogicOr,
    Less,
    Leq,
    Greater,
    Geq,
    Eq,
    Neq,
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    RemAssign,
    AndAssign,
    OrAssign,
    XorAssign,
    ShlAssign,
    ShrAssign,
    UShrAssign,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::UShr => ">>>",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::LogicAnd => "&&",
            BinaryOp::LogicOr => "||",
            BinaryOp::Less => "<",
            BinaryOp::Leq => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::Geq => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Neq => "!=",
            BinaryOp::Assign => "=",
            BinaryOp::AddAssign => "+=",
            BinaryOp::SubAssign => "-=",
            BinaryOp::MulAssign => "*=",
            BinaryOp::DivAssign => "/=",
            BinaryOp::RemAssign => "%=",
            BinaryOp::AndAssign => "&=",
            BinaryOp::OrAssign => "|=",
            BinaryOp::XorAssign => "^=",
            BinaryOp::ShlAssign => "<<=",
            BinaryOp::ShrAssign => ">>=",
            BinaryOp::UShrAssign => ">>>=",
        };
        write!(f, "{}", symbol)
    }
}

/// Prefix unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrefixOp {
    /// `++x`
    Inc,
    /// `--x`
    Dec,
    /// `!x`
    Not,
    /// `~x`
    BitNot,
    /// `+x`
    Plus,
    /// `-x`
    Neg,
}

/// Postfix unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SuffixOp {
    /// `x++`
    Inc,
    /// `x--`
    Dec,
}

/// Integer arithmetic and bitwise operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    UShr,
}

/// Relational operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Comparison {
    Eq,
    Neq,
    Less,
    Leq,
    Greater,
    Geq,
}

/// What a plain `=` stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssignKind {
    Int,
    Bool,
    String,
    /// Class or array reference (or `null`)
    Pointer,
}

/// Resolved meaning of a binary expression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    /// `int op int -> int`
    Int(ArithOp),
    /// `int cmp int -> bool`
    IntCompare(Comparison),
    /// `bool ==/!= bool -> bool`
    BoolCompare(Comparison),
    /// reference `==`/`!=` reference (or null)
    PointerCompare(Comparison),
    /// `string + string -> string`
    StringConcat,
    /// `string cmp string -> bool`, through the runtime
    StringCompare(Comparison),
    /// `bool && bool`, right operand evaluated only when the left is true
    LogicAnd,
    /// `bool || bool`, right operand evaluated only when the left is false
    LogicOr,
    /// `lvalue = rvalue`
    Assign(AssignKind),
    /// `int op= int`
    IntCompound(ArithOp),
    /// `string += string`
    StringCompound,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
