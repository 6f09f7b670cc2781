//! Operator resolution
//!
//! Picks the single [`Operation`] a binary operator means for a pair of
//! operand types. The backend dispatches on that key alone.

use tern_ast::{ArithOp, AssignKind, BinaryOp, Comparison, Operation, Type};

fn arith(op: BinaryOp) -> Option<ArithOp> {
    Some(match op {
        BinaryOp::Add | BinaryOp::AddAssign => ArithOp::Add,
        BinaryOp::Sub | BinaryOp::SubAssign => ArithOp::Sub,
        BinaryOp::Mul | BinaryOp::MulAssign => ArithOp::Mul,
        BinaryOp::Div | BinaryOp::DivAssign => ArithOp::Div,
        BinaryOp::Rem | BinaryOp::RemAssign => ArithOp::Rem,
        BinaryOp::BitAnd | BinaryOp::AndAssign => ArithOp::And,
        BinaryOp::BitOr | BinaryOp::OrAssign => ArithOp::Or,
        BinaryOp::BitXor | BinaryOp::XorAssign => ArithOp::Xor,
        BinaryOp::Shl | BinaryOp::ShlAssign => ArithOp::Shl,
        BinaryOp::Shr | BinaryOp::ShrAssign => ArithOp::Shr,
        BinaryOp::UShr | BinaryOp::UShrAssign => ArithOp::UShr,
        _ => return None,
    })
}

fn comparison(op: BinaryOp) -> Option<Comparison> {
    Some(match op {
        BinaryOp::Eq => Comparison::Eq,
        BinaryOp::Neq => Comparison::Neq,
        BinaryOp::Less => Comparison::Less,
        BinaryOp::Leq => Comparison::Leq,
        BinaryOp::Greater => Comparison::Greater,
        BinaryOp::Geq => Comparison::Geq,
        _ => return None,
    })
}

fn is_compound(op: BinaryOp) -> bool {
    matches!(
        op,
        BinaryOp::AddAssign
            | BinaryOp::SubAssign
            | BinaryOp::MulAssign
            | BinaryOp::DivAssign
            | BinaryOp::RemAssign
            | BinaryOp::AndAssign
            | BinaryOp::OrAssign
            | BinaryOp::XorAssign
            | BinaryOp::ShlAssign
            | BinaryOp::ShrAssign
            | BinaryOp::UShrAssign
    )
}

/// Resolves `lhs op rhs`. `None` means the combination is invalid, or an
/// operand is already `Unknown`.
pub fn resolve(op: BinaryOp, lhs: &Type, rhs: &Type) -> Option<Operation> {
    if matches!(lhs, Type::Unknown) || matches!(rhs, Type::Unknown) {
        return None;
    }

    match op {
        BinaryOp::Assign => {
            if !lhs.accepts(rhs) {
                return None;
            }
            let kind = match lhs {
                Type::Int => AssignKind::Int,
                Type::Bool => AssignKind::Bool,
                Type::String => AssignKind::String,
                Type::Array(_) | Type::Class(_) => AssignKind::Pointer,
                _ => return None,
            };
            Some(Operation::Assign(kind))
        }
        BinaryOp::LogicAnd | BinaryOp::LogicOr => match (lhs, rhs) {
            (Type::Bool, Type::Bool) if op == BinaryOp::LogicAnd => Some(Operation::LogicAnd),
            (Type::Bool, Type::Bool) => Some(Operation::LogicOr),
            _ => None,
        },
        _ if is_compound(op) => match (lhs, rhs) {
            (Type::Int, Type::Int) => arith(op).map(Operation::IntCompound),
            (Type::String, Type::String) if op == BinaryOp::AddAssign => {
                Some(Operation::StringCompound)
            }
            _ => None,
        },
        _ => {
            if let Some(cmp) = comparison(op) {
                let equality = matches!(cmp, Comparison::Eq | Comparison::Neq);
                return match (lhs, rhs) {
                    (Type::Int, Type::Int) => Some(Operation::IntCompare(cmp)),
                    (Type::String, Type::String) => Some(Operation::StringCompare(cmp)),
                    (Type::Bool, Type::Bool) if equality => Some(Operation::BoolCompare(cmp)),
                    (l, r) if equality && l.is_reference() && r.is_reference() => {
                        (l.accepts(r) || r.accepts(l)).then_some(Operation::PointerCompare(cmp))
                    }
                    _ => None,
                };
            }
            match (lhs, rhs) {
                (Type::Int, Type::Int) => arith(op).map(Operation::Int),
                (Type::String, Type::String) if op == BinaryOp::Add => {
                    Some(Operation::StringConcat)
                }
                _ => None,
            }
        }
    }
}

/// Static type of a binary expression with the given operation
pub fn result_type(operation: Operation) -> Type {
    match operation {
        Operation::Int(_) => Type::Int,
        Operation::IntCompare(_)
        | Operation::BoolCompare(_)
        | Operation::PointerCompare(_)
        | Operation::StringCompare(_)
        | Operation::LogicAnd
        | Operation::LogicOr => Type::Bool,
        Operation::StringConcat => Type::String,
        Operation::Assign(_) | Operation::IntCompound(_) | Operation::StringCompound => Type::Void,
    }
}
