//! IR Instructions
//!
//! Low-level instructions over explicit stack slots. Every local lives in
//! memory; a later promotion pass turns slots into values.

use crate::types::IrType;
use std::fmt;

/// Operand of an instruction
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    /// Integer or boolean constant
    Const(i32),
    /// Result of a previous instruction
    Temp(u32),
    /// Function parameter (the receiver of a member comes last)
    Param(usize),
    /// Global (by name @name)
    Global(String),
    /// The null pointer
    Null,
    /// Void / no value
    Void,
}

impl Value {
    pub fn temp(id: u32) -> Self {
        Value::Temp(id)
    }

    pub fn global(name: impl Into<String>) -> Self {
        Value::Global(name.into())
    }

    pub fn as_temp(&self) -> Option<u32> {
        match self {
            Value::Temp(id) => Some(*id),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Const(v) => write!(f, "{}", v),
            Value::Temp(id) => write!(f, "%t{}", id),
            Value::Param(idx) => write!(f, "%arg{}", idx),
            Value::Global(name) => write!(f, "@{}", name),
            Value::Null => write!(f, "null"),
            Value::Void => write!(f, "void"),
        }
    }
}

/// Binary operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    SDiv,
    SRem,
    And,
    Or,
    Xor,
    Shl,
    /// Arithmetic shift right
    AShr,
    /// Logical shift right
    LShr,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinaryOp::Add => write!(f, "add"),
            BinaryOp::Sub => write!(f, "sub"),
            BinaryOp::Mul => write!(f, "mul"),
            BinaryOp::SDiv => write!(f, "sdiv"),
            BinaryOp::SRem => write!(f, "srem"),
            BinaryOp::And => write!(f, "and"),
            BinaryOp::Or => write!(f, "or"),
            BinaryOp::Xor => write!(f, "xor"),
            BinaryOp::Shl => write!(f, "shl"),
            BinaryOp::AShr => write!(f, "ashr"),
            BinaryOp::LShr => write!(f, "lshr"),
        }
    }
}

/// Comparison operation (signed)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Slt,
    Sle,
    Sgt,
    Sge,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompareOp::Eq => write!(f, "eq"),
            CompareOp::Ne => write!(f, "ne"),
            CompareOp::Slt => write!(f, "slt"),
            CompareOp::Sle => write!(f, "sle"),
            CompareOp::Sgt => write!(f, "sgt"),
            CompareOp::Sge => write!(f, "sge"),
        }
    }
}

/// IR Instruction
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// Allocates a stack slot
    /// %dest = alloca ty
    Alloca { dest: u32, ty: IrType },

    /// Loads value from pointer
    /// %dest = load ty, ptr
    Load { dest: u32, ty: IrType, ptr: Value },

    /// Stores value in pointer
    /// store ty value, ptr
    Store { ty: IrType, value: Value, ptr: Value },

    /// Address of field `index` of the object at `ptr`
    /// %dest = member %Class, ptr, index
    MemberAddr {
        dest: u32,
        class: String,
        ptr: Value,
        index: usize,
        /// Field type
        ty: IrType,
    },

    /// `base + index * sizeof(ty)`, unchecked
    /// %dest = element ty, base, index
    ElementAddr {
        dest: u32,
        ty: IrType,
        base: Value,
        index: Value,
    },

    /// %dest = op ty lhs, rhs
    Binary {
        dest: u32,
        op: BinaryOp,
        ty: IrType,
        lhs: Value,
        rhs: Value,
    },

    /// Comparison of two `ty` operands, yields i1
    /// %dest = icmp op ty lhs, rhs
    Compare {
        dest: u32,
        op: CompareOp,
        ty: IrType,
        lhs: Value,
        rhs: Value,
    },

    /// Function call, no destination when the result is void
    /// %dest = call ret @function(args...)
    Call {
        dest: Option<u32>,
        ret: IrType,
        function: String,
        args: Vec<(IrType, Value)>,
    },

    /// %dest = phi ty [value, label], ...
    Phi {
        dest: u32,
        ty: IrType,
        incoming: Vec<(Value, String)>,
    },

    /// Unconditional branch
    /// jump label
    Jump { target: String },

    /// Conditional branch
    /// branch cond, then_label, else_label
    Branch {
        condition: Value,
        then_label: String,
        else_label: String,
    },

    /// ret ty value
    Return { ty: IrType, value: Value },
}

impl Instruction {
    /// Returns the instruction's destination (if any)
    pub fn dest(&self) -> Option<u32> {
        match self {
            Instruction::Alloca { dest, .. }
            | Instruction::Load { dest, .. }
            | Instruction::MemberAddr { dest, .. }
            | Instruction::ElementAddr { dest, .. }
            | Instruction::Binary { dest, .. }
            | Instruction::Compare { dest, .. }
            | Instruction::Phi { dest, .. } => Some(*dest),
            Instruction::Call { dest, .. } => *dest,
            Instruction::Store { .. }
            | Instruction::Jump { .. }
            | Instruction::Branch { .. }
            | Instruction::Return { .. } => None,
        }
    }

    /// Checks if it is a block terminator instruction
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Instruction::Return { .. } | Instruction::Jump { .. } | Instruction::Branch { .. }
        )
    }

    /// Values read by the instruction, in operand order.
    /// Phi incoming values are included.
    pub fn operands(&self) -> Vec<&Value> {
        match self {
            Instruction::Alloca { .. } | Instruction::Jump { .. } => vec![],
            Instruction::Load { ptr, .. } => vec![ptr],
            Instruction::Store { value, ptr, .. } => vec![value, ptr],
            Instruction::MemberAddr { ptr, .. } => vec![ptr],
            Instruction::ElementAddr { base, index, .. } => vec![base, index],
            Instruction::Binary { lhs, rhs, .. } | Instruction::Compare { lhs, rhs, .. } => {
                vec![lhs, rhs]
            }
            Instruction::Call { args, .. } => args.iter().map(|(_, v)| v).collect(),
            Instruction::Phi { incoming, .. } => incoming.iter().map(|(v, _)| v).collect(),
            Instruction::Branch { condition, .. } => vec![condition],
            Instruction::Return { value, .. } => vec![value],
        }
    }

    /// Labels control may continue at
    pub fn successors(&self) -> Vec<&str> {
        match self {
            Instruction::Jump { target } => vec![target.as_str()],
            Instruction::Branch {
                then_label,
                else_label,
                ..
            } => vec![then_label.as_str(), else_label.as_str()],
            _ => vec![],
        }
    }
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[(IrType, Value)]) -> fmt::Result {
    for (i, (ty, value)) in args.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{} {}", ty, value)?;
    }
    Ok(())
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Alloca { dest, ty } => write!(f, "%t{} = alloca {}", dest, ty),
            Instruction::Load { dest, ty, ptr } => write!(f, "%t{} = load {}, {}", dest, ty, ptr),
            Instruction::Store { ty, value, ptr } => write!(f, "store {} {}, {}", ty, value, ptr),
            Instruction::MemberAddr {
                dest,
                class,
                ptr,
                index,
                ty,
            } => write!(f, "%t{} = member %{}, {}, {} ; {}", dest, class, ptr, index, ty),
            Instruction::ElementAddr {
                dest,
                ty,
                base,
                index,
            } => write!(f, "%t{} = element {}, {}, {}", dest, ty, base, index),
            Instruction::Binary {
                dest,
                op,
                ty,
                lhs,
                rhs,
            } => write!(f, "%t{} = {} {} {}, {}", dest, op, ty, lhs, rhs),
            Instruction::Compare {
                dest,
                op,
                ty,
                lhs,
                rhs,
            } => write!(f, "%t{} = icmp {} {} {}, {}", dest, op, ty, lhs, rhs),
            Instruction::Call {
                dest,
                ret,
                function,
                args,
            } => {
                if let Some(d) = dest {
                    write!(f, "%t{} = ", d)?;
                }
                write!(f, "call {} @{}(", ret, function)?;
                write_args(f, args)?;
                write!(f, ")")
            }
            Instruction::Phi { dest, ty, incoming } => {
                write!(f, "%t{} = phi {} ", dest, ty)?;
                for (i, (val, label)) in incoming.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "[{}, {}]", val, label)?;
                }
                Ok(())
            }
            Instruction::Jump { target } => write!(f, "jump {}", target),
            Instruction::Branch {
                condition,
                then_label,
                else_label,
            } => write!(f, "branch {}, {}, {}", condition, then_label, else_label),
            Instruction::Return { ty, value } => {
                if ty.is_void() {
                    write!(f, "ret void")
                } else {
                    write!(f, "ret {} {}", ty, value)
                }
            }
        }
    }
}
