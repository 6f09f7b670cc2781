//! IR Type System
//!
//! Low-level types for IR representation.

use std::fmt;
use tern_ast::VarId;

/// IR Types (lower level than source types)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IrType {
    /// Void / no value
    Void,
    /// Boolean
    I1,
    /// Byte
    I8,
    /// 32-bit integer
    I32,
    /// Pointer to type
    Ptr(Box<IrType>),
    /// Class layout by name (only ever seen behind a pointer)
    Class(String),
    /// Fixed-size array, used for literal buffers
    Array(usize, Box<IrType>),
}

impl IrType {
    pub fn ptr(to: IrType) -> Self {
        IrType::Ptr(Box::new(to))
    }

    /// Strings are handles to their text payload
    pub fn string() -> Self {
        IrType::ptr(IrType::I8)
    }

    pub fn class_ptr(name: impl Into<String>) -> Self {
        IrType::ptr(IrType::Class(name.into()))
    }

    pub fn is_void(&self) -> bool {
        matches!(self, IrType::Void)
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, IrType::Ptr(_))
    }

    /// Class name behind a `%C*`
    pub fn class_name(&self) -> Option<&str> {
        match self {
            IrType::Ptr(inner) => match inner.as_ref() {
                IrType::Class(name) => Some(name),
                _ => None,
            },
            _ => None,
        }
    }

    /// Returns the size in bytes on a 32-bit target
    pub fn size_bytes(&self) -> usize {
        match self {
            IrType::Void => 0,
            IrType::I1 | IrType::I8 => 1,
            IrType::I32 => 4,
            IrType::Ptr(_) => 4,
            IrType::Class(_) => 0, // Needs lookup in the layout table
            IrType::Array(count, elem) => elem.size_bytes() * count,
        }
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrType::Void => write!(f, "void"),
            IrType::I1 => write!(f, "i1"),
            IrType::I8 => write!(f, "i8"),
            IrType::I32 => write!(f, "i32"),
            IrType::Ptr(inner) => write!(f, "{}*", inner),
            IrType::Class(name) => write!(f, "%{}", name),
            IrType::Array(count, elem) => write!(f, "[{} x {}]", count, elem),
        }
    }
}

/// One field slot of a class layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldLayout {
    pub id: VarId,
    pub name: String,
    pub ty: IrType,
}

/// Field layout of a class, in declaration order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassLayout {
    pub name: String,
    pub fields: Vec<FieldLayout>,
}

impl ClassLayout {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn add_field(&mut self, id: VarId, name: impl Into<String>, ty: IrType) {
        self.fields.push(FieldLayout {
            id,
            name: name.into(),
            ty,
        });
    }

    /// Stable index of a field in this layout
    pub fn field_index(&self, id: VarId) -> Option<usize> {
        self.fields.iter().position(|f| f.id == id)
    }

    /// Number of slots an instance takes
    pub fn slot_count(&self) -> usize {
        self.fields.len()
    }
}

impl fmt::Display for ClassLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{} = type {{ ", self.name)?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", field.ty)?;
        }
        write!(f, " }}")
    }
}
