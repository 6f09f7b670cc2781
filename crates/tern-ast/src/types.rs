//! Source-level types as the front end leaves them

use serde::{Deserialize, Serialize};
use std::fmt;

/// Static type of an expression or variable
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    /// 32-bit signed integer
    Int,
    Bool,
    /// Handle to an immutable, length-prefixed string
    String,
    Void,
    /// Element type of the array
    Array(Box<Type>),
    /// Class by name; the field layout lives in the class declaration
    Class(String),
    /// Type of `null`, compatible with every reference type
    Null,
    /// Marks an already-diagnosed error; compatible with everything
    Unknown,
}

impl Type {
    pub fn array_of(base: Type) -> Self {
        Type::Array(Box::new(base))
    }

    pub fn class(name: impl Into<String>) -> Self {
        Type::Class(name.into())
    }

    /// Reference types are the ones `null` may stand in for
    pub fn is_reference(&self) -> bool {
        matches!(self, Type::Array(_) | Type::Class(_) | Type::Null)
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    /// Whether a value of type `arg` may be passed where `self` is expected
    pub fn accepts(&self, arg: &Type) -> bool {
        match (self, arg) {
            (Type::Unknown, _) | (_, Type::Unknown) => true,
            (param, Type::Null) => param.is_reference(),
            (param, arg) => param == arg,
        }
    }

    /// Element type of an array, if this is one
    pub fn element(&self) -> Option<&Type> {
        match self {
            Type::Array(base) => Some(base),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => write!(f, "int"),
            Type::Bool => write!(f, "bool"),
            Type::String => write!(f, "string"),
            Type::Void => write!(f, "void"),
            Type::Array(base) => write!(f, "{}[]", base),
            Type::Class(name) => write!(f, "{}", name),
            Type::Null => write!(f, "null"),
            Type::Unknown => write!(f, "<unknown>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_only_fits_references() {
        assert!(Type::class("Node").accepts(&Type::Null));
        assert!(Type::array_of(Type::Int).accepts(&Type::Null));
        assert!(!Type::Int.accepts(&Type::Null));
        assert!(!Type::String.accepts(&Type::Null));
    }

    #[test]
    fn test_unknown_fits_everything() {
        assert!(Type::Int.accepts(&Type::Unknown));
        assert!(Type::Unknown.accepts(&Type::Bool));
    }

    #[test]
    fn test_type_display() {
        assert_eq!(Type::array_of(Type::array_of(Type::Int)).to_string(), "int[][]");
        assert_eq!(Type::class("Point").to_string(), "Point");
    }
}
