//! Function signatures and overload matching

use std::collections::HashMap;
use tern_ast::{Builtin, FunctionDecl, FunctionRef, Program, Type};

/// Callable shape of a function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub function: FunctionRef,
    /// Type of the implicit receiver, for members
    pub receiver: Option<Type>,
    pub params: Vec<Type>,
    pub return_type: Type,
}

impl Signature {
    pub fn of(decl: &FunctionDecl) -> Self {
        Self {
            function: decl.reference(),
            receiver: decl.class.as_ref().map(Type::class),
            params: decl.params.iter().map(|p| p.ty.clone()).collect(),
            return_type: decl.return_type.clone(),
        }
    }

    /// Signature of a runtime builtin.
    ///
    /// `size` and the default constructor depend on the receiver they are
    /// called on; without one the receiver is `Unknown`.
    pub fn builtin(builtin: Builtin, receiver: Option<&Type>) -> Self {
        use Type::{Bool, Int, Void};
        let string = Type::String;
        let receiver_ty = receiver.cloned().unwrap_or(Type::Unknown);

        let (params, return_type) = match builtin {
            Builtin::Print | Builtin::Println => (vec![string], Void),
            Builtin::PrintInt | Builtin::PrintlnInt => (vec![Int], Void),
            Builtin::GetString => (vec![], string),
            Builtin::GetInt => (vec![], Int),
            Builtin::ToString => (vec![Int], string),
            Builtin::StringLength | Builtin::StringParseInt => (vec![], Int),
            Builtin::StringOrd => (vec![Int], Int),
            Builtin::StringSubstring => (vec![Int, Int], string),
            Builtin::ArraySize => (vec![], Int),
            Builtin::DefaultConstructor => (vec![], receiver_ty.clone()),
            Builtin::StringConcatenate => (vec![string.clone(), string.clone()], string),
            Builtin::StringEqual
            | Builtin::StringNeq
            | Builtin::StringLess
            | Builtin::StringLeq
            | Builtin::StringGreater
            | Builtin::StringGeq => (vec![string.clone(), string], Bool),
            // raw memory, assignable to any reference
            Builtin::Malloc => (vec![Int], Type::Null),
        };

        let receiver = match builtin {
            Builtin::ArraySize | Builtin::DefaultConstructor => Some(receiver_ty),
            b if b.has_receiver() => Some(Type::String),
            _ => None,
        };

        Self {
            function: FunctionRef::Builtin(builtin),
            receiver,
            params,
            return_type,
        }
    }

    /// Exact arity, and every argument accepted by its parameter
    pub fn matches(&self, args: &[Type]) -> bool {
        args.len() == self.params.len()
            && self.params.iter().zip(args).all(|(param, arg)| param.accepts(arg))
    }
}

/// First candidate whose parameters accept `args`
pub fn resolve_overload<'a>(candidates: &'a [Signature], args: &[Type]) -> Option<&'a Signature> {
    candidates.iter().find(|candidate| candidate.matches(args))
}

/// Signatures of every function declared by a program, keyed by identity
#[derive(Debug, Default)]
pub struct SignatureTable {
    signatures: HashMap<FunctionRef, Signature>,
}

impl SignatureTable {
    pub fn new(program: &Program) -> Self {
        let mut table = Self::default();
        let classes = program.classes.iter().flat_map(|class| {
            class.methods.iter().chain(class.constructor.iter())
        });
        for decl in program.functions.iter().chain(classes) {
            table.signatures.insert(decl.reference(), Signature::of(decl));
        }
        table
    }

    /// Signature of `function` when called on `receiver`
    pub fn get(&self, function: &FunctionRef, receiver: Option<&Type>) -> Option<Signature> {
        match function {
            FunctionRef::Builtin(builtin) => Some(Signature::builtin(*builtin, receiver)),
            other => self.signatures.get(other).cloned(),
        }
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(params: Vec<Type>) -> Signature {
        Signature {
            function: FunctionRef::top("f"),
            receiver: None,
            params,
            return_type: Type::Void,
        }
    }

    #[test]
    fn test_exact_arity_required() {
        let f = sig(vec![Type::Int, Type::Int]);
        assert!(f.matches(&[Type::Int, Type::Int]));
        assert!(!f.matches(&[Type::Int]));
        assert!(!f.matches(&[Type::Int, Type::Int, Type::Int]));
    }

    #[test]
    fn test_null_only_for_references() {
        let f = sig(vec![Type::class("Node"), Type::array_of(Type::Int)]);
        assert!(f.matches(&[Type::Null, Type::Null]));

        let g = sig(vec![Type::Int]);
        assert!(!g.matches(&[Type::Null]));
    }

    #[test]
    fn test_unknown_is_compatible_either_way() {
        assert!(sig(vec![Type::Int]).matches(&[Type::Unknown]));
        assert!(sig(vec![Type::Unknown]).matches(&[Type::String]));
    }

    #[test]
    fn test_resolve_overload_picks_first_match() {
        let candidates = vec![sig(vec![Type::String]), sig(vec![Type::Int])];
        let picked = resolve_overload(&candidates, &[Type::Int]).unwrap();
        assert_eq!(picked.params, vec![Type::Int]);
        assert!(resolve_overload(&candidates, &[Type::Bool]).is_none());
    }

    #[test]
    fn test_builtin_signatures() {
        let ord = Signature::builtin(Builtin::StringOrd, None);
        assert_eq!(ord.receiver, Some(Type::String));
        assert!(ord.matches(&[Type::Int]));
        assert_eq!(ord.return_type, Type::Int);

        let array = Type::array_of(Type::Bool);
        let size = Signature::builtin(Builtin::ArraySize, Some(&array));
        assert_eq!(size.receiver, Some(array));
        assert!(size.matches(&[]));

        let print = Signature::builtin(Builtin::PrintInt, None);
        assert_eq!(print.receiver, None);
        assert!(!print.matches(&[Type::String]));
    }
}
