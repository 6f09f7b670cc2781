//! The closed catalogue of functions the runtime provides
//!
//! None of these has a body in the program. The backend recognises them by
//! identity and emits calls to the fixed external symbol of each one.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Builtin {
    Print,
    Println,
    PrintInt,
    PrintlnInt,
    GetString,
    GetInt,
    ToString,
    /// `s.length()`
    StringLength,
    /// `s.parseInt()`
    StringParseInt,
    /// `s.ord(i)`
    StringOrd,
    /// `s.substring(l, r)`
    StringSubstring,
    /// `a.size()`
    ArraySize,
    /// Constructor of a class that declares none; never called
    DefaultConstructor,
    StringConcatenate,
    StringEqual,
    StringNeq,
    StringLess,
    StringLeq,
    StringGreater,
    StringGeq,
    /// Heap allocator
    Malloc,
}

impl Builtin {
    pub const ALL: [Builtin; 21] = [
        Builtin::Print,
        Builtin::Println,
        Builtin::PrintInt,
        Builtin::PrintlnInt,
        Builtin::GetString,
        Builtin::GetInt,
        Builtin::ToString,
        Builtin::StringLength,
        Builtin::StringParseInt,
        Builtin::StringOrd,
        Builtin::StringSubstring,
        Builtin::ArraySize,
        Builtin::DefaultConstructor,
        Builtin::StringConcatenate,
        Builtin::StringEqual,
        Builtin::StringNeq,
        Builtin::StringLess,
        Builtin::StringLeq,
        Builtin::StringGreater,
        Builtin::StringGeq,
        Builtin::Malloc,
    ];

    /// External symbol emitted for calls
    pub fn symbol(&self) -> &'static str {
        match self {
            Builtin::Print => "__print__",
            Builtin::Println => "__println__",
            Builtin::PrintInt => "__printInt__",
            Builtin::PrintlnInt => "__printlnInt__",
            Builtin::GetString => "__getString__",
            Builtin::GetInt => "__getInt__",
            Builtin::ToString => "__toString__",
            Builtin::StringLength => "__string__length__",
            Builtin::StringParseInt => "__string__parseInt__",
            Builtin::StringOrd => "__string__ord__",
            Builtin::StringSubstring => "__string__substring__",
            Builtin::ArraySize => "__array__size__",
            Builtin::DefaultConstructor => "__empty__",
            Builtin::StringConcatenate => "__string__concatenate__",
            Builtin::StringEqual => "__string__equal__",
            Builtin::StringNeq => "__string__neq__",
            Builtin::StringLess => "__string__less__",
            Builtin::StringLeq => "__string__leq__",
            Builtin::StringGreater => "__string__greater__",
            Builtin::StringGeq => "__string__geq__",
            Builtin::Malloc => "__malloc__",
        }
    }

    /// Name the function has in source programs
    pub fn source_name(&self) -> &'static str {
        match self {
            Builtin::Print => "print",
            Builtin::Println => "println",
            Builtin::PrintInt => "printInt",
            Builtin::PrintlnInt => "printlnInt",
            Builtin::GetString => "getString",
            Builtin::GetInt => "getInt",
            Builtin::ToString => "toString",
            Builtin::StringLength => "length",
            Builtin::StringParseInt => "parseInt",
            Builtin::StringOrd => "ord",
            Builtin::StringSubstring => "substring",
            Builtin::ArraySize => "size",
            Builtin::DefaultConstructor => "__constructor__",
            Builtin::StringConcatenate => "string.+",
            Builtin::StringEqual => "string.==",
            Builtin::StringNeq => "string.!=",
            Builtin::StringLess => "string.<",
            Builtin::StringLeq => "string.<=",
            Builtin::StringGreater => "string.>",
            Builtin::StringGeq => "string.>=",
            Builtin::Malloc => "malloc",
        }
    }

    /// Builtins called with a receiver (`s.length()`, `a.size()`)
    pub fn has_receiver(&self) -> bool {
        matches!(
            self,
            Builtin::StringLength
                | Builtin::StringParseInt
                | Builtin::StringOrd
                | Builtin::StringSubstring
                | Builtin::ArraySize
                | Builtin::DefaultConstructor
        )
    }
}
