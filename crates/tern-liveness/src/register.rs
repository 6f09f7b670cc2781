//! Registers seen by the allocator

use std::fmt;

/// An allocation candidate, or one of the two fixed pseudo-registers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Register {
    /// Always reads as zero
    Zero,
    /// Stack pointer
    Sp,
    /// Incoming argument `n`
    Argument(usize),
    /// Virtual register, one per IR temporary
    Virtual(u32),
}

impl Register {
    /// Pseudo-registers never take part in interference or coalescing
    pub fn is_reserved(&self) -> bool {
        matches!(self, Register::Zero | Register::Sp)
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Register::Zero => write!(f, "zero"),
            Register::Sp => write!(f, "sp"),
            Register::Argument(n) => write!(f, "a{}", n),
            Register::Virtual(n) => write!(f, "v{}", n),
        }
    }
}

/// Undirected interference edge; `(a, b)` and `(b, a)` are the same edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegisterEdge(Register, Register);

impl RegisterEdge {
    /// `None` for a register paired with itself
    pub fn new(a: Register, b: Register) -> Option<Self> {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Some(Self(a, b)),
            std::cmp::Ordering::Greater => Some(Self(b, a)),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn endpoints(&self) -> (Register, Register) {
        (self.0, self.1)
    }

    pub fn contains(&self, reg: Register) -> bool {
        self.0 == reg || self.1 == reg
    }

    pub fn touches_reserved(&self) -> bool {
        self.0.is_reserved() || self.1.is_reserved()
    }
}

impl fmt::Display for RegisterEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -- {}", self.0, self.1)
    }
}
