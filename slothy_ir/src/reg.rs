//! Register classes and symbolic register names.

use std::fmt;

/// Architectural register class. Every operand slot carries one; symbolic
/// names are unified to a single class across all their uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterClass {
    /// General-purpose registers (r0-r14).
    Gpr,
    /// Scalar floating-point registers (s0-s31).
    Fpr,
    /// Vector registers (q0-q7).
    Vector,
    /// The flags pseudo-register (NZCV).
    Flags,
}

impl RegisterClass {
    /// Parse a class name as written in typing hints ("gpr", "vector", ...).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "gpr" => Some(RegisterClass::Gpr),
            "fpr" => Some(RegisterClass::Fpr),
            "vector" => Some(RegisterClass::Vector),
            "flags" => Some(RegisterClass::Flags),
            _ => None,
        }
    }

    /// Whether registers of this class are subject to renaming.
    /// Flags are a single architectural resource and are never renamed.
    pub fn is_renamed(self) -> bool {
        !matches!(self, RegisterClass::Flags)
    }
}

impl fmt::Display for RegisterClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RegisterClass::Gpr => "gpr",
            RegisterClass::Fpr => "fpr",
            RegisterClass::Vector => "vector",
            RegisterClass::Flags => "flags",
        };
        write!(f, "{name}")
    }
}
