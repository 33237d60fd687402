//! The instruction record produced by architecture classification.
//!
//! An `Instruction` is immutable once built: the optimizer never rewrites
//! mnemonics or operand shapes, it only reorders instructions and renames
//! their register operands.

use std::fmt;

use crate::reg::RegisterClass;

/// Role of an operand slot within its instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandRole {
    /// Register read.
    Read,
    /// Register write.
    Write,
    /// Register read and written in place (e.g. accumulators, writeback).
    ReadWrite,
    /// Immediate or other non-register text, passed through unchanged.
    Immediate,
}

impl OperandRole {
    pub fn is_read(self) -> bool {
        matches!(self, OperandRole::Read | OperandRole::ReadWrite)
    }

    pub fn is_write(self) -> bool {
        matches!(self, OperandRole::Write | OperandRole::ReadWrite)
    }
}

/// One operand slot. Register slots carry a class; immediate slots do not.
/// `address` marks registers that feed an address computation; dependencies
/// through such slots are tracked as address edges in the DFG.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operand {
    /// Register name (architectural or symbolic) or immediate text.
    pub name: String,
    pub role: OperandRole,
    pub class: Option<RegisterClass>,
    pub address: bool,
}

impl Operand {
    pub fn read(name: impl Into<String>, class: RegisterClass) -> Self {
        Self {
            name: name.into(),
            role: OperandRole::Read,
            class: Some(class),
            address: false,
        }
    }

    pub fn write(name: impl Into<String>, class: RegisterClass) -> Self {
        Self {
            name: name.into(),
            role: OperandRole::Write,
            class: Some(class),
            address: false,
        }
    }

    pub fn read_write(name: impl Into<String>, class: RegisterClass) -> Self {
        Self {
            name: name.into(),
            role: OperandRole::ReadWrite,
            class: Some(class),
            address: false,
        }
    }

    pub fn immediate(text: impl Into<String>) -> Self {
        Self {
            name: text.into(),
            role: OperandRole::Immediate,
            class: None,
            address: false,
        }
    }

    /// Mark this operand as participating in an address computation.
    pub fn addressing(mut self) -> Self {
        self.address = true;
        self
    }

    /// Whether this slot names a register (as opposed to an immediate).
    pub fn is_register(&self) -> bool {
        self.class.is_some()
    }
}

/// Memory effect of an instruction, used by the alias policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemEffect {
    None,
    Load,
    Store,
}

/// An address expression `[base, #offset]` as far as the alias predicate
/// cares: a base register name plus a constant byte offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddrExpr {
    pub base: String,
    pub offset: i64,
}

/// An instruction as matched against the architecture model.
///
/// `template` is the source text with each operand occurrence replaced by
/// `{i}`; rendering substitutes the (possibly renamed) operand names back in.
#[derive(Debug, Clone)]
pub struct Instruction {
    pub mnemonic: String,
    pub template: String,
    pub operands: Vec<Operand>,
    /// Symbolic immediate, if the instruction carries one. Kept separate
    /// from the operand list for multiset comparison in the self-check.
    pub immediate: Option<String>,
    pub mem: MemEffect,
    pub addr: Option<AddrExpr>,
    /// In-place constraint: the destination slot must be assigned the same
    /// architectural register as the given source slot.
    pub inplace: Option<(usize, usize)>,
}

impl Instruction {
    /// Render the instruction back to assembly text using the current
    /// operand names.
    pub fn render(&self) -> String {
        let mut out = self.template.clone();
        for (i, op) in self.operands.iter().enumerate() {
            out = out.replace(&format!("{{{i}}}"), &op.name);
        }
        out
    }

    /// Indices and operands of all register reads, in slot order.
    pub fn reads(&self) -> impl Iterator<Item = (usize, &Operand)> {
        self.operands
            .iter()
            .enumerate()
            .filter(|(_, op)| op.is_register() && op.role.is_read())
    }

    /// Indices and operands of all register writes, in slot order.
    pub fn writes(&self) -> impl Iterator<Item = (usize, &Operand)> {
        self.operands
            .iter()
            .enumerate()
            .filter(|(_, op)| op.is_register() && op.role.is_write())
    }

    pub fn is_load(&self) -> bool {
        self.mem == MemEffect::Load
    }

    pub fn is_store(&self) -> bool {
        self.mem == MemEffect::Store
    }

    pub fn touches_memory(&self) -> bool {
        self.mem != MemEffect::None
    }

    /// Stable shape key for multiset comparison: mnemonic, immediate, and
    /// the role/class signature of every slot. Register *names* are
    /// deliberately excluded; renaming must not change the shape.
    pub fn shape(&self) -> String {
        use fmt::Write;
        let mut key = self.mnemonic.clone();
        if let Some(imm) = &self.immediate {
            let _ = write!(key, " #{imm}");
        }
        for op in &self.operands {
            match (op.role, op.class) {
                (OperandRole::Immediate, _) => {
                    let _ = write!(key, " imm:{}", op.name);
                }
                (role, Some(class)) => {
                    let _ = write!(key, " {role:?}:{class}");
                }
                (role, None) => {
                    let _ = write!(key, " {role:?}:?");
                }
            }
        }
        key
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}
