//! The architecture model: an opaque table mapping assembly text to typed
//! instruction records.

use slothy_ir::inst::Instruction;
use slothy_ir::reg::RegisterClass;
use thiserror::Error;

/// Classification failure: the line matched no instruction pattern.
#[derive(Debug, Clone, Error)]
#[error("cannot classify `{text}`: {reason}")]
pub struct ClassifyError {
    pub text: String,
    pub reason: String,
}

/// An architecture model.
///
/// `classify` performs the text-to-record matching; the register queries
/// expose the architectural register file to the renamer.
pub trait Arch {
    fn name(&self) -> &'static str;

    /// Match one assembly line against the instruction table.
    fn classify(&self, text: &str) -> Result<Instruction, ClassifyError>;

    /// All architectural registers of a class, in allocation preference
    /// order. The renamer draws from this list minus [`Arch::reserved`].
    fn registers(&self, class: RegisterClass) -> &'static [&'static str];

    /// Class of an architectural register name, if the name is one.
    fn register_class(&self, name: &str) -> Option<RegisterClass>;

    /// Registers never handed out by the renamer (stack pointer, flags, ...).
    fn reserved(&self) -> &'static [&'static str];

    /// Architecture-level register aliases, e.g. `lr` -> `r14`.
    fn aliases(&self) -> &'static [(&'static str, &'static str)];
}
