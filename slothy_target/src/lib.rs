//! slothy_target: architecture and microarchitecture plug-in traits.
//!
//! The engine is target-agnostic: adding a new target means providing one
//! implementation of [`arch::Arch`] and one of [`uarch::Uarch`] in a new
//! crate, with no change to the engine.

pub mod arch;
pub mod uarch;
