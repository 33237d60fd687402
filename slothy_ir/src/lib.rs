//! slothy_ir: Core data model for the slothy superoptimizer.
//!
//! Holds the instruction record produced by architecture classification,
//! the data-flow graph the optimizer schedules against, and the
//! independent self-check that validates optimizer output.

pub mod dfg;
pub mod inst;
pub mod reg;
pub mod selfcheck;

#[cfg(test)]
mod tests;
