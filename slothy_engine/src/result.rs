//! The caller-visible result of one optimize call. This is the only durable
//! artifact; model objects and schedules are rebuilt per pass.

use std::collections::HashMap;

use crate::decode::SlotRename;

/// Loop-mode extras: the partitioned loop and the registers live across its
/// boundary.
#[derive(Debug, Clone)]
pub struct KernelInfo {
    pub preamble: Vec<String>,
    pub kernel: Vec<String>,
    pub postamble: Vec<String>,
    /// Registers the kernel consumes from outside (loop-carried and
    /// invariant values).
    pub inputs: Vec<String>,
    /// Registers the kernel defines.
    pub outputs: Vec<String>,
    pub early_count: usize,
}

#[derive(Debug, Clone)]
pub struct OptimizeOutput {
    /// The optimized window, with per-line issue-slot glyphs.
    pub body: Vec<String>,
    /// The whole source file with the window replaced.
    pub full: Vec<String>,
    /// Lowest stalls budget that succeeded.
    pub stalls: u32,
    /// Source index -> output position within the window.
    pub permutation: Vec<usize>,
    /// Every renamed operand occurrence.
    pub renames: Vec<SlotRename>,
    /// External input name -> architectural register.
    pub input_renames: HashMap<String, String>,
    /// `(budget, success)` per solver attempt.
    pub attempts: Vec<(u32, bool)>,
    pub kernel: Option<KernelInfo>,
}
