//! The loop transformer.
//!
//! Unrolls the loop body before modeling, partitions a pipelined schedule
//! into preamble / kernel / postamble, and exposes the kernel's live-in and
//! live-out registers for downstream optimization of inter-loop code.

use std::collections::{HashMap, HashSet};

use slothy_ir::inst::{Instruction, OperandRole};

use crate::decode::{Schedule, ScheduledInst};

/// Concatenate `u` copies of the body. Symbolic names defined by plain
/// writes are suffixed per copy so copies stay independent; a read before
/// the copy's first write refers to the previous copy, and copy 0 refers to
/// the last copy, closing the backedge. Read-modify-write names
/// (accumulators) keep their name: their single slot carries the chain
/// through every copy.
pub fn unroll(
    body: &[Instruction],
    unroll: u32,
    is_symbolic: &dyn Fn(&str) -> bool,
) -> Vec<Instruction> {
    if unroll <= 1 {
        return body.to_vec();
    }
    let u = unroll as usize;

    let mut pure_written: HashSet<&str> = HashSet::new();
    let mut chained: HashSet<&str> = HashSet::new();
    for inst in body {
        for op in &inst.operands {
            if !op.is_register() || !is_symbolic(&op.name) {
                continue;
            }
            match op.role {
                OperandRole::Write => {
                    pure_written.insert(&op.name);
                }
                OperandRole::ReadWrite => {
                    chained.insert(&op.name);
                }
                _ => {}
            }
        }
    }
    let renamed: HashSet<&str> = pure_written.difference(&chained).copied().collect();

    let mut out = Vec::with_capacity(body.len() * u);
    for k in 0..u {
        let prev = (k + u - 1) % u;
        let mut defined: HashSet<String> = HashSet::new();
        for inst in body {
            let mut inst = inst.clone();
            // Resolve reads against the pre-instruction state, then apply
            // the writes.
            let mut new_names: Vec<(usize, String)> = Vec::new();
            for (slot, op) in inst.operands.iter().enumerate() {
                if !op.is_register() || !renamed.contains(op.name.as_str()) {
                    continue;
                }
                match op.role {
                    OperandRole::Read => {
                        let copy = if defined.contains(&op.name) { k } else { prev };
                        new_names.push((slot, format!("{}_{copy}", op.name)));
                    }
                    OperandRole::Write => {
                        new_names.push((slot, format!("{}_{k}", op.name)));
                    }
                    _ => {}
                }
            }
            for op in &inst.operands {
                if op.role == OperandRole::Write && renamed.contains(op.name.as_str()) {
                    defined.insert(op.name.clone());
                }
            }
            for (slot, name) in new_names {
                inst.operands[slot].name = name;
            }
            // The address expression follows its base register.
            if let Some(addr) = &mut inst.addr {
                if let Some(op) = inst.operands.iter().find(|op| op.address) {
                    addr.base = op.name.clone();
                }
            }
            out.push(inst);
        }
    }
    out
}

/// Split a pipelined schedule into (preamble, kernel, postamble) views.
/// The kernel holds every instruction once in position order; the preamble
/// holds iteration 0's early instances; the postamble the final iteration's
/// non-early instances.
pub fn partition(
    schedule: &Schedule,
) -> (
    Vec<&ScheduledInst>,
    Vec<&ScheduledInst>,
    Vec<&ScheduledInst>,
) {
    let preamble = schedule.insts.iter().filter(|s| s.early).collect();
    let kernel = schedule.insts.iter().collect();
    let postamble = schedule.insts.iter().filter(|s| !s.early).collect();
    (preamble, kernel, postamble)
}

/// Registers live into and out of the kernel: reads of registers not yet
/// written in kernel order, and every written register.
pub fn kernel_io(kernel: &[&ScheduledInst]) -> (Vec<String>, Vec<String>) {
    let mut written: HashSet<&str> = HashSet::new();
    let mut inputs: Vec<String> = Vec::new();
    let mut outputs: Vec<String> = Vec::new();
    for s in kernel {
        for (_, op) in s.inst.reads() {
            if !written.contains(op.name.as_str()) && !inputs.iter().any(|i| *i == op.name) {
                inputs.push(op.name.clone());
            }
        }
        for (_, op) in s.inst.writes() {
            written.insert(&op.name);
            if !outputs.iter().any(|o| *o == op.name) {
                outputs.push(op.name.clone());
            }
        }
    }
    (inputs, outputs)
}

/// Build the k = 1 expansion `preamble ; kernel ; postamble` together with
/// the permutation mapping two concatenated body copies onto it, for the
/// loop-mode self-check.
pub fn expansion_for_check(
    body: &[Instruction],
    schedule: &Schedule,
) -> (Vec<Instruction>, Vec<Instruction>, Vec<usize>) {
    let n = body.len();
    let input: Vec<Instruction> = body.iter().chain(body.iter()).cloned().collect();

    let (preamble, kernel, postamble) = partition(schedule);
    let e = preamble.len();

    let mut output = Vec::with_capacity(2 * n);
    output.extend(preamble.iter().map(|s| s.inst.clone()));
    output.extend(kernel.iter().map(|s| s.inst.clone()));
    output.extend(postamble.iter().map(|s| s.inst.clone()));

    // Output index per source instruction, per role.
    let mut early_rank: HashMap<usize, usize> = HashMap::new();
    for (rank, s) in preamble.iter().enumerate() {
        early_rank.insert(s.source_index, rank);
    }
    let mut late_rank: HashMap<usize, usize> = HashMap::new();
    for (rank, s) in postamble.iter().enumerate() {
        late_rank.insert(s.source_index, rank);
    }

    let mut perm = vec![0usize; 2 * n];
    for s in &schedule.insts {
        let i = s.source_index;
        if s.early {
            // Iteration 0 runs in the preamble, iteration 1 in the kernel.
            perm[i] = early_rank[&i];
            perm[n + i] = e + s.position;
        } else {
            // Iteration 0 runs in the kernel, iteration 1 in the postamble.
            perm[i] = e + s.position;
            perm[n + i] = e + n + late_rank[&i];
        }
    }
    (input, output, perm)
}
