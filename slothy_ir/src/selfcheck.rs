//! Independent self-check of optimizer output.
//!
//! Rebuilds a DFG from the decoded output and verifies that the output is a
//! permutation + renaming of the input whose data flow matches. Collects all
//! violations rather than stopping at the first one; any violation means the
//! output must be rejected as an internal bug.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;

use crate::dfg::{DfgBuilder, EdgeKind};
use crate::inst::Instruction;

/// A single self-check violation.
#[derive(Debug, Clone)]
pub struct CheckViolation {
    pub message: String,
}

impl fmt::Display for CheckViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Collected self-check results.
#[derive(Debug, Default)]
pub struct CheckReport {
    pub violations: Vec<CheckViolation>,
}

impl CheckReport {
    pub fn is_ok(&self) -> bool {
        self.violations.is_empty()
    }

    fn violation(&mut self, message: impl Into<String>) {
        self.violations.push(CheckViolation {
            message: message.into(),
        });
    }
}

impl fmt::Display for CheckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ok() {
            return write!(f, "self-check passed");
        }
        writeln!(
            f,
            "self-check failed with {} violation(s); this is a bug, please report it:",
            self.violations.len()
        )?;
        for v in &self.violations {
            writeln!(f, "  {v}")?;
        }
        Ok(())
    }
}

/// Verify that `output` is a valid reordering + renaming of `input` under
/// the permutation `perm` (`perm[i]` is the output position of input
/// instruction `i`). `builder` must carry the same alias policy as the
/// optimization pass so memory ordering is judged identically.
pub fn check_schedule(
    input: &[Instruction],
    output: &[Instruction],
    perm: &[usize],
    builder: &DfgBuilder,
) -> CheckReport {
    let mut report = CheckReport::default();

    if output.len() != input.len() || perm.len() != input.len() {
        report.violation(format!(
            "length mismatch: {} input instructions, {} output, permutation of {}",
            input.len(),
            output.len(),
            perm.len()
        ));
        return report;
    }

    // perm must be a bijection onto 0..n.
    let mut seen = vec![false; input.len()];
    for (i, &p) in perm.iter().enumerate() {
        if p >= input.len() || seen[p] {
            report.violation(format!("invalid permutation entry {i} -> {p}"));
            return report;
        }
        seen[p] = true;
    }

    // Multiset of instruction shapes must be preserved.
    let mut in_shapes: Vec<String> = input.iter().map(Instruction::shape).collect();
    let mut out_shapes: Vec<String> = output.iter().map(Instruction::shape).collect();
    in_shapes.sort();
    out_shapes.sort();
    if in_shapes != out_shapes {
        report.violation("output is not a permutation of the input instruction multiset");
    }

    // Per-node correspondence: mnemonic and immediate must survive. The
    // remaining categories still run: every independent check reports its
    // own violations.
    for (i, inst) in input.iter().enumerate() {
        let out = &output[perm[i]];
        if out.mnemonic != inst.mnemonic || out.immediate != inst.immediate {
            report.violation(format!(
                "instruction {i} (`{}`) maps to output {} (`{}`)",
                inst.render(),
                perm[i],
                out.render()
            ));
        }
    }

    let in_dfg = match builder.build(input) {
        Ok(dfg) => dfg,
        Err(e) => {
            report.violation(format!("input DFG rebuild failed: {e}"));
            return report;
        }
    };
    let out_dfg = match builder.build(output) {
        Ok(dfg) => dfg,
        Err(e) => {
            report.violation(format!("output DFG rebuild failed: {e}"));
            return report;
        }
    };

    // Edge correspondence: every input dependency must hold in the output
    // under the permutation.
    for edge in &in_dfg.edges {
        let (Some(p), Some(c)) = (
            in_dfg.node(edge.producer).source_index(),
            in_dfg.node(edge.consumer).source_index(),
        ) else {
            continue; // source/sink edges checked via live-in consistency
        };
        let (op, oc) = (perm[p], perm[c]);

        if edge.kind == EdgeKind::Memory {
            // Memory edges are ordering-only.
            if op >= oc {
                report.violation(format!(
                    "memory ordering broken: input {p} before {c}, output {op} after {oc}"
                ));
            }
            continue;
        }

        let found = out_dfg.edges.iter().any(|oe| {
            out_dfg.node(oe.producer).source_index() == Some(op)
                && out_dfg.node(oe.consumer).source_index() == Some(oc)
                && oe.producer_slot == edge.producer_slot
                && oe.consumer_slot == edge.consumer_slot
        });
        if !found {
            report.violation(format!(
                "dependency lost: input edge {p}:{:?} -> {c}:{:?} has no counterpart \
                 {op} -> {oc} in the output",
                edge.producer_slot, edge.consumer_slot
            ));
        }
    }

    // Renaming consistency: all consumers of one live range must read the
    // same architectural register the producer wrote.
    for edge in &in_dfg.edges {
        if edge.kind == EdgeKind::Memory {
            continue;
        }
        let (Some(p), Some(c)) = (
            in_dfg.node(edge.producer).source_index(),
            in_dfg.node(edge.consumer).source_index(),
        ) else {
            continue;
        };
        let (Some(ps), Some(cs)) = (edge.producer_slot, edge.consumer_slot) else {
            continue;
        };
        // A missing slot means the per-node correspondence already failed;
        // that violation is on record, so only matching shapes are compared.
        let (Some(wr), Some(rd)) = (
            output[perm[p]].operands.get(ps),
            output[perm[c]].operands.get(cs),
        ) else {
            continue;
        };
        let (written, read) = (&wr.name, &rd.name);
        if written != read {
            report.violation(format!(
                "inconsistent renaming: input {p} slot {ps} renamed to `{written}` \
                 but consumer {c} slot {cs} reads `{read}`"
            ));
        }
    }

    // Live-in consistency: every consumer of one external input must read
    // one and the same register in the output.
    let mut live_in_names: HashMap<usize, (String, usize)> = HashMap::new();
    for edge in &in_dfg.edges {
        if edge.producer != in_dfg.source {
            continue;
        }
        let (Some(slot), Some(c), Some(cs)) = (
            edge.producer_slot,
            in_dfg.node(edge.consumer).source_index(),
            edge.consumer_slot,
        ) else {
            continue;
        };
        let Some(read) = output[perm[c]].operands.get(cs) else {
            continue;
        };
        let name = read.name.clone();
        match live_in_names.entry(slot) {
            Entry::Vacant(e) => {
                e.insert((name, c));
            }
            Entry::Occupied(e) => {
                let (first, first_c) = e.get();
                if *first != name {
                    report.violation(format!(
                        "live-in `{}` read as `{first}` by input {first_c} \
                         but as `{name}` by input {c}",
                        in_dfg.inputs[slot].name
                    ));
                }
            }
        }
    }

    report
}

/// Convenience wrapper: panic-free check used by the engine; logs the
/// outcome under the `slothy:` prefix.
pub fn run(
    input: &[Instruction],
    output: &[Instruction],
    perm: &[usize],
    builder: &DfgBuilder,
) -> CheckReport {
    let report = check_schedule(input, output, perm, builder);
    if report.is_ok() {
        log::debug!("slothy: selfcheck ok ({} instructions)", input.len());
    } else {
        log::error!("slothy: {report}");
    }
    report
}
