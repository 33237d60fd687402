//! Solution decoder: turns a satisfying assignment back into a concrete
//! instruction listing with renamed operands and issue-slot annotations.

use std::collections::HashMap;

use slothy_ir::dfg::Dfg;
use slothy_ir::inst::Instruction;
use slothy_model::Assignment;

use crate::encode::Encoding;

/// One emitted instruction.
#[derive(Debug, Clone)]
pub struct ScheduledInst {
    pub source_index: usize,
    pub position: usize,
    pub cycle: usize,
    pub early: bool,
    /// The instruction with architectural registers substituted in.
    pub inst: Instruction,
}

/// One renamed operand occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotRename {
    pub source_index: usize,
    pub slot: usize,
    pub from: String,
    pub to: String,
}

/// A decoded schedule, the durable artifact of one successful pass.
#[derive(Debug, Clone)]
pub struct Schedule {
    /// Instructions in emission (position) order.
    pub insts: Vec<ScheduledInst>,
    /// Source index -> output position.
    pub permutation: Vec<usize>,
    pub renames: Vec<SlotRename>,
    /// Renaming of the external live-ins: input name -> architectural name.
    pub input_renames: HashMap<String, String>,
    pub cycle_window: usize,
    pub pipelining: bool,
}

impl Schedule {
    /// Output instruction records in position order.
    pub fn output_insts(&self) -> Vec<Instruction> {
        self.insts.iter().map(|s| s.inst.clone()).collect()
    }
}

/// Read the assignment back through the encoding.
pub fn decode(dfg: &Dfg, enc: &Encoding, assignment: &Assignment) -> Schedule {
    let mut insts = Vec::with_capacity(enc.nodes.len());
    let mut renames = Vec::new();

    for (node, inst) in dfg.insts() {
        let i = node.index() - 1;
        let mut renamed = inst.clone();
        for (slot, op) in renamed.operands.iter_mut().enumerate() {
            if !op.is_register() {
                continue;
            }
            let var = enc.slot_vars[&(node, slot)];
            let name = enc.reg_name(assignment.value(var));
            if name != op.name {
                renames.push(SlotRename {
                    source_index: i,
                    slot,
                    from: op.name.clone(),
                    to: name.to_string(),
                });
                op.name = name.to_string();
            }
        }
        let nv = &enc.nodes[i];
        insts.push(ScheduledInst {
            source_index: i,
            position: assignment.value(nv.pos) as usize,
            cycle: assignment.value(nv.cycle) as usize,
            early: nv.early.is_some_and(|e| assignment.value(e) == 1),
            inst: renamed,
        });
    }

    insts.sort_by_key(|s| s.position);
    let mut permutation = vec![0usize; insts.len()];
    for s in &insts {
        permutation[s.source_index] = s.position;
    }

    // Input renames surface through the consumers; resolve each live-in via
    // its first instruction consumer.
    let mut input_renames = HashMap::new();
    for live_in in &dfg.inputs {
        for edge in dfg.consumers_of_slot(dfg.source, live_in.slot) {
            let (Some(c), Some(cs)) = (dfg.node(edge.consumer).source_index(), edge.consumer_slot)
            else {
                continue;
            };
            let pos = permutation[c];
            let name = insts[pos].inst.operands[cs].name.clone();
            input_renames.insert(live_in.name.clone(), name);
            break;
        }
    }

    Schedule {
        insts,
        permutation,
        renames,
        input_renames,
        cycle_window: enc.cycle_window,
        pipelining: enc.pipelining,
    }
}

/// Render the schedule with per-line issue-slot glyphs: one column per
/// cycle of the window, `*` at the issue cycle (`e` for early
/// instructions), `.` elsewhere.
pub fn format_lines(schedule: &Schedule) -> Vec<String> {
    schedule
        .insts
        .iter()
        .map(|s| {
            let mut glyphs: Vec<char> = vec!['.'; schedule.cycle_window];
            if s.cycle < glyphs.len() {
                glyphs[s.cycle] = if s.early { 'e' } else { '*' };
            }
            let glyph: String = glyphs.into_iter().collect();
            format!("{:<40} // {}", s.inst.render(), glyph)
        })
        .collect()
}
