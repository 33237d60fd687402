//! Model encoder: lowers the DFG plus the architecture and microarchitecture
//! tables into a constraint model describing every valid schedule, renaming,
//! and (in loop mode) pipelining.
//!
//! Register linkage is realized by variable sharing: all slots connected by
//! RAW edges or in-place constraints collapse to one model variable via
//! union-find, so renaming consistency holds by construction. Software
//! pipelining introduces per-node `early` flags and channels effective
//! coordinates `epos = pos - early * n`, `ecyc = cycle - early * window`;
//! all ordering constraints run on effective coordinates while issue
//! capacity and the permutation run on the window-relative raw ones.

use std::collections::HashMap;

use slothy_ir::dfg::{Dfg, EdgeKind, NodeId, NodeKind};
use slothy_ir::reg::RegisterClass;
use slothy_model::model::{
    Constraint, IssueCapacity, IssueSpec, LiveRangeDisjoint, Model, Objective, WriteSpec,
};
use slothy_model::Var;
use slothy_target::arch::Arch;
use slothy_target::uarch::{Uarch, Unit};

use crate::config::Config;

/// Per-instruction model variables, indexed by source order.
#[derive(Debug, Clone)]
pub struct NodeVars {
    pub pos: Var,
    pub cycle: Var,
    pub unit: Var,
    pub early: Option<Var>,
    /// Effective position; identical to `pos` outside loop mode.
    pub epos: Var,
    /// Effective cycle; identical to `cycle` outside loop mode.
    pub ecyc: Var,
}

/// A lowered model plus everything the decoder needs to read the solution
/// back.
pub struct Encoding {
    pub model: Model,
    pub nodes: Vec<NodeVars>,
    /// (node, slot) -> shared register variable.
    pub slot_vars: HashMap<(NodeId, usize), Var>,
    /// Global register id -> architectural register name.
    pub reg_names: Vec<String>,
    pub codesize: usize,
    /// Cycle window: codesize + stalls budget.
    pub cycle_window: usize,
    pub pipelining: bool,
}

impl Encoding {
    pub fn reg_name(&self, id: i64) -> &str {
        &self.reg_names[id as usize]
    }
}

/// Plain union-find over dense slot indices.
struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    fn find(&mut self, i: usize) -> usize {
        if self.parent[i] != i {
            let root = self.find(self.parent[i]);
            self.parent[i] = root;
        }
        self.parent[i]
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[ra.max(rb)] = ra.min(rb);
        }
    }
}

const CLASS_ORDER: [RegisterClass; 4] = [
    RegisterClass::Gpr,
    RegisterClass::Fpr,
    RegisterClass::Vector,
    RegisterClass::Flags,
];

/// Lower `dfg` into a model with the given stalls budget. `blocked_regs`
/// are additional architectural registers the renamer must not hand out
/// (e.g. the loop counter, which lives outside the modeled window).
pub fn encode(
    dfg: &Dfg,
    arch: &dyn Arch,
    uarch: &dyn Uarch,
    config: &Config,
    stalls: u32,
    pipelining: bool,
    blocked_regs: &[String],
) -> Encoding {
    let n = dfg.inst_count();
    let window = n + stalls as usize;
    let mut model = Model::new();

    // Global register numbering across classes.
    let mut reg_names: Vec<String> = Vec::new();
    let mut reg_ids: HashMap<(RegisterClass, &str), i64> = HashMap::new();
    let mut allocatable: HashMap<RegisterClass, Vec<i64>> = HashMap::new();
    for class in CLASS_ORDER {
        let mut free = Vec::new();
        for &name in arch.registers(class) {
            let id = reg_names.len() as i64;
            reg_names.push(name.to_string());
            reg_ids.insert((class, name), id);
            if !arch.reserved().contains(&name) && !blocked_regs.iter().any(|b| b == name) {
                free.push(id);
            }
        }
        allocatable.insert(class, free);
    }

    // Scheduling variables, in source order so the solver labels them the
    // way the input reads.
    let mut nodes = Vec::with_capacity(n);
    for (node, inst) in dfg.insts() {
        let i = node.index() - 1;
        let pos = model.new_range(format!("pos_{i}"), 0, n as i64 - 1);
        let cycle = model.new_range(format!("cycle_{i}"), 0, window as i64 - 1);
        let alts = uarch.units(inst).len().max(1);
        let unit = model.new_range(format!("unit_{i}"), 0, alts as i64 - 1);
        let (early, epos, ecyc) = if pipelining {
            let early = model.new_bool(format!("early_{i}"));
            let epos = model.new_range(format!("epos_{i}"), -(n as i64), n as i64 - 1);
            let ecyc = model.new_range(format!("ecyc_{i}"), -(window as i64), window as i64 - 1);
            model.add(Constraint::LinearEq {
                terms: vec![(epos, 1), (pos, -1), (early, n as i64)],
                constant: 0,
            });
            model.add(Constraint::LinearEq {
                terms: vec![(ecyc, 1), (cycle, -1), (early, window as i64)],
                constant: 0,
            });
            (Some(early), epos, ecyc)
        } else {
            (None, pos, cycle)
        };
        nodes.push(NodeVars {
            pos,
            cycle,
            unit,
            early,
            epos,
            ecyc,
        });
    }

    // Permutation: positions are pairwise distinct.
    if n > 0 {
        model.add(Constraint::AllDifferent(
            nodes.iter().map(|nv| nv.pos).collect(),
        ));
    }

    // Register slot unification.
    let (slot_vars, source_slot_vars) =
        build_register_vars(dfg, arch, &mut model, &reg_ids, &allocatable);

    // Ordering along edges, on effective coordinates. Source and sink
    // nodes carry no scheduling variables and are skipped here.
    for edge in &dfg.edges {
        let (
            NodeKind::Inst {
                inst: p_inst,
                source_index: p,
            },
            NodeKind::Inst {
                inst: c_inst,
                source_index: c,
            },
        ) = (&dfg.node(edge.producer).kind, &dfg.node(edge.consumer).kind)
        else {
            continue;
        };
        let pv = &nodes[*p];
        let cv = &nodes[*c];
        let pos_shift = if edge.cross { n as i64 } else { 0 };
        model.add(Constraint::OffsetLe {
            a: pv.epos,
            offset: 1 - pos_shift,
            b: cv.epos,
        });
        if edge.kind == EdgeKind::Memory {
            continue;
        }
        let lat = uarch.edge_latency(p_inst, c_inst, edge.kind) as i64;
        let cyc_shift = if edge.cross { window as i64 } else { 0 };
        model.add(Constraint::OffsetLe {
            a: pv.ecyc,
            offset: lat - cyc_shift,
            b: cv.ecyc,
        });
    }

    // In-order issue: emitted order and cycle order agree.
    model.add(Constraint::OrderedCycles {
        items: nodes.iter().map(|nv| (nv.pos, nv.cycle)).collect(),
    });

    // Issue width and functional-unit capacities.
    let mut specs = Vec::with_capacity(n);
    let mut max_unit = 0u8;
    for (node, inst) in dfg.insts() {
        let i = node.index() - 1;
        let alternatives: Vec<Vec<u8>> = uarch
            .units(inst)
            .into_iter()
            .map(|alt| alt.into_iter().map(|Unit(u)| u).collect::<Vec<u8>>())
            .collect();
        for alt in &alternatives {
            for &u in alt {
                max_unit = max_unit.max(u);
            }
        }
        specs.push(IssueSpec {
            cycle: nodes[i].cycle,
            unit_choice: nodes[i].unit,
            alternatives,
        });
    }
    let capacity = (0..=max_unit)
        .map(|u| uarch.unit_capacity(Unit(u)))
        .collect();
    model.add(Constraint::IssueCapacity(IssueCapacity {
        nodes: specs,
        width: uarch.issue_width(),
        capacity,
    }));

    // Register lifetimes.
    let lifetime_window = if pipelining { Some(n as i64) } else { None };
    let before_all = model.constant("t_source", -1);
    let after_all = model.constant("t_sink", n as i64);
    let mut writes = Vec::new();

    for (node, inst) in dfg.insts() {
        let i = node.index() - 1;
        for (slot, _) in inst.writes() {
            let reg = slot_vars[&(node, slot)];
            let mut ends = Vec::new();
            let mut incoming_ends = Vec::new();
            for edge in dfg.consumers_of_slot(node, slot) {
                match dfg.node(edge.consumer).source_index() {
                    Some(c) => {
                        if edge.cross && !pipelining {
                            // Loop-carried value optimized without
                            // pipelining: the incoming instance occupies the
                            // register from block entry to its last read,
                            // and this iteration's instance to block exit.
                            incoming_ends.push((nodes[c].epos, 0));
                            ends.push((after_all, 0));
                        } else {
                            let off = if edge.cross { n as i64 } else { 0 };
                            ends.push((nodes[c].epos, off));
                        }
                    }
                    None => {
                        // Sink consumer: the value survives the block. In
                        // loop mode the final iteration's value is read by
                        // the postamble, not inside the window.
                        if !pipelining {
                            ends.push((after_all, 0));
                        }
                    }
                }
            }
            if !incoming_ends.is_empty() {
                writes.push(WriteSpec {
                    reg,
                    start: (before_all, 0),
                    ends: incoming_ends,
                    periodic: false,
                });
            }
            writes.push(WriteSpec {
                reg,
                start: (nodes[i].epos, 0),
                ends,
                periodic: pipelining,
            });
        }
    }

    // External inputs: live from before the block. In loop mode an input
    // register is in use for the whole window of every iteration.
    for live_in in &dfg.inputs {
        let reg = source_slot_vars[&live_in.slot];
        let ends = if pipelining {
            // Occupied for the whole window of every iteration.
            vec![(before_all, n as i64 + 1)]
        } else {
            let mut ends = Vec::new();
            for edge in dfg.consumers_of_slot(dfg.source, live_in.slot) {
                match dfg.node(edge.consumer).source_index() {
                    Some(c) => ends.push((nodes[c].epos, 0)),
                    None => ends.push((after_all, 0)),
                }
            }
            ends
        };
        writes.push(WriteSpec {
            reg,
            start: (before_all, 0),
            ends,
            periodic: false,
        });
    }

    model.add(Constraint::LiveRangeDisjoint(LiveRangeDisjoint {
        writes,
        window: lifetime_window,
    }));

    // Objective: tighten the kernel by minimizing cross-iteration overlap.
    if pipelining && config.sw_pipelining.minimize_overlapping {
        let early: Vec<Var> = nodes.iter().filter_map(|nv| nv.early).collect();
        model.set_objective(Objective::MinimizeSum(early));
    }

    Encoding {
        model,
        nodes,
        slot_vars,
        reg_names,
        codesize: n,
        cycle_window: window,
        pipelining,
    }
}

/// Unify RAW-linked slots into shared register variables and build their
/// domains. Returns the slot map plus the source-slot map used for live-in
/// lifetimes.
#[allow(clippy::type_complexity)]
fn build_register_vars(
    dfg: &Dfg,
    arch: &dyn Arch,
    model: &mut Model,
    reg_ids: &HashMap<(RegisterClass, &str), i64>,
    allocatable: &HashMap<RegisterClass, Vec<i64>>,
) -> (HashMap<(NodeId, usize), Var>, HashMap<usize, Var>) {
    // Enumerate register slots densely.
    let mut keys: Vec<(NodeId, usize)> = Vec::new();
    let mut key_index: HashMap<(NodeId, usize), usize> = HashMap::new();
    let add_key = |node: NodeId,
                   slot: usize,
                   keys: &mut Vec<(NodeId, usize)>,
                   key_index: &mut HashMap<(NodeId, usize), usize>| {
        key_index.entry((node, slot)).or_insert_with(|| {
            keys.push((node, slot));
            keys.len() - 1
        });
    };
    for live_in in &dfg.inputs {
        add_key(dfg.source, live_in.slot, &mut keys, &mut key_index);
    }
    for (node, inst) in dfg.insts() {
        for (slot, op) in inst.operands.iter().enumerate() {
            if op.is_register() {
                add_key(node, slot, &mut keys, &mut key_index);
            }
        }
    }
    for live_out in &dfg.outputs {
        add_key(dfg.sink, live_out.slot, &mut keys, &mut key_index);
    }

    let mut uf = UnionFind::new(keys.len());
    for edge in &dfg.edges {
        let (Some(ps), Some(cs)) = (edge.producer_slot, edge.consumer_slot) else {
            continue;
        };
        uf.union(
            key_index[&(edge.producer, ps)],
            key_index[&(edge.consumer, cs)],
        );
    }
    for (node, inst) in dfg.insts() {
        if let Some((dst, src)) = inst.inplace {
            uf.union(key_index[&(node, dst)], key_index[&(node, src)]);
        }
    }

    // Slot metadata: register class and pre-pinned name, if architectural.
    let slot_info = |node: NodeId, slot: usize| -> (RegisterClass, Option<&str>) {
        if node == dfg.source {
            let li = &dfg.inputs[slot];
            (li.class, arch.register_class(&li.name).map(|_| li.name.as_str()))
        } else if node == dfg.sink {
            let lo = &dfg.outputs[slot];
            (lo.class, arch.register_class(&lo.name).map(|_| lo.name.as_str()))
        } else {
            match &dfg.node(node).kind {
                NodeKind::Inst { inst, .. } => {
                    let op = &inst.operands[slot];
                    let class = op.class.unwrap_or(RegisterClass::Gpr);
                    (class, arch.register_class(&op.name).map(|_| op.name.as_str()))
                }
                // Source and sink were handled above; slot keys only exist
                // for the three node kinds.
                _ => (RegisterClass::Gpr, None),
            }
        }
    };

    // One variable per union class, domain = intersection of member demands.
    let mut class_var: HashMap<usize, Var> = HashMap::new();
    let mut slot_vars = HashMap::new();
    let mut source_slot_vars = HashMap::new();
    for (idx, &(node, slot)) in keys.iter().enumerate() {
        let root = uf.find(idx);
        let var = match class_var.get(&root).copied() {
            Some(v) => v,
            None => {
                // Walk the members once to build the domain.
                let mut domain: Option<Vec<i64>> = None;
                for (j, &(n2, s2)) in keys.iter().enumerate() {
                    if uf.find(j) != root {
                        continue;
                    }
                    let (class, pinned) = slot_info(n2, s2);
                    let member: Vec<i64> = match pinned {
                        Some(name) => reg_ids
                            .get(&(class, name))
                            .map(|&id| vec![id])
                            .unwrap_or_default(),
                        None => allocatable.get(&class).cloned().unwrap_or_default(),
                    };
                    domain = Some(match domain {
                        None => member,
                        Some(prev) => prev.into_iter().filter(|v| member.contains(v)).collect(),
                    });
                }
                let v = model.new_var(format!("reg_{node}_{slot}"), domain.unwrap_or_default());
                class_var.insert(root, v);
                v
            }
        };
        if node == dfg.source {
            source_slot_vars.insert(slot, var);
        } else if node != dfg.sink {
            slot_vars.insert((node, slot), var);
        }
    }

    (slot_vars, source_slot_vars)
}
