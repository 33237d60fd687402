//! Data-flow graph construction.
//!
//! A single left-to-right pass over the instruction sequence maintains the
//! current producer of every register name and inserts one producer edge per
//! read slot. After construction, register names are irrelevant: two nodes
//! are dependent iff an edge connects them, whatever renaming the encoder
//! later picks.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

use crate::inst::{AddrExpr, Instruction, MemEffect};
use crate::reg::RegisterClass;

/// Handle into [`Dfg::nodes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Dependency kind carried on every edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// True (RAW) register dependency.
    Register,
    /// Dependency through the flags pseudo-register.
    Flags,
    /// Register dependency feeding an address computation. Participates in
    /// renaming linkage like a register edge; tagged so the latency model
    /// can treat address forwarding separately.
    Address,
    /// Memory ordering edge from the alias policy. Ordering only; carries
    /// no operand slots and never links renaming.
    Memory,
}

/// Directed, typed edge `(producer, producer_slot) -> (consumer, consumer_slot)`.
/// Memory edges carry no slots.
#[derive(Debug, Clone)]
pub struct Edge {
    pub producer: NodeId,
    pub producer_slot: Option<usize>,
    pub consumer: NodeId,
    pub consumer_slot: Option<usize>,
    pub kind: EdgeKind,
    /// Loop mode: the producer instance belongs to the previous iteration.
    pub cross: bool,
}

/// A DFG node: one instruction, or the virtual source/sink.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Virtual producer of all externally live-in registers.
    Source,
    /// Virtual consumer of all required output registers.
    Sink,
    Inst {
        inst: Instruction,
        /// Stable input order of the instruction.
        source_index: usize,
    },
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
}

impl Node {
    pub fn source_index(&self) -> Option<usize> {
        match &self.kind {
            NodeKind::Inst { source_index, .. } => Some(*source_index),
            _ => None,
        }
    }
}

/// Memory alias policy: decides whether two address expressions may refer to
/// overlapping memory. Conservative unless proven otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AliasPolicy {
    /// All load/store pairs alias.
    #[default]
    Conservative,
    /// Identical base register with distinct constant offsets proves
    /// non-aliasing; everything else aliases.
    BaseOffset,
    /// Memory dependencies are not modeled; the caller guarantees buffers
    /// are disjoint. Required for useful software pipelining of load/store
    /// kernels.
    None,
}

impl AliasPolicy {
    pub fn may_alias(self, a: Option<&AddrExpr>, b: Option<&AddrExpr>) -> bool {
        match self {
            AliasPolicy::Conservative => true,
            AliasPolicy::BaseOffset => match (a, b) {
                (Some(a), Some(b)) if a.base == b.base => a.offset == b.offset,
                _ => true,
            },
            AliasPolicy::None => false,
        }
    }
}

/// Errors surfaced during DFG construction. All are input errors.
#[derive(Debug, Clone, Error)]
pub enum DfgError {
    #[error(
        "instruction {index}: read of `{name}` has no producer and is not a declared input"
    )]
    UndefinedRead { name: String, index: usize },
    #[error(
        "register class conflict for `{name}`: used as {first} and as {second}; \
         add a typing hint for `{name}`"
    )]
    ClassConflict {
        name: String,
        first: RegisterClass,
        second: RegisterClass,
    },
    #[error("required output register `{name}` is never written and not an input")]
    UndefinedOutput { name: String },
}

/// An externally live-in register exposed by the virtual source.
#[derive(Debug, Clone)]
pub struct LiveIn {
    pub name: String,
    pub class: RegisterClass,
    /// Output slot index on the virtual source node.
    pub slot: usize,
}

/// A required output register consumed by the virtual sink.
#[derive(Debug, Clone)]
pub struct LiveOut {
    pub name: String,
    pub class: RegisterClass,
    /// Input slot index on the virtual sink node.
    pub slot: usize,
}

/// The data-flow graph. Node 0 is the virtual source, the last node the
/// virtual sink, and instruction `i` of the input sits at node `i + 1`.
#[derive(Debug, Clone)]
pub struct Dfg {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub source: NodeId,
    pub sink: NodeId,
    /// Externally live-in registers, in discovery order.
    pub inputs: Vec<LiveIn>,
    /// Required outputs, in discovery order.
    pub outputs: Vec<LiveOut>,
    /// Resolved register class per name appearing in the body.
    pub classes: HashMap<String, RegisterClass>,
}

impl Dfg {
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    /// Node id of input instruction `i`.
    pub fn inst_node(&self, source_index: usize) -> NodeId {
        NodeId(source_index as u32 + 1)
    }

    /// Number of instruction nodes (excludes source and sink).
    pub fn inst_count(&self) -> usize {
        self.nodes.len() - 2
    }

    /// All instruction nodes in input order.
    pub fn insts(&self) -> impl Iterator<Item = (NodeId, &Instruction)> {
        self.nodes.iter().filter_map(|n| match &n.kind {
            NodeKind::Inst { inst, .. } => Some((n.id, inst)),
            _ => None,
        })
    }

    /// The producer edge feeding a read slot, if any.
    pub fn producer_for_slot(&self, node: NodeId, slot: usize) -> Option<&Edge> {
        self.edges
            .iter()
            .find(|e| e.consumer == node && e.consumer_slot == Some(slot))
    }

    /// All edges consuming the value written at `(node, slot)`.
    pub fn consumers_of_slot(&self, node: NodeId, slot: usize) -> impl Iterator<Item = &Edge> {
        self.edges
            .iter()
            .filter(move |e| e.producer == node && e.producer_slot == Some(slot))
    }
}

/// Configurable DFG builder. Reused by the optimizer (on input) and by the
/// self-check (on decoded output).
#[derive(Debug, Clone)]
pub struct DfgBuilder {
    pub alias_policy: AliasPolicy,
    /// Whether loads may reorder among themselves.
    pub allow_load_reordering: bool,
    pub typing_hints: HashMap<String, RegisterClass>,
    /// Declared live-in registers. `None` auto-discovers: every read with no
    /// earlier producer becomes an input.
    pub inputs: Option<Vec<String>>,
    /// Required output registers. `None` keeps every finally-written
    /// register live into the sink.
    pub outputs: Option<Vec<String>>,
    /// Loop mode: a read before the first write of a name that is written
    /// later in the body consumes last iteration's value (cross edge).
    pub loop_carried: bool,
}

impl DfgBuilder {
    pub fn new() -> Self {
        Self {
            alias_policy: AliasPolicy::Conservative,
            allow_load_reordering: true,
            typing_hints: HashMap::new(),
            inputs: None,
            outputs: None,
            loop_carried: false,
        }
    }

    /// Build the DFG for an instruction sequence.
    pub fn build(&self, insts: &[Instruction]) -> Result<Dfg, DfgError> {
        let classes = self.resolve_classes(insts)?;

        let source = NodeId(0);
        let sink = NodeId(insts.len() as u32 + 1);

        let mut nodes = Vec::with_capacity(insts.len() + 2);
        nodes.push(Node {
            id: source,
            kind: NodeKind::Source,
        });
        for (i, inst) in insts.iter().enumerate() {
            nodes.push(Node {
                id: NodeId(i as u32 + 1),
                kind: NodeKind::Inst {
                    inst: inst.clone(),
                    source_index: i,
                },
            });
        }
        nodes.push(Node {
            id: sink,
            kind: NodeKind::Sink,
        });

        // Last writer per name, for loop-carried backedge resolution.
        let mut last_writer: HashMap<&str, (NodeId, usize)> = HashMap::new();
        if self.loop_carried {
            for (i, inst) in insts.iter().enumerate() {
                for (slot, op) in inst.writes() {
                    last_writer.insert(op.name.as_str(), (NodeId(i as u32 + 1), slot));
                }
            }
        }

        let mut edges = Vec::new();
        let mut inputs: Vec<LiveIn> = Vec::new();
        let mut current: HashMap<String, (NodeId, usize)> = HashMap::new();

        // Pre-declare explicit inputs so their source slots are stable.
        if let Some(declared) = &self.inputs {
            for name in declared {
                let class = classes.get(name).copied().unwrap_or(RegisterClass::Gpr);
                declare_input(source, name, class, &mut inputs, &mut current);
            }
        }

        // Memory-touching predecessors, for alias edges.
        let mut mem_insts: Vec<(NodeId, MemEffect, Option<AddrExpr>)> = Vec::new();

        for (i, inst) in insts.iter().enumerate() {
            let node = NodeId(i as u32 + 1);

            // Reads first; read-write slots read the old value.
            for (slot, op) in inst.reads() {
                let class = classes[&op.name];
                let kind = if class == RegisterClass::Flags {
                    EdgeKind::Flags
                } else if op.address {
                    EdgeKind::Address
                } else {
                    EdgeKind::Register
                };

                let (producer, producer_slot, cross) = match current.get(&op.name).copied() {
                    Some((p, ps)) => (p, ps, false),
                    None => {
                        if let Some(&(p, ps)) =
                            last_writer.get(op.name.as_str()).filter(|_| self.loop_carried)
                        {
                            // Value is live across the backedge.
                            (p, ps, true)
                        } else if self.inputs.is_none() {
                            let (p, ps) =
                                declare_input(source, &op.name, class, &mut inputs, &mut current);
                            (p, ps, false)
                        } else {
                            return Err(DfgError::UndefinedRead {
                                name: op.name.clone(),
                                index: i,
                            });
                        }
                    }
                };
                edges.push(Edge {
                    producer,
                    producer_slot: Some(producer_slot),
                    consumer: node,
                    consumer_slot: Some(slot),
                    kind,
                    cross,
                });
            }

            // Memory ordering: one edge per conflicting predecessor. This is
            // deliberately denser than a nearest-conflict chain; may-alias is
            // not transitive under the base+offset policy, so a chain alone
            // would under-constrain stores hopping over unrelated loads.
            if inst.touches_memory() {
                for (p, p_mem, p_addr) in &mem_insts {
                    let both_loads = *p_mem == MemEffect::Load && inst.mem == MemEffect::Load;
                    if both_loads && self.allow_load_reordering {
                        continue;
                    }
                    if !both_loads
                        && !self.alias_policy.may_alias(p_addr.as_ref(), inst.addr.as_ref())
                    {
                        continue;
                    }
                    edges.push(Edge {
                        producer: *p,
                        producer_slot: None,
                        consumer: node,
                        consumer_slot: None,
                        kind: EdgeKind::Memory,
                        cross: false,
                    });
                }
                mem_insts.push((node, inst.mem, inst.addr.clone()));
            }

            // Writes last: this node becomes the current producer.
            for (slot, op) in inst.writes() {
                current.insert(op.name.clone(), (node, slot));
            }

            log::trace!("slothy: dfg node {node} <- {}", inst.render());
        }

        // Loop mode: a memory instruction's next-iteration instance must
        // stay ordered after this iteration's conflicting accesses, or the
        // pipeliner could float it across the backedge past them.
        if self.loop_carried {
            for (ai, &(a, a_mem, ref a_addr)) in mem_insts.iter().enumerate() {
                for &(b, b_mem, ref b_addr) in &mem_insts[..=ai] {
                    if a == b {
                        continue;
                    }
                    let both_loads = a_mem == MemEffect::Load && b_mem == MemEffect::Load;
                    if both_loads && self.allow_load_reordering {
                        continue;
                    }
                    if !both_loads && !self.alias_policy.may_alias(a_addr.as_ref(), b_addr.as_ref())
                    {
                        continue;
                    }
                    edges.push(Edge {
                        producer: a,
                        producer_slot: None,
                        consumer: b,
                        consumer_slot: None,
                        kind: EdgeKind::Memory,
                        cross: true,
                    });
                }
            }
        }

        // Connect required outputs to the virtual sink.
        let mut outputs = Vec::new();
        let out_names: Vec<String> = match &self.outputs {
            Some(declared) => declared.clone(),
            None => {
                // Every finally-written register stays live.
                let mut names: Vec<&String> = current
                    .iter()
                    .filter(|(_, (p, _))| *p != source)
                    .map(|(name, _)| name)
                    .collect();
                names.sort();
                names.into_iter().cloned().collect()
            }
        };
        for name in out_names {
            let &(producer, producer_slot) = current
                .get(&name)
                .ok_or_else(|| DfgError::UndefinedOutput { name: name.clone() })?;
            let class = classes
                .get(&name)
                .copied()
                .unwrap_or(RegisterClass::Gpr);
            let slot = outputs.len();
            outputs.push(LiveOut {
                name: name.clone(),
                class,
                slot,
            });
            edges.push(Edge {
                producer,
                producer_slot: Some(producer_slot),
                consumer: sink,
                consumer_slot: Some(slot),
                kind: EdgeKind::Register,
                cross: false,
            });
        }

        Ok(Dfg {
            nodes,
            edges,
            source,
            sink,
            inputs,
            outputs,
            classes,
        })
    }

    /// Unify the register class of every name across all its uses.
    /// Hints seed the unification; a conflict is a fatal input error.
    fn resolve_classes(
        &self,
        insts: &[Instruction],
    ) -> Result<HashMap<String, RegisterClass>, DfgError> {
        let mut classes: HashMap<String, RegisterClass> = self
            .typing_hints
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();

        for inst in insts {
            for op in &inst.operands {
                let Some(class) = op.class else { continue };
                match classes.get(&op.name) {
                    None => {
                        classes.insert(op.name.clone(), class);
                    }
                    Some(&first) if first != class => {
                        return Err(DfgError::ClassConflict {
                            name: op.name.clone(),
                            first,
                            second: class,
                        });
                    }
                    Some(_) => {}
                }
            }
        }
        Ok(classes)
    }
}

impl Default for DfgBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Register a live-in on the virtual source and make it the current producer.
fn declare_input(
    source: NodeId,
    name: &str,
    class: RegisterClass,
    inputs: &mut Vec<LiveIn>,
    current: &mut HashMap<String, (NodeId, usize)>,
) -> (NodeId, usize) {
    let slot = inputs.len();
    inputs.push(LiveIn {
        name: name.to_string(),
        class,
        slot,
    });
    current.insert(name.to_string(), (source, slot));
    (source, slot)
}
