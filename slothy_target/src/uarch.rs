//! The microarchitecture model: latencies, issue width, functional units.

use slothy_ir::dfg::EdgeKind;
use slothy_ir::inst::Instruction;

/// A functional unit id, scoped to one microarchitecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Unit(pub u8);

/// A microarchitecture model.
pub trait Uarch {
    fn name(&self) -> &'static str;

    /// Instructions issued per cycle. `None` means unbounded.
    fn issue_width(&self) -> Option<usize>;

    /// Result latency of an instruction in cycles.
    fn latency(&self, inst: &Instruction) -> u32;

    /// Alternative unit assignments for an instruction. Each inner set is
    /// consumed together for one cycle; the scheduler picks one alternative.
    /// An empty list means the instruction occupies no modeled unit.
    fn units(&self, inst: &Instruction) -> Vec<Vec<Unit>>;

    /// How many instructions may use `unit` in the same cycle.
    fn unit_capacity(&self, _unit: Unit) -> usize {
        1
    }

    fn unit_name(&self, unit: Unit) -> &'static str;

    /// Pairwise latency override for a producer/consumer pair along an edge
    /// of the given kind (forwarding paths, writeback exceptions).
    fn forwarding(
        &self,
        _producer: &Instruction,
        _consumer: &Instruction,
        _kind: EdgeKind,
    ) -> Option<u32> {
        None
    }

    /// Effective latency along an edge: the forwarding override when one
    /// applies, the plain result latency otherwise.
    fn edge_latency(&self, producer: &Instruction, consumer: &Instruction, kind: EdgeKind) -> u32 {
        self.forwarding(producer, consumer, kind)
            .unwrap_or_else(|| self.latency(producer))
    }
}

/// The identity microarchitecture: zero latency, unbounded issue width, no
/// units. Under this model a zero-stall schedule always exists and the
/// input may be emitted unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrivialUarch;

impl Uarch for TrivialUarch {
    fn name(&self) -> &'static str {
        "trivial"
    }

    fn issue_width(&self) -> Option<usize> {
        None
    }

    fn latency(&self, _inst: &Instruction) -> u32 {
        0
    }

    fn units(&self, _inst: &Instruction) -> Vec<Vec<Unit>> {
        vec![]
    }

    fn unit_name(&self, _unit: Unit) -> &'static str {
        "none"
    }
}
