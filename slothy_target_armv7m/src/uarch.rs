//! An in-order MVE-capable pipeline model (Cortex-M55-like).
//!
//! Single issue. Loads and multiply-accumulates take two cycles, simple ALU
//! ops one. Address writeback of post-increment loads forwards a cycle
//! earlier than the load result.

use slothy_ir::dfg::EdgeKind;
use slothy_ir::inst::Instruction;
use slothy_target::uarch::{Uarch, Unit};

pub const ALU: Unit = Unit(0);
pub const MAC: Unit = Unit(1);
pub const LSU: Unit = Unit(2);

#[derive(Debug, Clone, Copy, Default)]
pub struct CortexM55;

impl CortexM55 {
    fn base(mnemonic: &str) -> &str {
        mnemonic.split('.').next().unwrap_or(mnemonic)
    }
}

impl Uarch for CortexM55 {
    fn name(&self) -> &'static str {
        "cortex-m55"
    }

    fn issue_width(&self) -> Option<usize> {
        Some(1)
    }

    fn latency(&self, inst: &Instruction) -> u32 {
        match Self::base(&inst.mnemonic) {
            "ldr" | "vldrw" => 2,
            "mul" | "mla" | "vmla" | "vmul" => 2,
            _ => 1,
        }
    }

    fn units(&self, inst: &Instruction) -> Vec<Vec<Unit>> {
        match Self::base(&inst.mnemonic) {
            "ldr" | "str" | "vldrw" | "vstrw" => vec![vec![LSU]],
            "mul" | "mla" | "vmla" | "vmul" => vec![vec![MAC]],
            _ => vec![vec![ALU]],
        }
    }

    fn unit_name(&self, unit: Unit) -> &'static str {
        match unit {
            Unit(0) => "alu",
            Unit(1) => "mac",
            Unit(2) => "lsu",
            _ => "?",
        }
    }

    fn forwarding(
        &self,
        producer: &Instruction,
        _consumer: &Instruction,
        kind: EdgeKind,
    ) -> Option<u32> {
        // Post-increment writeback is ready for the next address generation
        // one cycle after issue, well before the loaded data.
        if kind == EdgeKind::Address && producer.is_load() {
            return Some(1);
        }
        None
    }
}
