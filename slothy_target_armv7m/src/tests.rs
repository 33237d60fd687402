//! Classification and model tests for the Armv7-M target.

use slothy_ir::dfg::EdgeKind;
use slothy_ir::inst::{MemEffect, OperandRole};
use slothy_ir::reg::RegisterClass;
use slothy_target::arch::Arch;
use slothy_target::uarch::Uarch;

use crate::{Armv7m, CortexM55};

#[test]
fn classify_three_operand_add() {
    let inst = Armv7m.classify("add r0, r1, r2").unwrap();
    assert_eq!(inst.mnemonic, "add");
    assert_eq!(inst.operands.len(), 3);
    assert_eq!(inst.operands[0].role, OperandRole::Write);
    assert_eq!(inst.operands[0].name, "r0");
    assert!(inst.operands[1].role.is_read());
    assert_eq!(inst.render(), "add r0, r1, r2");
}

#[test]
fn classify_symbolic_operands() {
    let inst = Armv7m.classify("add acc, acc, tmp").unwrap();
    assert_eq!(inst.operands[0].name, "acc");
    assert_eq!(inst.operands[0].class, Some(RegisterClass::Gpr));
    assert_eq!(inst.operands[2].name, "tmp");
}

#[test]
fn classify_immediate_form() {
    let inst = Armv7m.classify("sub r3, r3, #16").unwrap();
    assert_eq!(inst.immediate.as_deref(), Some("16"));
    // Immediate operands pass through rendering unchanged.
    assert_eq!(inst.render(), "sub r3, r3, #16");
}

#[test]
fn classify_load_with_offset() {
    let inst = Armv7m.classify("ldr r1, [r0, #8]").unwrap();
    assert_eq!(inst.mem, MemEffect::Load);
    let addr = inst.addr.as_ref().unwrap();
    assert_eq!(addr.base, "r0");
    assert_eq!(addr.offset, 8);
    // Base register is a plain read tagged as addressing.
    let (_, base) = inst.reads().find(|(_, op)| op.name == "r0").unwrap();
    assert!(base.address);
}

#[test]
fn classify_post_increment_writes_back_base() {
    let inst = Armv7m.classify("ldr r1, [r0], #4").unwrap();
    assert_eq!(inst.mem, MemEffect::Load);
    // Post-increment accesses the pre-increment address.
    assert_eq!(inst.addr.as_ref().unwrap().offset, 0);
    let base = inst
        .operands
        .iter()
        .find(|op| op.name == "r0")
        .unwrap();
    assert_eq!(base.role, OperandRole::ReadWrite);
}

#[test]
fn classify_vector_multiply_accumulate() {
    let inst = Armv7m.classify("vmla q0, q1, const").unwrap();
    let acc = &inst.operands[0];
    assert_eq!(acc.name, "q0");
    assert_eq!(acc.role, OperandRole::ReadWrite);
    assert_eq!(acc.class, Some(RegisterClass::Vector));
    // The scalar multiplier slot takes a GPR, symbolic here.
    assert_eq!(inst.operands[2].class, Some(RegisterClass::Gpr));
}

#[test]
fn classify_flag_setter_gets_flags_slot() {
    let inst = Armv7m.classify("subs r0, r0, #1").unwrap();
    let flags = inst.operands.last().unwrap();
    assert_eq!(flags.name, "flags");
    assert_eq!(flags.class, Some(RegisterClass::Flags));
    assert_eq!(flags.role, OperandRole::Write);
    // Flags are synthetic: they do not appear in the rendered text.
    assert_eq!(inst.render(), "subs r0, r0, #1");
}

#[test]
fn classify_width_suffix_matches_base_mnemonic() {
    let inst = Armv7m.classify("vldrw.u32 q2, [r0]").unwrap();
    assert_eq!(inst.mnemonic, "vldrw.u32");
    assert_eq!(inst.mem, MemEffect::Load);
    assert_eq!(inst.render(), "vldrw.u32 q2, [r0]");
}

#[test]
fn classify_rejects_unknown() {
    assert!(Armv7m.classify("frobnicate r0, r1").is_err());
}

#[test]
fn register_tables_and_reservations() {
    assert_eq!(Armv7m.register_class("r12"), Some(RegisterClass::Gpr));
    assert_eq!(Armv7m.register_class("q7"), Some(RegisterClass::Vector));
    assert_eq!(Armv7m.register_class("const"), None);
    assert!(Armv7m.reserved().contains(&"r13"));
    assert!(Armv7m.registers(RegisterClass::Vector).contains(&"q0"));
}

#[test]
fn uarch_latencies_match_the_pipeline() {
    let vldrw = Armv7m.classify("vldrw q0, [r0]").unwrap();
    let vmla = Armv7m.classify("vmla q0, q1, r2").unwrap();
    let vstrw = Armv7m.classify("vstrw q0, [r1]").unwrap();
    assert_eq!(CortexM55.latency(&vldrw), 2);
    assert_eq!(CortexM55.latency(&vmla), 2);
    assert_eq!(CortexM55.latency(&vstrw), 1);
    assert_eq!(CortexM55.issue_width(), Some(1));
}

#[test]
fn uarch_forwards_address_writeback() {
    let producer = Armv7m.classify("ldr r1, [r0], #4").unwrap();
    let consumer = Armv7m.classify("ldr r2, [r0], #4").unwrap();
    assert_eq!(
        CortexM55.edge_latency(&producer, &consumer, EdgeKind::Address),
        1
    );
    assert_eq!(
        CortexM55.edge_latency(&producer, &consumer, EdgeKind::Register),
        2
    );
}
