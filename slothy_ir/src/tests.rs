//! Unit tests for DFG construction and the self-check.

use crate::dfg::{AliasPolicy, DfgBuilder, DfgError, EdgeKind, NodeId};
use crate::inst::{AddrExpr, Instruction, MemEffect, Operand};
use crate::reg::RegisterClass;
use crate::selfcheck::check_schedule;

fn rrr(mnemonic: &str, d: &str, a: &str, b: &str) -> Instruction {
    Instruction {
        mnemonic: mnemonic.to_string(),
        template: format!("{mnemonic} {{0}}, {{1}}, {{2}}"),
        operands: vec![
            Operand::write(d, RegisterClass::Gpr),
            Operand::read(a, RegisterClass::Gpr),
            Operand::read(b, RegisterClass::Gpr),
        ],
        immediate: None,
        mem: MemEffect::None,
        addr: None,
        inplace: None,
    }
}

fn load(dst: &str, base: &str, offset: i64) -> Instruction {
    Instruction {
        mnemonic: "ldr".to_string(),
        template: format!("ldr {{0}}, [{{1}}, #{offset}]"),
        operands: vec![
            Operand::write(dst, RegisterClass::Gpr),
            Operand::read(base, RegisterClass::Gpr).addressing(),
        ],
        immediate: None,
        mem: MemEffect::Load,
        addr: Some(AddrExpr {
            base: base.to_string(),
            offset,
        }),
        inplace: None,
    }
}

fn store(src: &str, base: &str, offset: i64) -> Instruction {
    Instruction {
        mnemonic: "str".to_string(),
        template: format!("str {{0}}, [{{1}}, #{offset}]"),
        operands: vec![
            Operand::read(src, RegisterClass::Gpr),
            Operand::read(base, RegisterClass::Gpr).addressing(),
        ],
        immediate: None,
        mem: MemEffect::Store,
        addr: Some(AddrExpr {
            base: base.to_string(),
            offset,
        }),
        inplace: None,
    }
}

#[test]
fn chain_has_one_producer_per_read() {
    // a = x + y; b = a + a
    let insts = vec![rrr("add", "a", "x", "y"), rrr("add", "b", "a", "a")];
    let dfg = DfgBuilder::new().build(&insts).unwrap();

    // Second instruction reads `a` twice, both from node 1.
    let n2 = dfg.inst_node(1);
    for slot in [1, 2] {
        let edge = dfg.producer_for_slot(n2, slot).expect("producer edge");
        assert_eq!(edge.producer, NodeId(1));
        assert_eq!(edge.producer_slot, Some(0));
        assert_eq!(edge.kind, EdgeKind::Register);
    }
}

#[test]
fn reads_without_producer_become_inputs() {
    let insts = vec![rrr("add", "a", "x", "y")];
    let dfg = DfgBuilder::new().build(&insts).unwrap();
    let names: Vec<&str> = dfg.inputs.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, ["x", "y"]);
    // Both reads are fed by the virtual source.
    for slot in [1, 2] {
        let edge = dfg.producer_for_slot(dfg.inst_node(0), slot).unwrap();
        assert_eq!(edge.producer, dfg.source);
    }
}

#[test]
fn declared_inputs_make_unknown_reads_fatal() {
    let insts = vec![rrr("add", "a", "x", "y")];
    let mut builder = DfgBuilder::new();
    builder.inputs = Some(vec!["x".to_string()]);
    let err = builder.build(&insts).unwrap_err();
    match err {
        DfgError::UndefinedRead { name, index } => {
            assert_eq!(name, "y");
            assert_eq!(index, 0);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn class_conflict_is_fatal_and_names_the_symbol() {
    let mut v = rrr("vadd", "q", "foo", "bar");
    v.operands[1].class = Some(RegisterClass::Vector);
    v.operands[0].class = Some(RegisterClass::Vector);
    let insts = vec![rrr("add", "a", "foo", "foo"), v];
    let err = DfgBuilder::new().build(&insts).unwrap_err();
    match err {
        DfgError::ClassConflict { name, .. } => assert_eq!(name, "foo"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn conservative_alias_orders_all_load_store_pairs() {
    let insts = vec![
        load("a", "p", 0),
        store("a", "q", 0),
        load("b", "p", 4),
    ];
    let dfg = DfgBuilder::new().build(&insts).unwrap();
    let mem_edges: Vec<(NodeId, NodeId)> = dfg
        .edges
        .iter()
        .filter(|e| e.kind == EdgeKind::Memory)
        .map(|e| (e.producer, e.consumer))
        .collect();
    // load->store and store->load, but not load->load.
    assert!(mem_edges.contains(&(NodeId(1), NodeId(2))));
    assert!(mem_edges.contains(&(NodeId(2), NodeId(3))));
    assert!(!mem_edges.contains(&(NodeId(1), NodeId(3))));
}

#[test]
fn base_offset_policy_proves_non_alias() {
    let insts = vec![store("a", "p", 0), store("b", "p", 4)];
    let mut builder = DfgBuilder::new();
    builder.alias_policy = AliasPolicy::BaseOffset;
    let dfg = builder.build(&insts).unwrap();
    assert!(dfg.edges.iter().all(|e| e.kind != EdgeKind::Memory));

    // Same offset still aliases.
    let insts = vec![store("a", "p", 0), store("b", "p", 0)];
    let dfg = builder.build(&insts).unwrap();
    assert!(dfg.edges.iter().any(|e| e.kind == EdgeKind::Memory));
}

#[test]
fn load_reordering_can_be_disabled() {
    let insts = vec![load("a", "p", 0), load("b", "q", 0)];
    let mut builder = DfgBuilder::new();
    builder.allow_load_reordering = false;
    let dfg = builder.build(&insts).unwrap();
    assert!(dfg.edges.iter().any(|e| e.kind == EdgeKind::Memory));
}

#[test]
fn loop_carried_read_resolves_to_last_writer() {
    // `acc` is read before it is written: cross-iteration dependency.
    let insts = vec![rrr("add", "t", "acc", "x"), rrr("add", "acc", "t", "y")];
    let mut builder = DfgBuilder::new();
    builder.loop_carried = true;
    let dfg = builder.build(&insts).unwrap();
    let edge = dfg.producer_for_slot(dfg.inst_node(0), 1).unwrap();
    assert!(edge.cross);
    assert_eq!(edge.producer, dfg.inst_node(1));
}

#[test]
fn selfcheck_accepts_valid_renamed_permutation() {
    // in:  a = x+y ; b = a+a ; c = x+x
    let input = vec![
        rrr("add", "a", "x", "y"),
        rrr("add", "b", "a", "a"),
        rrr("add", "c", "x", "x"),
    ];
    // out: r2 = r0+r0 ; r3 = r0+r1 ; r4 = r3+r3   (c hoisted, renamed)
    let output = vec![
        rrr("add", "r2", "r0", "r0"),
        rrr("add", "r3", "r0", "r1"),
        rrr("add", "r4", "r3", "r3"),
    ];
    let perm = vec![1, 2, 0];
    let report = check_schedule(&input, &output, &perm, &DfgBuilder::new());
    assert!(report.is_ok(), "{report}");
}

#[test]
fn selfcheck_rejects_broken_dependency() {
    let input = vec![rrr("add", "a", "x", "y"), rrr("add", "b", "a", "a")];
    // Output swaps the two instructions: consumer now runs first.
    let output = vec![rrr("add", "r3", "r2", "r2"), rrr("add", "r2", "r0", "r1")];
    let perm = vec![1, 0];
    let report = check_schedule(&input, &output, &perm, &DfgBuilder::new());
    assert!(!report.is_ok());
}

#[test]
fn selfcheck_rejects_inconsistent_renaming() {
    let input = vec![rrr("add", "a", "x", "y"), rrr("add", "b", "a", "a")];
    // Producer writes r2 but the consumer reads r5.
    let output = vec![rrr("add", "r2", "r0", "r1"), rrr("add", "r3", "r5", "r5")];
    let perm = vec![0, 1];
    let report = check_schedule(&input, &output, &perm, &DfgBuilder::new());
    assert!(!report.is_ok());
}

#[test]
fn selfcheck_rejects_dropped_instruction() {
    let input = vec![rrr("add", "a", "x", "y"), rrr("sub", "b", "x", "y")];
    let output = vec![rrr("add", "r2", "r0", "r1"), rrr("add", "r3", "r0", "r1")];
    let report = check_schedule(&input, &output, &[0, 1], &DfgBuilder::new());
    assert!(!report.is_ok());
}
