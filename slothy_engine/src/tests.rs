//! Engine tests: straight-line scheduling, renaming, stalls search, and
//! loop mode, on the Armv7-M target.

use slothy_model::BacktrackSolver;
use slothy_target::uarch::TrivialUarch;
use slothy_target_armv7m::{Armv7m, CortexM55};

use crate::config::Config;
use crate::permutation::{compose, identity, is_permutation, pad};
use crate::{Slothy, SlothyError};

fn optimize(source: &str, config: Config) -> Result<crate::OptimizeOutput, SlothyError> {
    let solver = BacktrackSolver::new();
    Slothy::new(&Armv7m, &CortexM55, &solver, config).optimize(source, None, None)
}

fn optimize_loop(
    source: &str,
    label: &str,
    config: Config,
) -> Result<crate::OptimizeOutput, SlothyError> {
    let solver = BacktrackSolver::new();
    Slothy::new(&Armv7m, &CortexM55, &solver, config).optimize_loop(source, label)
}

#[test]
fn identity_under_trivial_uarch() {
    // Zero latency and unbounded width: budget 0 suffices and the input
    // comes back unchanged.
    let solver = BacktrackSolver::new();
    let slothy = Slothy::new(&Armv7m, &TrivialUarch, &solver, Config::default());
    let out = slothy
        .optimize("add r1, r0, r0\nadd r2, r1, r0\n", None, None)
        .unwrap();
    assert_eq!(out.stalls, 0);
    assert_eq!(out.permutation, vec![0, 1]);
    assert!(out.renames.is_empty());
    assert!(out.body[0].starts_with("add r1, r0, r0"));
}

#[test]
fn empty_body_is_a_budget_zero_success() {
    let out = optimize("", Config::default()).unwrap();
    assert_eq!(out.stalls, 0);
    assert!(out.body.is_empty());
    assert!(out.permutation.is_empty());
}

#[test]
fn single_instruction_round_trips() {
    let out = optimize("add r1, r0, r0\n", Config::default()).unwrap();
    assert_eq!(out.stalls, 0);
    assert_eq!(out.permutation, vec![0]);
    assert!(out.renames.is_empty());
}

#[test]
fn latency_gap_requires_stalls() {
    // Load latency 2, single issue: the dependent add needs one stall.
    let out = optimize("ldr r1, [r0]\nadd r2, r1, r1\n", Config::default()).unwrap();
    assert_eq!(out.stalls, 1);
    assert_eq!(out.attempts, vec![(0, false), (1, true)]);
}

#[test]
fn independent_instruction_fills_the_stall() {
    let out = optimize(
        "ldr r1, [r0]\nadd r2, r1, r1\nadd r3, r0, r0\n",
        Config::default(),
    )
    .unwrap();
    assert_eq!(out.stalls, 0);
    // The free add moves into the load shadow.
    assert_eq!(out.permutation, vec![0, 2, 1]);
}

#[test]
fn symbolic_registers_are_renamed_consistently() {
    let out = optimize("mov tmp, #1\nadd r2, tmp, tmp\n", Config::default()).unwrap();
    assert_eq!(out.stalls, 0);
    // tmp appears three times and lands on one register.
    assert_eq!(out.renames.len(), 3);
    assert!(out.renames.iter().all(|r| r.from == "tmp" && r.to == "r0"));
    assert!(out.body[0].starts_with("mov r0, #1"));
}

#[test]
fn ambiguous_register_class_is_fatal() {
    let err = optimize(
        "add r0, foo, r1\nvadd q0, q1, foo\n",
        Config::default(),
    )
    .unwrap_err();
    assert_eq!(err.exit_code(), 2);
    assert!(err.to_string().contains("foo"), "{err}");
}

#[test]
fn unknown_mnemonic_reports_the_line() {
    let err = optimize("add r1, r0, r0\nfrobnicate r2\n", Config::default()).unwrap_err();
    assert_eq!(err.exit_code(), 2);
    assert!(err.to_string().contains("line 2"), "{err}");
}

#[test]
fn vector_kernel_with_typing_hint() {
    // vldrw (2) -> vmla (2) -> vmla (2) -> vstrw: three stalls under single
    // issue; `const` is renamed to the first free GPR.
    let mut config = Config::default();
    config
        .typing_hints
        .insert("const".to_string(), "gpr".to_string());
    let out = optimize(
        "vldrw q0, [r0]\nvmla q0, q1, const\nvmla q0, q1, const\nvstrw q0, [r1]\n",
        config,
    )
    .unwrap();
    assert_eq!(out.stalls, 3);
    assert_eq!(out.permutation, vec![0, 1, 2, 3]);
    assert_eq!(out.input_renames.get("const").map(String::as_str), Some("r2"));
    // Doubling schedule overshoots to 4, tightening lands on 3.
    assert_eq!(
        out.attempts,
        vec![(0, false), (1, false), (2, false), (4, true), (3, true)]
    );
}

#[test]
fn infeasible_under_stalls_cap() {
    let mut config = Config::default();
    config.constraints.stalls.cap = 0;
    let err = optimize("vldrw q0, [r0]\nvmla q0, q1, r2\n", config).unwrap_err();
    assert!(matches!(err, SlothyError::Infeasible { cap: 0 }));
    assert_eq!(err.exit_code(), 1);
}

#[test]
fn invalid_unroll_is_a_configuration_error() {
    let mut config = Config::default();
    config.sw_pipelining.unroll = 3;
    let err = optimize("add r1, r0, r0\n", config).unwrap_err();
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn config_deserializes_from_json() {
    let config: Config = serde_json::from_str(
        r#"{
            "sw_pipelining": { "enabled": true, "unroll": 2 },
            "constraints": { "stalls": { "cap": 16 }, "alias_policy": "none" },
            "typing_hints": { "const": "gpr" },
            "selfcheck": true
        }"#,
    )
    .unwrap();
    assert!(config.sw_pipelining.enabled);
    assert_eq!(config.sw_pipelining.unroll, 2);
    assert_eq!(config.constraints.stalls.cap, 16);
    config.validate().unwrap();
}

#[test]
fn loop_without_pipelining_behaves_like_straight_line() {
    let src = "\
start:
        vldrw q0, [r0], #16
        vstrw q0, [r1], #16
        subs r14, r14, #1
        cbnz r14, start
";
    let out = optimize_loop(src, "start", Config::default()).unwrap();
    assert_eq!(out.stalls, 1);
    let kernel = out.kernel.as_ref().unwrap();
    assert_eq!(kernel.kernel.len(), 2);
    assert_eq!(kernel.early_count, 0);
    assert!(kernel.preamble.is_empty());
    assert!(kernel.postamble.is_empty());
    assert!(out.full.iter().any(|l| l.trim() == "subs r14, r14, #1"));
    assert!(out.full.iter().any(|l| l.trim() == "cbnz r14, start"));
}

#[test]
fn unrolled_pipelined_loop_reaches_zero_stalls() {
    let src = "\
start:
        vldrw vec, [r0], #16
        vstrw vec, [r1], #16
        subs r14, r14, #1
        cbnz r14, start
";
    let mut config = Config::default();
    config.sw_pipelining.enabled = true;
    config.sw_pipelining.unroll = 2;
    config.constraints.alias_policy = "none".to_string();
    let out = optimize_loop(src, "start", config).unwrap();
    assert_eq!(out.stalls, 0);
    let kernel = out.kernel.as_ref().unwrap();
    // Kernel length is twice the original body.
    assert_eq!(kernel.kernel.len(), 4);
    assert!(is_permutation(&out.permutation, 4));
    // The unrolled counter is shifted before the loop.
    assert!(out
        .full
        .iter()
        .any(|l| l.trim() == "lsr r14, r14, #1"));
}

#[test]
fn inplace_constraint_forces_shared_register() {
    use slothy_ir::dfg::DfgBuilder;
    use slothy_ir::inst::{Instruction, MemEffect, Operand};
    use slothy_ir::reg::RegisterClass;
    use slothy_model::{Outcome, Solver};

    // A two-operand form whose destination must equal its first source,
    // with distinct symbolic names on the two slots.
    let inst = Instruction {
        mnemonic: "mul2".to_string(),
        template: "mul2 {0}, {1}".to_string(),
        operands: vec![
            Operand::write("dst", RegisterClass::Gpr),
            Operand::read("src", RegisterClass::Gpr),
        ],
        immediate: None,
        mem: MemEffect::None,
        addr: None,
        inplace: Some((0, 1)),
    };
    let dfg = DfgBuilder::new().build(&[inst]).unwrap();
    let enc = crate::encode::encode(
        &dfg,
        &Armv7m,
        &CortexM55,
        &Config::default(),
        0,
        false,
        &[],
    );
    let Outcome::Sat(assignment) = BacktrackSolver::new().solve(&enc.model, None) else {
        panic!("expected sat");
    };
    let node = dfg.inst_node(0);
    let dst = assignment.value(enc.slot_vars[&(node, 0)]);
    let src = assignment.value(enc.slot_vars[&(node, 1)]);
    assert_eq!(dst, src);
}

#[test]
fn permutation_helpers() {
    assert!(is_permutation(&[2, 0, 1], 3));
    assert!(!is_permutation(&[0, 0, 1], 3));
    assert_eq!(compose(&[1, 2, 0], &identity(3)), vec![1, 2, 0]);
    assert_eq!(pad(&[1, 0], 1, 1), vec![0, 2, 1, 3]);
}
