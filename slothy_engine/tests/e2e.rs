//! End-to-end tests: full source files with labels, macros, and register
//! aliases through the whole pipeline, self-check included.

use slothy_engine::{Config, Slothy};
use slothy_model::BacktrackSolver;
use slothy_target_armv7m::{Armv7m, CortexM55};

#[test]
fn optimize_window_preserves_surrounding_code() {
    let src = "\
        .macro acc_step d, s
        vmla \\d, \\s, gain
        .endm
        gain .req r5
prologue:
        mov r5, #3
start:
        vldrw q0, [r0]
        acc_step q0, q1
end:
        bx lr
";
    let solver = BacktrackSolver::new();
    let slothy = Slothy::new(&Armv7m, &CortexM55, &solver, Config::default());
    let out = slothy.optimize(src, Some("start"), Some("end")).unwrap();

    // vldrw has latency 2, so the dependent vmla needs one stall.
    assert_eq!(out.stalls, 1);
    assert_eq!(out.body.len(), 2);
    // Macro and alias both unfolded before classification.
    assert!(out.body[1].starts_with("        vmla q0, q1, r5"));

    // Surrounding code and labels survive.
    let full = out.full.join("\n");
    assert!(full.contains("mov r5, #3"));
    assert!(full.contains("start:"));
    assert!(full.contains("end:"));
    assert!(full.contains("bx lr"));
}

#[test]
fn two_chains_schedule_without_stalls() {
    // Two independent load-compute-store chains interleave into the load
    // shadows; everything symbolic gets renamed.
    let src = "\
ldr in0, [r0]
ldr in1, [r0, #4]
add s0, in0, in0
add s1, in1, in1
str s0, [r1]
str s1, [r1, #4]
";
    let solver = BacktrackSolver::new();
    let slothy = Slothy::new(&Armv7m, &CortexM55, &solver, Config::default());
    let out = slothy.optimize(src, None, None).unwrap();

    assert_eq!(out.stalls, 0);
    assert_eq!(out.permutation, vec![0, 1, 2, 3, 4, 5]);
    assert!(slothy_engine::is_permutation(&out.permutation, 6));
    // All four symbolic names resolved to architectural registers.
    for name in ["in0", "in1", "s0", "s1"] {
        assert!(
            out.renames.iter().any(|r| r.from == name),
            "{name} not renamed"
        );
    }
}

#[test]
fn base_offset_policy_lets_stores_reorder() {
    // The two stores hit the same base at distinct offsets, so the
    // independent one may move up into the load shadow.
    let src = "\
ldr in0, [r0]
str in0, [r1]
str r2, [r1, #4]
";
    let mut config = Config::default();
    config.constraints.alias_policy = "base_offset".to_string();
    let solver = BacktrackSolver::new();
    let slothy = Slothy::new(&Armv7m, &CortexM55, &solver, config);
    let out = slothy.optimize(src, None, None).unwrap();

    assert_eq!(out.stalls, 0);
    assert_eq!(out.permutation, vec![0, 2, 1]);
}

#[test]
fn conservative_policy_keeps_stores_in_order() {
    let src = "\
ldr in0, [r0]
str in0, [r1]
str r2, [r1, #4]
";
    let solver = BacktrackSolver::new();
    let slothy = Slothy::new(&Armv7m, &CortexM55, &solver, Config::default());
    let out = slothy.optimize(src, None, None).unwrap();

    // All store pairs alias: order is fixed and the load latency shows up
    // as a stall instead.
    assert_eq!(out.stalls, 1);
    assert_eq!(out.permutation, vec![0, 1, 2]);
}

#[test]
fn pipelined_loop_emits_preamble_and_postamble() {
    // One load-use chain per iteration with nothing to fill the load
    // shadow in-iteration: pipelining lifts the next iteration's load into
    // the gap once the accumulator chain allows it.
    let src = "\
start:
        vldrw vec, [r0], #16
        vldrw mask, [r2], #16
        vmla acc, vec, r3
        vmla acc, mask, r3
        subs r14, r14, #1
        cbnz r14, start
";
    let mut config = Config::default();
    config.sw_pipelining.enabled = true;
    config.constraints.alias_policy = "none".to_string();
    let solver = BacktrackSolver::new();
    let slothy = Slothy::new(&Armv7m, &CortexM55, &solver, config);
    let out = slothy.optimize_loop(src, "start").unwrap();

    // Without overlap the accumulator chain forces a stall; lifting exactly
    // one load into the previous iteration removes it.
    assert_eq!(out.stalls, 0);
    let kernel = out.kernel.as_ref().unwrap();
    assert_eq!(kernel.kernel.len(), 4);
    assert_eq!(kernel.early_count, 1);
    assert!(slothy_engine::is_permutation(&out.permutation, 4));
    // The kernel consumes the pointer and scalar registers from outside.
    for reg in ["r0", "r2", "r3"] {
        assert!(
            kernel.inputs.iter().any(|i| i == reg),
            "{reg} missing from kernel inputs: {:?}",
            kernel.inputs
        );
    }
    // Preamble and postamble sizes agree with the early count.
    assert_eq!(kernel.preamble.len(), 1);
    assert_eq!(kernel.postamble.len(), 3);
    let full = out.full.join("\n");
    assert!(full.contains("sub r14, r14, #1"));
}
