//! The stalls search driver.
//!
//! Runs a sequence of solver calls with growing stalls budgets (doubling
//! schedule), then tightens linearly downward from the first success. Each
//! attempt builds a fresh model; the only state carried across attempts is
//! the best schedule so far.

use std::time::{Duration, Instant};

use slothy_ir::dfg::Dfg;
use slothy_model::{Outcome, Solver};
use slothy_target::arch::Arch;
use slothy_target::uarch::Uarch;

use crate::config::Config;
use crate::decode::{decode, Schedule};
use crate::encode::encode;
use crate::SlothyError;

/// Result of a completed stalls search.
#[derive(Debug)]
pub struct SearchResult {
    pub schedule: Schedule,
    pub stalls: u32,
    /// `(budget, success)` per attempt, in order.
    pub attempts: Vec<(u32, bool)>,
}

enum Attempt {
    Solved(Box<Schedule>),
    Unsat,
    Timeout,
}

struct Pass<'a> {
    dfg: &'a Dfg,
    arch: &'a dyn Arch,
    uarch: &'a dyn Uarch,
    config: &'a Config,
    solver: &'a dyn Solver,
    pipelining: bool,
    blocked_regs: &'a [String],
    counter: usize,
}

impl Pass<'_> {
    /// One solver call at a fixed budget.
    fn attempt(&mut self, stalls: u32) -> Attempt {
        self.counter += 1;
        let enc = encode(
            self.dfg,
            self.arch,
            self.uarch,
            self.config,
            stalls,
            self.pipelining,
            self.blocked_regs,
        );
        log::info!(
            "slothy: pass {}: {} instructions, stalls budget {stalls}",
            self.counter,
            enc.codesize
        );

        if let Some(dir) = &self.config.solver.dump_dir {
            // Unique per-pass path so successive passes never collide.
            let path = format!("{dir}/model_pass{:04}_stalls{stalls}.txt", self.counter);
            if let Err(e) = std::fs::write(&path, enc.model.to_string()) {
                log::warn!("slothy: failed to dump model to {path}: {e}");
            }
        }

        let deadline = self
            .config
            .solver
            .timeout_ms
            .map(|ms| Instant::now() + Duration::from_millis(ms));
        match self.solver.solve(&enc.model, deadline) {
            Outcome::Sat(assignment) => {
                log::info!("slothy: pass {}: sat", self.counter);
                Attempt::Solved(Box::new(decode(self.dfg, &enc, &assignment)))
            }
            Outcome::Unsat => {
                log::info!("slothy: pass {}: unsat", self.counter);
                Attempt::Unsat
            }
            Outcome::Unknown => {
                log::info!("slothy: pass {}: timeout, treating as infeasible", self.counter);
                Attempt::Timeout
            }
        }
    }
}

/// Drive the stalls search over the DFG. `pipelining` selects the loop-mode
/// encoding.
pub fn optimize_dfg(
    dfg: &Dfg,
    arch: &dyn Arch,
    uarch: &dyn Uarch,
    config: &Config,
    solver: &dyn Solver,
    pipelining: bool,
    blocked_regs: &[String],
) -> Result<SearchResult, SlothyError> {
    let cap = config.constraints.stalls.cap;
    let mut pass = Pass {
        dfg,
        arch,
        uarch,
        config,
        solver,
        pipelining,
        blocked_regs,
        counter: 0,
    };

    let mut attempts: Vec<(u32, bool)> = Vec::new();
    let mut saw_unsat = false;
    let mut budget = config.constraints.stalls.initial.min(cap);

    let (mut best, mut best_budget) = loop {
        match pass.attempt(budget) {
            Attempt::Solved(schedule) => {
                attempts.push((budget, true));
                break (*schedule, budget);
            }
            Attempt::Unsat => {
                attempts.push((budget, false));
                saw_unsat = true;
            }
            Attempt::Timeout => attempts.push((budget, false)),
        }
        if budget == cap {
            return Err(if saw_unsat {
                SlothyError::Infeasible { cap }
            } else {
                SlothyError::SolverFailure(
                    "solver timed out on every stalls budget".to_string(),
                )
            });
        }
        budget = if budget == 0 { 1 } else { budget.saturating_mul(2) }.min(cap);
    };

    // Tightening descent: accept the lowest budget that still succeeds.
    let floor = attempts
        .iter()
        .filter(|(_, ok)| !ok)
        .map(|&(b, _)| b + 1)
        .max()
        .unwrap_or(0);
    let mut t = best_budget;
    while t > floor {
        t -= 1;
        match pass.attempt(t) {
            Attempt::Solved(schedule) => {
                attempts.push((t, true));
                best = *schedule;
                best_budget = t;
            }
            _ => {
                attempts.push((t, false));
                break;
            }
        }
    }

    log::info!(
        "slothy: search done: {best_budget} stalls after {} attempts",
        attempts.len()
    );
    Ok(SearchResult {
        schedule: best,
        stalls: best_budget,
        attempts,
    })
}
