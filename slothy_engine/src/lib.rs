//! slothy_engine: the optimization engine.
//!
//! Ties the pieces together: source extraction, classification, DFG
//! construction, the stalls search over the constraint model, solution
//! decoding, the software-pipelining loop transformation, and the
//! independent self-check of every result.

use thiserror::Error;

use slothy_asm::region::{self, Region};
use slothy_asm::{alias::Aliases, macros::AsmMacro, source_lines, SourceLine};
use slothy_ir::dfg::DfgBuilder;
use slothy_ir::inst::Instruction;
use slothy_ir::selfcheck;
use slothy_model::Solver;
use slothy_target::arch::Arch;
use slothy_target::uarch::Uarch;

pub mod config;
pub mod decode;
pub mod encode;
pub mod pipeline;
pub mod permutation;
pub mod result;
pub mod search;

#[cfg(test)]
mod tests;

pub use config::{Config, ConfigError};
pub use result::{KernelInfo, OptimizeOutput};

/// Engine errors, mapped onto the front-end exit codes.
#[derive(Debug, Error)]
pub enum SlothyError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Asm(#[from] slothy_asm::AsmError),
    #[error("line {line}: {message}")]
    Input { line: usize, message: String },
    #[error("{0}")]
    Dfg(#[from] slothy_ir::dfg::DfgError),
    #[error("no schedule within the stalls cap of {cap}")]
    Infeasible { cap: u32 },
    #[error("solver failure: {0}")]
    SolverFailure(String),
    #[error("{0}")]
    SelfCheck(String),
}

impl SlothyError {
    /// Front-end exit code: 1 infeasible, 2 malformed input, 3 solver
    /// failure, 4 self-check failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            SlothyError::Infeasible { .. } => 1,
            SlothyError::Config(_)
            | SlothyError::Asm(_)
            | SlothyError::Input { .. }
            | SlothyError::Dfg(_) => 2,
            SlothyError::SolverFailure(_) => 3,
            SlothyError::SelfCheck(_) => 4,
        }
    }
}

/// One optimizer instance: an architecture, a microarchitecture, a solver,
/// and a configuration. No state survives an optimize call.
pub struct Slothy<'a> {
    arch: &'a dyn Arch,
    uarch: &'a dyn Uarch,
    solver: &'a dyn Solver,
    pub config: Config,
}

impl<'a> Slothy<'a> {
    pub fn new(
        arch: &'a dyn Arch,
        uarch: &'a dyn Uarch,
        solver: &'a dyn Solver,
        config: Config,
    ) -> Self {
        Self {
            arch,
            uarch,
            solver,
            config,
        }
    }

    /// Optimize the straight-line region between two labels (either may be
    /// omitted to mean start/end of file).
    pub fn optimize(
        &self,
        source: &str,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Result<OptimizeOutput, SlothyError> {
        self.config.validate()?;
        let region = region::extract(source, start, end)?;
        let body = self.prepare(source, region.body.clone());
        let insts = self.classify(&body)?;

        if insts.is_empty() {
            // Empty body: nothing to schedule, succeed at budget zero.
            return Ok(self.empty_output(&region));
        }

        let builder = self.dfg_builder(false)?;
        let dfg = builder.build(&insts)?;
        let found = search::optimize_dfg(
            &dfg,
            self.arch,
            self.uarch,
            &self.config,
            self.solver,
            false,
            &[],
        )?;

        if self.config.selfcheck {
            self.run_selfcheck(&insts, &found.schedule.output_insts(), &found.schedule.permutation)?;
        }

        let body_lines =
            slothy_asm::apply_indentation(decode::format_lines(&found.schedule), region.indentation);
        let mut full: Vec<String> = region.pre.iter().map(|l| l.text.clone()).collect();
        if let Some(lbl) = start {
            full.push(format!("{lbl}:"));
        }
        full.extend(body_lines.iter().cloned());
        if let Some(lbl) = end {
            full.push(format!("{lbl}:"));
        }
        full.extend(region.post.iter().map(|l| l.text.clone()));

        Ok(OptimizeOutput {
            body: body_lines,
            full,
            stalls: found.stalls,
            permutation: found.schedule.permutation.clone(),
            renames: found.schedule.renames.clone(),
            input_renames: found.schedule.input_renames.clone(),
            attempts: found.attempts,
            kernel: None,
        })
    }

    /// Optimize a decrement-and-branch loop, with software pipelining when
    /// enabled in the configuration.
    pub fn optimize_loop(&self, source: &str, label: &str) -> Result<OptimizeOutput, SlothyError> {
        self.config.validate()?;
        let pipelining = self.config.sw_pipelining.enabled;
        let unroll = self.config.sw_pipelining.unroll;
        let lp = region::extract_loop(source, label)?;
        let body = self.prepare(source, lp.body.clone());
        let body_insts = self.classify(&body)?;

        if body_insts.is_empty() {
            let region = Region {
                pre: lp.pre.clone(),
                body: vec![],
                post: lp.post.clone(),
                indentation: lp.indentation,
            };
            return Ok(self.empty_output(&region));
        }

        let arch = self.arch;
        let is_symbolic = move |name: &str| arch.register_class(name).is_none();
        let unrolled = pipeline::unroll(&body_insts, unroll, &is_symbolic);

        // The loop counter lives outside the modeled window; the renamer
        // must leave it alone. Resolve `.req` and architecture aliases to
        // the canonical register names first.
        let aliases = Aliases::parse(&source_lines(source)).unwrap_or_default();
        let mut blocked: Vec<String> = Vec::new();
        for name in [&lp.counter.dst, &lp.counter.src] {
            let name = aliases.get(name).unwrap_or(name);
            let canon = resolve_alias(self.arch, name);
            if !blocked.contains(&canon) {
                blocked.push(canon);
            }
        }

        let builder = self.dfg_builder(true)?;
        let dfg = builder.build(&unrolled)?;
        let found = search::optimize_dfg(
            &dfg,
            self.arch,
            self.uarch,
            &self.config,
            self.solver,
            pipelining,
            &blocked,
        )?;
        let schedule = &found.schedule;

        if self.config.selfcheck {
            if pipelining {
                let (input, output, perm) = pipeline::expansion_for_check(&unrolled, schedule);
                self.run_selfcheck(&input, &output, &perm)?;
            } else {
                self.run_selfcheck(&unrolled, &schedule.output_insts(), &schedule.permutation)?;
            }
        }

        let (pre_insts, kernel_insts, post_insts) = pipeline::partition(schedule);
        let early_count = pre_insts.len();
        let pipelined = pipelining && early_count > 0;
        let (kernel_inputs, kernel_outputs) = pipeline::kernel_io(&kernel_insts);

        let indent = lp.indentation.unwrap_or(8);
        let pad = " ".repeat(indent);
        let render = |insts: &[&decode::ScheduledInst]| -> Vec<String> {
            insts
                .iter()
                .map(|s| format!("{pad}{}", s.inst.render()))
                .collect()
        };

        let preamble_lines = render(&pre_insts);
        let kernel_lines =
            slothy_asm::apply_indentation(decode::format_lines(schedule), Some(indent));
        let postamble_lines = if pipelined { render(&post_insts) } else { vec![] };

        let mut full: Vec<String> = lp.pre.iter().map(|l| l.text.clone()).collect();
        full.extend(region::loop_counter_adjust(
            &resolve_alias(self.arch, &lp.counter.src),
            unroll as usize,
            indent,
        ));
        if pipelined {
            // Preamble and postamble together absorb one iteration.
            full.push(format!(
                "{pad}sub {}, {}, #1",
                lp.counter.src, lp.counter.src
            ));
            full.extend(preamble_lines.iter().cloned());
        }
        full.push(format!("{label}:"));
        full.extend(kernel_lines.iter().cloned());
        full.extend(region::loop_end(&lp.counter, label, indent));
        full.extend(postamble_lines.iter().cloned());
        full.extend(lp.post.iter().map(|l| l.text.clone()));

        Ok(OptimizeOutput {
            body: kernel_lines.clone(),
            full,
            stalls: found.stalls,
            permutation: schedule.permutation.clone(),
            renames: schedule.renames.clone(),
            input_renames: schedule.input_renames.clone(),
            attempts: found.attempts,
            kernel: Some(KernelInfo {
                preamble: preamble_lines,
                kernel: kernel_lines,
                postamble: postamble_lines,
                inputs: kernel_inputs,
                outputs: kernel_outputs,
                early_count,
            }),
        })
    }

    /// Macro unfolding, `.req` alias unfolding, architecture aliases, and a
    /// final reduction to bare instruction lines.
    fn prepare(&self, source: &str, body: Vec<SourceLine>) -> Vec<SourceLine> {
        let all = source_lines(source);
        let macros = AsmMacro::extract(&all);
        let body = AsmMacro::unfold_all(&macros, body);
        let body = match Aliases::parse(&all) {
            Ok(aliases) => aliases.unfold(&body),
            Err(_) => body, // alias errors surface when the body parses
        };
        let body: Vec<SourceLine> = body
            .iter()
            .map(|l| {
                let mut text = l.text.clone();
                for (from, to) in self.arch.aliases() {
                    text = slothy_asm::replace_word(&text, from, to);
                }
                SourceLine::new(text, l.number)
            })
            .collect();
        slothy_asm::reduce_source(&body, false)
    }

    fn classify(&self, body: &[SourceLine]) -> Result<Vec<Instruction>, SlothyError> {
        body.iter()
            .map(|line| {
                self.arch
                    .classify(&line.text)
                    .map_err(|e| SlothyError::Input {
                        line: line.number,
                        message: e.to_string(),
                    })
            })
            .collect()
    }

    fn dfg_builder(&self, loop_carried: bool) -> Result<DfgBuilder, SlothyError> {
        let mut builder = DfgBuilder::new();
        builder.alias_policy = self.config.alias_policy()?;
        builder.allow_load_reordering = self.config.constraints.allow_reordering_of_loads;
        builder.typing_hints = self.config.hints()?;
        builder.inputs = self.config.inputs.clone();
        builder.outputs = self.config.outputs.clone();
        builder.loop_carried = loop_carried;
        Ok(builder)
    }

    fn run_selfcheck(
        &self,
        input: &[Instruction],
        output: &[Instruction],
        perm: &[usize],
    ) -> Result<(), SlothyError> {
        // The check rebuilds both DFGs as straight-line code with
        // auto-discovered inputs, under the same alias policy.
        let mut builder = DfgBuilder::new();
        builder.alias_policy = self.config.alias_policy()?;
        builder.allow_load_reordering = self.config.constraints.allow_reordering_of_loads;
        builder.typing_hints = self.config.hints()?;
        let report = selfcheck::run(input, output, perm, &builder);
        if report.is_ok() {
            Ok(())
        } else {
            Err(SlothyError::SelfCheck(report.to_string()))
        }
    }

    fn empty_output(&self, region: &Region) -> OptimizeOutput {
        let mut full: Vec<String> = region.pre.iter().map(|l| l.text.clone()).collect();
        full.extend(region.post.iter().map(|l| l.text.clone()));
        OptimizeOutput {
            body: vec![],
            full,
            stalls: 0,
            permutation: vec![],
            renames: vec![],
            input_renames: Default::default(),
            attempts: vec![],
            kernel: None,
        }
    }
}

/// Resolve an architecture alias (`lr` -> `r14`) to its canonical name.
fn resolve_alias(arch: &dyn Arch, name: &str) -> String {
    for (from, to) in arch.aliases() {
        if *from == name {
            return to.to_string();
        }
    }
    name.to_string()
}

pub use permutation::is_permutation;
