//! slothy: assembly superoptimizer front-end.
//!
//! Reads an assembly file, optimizes the requested window or loop on the
//! Armv7-M + MVE target, and writes the transformed source. Exit codes:
//! 0 success, 1 infeasible under the stalls cap, 2 malformed input,
//! 3 solver failure, 4 self-check failure.

use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};

use slothy_engine::{Config, OptimizeOutput, Slothy, SlothyError};
use slothy_model::BacktrackSolver;
use slothy_target_armv7m::{Armv7m, CortexM55};

#[derive(Parser)]
#[command(name = "slothy", version, about = "Assembly superoptimizer")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Optimize the straight-line region between two labels.
    Optimize {
        #[command(flatten)]
        common: Common,
        /// Label opening the optimization window (default: top of file).
        #[arg(long)]
        start: Option<String>,
        /// Label closing the optimization window (default: end of file).
        #[arg(long)]
        end: Option<String>,
    },
    /// Optimize a decrement-and-branch loop.
    OptimizeLoop {
        #[command(flatten)]
        common: Common,
        /// Label of the loop to optimize.
        #[arg(long = "loop")]
        label: String,
    },
}

#[derive(Args)]
struct Common {
    /// Input assembly file.
    input: PathBuf,
    /// Output file (default: stdout).
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// JSON configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Enable software pipelining.
    #[arg(long)]
    pipelining: bool,
    /// Unroll factor (power of two).
    #[arg(long)]
    unroll: Option<u32>,
    /// Stalls cap for the search.
    #[arg(long)]
    stalls_cap: Option<u32>,
    /// Solver wall-clock budget per pass, in milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,
    /// Skip the output self-check.
    #[arg(long)]
    no_selfcheck: bool,
}

enum CliError {
    Io(PathBuf, std::io::Error),
    ConfigFile(PathBuf, serde_json::Error),
    Engine(SlothyError),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Io(path, e) => write!(f, "{}: {e}", path.display()),
            CliError::ConfigFile(path, e) => write!(f, "{}: {e}", path.display()),
            CliError::Engine(e) => write!(f, "{e}"),
        }
    }
}

impl From<SlothyError> for CliError {
    fn from(e: SlothyError) -> Self {
        CliError::Engine(e)
    }
}

impl CliError {
    fn exit_code(&self) -> u8 {
        match self {
            CliError::Io(..) | CliError::ConfigFile(..) => 2,
            CliError::Engine(e) => e.exit_code() as u8,
        }
    }
}

fn load_config(common: &Common) -> Result<Config, CliError> {
    let mut config = match &common.config {
        Some(path) => {
            let text = fs::read_to_string(path).map_err(|e| CliError::Io(path.clone(), e))?;
            serde_json::from_str(&text).map_err(|e| CliError::ConfigFile(path.clone(), e))?
        }
        None => Config::default(),
    };
    if common.pipelining {
        config.sw_pipelining.enabled = true;
    }
    if let Some(u) = common.unroll {
        config.sw_pipelining.unroll = u;
    }
    if let Some(cap) = common.stalls_cap {
        config.constraints.stalls.cap = cap;
    }
    if let Some(ms) = common.timeout_ms {
        config.solver.timeout_ms = Some(ms);
    }
    if common.no_selfcheck {
        config.selfcheck = false;
    }
    Ok(config)
}

fn emit(common: &Common, output: &OptimizeOutput) -> Result<(), CliError> {
    let text = output.full.join("\n") + "\n";
    match &common.output {
        Some(path) => fs::write(path, text).map_err(|e| CliError::Io(path.clone(), e))?,
        None => print!("{text}"),
    }
    log::info!(
        "slothy: done: {} stalls, {} renames",
        output.stalls,
        output.renames.len()
    );
    if let Some(kernel) = &output.kernel {
        log::info!(
            "slothy: kernel of {} instructions, {} early, live-in {:?}",
            kernel.kernel.len(),
            kernel.early_count,
            kernel.inputs
        );
    }
    Ok(())
}

fn run(cli: &Cli) -> Result<(), CliError> {
    let (common, task): (&Common, _) = match &cli.command {
        Command::Optimize { common, start, end } => {
            (common, (start.as_deref(), end.as_deref(), None))
        }
        Command::OptimizeLoop { common, label } => (common, (None, None, Some(label.as_str()))),
    };

    let source =
        fs::read_to_string(&common.input).map_err(|e| CliError::Io(common.input.clone(), e))?;
    let config = load_config(common)?;
    let solver = BacktrackSolver::new();
    let slothy = Slothy::new(&Armv7m, &CortexM55, &solver, config);

    let output = match task {
        (start, end, None) => slothy.optimize(&source, start, end)?,
        (_, _, Some(label)) => slothy.optimize_loop(&source, label)?,
    };
    emit(common, &output)
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("slothy: error: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}
