//! Engine configuration.
//!
//! Plain structs with serde `Deserialize` so the front-end can load a JSON
//! config file; every field has a default so partial configs work. Binding
//! errors (bad unroll, unknown class names) surface before any pass runs.

use std::collections::HashMap;

use serde::Deserialize;
use thiserror::Error;

use slothy_ir::dfg::AliasPolicy;
use slothy_ir::reg::RegisterClass;

#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("sw_pipelining.unroll must be a power of two >= 1, got {0}")]
    InvalidUnroll(u32),
    #[error("typing hint for `{name}`: unknown register class `{class}`")]
    UnknownClass { name: String, class: String },
    #[error(
        "unknown alias policy `{0}` (expected \"conservative\", \"base_offset\", or \"none\")"
    )]
    UnknownAliasPolicy(String),
    #[error("loop mode requires a loop label")]
    MissingLoopLabel,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SwPipelining {
    pub enabled: bool,
    pub unroll: u32,
    /// Minimize the number of early instructions (tightens the kernel).
    pub minimize_overlapping: bool,
}

impl Default for SwPipelining {
    fn default() -> Self {
        Self {
            enabled: false,
            unroll: 1,
            minimize_overlapping: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Stalls {
    pub initial: u32,
    pub cap: u32,
}

impl Default for Stalls {
    fn default() -> Self {
        Self {
            initial: 0,
            cap: 64,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Constraints {
    pub stalls: Stalls,
    pub allow_reordering_of_loads: bool,
    /// `"conservative"`, `"base_offset"`, or `"none"`.
    pub alias_policy: String,
}

impl Default for Constraints {
    fn default() -> Self {
        Self {
            stalls: Stalls::default(),
            allow_reordering_of_loads: true,
            alias_policy: "conservative".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Wall-clock budget per solver call, in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Directory for per-pass model dumps. Disabled when unset.
    pub dump_dir: Option<String>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            timeout_ms: None,
            dump_dir: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sw_pipelining: SwPipelining,
    pub constraints: Constraints,
    /// Symbolic register name -> class name ("gpr", "fpr", "vector").
    pub typing_hints: HashMap<String, String>,
    /// Externally live-in registers. `None` auto-discovers.
    pub inputs: Option<Vec<String>>,
    /// Required output registers. `None` keeps all finally-written values.
    pub outputs: Option<Vec<String>>,
    pub selfcheck: bool,
    pub solver: SolverConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sw_pipelining: SwPipelining::default(),
            constraints: Constraints::default(),
            typing_hints: HashMap::new(),
            inputs: None,
            outputs: None,
            selfcheck: true,
            solver: SolverConfig::default(),
        }
    }
}

impl Config {
    /// Check all bindings; fatal before the first pass.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let u = self.sw_pipelining.unroll;
        if u < 1 || !u.is_power_of_two() {
            return Err(ConfigError::InvalidUnroll(u));
        }
        self.alias_policy()?;
        self.hints()?;
        Ok(())
    }

    pub fn alias_policy(&self) -> Result<AliasPolicy, ConfigError> {
        match self.constraints.alias_policy.as_str() {
            "conservative" => Ok(AliasPolicy::Conservative),
            "base_offset" => Ok(AliasPolicy::BaseOffset),
            "none" => Ok(AliasPolicy::None),
            other => Err(ConfigError::UnknownAliasPolicy(other.to_string())),
        }
    }

    /// Typing hints with resolved classes.
    pub fn hints(&self) -> Result<HashMap<String, RegisterClass>, ConfigError> {
        self.typing_hints
            .iter()
            .map(|(name, class)| match RegisterClass::parse(class) {
                Some(c) => Ok((name.clone(), c)),
                None => Err(ConfigError::UnknownClass {
                    name: name.clone(),
                    class: class.clone(),
                }),
            })
            .collect()
    }
}
