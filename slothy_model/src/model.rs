//! Model IR: variables, domains, constraints, objective.

use std::fmt;

/// Handle to an integer decision variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Var(pub u32);

impl Var {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A variable definition: a name for dumps and an explicit, sorted domain.
#[derive(Debug, Clone)]
pub struct VarDef {
    pub name: String,
    pub domain: Vec<i64>,
}

/// One instruction's issue-slot demand: its cycle variable, the chosen
/// alternative, and the unit sets the alternatives consume.
#[derive(Debug, Clone)]
pub struct IssueSpec {
    pub cycle: Var,
    pub unit_choice: Var,
    pub alternatives: Vec<Vec<u8>>,
}

/// Per-cycle issue width and functional-unit capacities.
#[derive(Debug, Clone)]
pub struct IssueCapacity {
    pub nodes: Vec<IssueSpec>,
    /// Instructions per cycle; `None` is unbounded.
    pub width: Option<usize>,
    /// Capacity per unit id; units beyond the table default to 1.
    pub capacity: Vec<usize>,
}

/// One written register's lifetime: the shared register variable, the
/// writer's position coordinate, and the consumer coordinates. Coordinates
/// are `(variable, offset)` so cross-iteration ends can be shifted by the
/// kernel length without extra variables.
#[derive(Debug, Clone)]
pub struct WriteSpec {
    pub reg: Var,
    pub start: (Var, i64),
    pub ends: Vec<(Var, i64)>,
    /// Whether the write itself repeats every window (kernel instructions).
    /// A periodic write clobbers its own value one window later, so its
    /// lifetime must stay shorter than the window. External (source) writes
    /// are not periodic and may cover a full window.
    pub periodic: bool,
}

/// No two writes assigned the same register may have overlapping lifetimes.
/// With `window = Some(n)` lifetimes repeat every `n` positions (software
/// pipelining) and overlap is judged on the periodic intervals.
#[derive(Debug, Clone)]
pub struct LiveRangeDisjoint {
    pub writes: Vec<WriteSpec>,
    pub window: Option<i64>,
}

#[derive(Debug, Clone)]
pub enum Constraint {
    /// All variables take pairwise distinct values.
    AllDifferent(Vec<Var>),
    /// `a + offset <= b`.
    OffsetLe { a: Var, offset: i64, b: Var },
    /// `a == b`.
    EqVar { a: Var, b: Var },
    /// `sum(coef * var) == constant`.
    LinearEq {
        terms: Vec<(Var, i64)>,
        constant: i64,
    },
    /// `sum(vars) <= bound`.
    SumLe { vars: Vec<Var>, bound: i64 },
    /// Issue order consistency: `pos_i < pos_j` implies `cycle_i <= cycle_j`
    /// over all pairs of `(pos, cycle)` items.
    OrderedCycles { items: Vec<(Var, Var)> },
    IssueCapacity(IssueCapacity),
    LiveRangeDisjoint(LiveRangeDisjoint),
}

#[derive(Debug, Clone)]
pub enum Objective {
    /// Minimize `sum(vars)`.
    MinimizeSum(Vec<Var>),
    /// Minimize `max(vars)`. Rarely used directly; the outer stalls search
    /// usually bounds the makespan instead.
    MinimizeMax(Vec<Var>),
}

/// A complete constraint model for one solver invocation.
#[derive(Debug, Clone, Default)]
pub struct Model {
    vars: Vec<VarDef>,
    constraints: Vec<Constraint>,
    objective: Option<Objective>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    /// New variable with an explicit domain. Values are sorted and deduped;
    /// search tries them in ascending order.
    pub fn new_var(&mut self, name: impl Into<String>, domain: impl IntoIterator<Item = i64>) -> Var {
        let mut domain: Vec<i64> = domain.into_iter().collect();
        domain.sort_unstable();
        domain.dedup();
        let var = Var(self.vars.len() as u32);
        self.vars.push(VarDef {
            name: name.into(),
            domain,
        });
        var
    }

    /// New variable over the inclusive range `[lo, hi]`.
    pub fn new_range(&mut self, name: impl Into<String>, lo: i64, hi: i64) -> Var {
        self.new_var(name, lo..=hi)
    }

    /// New boolean (0/1) variable.
    pub fn new_bool(&mut self, name: impl Into<String>) -> Var {
        self.new_var(name, [0, 1])
    }

    /// New fixed variable.
    pub fn constant(&mut self, name: impl Into<String>, value: i64) -> Var {
        self.new_var(name, [value])
    }

    pub fn var_count(&self) -> usize {
        self.vars.len()
    }

    pub fn def(&self, var: Var) -> &VarDef {
        &self.vars[var.index()]
    }

    pub fn defs(&self) -> &[VarDef] {
        &self.vars
    }

    /// Restrict a variable's domain to a single value (pre-pinning).
    pub fn pin(&mut self, var: Var, value: i64) {
        self.vars[var.index()].domain.retain(|&v| v == value);
    }

    pub fn add(&mut self, constraint: Constraint) {
        self.constraints.push(constraint);
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn set_objective(&mut self, objective: Objective) {
        self.objective = Some(objective);
    }

    pub fn objective(&self) -> Option<&Objective> {
        self.objective.as_ref()
    }
}

fn fmt_domain(domain: &[i64], f: &mut fmt::Formatter<'_>) -> fmt::Result {
    // Contiguous ranges print as lo..hi.
    if domain.len() > 2
        && domain
            .windows(2)
            .all(|w| w[1] == w[0] + 1)
    {
        return write!(f, "{}..{}", domain[0], domain[domain.len() - 1]);
    }
    write!(f, "{domain:?}")
}

/// Human-readable model dump, one variable or constraint per line.
impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "model: {} vars, {} constraints", self.vars.len(), self.constraints.len())?;
        for (i, def) in self.vars.iter().enumerate() {
            write!(f, "  v{i} {} in ", def.name)?;
            fmt_domain(&def.domain, f)?;
            writeln!(f)?;
        }
        for c in &self.constraints {
            match c {
                Constraint::AllDifferent(vars) => {
                    writeln!(f, "  alldifferent {vars:?}")?;
                }
                Constraint::OffsetLe { a, offset, b } => {
                    writeln!(f, "  {a} + {offset} <= {b}")?;
                }
                Constraint::EqVar { a, b } => writeln!(f, "  {a} == {b}")?,
                Constraint::LinearEq { terms, constant } => {
                    write!(f, "  0 ==")?;
                    for (v, c) in terms {
                        write!(f, " {c:+}*{v}")?;
                    }
                    writeln!(f, " {:+}", -constant)?;
                }
                Constraint::SumLe { vars, bound } => {
                    writeln!(f, "  sum {vars:?} <= {bound}")?;
                }
                Constraint::OrderedCycles { items } => {
                    writeln!(f, "  ordered-cycles over {} items", items.len())?;
                }
                Constraint::IssueCapacity(ic) => {
                    writeln!(
                        f,
                        "  issue-capacity width={:?} caps={:?} over {} nodes",
                        ic.width,
                        ic.capacity,
                        ic.nodes.len()
                    )?;
                }
                Constraint::LiveRangeDisjoint(lr) => {
                    writeln!(
                        f,
                        "  live-range-disjoint window={:?} over {} writes",
                        lr.window,
                        lr.writes.len()
                    )?;
                }
            }
        }
        if let Some(Objective::MinimizeSum(vars)) = &self.objective {
            writeln!(f, "  minimize sum {vars:?}")?;
        }
        Ok(())
    }
}
