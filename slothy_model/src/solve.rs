//! The solver interface and the built-in backtracking solver.
//!
//! The engine submits a [`Model`] and receives SAT with an assignment,
//! UNSAT, or UNKNOWN (deadline hit). The built-in solver is a deterministic
//! chronological backtracking search with forward-checking propagation:
//! variables are labeled in creation order, values in ascending order, so
//! identical models always produce identical assignments.

use std::time::Instant;

use crate::model::{Constraint, IssueCapacity, LiveRangeDisjoint, Model, Objective, Var};

/// A satisfying assignment: one value per model variable.
#[derive(Debug, Clone)]
pub struct Assignment {
    values: Vec<i64>,
}

impl Assignment {
    pub fn value(&self, var: Var) -> i64 {
        self.values[var.index()]
    }

    pub fn sum(&self, vars: &[Var]) -> i64 {
        vars.iter().map(|&v| self.value(v)).sum()
    }
}

/// Result of one solver invocation.
#[derive(Debug, Clone)]
pub enum Outcome {
    Sat(Assignment),
    Unsat,
    /// The deadline expired before the search finished.
    Unknown,
}

impl Outcome {
    pub fn is_sat(&self) -> bool {
        matches!(self, Outcome::Sat(_))
    }
}

/// The external solver interface: submit a model, receive an outcome.
pub trait Solver {
    fn solve(&self, model: &Model, deadline: Option<Instant>) -> Outcome;
}

/// Deterministic backtracking solver with forward checking.
#[derive(Debug, Clone)]
pub struct BacktrackSolver {
    /// How many search nodes between deadline polls.
    pub deadline_poll: u64,
}

impl BacktrackSolver {
    pub fn new() -> Self {
        Self { deadline_poll: 256 }
    }
}

impl Default for BacktrackSolver {
    fn default() -> Self {
        Self::new()
    }
}

type Domains = Vec<Vec<i64>>;

enum Search {
    Found(Vec<i64>),
    Exhausted,
    Aborted,
}

struct Ctx<'a> {
    model: &'a Model,
    deadline: Option<Instant>,
    poll: u64,
    nodes: u64,
}

impl Solver for BacktrackSolver {
    fn solve(&self, model: &Model, deadline: Option<Instant>) -> Outcome {
        let mut ctx = Ctx {
            model,
            deadline,
            poll: self.deadline_poll,
            nodes: 0,
        };
        let domains: Domains = model.defs().iter().map(|d| d.domain.clone()).collect();

        match model.objective() {
            None => {
                let mut domains = domains;
                if !propagate(model, &mut domains) {
                    return Outcome::Unsat;
                }
                match search(&mut ctx, domains, 0) {
                    Search::Found(values) => Outcome::Sat(Assignment { values }),
                    Search::Exhausted => Outcome::Unsat,
                    Search::Aborted => Outcome::Unknown,
                }
            }
            Some(objective) => {
                // Branch and bound: re-solve with a tightening bound on the
                // objective value.
                let mut best: Option<Assignment> = None;
                let mut bound = i64::MAX;
                loop {
                    let mut bounded = domains.clone();
                    if !apply_bound(objective, &mut bounded, bound) || !propagate(model, &mut bounded)
                    {
                        break;
                    }
                    // Sum bounds also prune during the search; a max bound
                    // is fully enforced by the domain restriction above.
                    let (sum_vars, sum_bound): (&[Var], i64) = match objective {
                        Objective::MinimizeSum(vars) => (vars, bound),
                        Objective::MinimizeMax(_) => (&[], i64::MAX),
                    };
                    match search_bounded(&mut ctx, bounded, sum_vars, sum_bound) {
                        Search::Found(values) => {
                            let assignment = Assignment { values };
                            bound = objective_value(objective, &assignment);
                            best = Some(assignment);
                            if matches!(objective, Objective::MinimizeSum(_)) && bound == 0 {
                                break;
                            }
                        }
                        Search::Exhausted => break,
                        Search::Aborted => {
                            return match best {
                                Some(a) => Outcome::Sat(a),
                                None => Outcome::Unknown,
                            };
                        }
                    }
                }
                match best {
                    Some(a) => Outcome::Sat(a),
                    None => Outcome::Unsat,
                }
            }
        }
    }
}

/// Restrict domains so the objective must improve on `bound`.
fn apply_bound(objective: &Objective, domains: &mut Domains, bound: i64) -> bool {
    if bound == i64::MAX {
        return true;
    }
    match objective {
        Objective::MinimizeSum(vars) => prune_sum_le(domains, vars, bound - 1),
        Objective::MinimizeMax(vars) => {
            for &v in vars {
                let (_, ok) = retain(domains, v, |x| x < bound);
                if !ok {
                    return false;
                }
            }
            true
        }
    }
}

fn objective_value(objective: &Objective, assignment: &Assignment) -> i64 {
    match objective {
        Objective::MinimizeSum(vars) => assignment.sum(vars),
        Objective::MinimizeMax(vars) => vars
            .iter()
            .map(|&v| assignment.value(v))
            .max()
            .unwrap_or(0),
    }
}

fn search(ctx: &mut Ctx<'_>, domains: Domains, idx: usize) -> Search {
    search_impl(ctx, domains, idx, &[], i64::MAX)
}

fn search_bounded(ctx: &mut Ctx<'_>, domains: Domains, obj: &[Var], bound: i64) -> Search {
    search_impl(ctx, domains, 0, obj, bound)
}

fn search_impl(
    ctx: &mut Ctx<'_>,
    domains: Domains,
    idx: usize,
    obj: &[Var],
    bound: i64,
) -> Search {
    if idx == domains.len() {
        return Search::Found(domains.iter().map(|d| d[0]).collect());
    }

    ctx.nodes += 1;
    if ctx.nodes % ctx.poll == 0
        && let Some(deadline) = ctx.deadline
        && Instant::now() >= deadline
    {
        return Search::Aborted;
    }

    // Already singleton: move on without branching.
    if domains[idx].len() == 1 {
        return search_impl(ctx, domains, idx + 1, obj, bound);
    }

    let values = domains[idx].clone();
    for value in values {
        let mut child = domains.clone();
        child[idx] = vec![value];
        if bound != i64::MAX && !prune_sum_le(&mut child, obj, bound - 1) {
            continue;
        }
        if !propagate(ctx.model, &mut child) {
            continue;
        }
        match search_impl(ctx, child, idx + 1, obj, bound) {
            Search::Exhausted => {}
            other => return other,
        }
    }
    Search::Exhausted
}

// ---------------------------------------------------------------------------
// Propagation
// ---------------------------------------------------------------------------

fn min(domains: &Domains, var: Var) -> i64 {
    domains[var.index()][0]
}

fn max(domains: &Domains, var: Var) -> i64 {
    *domains[var.index()].last().unwrap_or(&i64::MIN)
}

fn assigned(domains: &Domains, var: Var) -> Option<i64> {
    let d = &domains[var.index()];
    if d.len() == 1 { Some(d[0]) } else { None }
}

fn retain(domains: &mut Domains, var: Var, keep: impl Fn(i64) -> bool) -> (bool, bool) {
    let d = &mut domains[var.index()];
    let before = d.len();
    d.retain(|&v| keep(v));
    (d.len() != before, !d.is_empty())
}

/// `sum(vars) <= bound`: fail on infeasible minimum, prune maxima.
fn prune_sum_le(domains: &mut Domains, vars: &[Var], bound: i64) -> bool {
    if vars.is_empty() {
        return 0 <= bound;
    }
    let min_sum: i64 = vars.iter().map(|&v| min(domains, v)).sum();
    if min_sum > bound {
        return false;
    }
    for &v in vars {
        let slack = bound - (min_sum - min(domains, v));
        let (_, ok) = retain(domains, v, |x| x <= slack);
        if !ok {
            return false;
        }
    }
    true
}

/// Fixpoint forward checking over the arithmetic constraints, then the
/// global consistency checks. Returns false when any domain empties or a
/// fully-assigned constraint is violated.
fn propagate(model: &Model, domains: &mut Domains) -> bool {
    if domains.iter().any(|d| d.is_empty()) {
        return false;
    }
    loop {
        let mut changed = false;
        for c in model.constraints() {
            match c {
                Constraint::AllDifferent(vars) => {
                    for &v in vars {
                        let Some(val) = assigned(domains, v) else {
                            continue;
                        };
                        for &w in vars {
                            if w == v {
                                continue;
                            }
                            let (ch, ok) = retain(domains, w, |x| x != val);
                            if !ok {
                                return false;
                            }
                            changed |= ch;
                        }
                    }
                }
                Constraint::OffsetLe { a, offset, b } => {
                    let lo = min(domains, *a) + offset;
                    let (ch, ok) = retain(domains, *b, |x| x >= lo);
                    if !ok {
                        return false;
                    }
                    changed |= ch;
                    let hi = max(domains, *b) - offset;
                    let (ch, ok) = retain(domains, *a, |x| x <= hi);
                    if !ok {
                        return false;
                    }
                    changed |= ch;
                }
                Constraint::EqVar { a, b } => {
                    let db = domains[b.index()].clone();
                    let (ch, ok) = retain(domains, *a, |x| db.binary_search(&x).is_ok());
                    if !ok {
                        return false;
                    }
                    changed |= ch;
                    let da = domains[a.index()].clone();
                    let (ch, ok) = retain(domains, *b, |x| da.binary_search(&x).is_ok());
                    if !ok {
                        return false;
                    }
                    changed |= ch;
                }
                Constraint::LinearEq { terms, constant } => {
                    let mut unassigned = None;
                    let mut sum = 0i64;
                    let mut pending = 0;
                    for &(v, coef) in terms {
                        match assigned(domains, v) {
                            Some(val) => sum += coef * val,
                            None => {
                                pending += 1;
                                unassigned = Some((v, coef));
                            }
                        }
                    }
                    match (pending, unassigned) {
                        (0, _) => {
                            if sum != *constant {
                                return false;
                            }
                        }
                        (1, Some((v, coef))) => {
                            let rest = constant - sum;
                            if rest % coef != 0 {
                                return false;
                            }
                            let val = rest / coef;
                            let (ch, ok) = retain(domains, v, |x| x == val);
                            if !ok {
                                return false;
                            }
                            changed |= ch;
                        }
                        _ => {}
                    }
                }
                Constraint::SumLe { vars, bound } => {
                    if !prune_sum_le(domains, vars, *bound) {
                        return false;
                    }
                }
                // Globals are verified below on their assigned parts.
                Constraint::OrderedCycles { .. }
                | Constraint::IssueCapacity(_)
                | Constraint::LiveRangeDisjoint(_) => {}
            }
        }
        if !changed {
            break;
        }
    }
    check_globals(model, domains)
}

/// Verify the global constraints over their fully-assigned participants.
fn check_globals(model: &Model, domains: &Domains) -> bool {
    for c in model.constraints() {
        match c {
            Constraint::OrderedCycles { items } => {
                if !check_ordered_cycles(items, domains) {
                    return false;
                }
            }
            Constraint::IssueCapacity(ic) => {
                if !check_issue_capacity(ic, domains) {
                    return false;
                }
            }
            Constraint::LiveRangeDisjoint(lr) => {
                if !check_live_ranges(lr, domains) {
                    return false;
                }
            }
            _ => {}
        }
    }
    true
}

fn check_ordered_cycles(items: &[(Var, Var)], domains: &Domains) -> bool {
    let fixed: Vec<(i64, i64)> = items
        .iter()
        .filter_map(|&(pos, cycle)| Some((assigned(domains, pos)?, assigned(domains, cycle)?)))
        .collect();
    for (i, &(pi, ci)) in fixed.iter().enumerate() {
        for &(pj, cj) in &fixed[i + 1..] {
            if (pi < pj && ci > cj) || (pj < pi && cj > ci) {
                return false;
            }
        }
    }
    true
}

fn check_issue_capacity(ic: &IssueCapacity, domains: &Domains) -> bool {
    use std::collections::HashMap;
    // cycle -> (instruction count, unit usage)
    let mut cycles: HashMap<i64, (usize, HashMap<u8, usize>)> = HashMap::new();
    for node in &ic.nodes {
        let Some(cycle) = assigned(domains, node.cycle) else {
            continue;
        };
        let entry = cycles.entry(cycle).or_default();
        entry.0 += 1;
        if let Some(choice) = assigned(domains, node.unit_choice) {
            if let Some(units) = node.alternatives.get(choice as usize) {
                for &u in units {
                    *entry.1.entry(u).or_default() += 1;
                }
            }
        }
    }
    for (count, units) in cycles.values() {
        if let Some(width) = ic.width
            && *count > width
        {
            return false;
        }
        for (&unit, &used) in units {
            let cap = ic.capacity.get(unit as usize).copied().unwrap_or(1);
            if used > cap {
                return false;
            }
        }
    }
    true
}

fn div_floor(a: i64, n: i64) -> i64 {
    a.div_euclid(n)
}

fn div_ceil(a: i64, n: i64) -> i64 {
    -(-a).div_euclid(n)
}

/// Overlap of two lifetimes, optionally as periodic intervals with the
/// given window length.
///
/// Lifetimes are half-open `[start, end)`: the value occupies its register
/// from its write up to but not including the slot of its last read. The
/// reading instruction may itself write the same register (read-modify-write
/// and destination-reuse), so touching intervals do not conflict.
fn ranges_conflict(s1: i64, e1: i64, s2: i64, e2: i64, window: Option<i64>) -> bool {
    let e1 = e1.max(s1);
    let e2 = e2.max(s2);
    match window {
        None => s1 < e2 && s2 < e1,
        // Conflict iff some shift k*n of the second interval overlaps the
        // first: an integer k with s1 - e2 < k*n < e1 - s2.
        Some(n) => div_ceil(s1 - e2 + 1, n) <= div_floor(e1 - s2 - 1, n),
    }
}

fn check_live_ranges(lr: &LiveRangeDisjoint, domains: &Domains) -> bool {
    // Resolve fully-assigned writes to (reg, start, end).
    let mut fixed: Vec<(i64, i64, i64)> = Vec::with_capacity(lr.writes.len());
    'writes: for w in &lr.writes {
        let Some(reg) = assigned(domains, w.reg) else {
            continue;
        };
        let Some(start) = assigned(domains, w.start.0) else {
            continue;
        };
        let start = start + w.start.1;
        let mut end = start;
        for &(v, off) in &w.ends {
            let Some(val) = assigned(domains, v) else {
                continue 'writes;
            };
            end = end.max(val + off);
        }
        // A periodic write one window later clobbers a value that is still
        // live past a full window. Exactly one window is legal: that is a
        // read-modify-write chain consuming the old value as it is rewritten.
        if let Some(n) = lr.window
            && w.periodic
            && end - start > n
        {
            return false;
        }
        fixed.push((reg, start, end));
    }
    for (i, &(r1, s1, e1)) in fixed.iter().enumerate() {
        for &(r2, s2, e2) in &fixed[i + 1..] {
            if r1 == r2 && ranges_conflict(s1, e1, s2, e2, lr.window) {
                return false;
            }
        }
    }
    true
}
