//! Main solver: chronological DPLL(T) over the string theory.
//!
//! The search keeps a clause store over atoms, a trail of assigned
//! literals and one decision level per decision. Each level is mirrored in
//! the e-graph, the length propagator and the string plugin. A round of
//! propagation runs unit propagation, applies assigned atoms to the
//! e-graph and the length domains, lets the plugin instantiate axioms, and
//! assigns atoms whose truth the theories already fix. When every clause
//! is satisfied, the plugin's final check either accepts the branch,
//! asserts more lemmas, or rejects the branch.
//!
//! Conflicts flip the most recent decision that was not flipped yet. There
//! is no clause learning: lemmas from the plugin are the only clauses added
//! during search.
//!
//! Unit propagation uses two watched literals per clause. Lemmas arrive
//! while literals are assigned and backtracking is chronological, so the
//! watches are rebuilt once after every pop. Atoms are indexed by their
//! arguments; a round only looks at atoms over classes touched by merges
//! or disequalities, plus the integer atoms when a domain changed.

use crate::cnf::{self, AtomClause, AtomLit};
use crate::config::SolverConfig;
use crate::context::HostContext;
use crate::egraph::EGraph;
use crate::length::{LengthConstraint, LengthPropagator};
use crate::literal::{Lit, Var};
use crate::model::{Model, Value};
use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt;
use strz_core::ast::{TermId, TermKind, TermManager};
use strz_core::error::{Result, StrzError};
use strz_core::sort::SortKind;
use strz_core::traits::{FinalCheckResult, Theory, TheoryModel};
use strz_theories::string::{StringSolver, StringStats};
use tracing::{debug, info, trace};

/// Why a check ended without an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnknownReason {
    /// A decision or final check limit was reached.
    ResourceLimit,
    /// The branch space was exhausted, but loop detection suppressed
    /// some case of a word equation.
    LoopCut,
    /// No model could be built, or the built model does not satisfy the
    /// assertions.
    IncompleteModel,
    /// Interval reasoning stopped short of a fixpoint and the model does
    /// not satisfy the integer constraints.
    Arithmetic,
}

impl fmt::Display for UnknownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnknownReason::ResourceLimit => write!(f, "resource limit"),
            UnknownReason::LoopCut => write!(f, "loop cut"),
            UnknownReason::IncompleteModel => write!(f, "incomplete model"),
            UnknownReason::Arithmetic => write!(f, "arithmetic"),
        }
    }
}

/// Result of SMT solving
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverResult {
    /// Satisfiable
    Sat,
    /// Unsatisfiable
    Unsat,
    /// Unknown, with the reason
    Unknown(UnknownReason),
}

impl fmt::Display for SolverResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverResult::Sat => write!(f, "sat"),
            SolverResult::Unsat => write!(f, "unsat"),
            SolverResult::Unknown(reason) => write!(f, "unknown ({reason})"),
        }
    }
}

/// Search statistics.
#[derive(Debug, Clone, Default)]
pub struct SolverStats {
    /// Number of decisions made
    pub decisions: u64,
    /// Number of conflicts
    pub conflicts: u64,
    /// Number of final checks
    pub final_checks: u64,
    /// Literals assigned by unit propagation
    pub propagations: u64,
    /// Literals assigned because the theories fix their truth
    pub theory_propagations: u64,
    /// Axioms received from the string plugin
    pub axioms: u64,
    /// Maximum decision level reached
    pub max_level: usize,
}

#[derive(Debug, Clone, Copy)]
struct Decision {
    lit: Lit,
    flipped: bool,
}

/// A falsified clause or an inconsistent theory state.
struct Conflict;

/// Status of a clause when its watches are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClauseState {
    Satisfied,
    Open,
    Unit(Lit),
    Conflict,
}

/// DPLL(T) solver for string constraints.
#[derive(Debug)]
pub struct Solver {
    config: SolverConfig,
    tm: TermManager,
    egraph: EGraph,
    lengths: LengthPropagator,
    strings: StringSolver,
    assertions: Vec<TermId>,
    clauses: Vec<Vec<Lit>>,
    /// Positions of the two watched literals of each clause.
    watched: Vec<[usize; 2]>,
    /// Clauses watching the negation of each literal, by [`Lit::index`].
    watches: Vec<Vec<usize>>,
    /// Units and conflicts found when clauses were attached.
    pending_units: Vec<Lit>,
    clause_conflict: bool,
    /// Watches are stale after a pop.
    rewatch: bool,
    /// Trail position of the next literal to run through the watches.
    prop_head: usize,
    /// Atom of each variable.
    atoms: Vec<TermId>,
    atom_vars: FxHashMap<TermId, Var>,
    /// Atoms over each argument term.
    atom_uses: FxHashMap<TermId, Vec<Var>>,
    /// Comparisons and integer equalities.
    int_atoms: Vec<Var>,
    /// Atoms created since the last round.
    atom_queue: Vec<Var>,
    /// Terms whose class was merged or got a disequality.
    touched: Vec<TermId>,
    lengths_changed: bool,
    rescan_atoms: bool,
    assigns: Vec<Option<bool>>,
    /// Trail position of each assigned variable.
    assigned_at: Vec<usize>,
    trail: Vec<Lit>,
    /// Trail length at the start of each decision level.
    trail_lim: Vec<usize>,
    decisions: Vec<Decision>,
    /// Trail position of the next literal to hand to the theories.
    theory_head: usize,
    /// Axioms asserted by the plugin and not yet clausified.
    new_axioms: Vec<TermId>,
    /// Unions not yet reported to the plugin.
    merged: Vec<(TermId, TermId)>,
    /// A term registration produced an inconsistent class.
    pending_clash: bool,
    model: Option<Model>,
    stats: SolverStats,
}

impl Solver {
    /// Create a solver with the default configuration.
    pub fn new() -> Self {
        Self::with_config(SolverConfig::default())
    }

    /// Create a solver with the given configuration.
    pub fn with_config(config: SolverConfig) -> Self {
        let strings = StringSolver::with_config(config.string.clone());
        Self {
            config,
            tm: TermManager::new(),
            egraph: EGraph::new(),
            lengths: LengthPropagator::new(),
            strings,
            assertions: Vec::new(),
            clauses: Vec::new(),
            watched: Vec::new(),
            watches: Vec::new(),
            pending_units: Vec::new(),
            clause_conflict: false,
            rewatch: false,
            prop_head: 0,
            atoms: Vec::new(),
            atom_vars: FxHashMap::default(),
            atom_uses: FxHashMap::default(),
            int_atoms: Vec::new(),
            atom_queue: Vec::new(),
            touched: Vec::new(),
            lengths_changed: false,
            rescan_atoms: false,
            assigns: Vec::new(),
            assigned_at: Vec::new(),
            trail: Vec::new(),
            trail_lim: Vec::new(),
            decisions: Vec::new(),
            theory_head: 0,
            new_axioms: Vec::new(),
            merged: Vec::new(),
            pending_clash: false,
            model: None,
            stats: SolverStats::default(),
        }
    }

    /// Configuration.
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Term manager, for inspecting terms.
    pub fn terms(&self) -> &TermManager {
        &self.tm
    }

    /// Term manager, for building assertions.
    pub fn terms_mut(&mut self) -> &mut TermManager {
        &mut self.tm
    }

    /// Search statistics.
    pub fn stats(&self) -> &SolverStats {
        &self.stats
    }

    /// String plugin statistics.
    pub fn string_stats(&self) -> StringStats {
        self.strings.stats()
    }

    /// The string plugin.
    pub fn string_solver(&self) -> &StringSolver {
        &self.strings
    }

    /// Number of clauses in the store.
    pub fn num_clauses(&self) -> usize {
        self.clauses.len()
    }

    /// Model of the last satisfiable check.
    pub fn model(&self) -> Option<&Model> {
        self.model.as_ref()
    }

    /// Evaluate a term in the model of the last satisfiable check.
    pub fn eval(&self, term: TermId) -> Option<Value> {
        self.model.as_ref()?.eval(&self.tm, term)
    }

    /// Drop assertions, clauses and all search state. Terms stay valid.
    pub fn reset(&mut self) {
        let tm = std::mem::take(&mut self.tm);
        *self = Self::with_config(self.config.clone());
        self.tm = tm;
    }

    /// Add an assertion.
    ///
    /// Fails if `formula` is not a Boolean term or clausifies to too many
    /// clauses.
    pub fn assert(&mut self, formula: TermId) -> Result<()> {
        self.backtrack_to_base();
        self.model = None;
        let clauses = cnf::clausify(&self.tm, formula)?;
        debug!(formula = %self.tm.display(formula), clauses = clauses.len(), "assert");
        self.assertions.push(formula);
        self.add_clauses(clauses)
    }

    /// Decide the conjunction of the assertions.
    pub fn check(&mut self) -> Result<SolverResult> {
        self.backtrack_to_base();
        self.model = None;
        self.rewatch = true;
        self.rescan_atoms = true;
        info!(
            assertions = self.assertions.len(),
            clauses = self.clauses.len(),
            "check"
        );
        let result = match self.search() {
            Err(StrzError::ResourceLimit(msg)) => {
                debug!(%msg, "giving up");
                Ok(SolverResult::Unknown(UnknownReason::ResourceLimit))
            }
            other => other,
        };
        if let Ok(result) = &result {
            info!(%result, decisions = self.stats.decisions, "check finished");
        }
        result
    }

    fn search(&mut self) -> Result<SolverResult> {
        let mut decisions = 0u64;
        let mut final_checks = 0u64;
        loop {
            if !self.propagate()? {
                if !self.backtrack() {
                    return Ok(self.unsat_result());
                }
                continue;
            }

            if let Some(lit) = self.pick_branch() {
                decisions += 1;
                if SolverConfig::exceeded(self.config.max_decisions, decisions) {
                    return Ok(SolverResult::Unknown(UnknownReason::ResourceLimit));
                }
                self.decide(lit);
                continue;
            }

            final_checks += 1;
            self.stats.final_checks += 1;
            if SolverConfig::exceeded(self.config.max_final_checks, final_checks) {
                return Ok(SolverResult::Unknown(UnknownReason::ResourceLimit));
            }
            let outcome = {
                let (strings, mut ctx) = self.plugin_and_context();
                strings.final_check(&mut ctx)
            };
            trace!(?outcome, level = self.trail_lim.len(), "final check");
            match outcome {
                FinalCheckResult::Sat => return self.sat_result(),
                FinalCheckResult::Continue => {
                    self.flush_axioms()?;
                }
                FinalCheckResult::Conflict => {
                    if !self.backtrack() {
                        return Ok(self.unsat_result());
                    }
                }
            }
        }
    }

    fn unsat_result(&self) -> SolverResult {
        if self.strings.is_incomplete() {
            SolverResult::Unknown(UnknownReason::LoopCut)
        } else {
            SolverResult::Unsat
        }
    }

    fn sat_result(&mut self) -> Result<SolverResult> {
        let model = match self.build_model() {
            Ok(model) => model,
            Err(StrzError::ModelIncomplete(msg)) => {
                debug!(%msg, "no model");
                return Ok(SolverResult::Unknown(UnknownReason::IncompleteModel));
            }
            Err(e) => return Err(e),
        };
        for &assertion in &self.assertions {
            if model.eval(&self.tm, assertion) != Some(Value::Bool(true)) {
                debug!(assertion = %self.tm.display(assertion), "model violates assertion");
                let reason = if self.lengths.gave_up() {
                    UnknownReason::Arithmetic
                } else {
                    UnknownReason::IncompleteModel
                };
                return Ok(SolverResult::Unknown(reason));
            }
        }
        self.model = Some(model);
        Ok(SolverResult::Sat)
    }

    // ===== Clause store =====

    fn atom_var(&mut self, atom: TermId) -> Result<Var> {
        if let Some(&var) = self.atom_vars.get(&atom) {
            return Ok(var);
        }
        let args = match self.tm.kind(atom) {
            Some(
                TermKind::Eq(a, b)
                | TermKind::Le(a, b)
                | TermKind::Lt(a, b)
                | TermKind::Ge(a, b)
                | TermKind::Gt(a, b),
            ) => Some((*a, *b)),
            _ => None,
        };
        if let Some((a, b)) = args {
            self.register_term(a)?;
            self.register_term(b)?;
        }
        let var = self.atoms.len() as Var;
        self.atoms.push(atom);
        self.assigns.push(None);
        self.assigned_at.push(0);
        self.watches.push(Vec::new());
        self.watches.push(Vec::new());
        self.atom_vars.insert(atom, var);
        if let Some((a, b)) = args {
            self.atom_uses.entry(a).or_default().push(var);
            if a != b {
                self.atom_uses.entry(b).or_default().push(var);
            }
            let equality = matches!(self.tm.kind(atom), Some(TermKind::Eq(..)));
            if !equality || self.tm.is_int_sort(a) {
                self.int_atoms.push(var);
            }
        }
        self.atom_queue.push(var);
        Ok(var)
    }

    fn add_clauses(&mut self, clauses: Vec<AtomClause>) -> Result<()> {
        for clause in clauses {
            let mut lits = Vec::with_capacity(clause.len());
            for AtomLit { atom, positive } in clause {
                lits.push(Lit::new(self.atom_var(atom)?, positive));
            }
            let ci = self.clauses.len();
            self.clauses.push(lits);
            self.watched.push([0, 0]);
            if !self.rewatch {
                let state = self.attach(ci);
                self.note_clause_state(state);
            }
        }
        Ok(())
    }

    /// Choose and register the watches of clause `ci` under the current
    /// assignment. True literals are preferred, then open ones, then false
    /// ones assigned most recently.
    fn attach(&mut self, ci: usize) -> ClauseState {
        let (first, second) = {
            let clause = &self.clauses[ci];
            let rank = |pos: usize| {
                let lit = clause[pos];
                let var = lit.var() as usize;
                match lit.value(self.assigns[var]) {
                    Some(true) => (0u8, 0usize),
                    None => (1, 0),
                    Some(false) => (2, usize::MAX - self.assigned_at[var]),
                }
            };
            let mut order: Vec<usize> = (0..clause.len()).collect();
            order.sort_by_key(|&pos| rank(pos));
            match order[..] {
                [] => return ClauseState::Conflict,
                [only] => {
                    return match self.value(clause[only]) {
                        Some(true) => ClauseState::Satisfied,
                        Some(false) => ClauseState::Conflict,
                        None => ClauseState::Unit(clause[only]),
                    };
                }
                [first, second, ..] => (first, second),
            }
        };
        self.watched[ci] = [first, second];
        let (l0, l1) = (self.clauses[ci][first], self.clauses[ci][second]);
        self.watches[(!l0).index()].push(ci);
        self.watches[(!l1).index()].push(ci);
        match (self.value(l0), self.value(l1)) {
            (Some(true), _) => ClauseState::Satisfied,
            (Some(false), _) => ClauseState::Conflict,
            (None, Some(false)) => ClauseState::Unit(l0),
            (None, _) => ClauseState::Open,
        }
    }

    fn note_clause_state(&mut self, state: ClauseState) {
        match state {
            ClauseState::Unit(lit) => self.pending_units.push(lit),
            ClauseState::Conflict => self.clause_conflict = true,
            ClauseState::Satisfied | ClauseState::Open => {}
        }
    }

    /// Rebuild every watch list for the current assignment.
    fn rewatch_all(&mut self) {
        for list in &mut self.watches {
            list.clear();
        }
        self.pending_units.clear();
        self.clause_conflict = false;
        self.prop_head = self.trail.len();
        for ci in 0..self.clauses.len() {
            let state = self.attach(ci);
            self.note_clause_state(state);
        }
        trace!(clauses = self.clauses.len(), "watches rebuilt");
    }

    /// Register a string or integer term with the e-graph, the length
    /// propagator and the plugin.
    fn register_term(&mut self, term: TermId) -> Result<()> {
        if self.egraph.contains(term) {
            return Ok(());
        }
        let before = self.egraph.len();
        if let Err(clash) = self.egraph.add_term(&self.tm, term, &mut self.merged) {
            debug!(lhs = %clash.lhs, rhs = %clash.rhs, "clash while registering");
            self.pending_clash = true;
        }
        let added = self.egraph.terms()[before..].to_vec();
        for t in added {
            match self.tm.sort_kind(t) {
                Some(SortKind::Int) => self.lengths.register(t),
                Some(SortKind::String) => {
                    let (strings, mut ctx) = self.plugin_and_context();
                    strings.internalize_term(&mut ctx, t)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn plugin_and_context(&mut self) -> (&mut StringSolver, HostContext<'_>) {
        let ctx = HostContext {
            tm: &mut self.tm,
            egraph: &self.egraph,
            lengths: &self.lengths,
            level: self.trail_lim.len(),
            axioms: &mut self.new_axioms,
        };
        (&mut self.strings, ctx)
    }

    /// Turn buffered plugin axioms into clauses. Returns true if any
    /// axiom was added.
    fn flush_axioms(&mut self) -> Result<bool> {
        let mut added = false;
        while !self.new_axioms.is_empty() {
            for axiom in std::mem::take(&mut self.new_axioms) {
                trace!(axiom = %self.tm.display(axiom), "theory axiom");
                let clauses = cnf::clausify(&self.tm, axiom)?;
                self.add_clauses(clauses)?;
                self.stats.axioms += 1;
                added = true;
            }
        }
        Ok(added)
    }

    // ===== Assignment and propagation =====

    fn value(&self, lit: Lit) -> Option<bool> {
        lit.value(self.assigns[lit.var() as usize])
    }

    fn assign(&mut self, lit: Lit) {
        let var = lit.var() as usize;
        debug_assert!(self.assigns[var].is_none());
        self.assigns[var] = Some(lit.is_positive());
        self.assigned_at[var] = self.trail.len();
        self.trail.push(lit);
    }

    /// Run every propagation to a fixpoint. Returns false on conflict.
    fn propagate(&mut self) -> Result<bool> {
        loop {
            if self.pending_clash {
                return Ok(false);
            }
            if self.egraph.needs_rebuild() && self.egraph.rebuild(&mut self.merged).is_err() {
                return Ok(false);
            }
            let mut progress = self.notify_merges();
            progress |= self.flush_axioms()?;

            match self.propagate_clauses() {
                Ok(assigned) => progress |= assigned,
                Err(Conflict) => return Ok(false),
            }
            if self.process_assignments().is_err() {
                return Ok(false);
            }
            progress |= self.notify_merges();
            match self.lengths.propagate(&self.tm, &self.egraph) {
                Ok(changed) => self.lengths_changed |= changed,
                Err(_) => return Ok(false),
            }

            let (strings, mut ctx) = self.plugin_and_context();
            if strings.can_propagate() {
                strings.propagate(&mut ctx);
            }
            progress |= self.flush_axioms()?;
            if self.pending_clash {
                return Ok(false);
            }

            progress |= self.propagate_atoms();
            if !progress {
                return Ok(true);
            }
        }
    }

    /// Unit propagation over the watch lists.
    fn propagate_clauses(&mut self) -> std::result::Result<bool, Conflict> {
        let start = self.trail.len();
        if std::mem::take(&mut self.rewatch) {
            self.rewatch_all();
        }
        if self.clause_conflict {
            return Err(Conflict);
        }
        for lit in std::mem::take(&mut self.pending_units) {
            match self.value(lit) {
                Some(true) => {}
                Some(false) => return Err(Conflict),
                None => {
                    self.assign(lit);
                    self.stats.propagations += 1;
                }
            }
        }
        while self.prop_head < self.trail.len() {
            let lit = self.trail[self.prop_head];
            self.prop_head += 1;
            self.visit_watches(lit)?;
        }
        Ok(self.trail.len() > start)
    }

    /// `lit` became true: move the watches of clauses watching `!lit`, and
    /// assign the other watch of clauses left with no replacement.
    fn visit_watches(&mut self, lit: Lit) -> std::result::Result<(), Conflict> {
        let falsified = !lit;
        let watching = std::mem::take(&mut self.watches[lit.index()]);
        let mut kept = Vec::with_capacity(watching.len());
        let mut conflict = false;
        for ci in watching {
            if conflict {
                kept.push(ci);
                continue;
            }
            let [w0, w1] = self.watched[ci];
            let (slot, other) = if self.clauses[ci][w0] == falsified {
                (0, self.clauses[ci][w1])
            } else if self.clauses[ci][w1] == falsified {
                (1, self.clauses[ci][w0])
            } else {
                continue;
            };
            if self.value(other) == Some(true) {
                kept.push(ci);
                continue;
            }
            let replacement = (0..self.clauses[ci].len())
                .filter(|&pos| pos != w0 && pos != w1)
                .find(|&pos| self.value(self.clauses[ci][pos]) != Some(false));
            if let Some(pos) = replacement {
                self.watched[ci][slot] = pos;
                let watch = !self.clauses[ci][pos];
                self.watches[watch.index()].push(ci);
                continue;
            }
            kept.push(ci);
            if self.value(other) == Some(false) {
                conflict = true;
            } else {
                self.assign(other);
                self.stats.propagations += 1;
            }
        }
        self.watches[lit.index()].extend(kept);
        if conflict {
            return Err(Conflict);
        }
        Ok(())
    }

    /// Hand newly assigned atoms to the e-graph and the length propagator.
    fn process_assignments(&mut self) -> std::result::Result<(), Conflict> {
        while self.theory_head < self.trail.len() {
            let lit = self.trail[self.theory_head];
            self.theory_head += 1;
            let atom = self.atoms[lit.var() as usize];
            let positive = lit.is_positive();
            let Some(kind) = self.tm.kind(atom).cloned() else {
                continue;
            };
            match kind {
                TermKind::Eq(a, b) if positive => {
                    if let Err(clash) = self.egraph.merge(a, b, &mut self.merged) {
                        debug!(lhs = %clash.lhs, rhs = %clash.rhs, "merge clash");
                        return Err(Conflict);
                    }
                }
                TermKind::Eq(a, b) => {
                    if self.egraph.add_diseq(a, b).is_err() {
                        return Err(Conflict);
                    }
                    self.touched.push(a);
                    self.touched.push(b);
                    if self.tm.is_string_sort(a) {
                        let (strings, mut ctx) = self.plugin_and_context();
                        strings.new_diseq(&mut ctx, a, b);
                    }
                }
                TermKind::Le(a, b) => self.lengths.add_constraint(if positive {
                    LengthConstraint::LessEq(a, b)
                } else {
                    LengthConstraint::Less(b, a)
                }),
                TermKind::Lt(a, b) => self.lengths.add_constraint(if positive {
                    LengthConstraint::Less(a, b)
                } else {
                    LengthConstraint::LessEq(b, a)
                }),
                TermKind::Ge(a, b) => self.lengths.add_constraint(if positive {
                    LengthConstraint::LessEq(b, a)
                } else {
                    LengthConstraint::Less(a, b)
                }),
                TermKind::Gt(a, b) => self.lengths.add_constraint(if positive {
                    LengthConstraint::Less(b, a)
                } else {
                    LengthConstraint::LessEq(a, b)
                }),
                _ => {}
            }
        }
        Ok(())
    }

    /// Report unions to the plugin. Returns true if there were any.
    fn notify_merges(&mut self) -> bool {
        if self.merged.is_empty() {
            return false;
        }
        let merged = std::mem::take(&mut self.merged);
        let (strings, mut ctx) = self.plugin_and_context();
        for &(a, b) in &merged {
            strings.new_eq(&mut ctx, a, b);
        }
        self.touched.extend(merged.iter().flat_map(|&(a, b)| [a, b]));
        true
    }

    /// Assign atoms whose truth the e-graph or the length domains fix.
    fn propagate_atoms(&mut self) -> bool {
        let mut fixed = Vec::new();
        for var in self.atom_candidates() {
            if self.assigns[var as usize].is_some() {
                continue;
            }
            if let Some(truth) = self.atom_truth(self.atoms[var as usize]) {
                fixed.push(Lit::new(var, truth));
            }
        }
        self.stats.theory_propagations += fixed.len() as u64;
        let progress = !fixed.is_empty();
        for lit in fixed {
            self.assign(lit);
        }
        progress
    }

    /// Atoms whose truth may have changed since the last round, in
    /// variable order.
    fn atom_candidates(&mut self) -> Vec<Var> {
        let touched = std::mem::take(&mut self.touched);
        let mut candidates = std::mem::take(&mut self.atom_queue);
        let lengths_changed = std::mem::take(&mut self.lengths_changed);
        if std::mem::take(&mut self.rescan_atoms) {
            return (0..self.atoms.len() as Var).collect();
        }
        if lengths_changed {
            candidates.extend_from_slice(&self.int_atoms);
        }
        let mut roots = FxHashSet::default();
        for term in touched {
            let root = self.egraph.root(term);
            if !roots.insert(root) {
                continue;
            }
            for member in self.egraph.members(root) {
                if let Some(vars) = self.atom_uses.get(&member) {
                    candidates.extend_from_slice(vars);
                }
            }
        }
        candidates.sort_unstable();
        candidates.dedup();
        candidates
    }

    fn atom_truth(&self, atom: TermId) -> Option<bool> {
        match self.tm.kind(atom) {
            Some(TermKind::Eq(a, b)) => {
                let (a, b) = (*a, *b);
                if self.egraph.are_equal(a, b) {
                    Some(true)
                } else if self.egraph.are_disequal(a, b)
                    || (self.tm.is_int_sort(a) && self.lengths.disjoint(&self.egraph, a, b))
                {
                    Some(false)
                } else {
                    None
                }
            }
            Some(TermKind::Le(a, b)) => self.lengths.decide_le(&self.egraph, *a, *b, false),
            Some(TermKind::Lt(a, b)) => self.lengths.decide_le(&self.egraph, *a, *b, true),
            Some(TermKind::Ge(a, b)) => self.lengths.decide_le(&self.egraph, *b, *a, false),
            Some(TermKind::Gt(a, b)) => self.lengths.decide_le(&self.egraph, *b, *a, true),
            _ => None,
        }
    }

    // ===== Decisions and backtracking =====

    /// First open literal of the first clause not yet satisfied.
    fn pick_branch(&self) -> Option<Lit> {
        self.clauses
            .iter()
            .filter(|clause| !clause.iter().any(|&l| self.value(l) == Some(true)))
            .find_map(|clause| clause.iter().copied().find(|&l| self.value(l).is_none()))
    }

    fn open_level(&mut self) {
        self.trail_lim.push(self.trail.len());
        self.egraph.push_scope();
        self.lengths.push_scope();
        self.strings.push_scope();
        self.stats.max_level = self.stats.max_level.max(self.trail_lim.len());
    }

    fn pop_level(&mut self) {
        let Some(start) = self.trail_lim.pop() else {
            return;
        };
        for lit in self.trail.drain(start..) {
            self.assigns[lit.var() as usize] = None;
        }
        self.theory_head = self.theory_head.min(self.trail.len());
        self.prop_head = self.prop_head.min(self.trail.len());
        self.egraph.pop_scope(1);
        self.lengths.pop_scope(1);
        self.strings.pop_scope(1);
        self.merged.clear();
        self.touched.clear();
        self.pending_clash = false;
        self.rewatch = true;
        self.rescan_atoms = true;
    }

    fn decide(&mut self, lit: Lit) {
        self.stats.decisions += 1;
        self.open_level();
        trace!(%lit, atom = %self.tm.display(self.atoms[lit.var() as usize]), "decide");
        self.decisions.push(Decision {
            lit,
            flipped: false,
        });
        self.assign(lit);
    }

    /// Flip the most recent decision not flipped yet. Returns false if
    /// there is none.
    fn backtrack(&mut self) -> bool {
        self.stats.conflicts += 1;
        while let Some(decision) = self.decisions.pop() {
            self.pop_level();
            if !decision.flipped {
                let lit = !decision.lit;
                debug!(%lit, level = self.trail_lim.len() + 1, "flip decision");
                self.open_level();
                self.decisions.push(Decision { lit, flipped: true });
                self.assign(lit);
                return true;
            }
        }
        false
    }

    fn backtrack_to_base(&mut self) {
        while !self.trail_lim.is_empty() {
            self.pop_level();
        }
        self.decisions.clear();
    }

    // ===== Models =====

    fn build_model(&mut self) -> Result<Model> {
        let theory_model = {
            let (strings, mut ctx) = self.plugin_and_context();
            strings.init_model(&mut ctx);
            strings.finalize_model(&mut ctx)?
        };

        let mut model = Model::new();
        for var in self.user_constants() {
            match self.tm.sort_kind(var) {
                Some(SortKind::String) => {
                    let text = theory_model
                        .get(var)
                        .and_then(|v| self.tm.string_lit(v))
                        .ok_or_else(|| {
                            StrzError::model_incomplete(format!(
                                "no value for {}",
                                self.tm.display(var)
                            ))
                        })?;
                    model.assign_string(var, text.to_string());
                }
                Some(SortKind::Int) => {
                    let value = self.int_value(&theory_model, var, 0);
                    model.assign_int(var, value);
                }
                Some(SortKind::Bool) => {
                    let value = self
                        .atom_vars
                        .get(&var)
                        .and_then(|&v| self.assigns[v as usize])
                        .unwrap_or(false);
                    model.assign_bool(var, value);
                }
                None => return Err(StrzError::UnknownTerm(var.raw())),
            }
        }
        Ok(model)
    }

    /// Free constants of the assertions.
    fn user_constants(&self) -> Vec<TermId> {
        let mut seen = FxHashSet::default();
        let mut out = Vec::new();
        let mut stack: Vec<TermId> = self.assertions.clone();
        while let Some(term) = stack.pop() {
            if !seen.insert(term) {
                continue;
            }
            if matches!(self.tm.kind(term), Some(TermKind::Var(_))) {
                out.push(term);
            }
            stack.extend(self.tm.children(term));
        }
        out.sort();
        out
    }

    /// Value of an integer class: read off a constant, a length or a sum
    /// in the class, else the smallest value of its domain.
    fn int_value(&self, theory_model: &TheoryModel, term: TermId, depth: usize) -> i64 {
        const MAX_DEPTH: usize = 4;
        for member in self.egraph.members(term) {
            match self.tm.kind(member) {
                Some(TermKind::IntConst(n)) => return *n,
                Some(TermKind::StrLen(s)) => {
                    if let Some(text) = theory_model.get(*s).and_then(|v| self.tm.string_lit(v)) {
                        return text.chars().count() as i64;
                    }
                }
                Some(TermKind::Add(args)) if depth < MAX_DEPTH => {
                    return args.iter().fold(0i64, |acc, &arg| {
                        acc.saturating_add(self.int_value(theory_model, arg, depth + 1))
                    });
                }
                _ => {}
            }
        }
        self.lengths
            .get_domain(&self.egraph, term)
            .pick()
            .unwrap_or(0)
    }
}

impl Default for Solver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn str_var(solver: &mut Solver, name: &str) -> TermId {
        let tm = solver.terms_mut();
        let sort = tm.sorts.string_sort;
        tm.mk_var(name, sort)
    }

    fn bool_var(solver: &mut Solver, name: &str) -> TermId {
        let tm = solver.terms_mut();
        let sort = tm.sorts.bool_sort;
        tm.mk_var(name, sort)
    }

    #[test]
    fn test_empty_problem_is_sat() {
        let mut solver = Solver::new();
        assert_eq!(solver.check().expect("check"), SolverResult::Sat);
        assert!(solver.model().is_some_and(Model::is_empty));
    }

    #[test]
    fn test_false_is_unsat() {
        let mut solver = Solver::new();
        let f = solver.terms().mk_false();
        solver.assert(f).expect("bool");
        assert_eq!(solver.check().expect("check"), SolverResult::Unsat);
        assert!(solver.model().is_none());
    }

    #[test]
    fn test_assert_rejects_non_boolean() {
        let mut solver = Solver::new();
        let x = str_var(&mut solver, "x");
        assert!(solver.assert(x).is_err());
    }

    #[test]
    fn test_boolean_search_flips_decisions() {
        let mut solver = Solver::new();
        let tm = solver.terms_mut();
        let sort = tm.sorts.bool_sort;
        let p = tm.mk_var("p", sort);
        let q = tm.mk_var("q", sort);
        let not_p = tm.mk_not(p);
        let or = tm.mk_or([p, q]);
        let implies = tm.mk_implies(p, not_p);
        solver.assert(or).expect("bool");
        solver.assert(implies).expect("bool");

        assert_eq!(solver.check().expect("check"), SolverResult::Sat);
        let model = solver.model().expect("model");
        assert!(!model.bool_value(p));
        assert!(model.bool_value(q));
    }

    #[test]
    fn test_implication_chain_needs_no_decision() {
        let mut solver = Solver::new();
        let vars: Vec<TermId> = (0..6)
            .map(|i| bool_var(&mut solver, &format!("p{i}")))
            .collect();
        solver.assert(vars[0]).expect("bool");
        for pair in vars.windows(2) {
            let step = solver.terms_mut().mk_implies(pair[0], pair[1]);
            solver.assert(step).expect("bool");
        }

        assert_eq!(solver.check().expect("check"), SolverResult::Sat);
        assert_eq!(solver.stats().decisions, 0);
        assert!(solver.stats().propagations >= 6);
        let model = solver.model().expect("model");
        assert!(vars.iter().all(|&v| model.bool_value(v)));
    }

    #[test]
    fn test_clause_added_after_check_sees_assignment() {
        let mut solver = Solver::new();
        let p = bool_var(&mut solver, "p");
        let q = bool_var(&mut solver, "q");
        solver.assert(p).expect("bool");
        assert_eq!(solver.check().expect("check"), SolverResult::Sat);

        let implies = solver.terms_mut().mk_implies(p, q);
        solver.assert(implies).expect("bool");
        assert_eq!(solver.check().expect("check"), SolverResult::Sat);
        assert_eq!(solver.stats().decisions, 0);
        assert!(solver.model().is_some_and(|m| m.bool_value(q)));

        let not_q = solver.terms_mut().mk_not(q);
        solver.assert(not_q).expect("bool");
        assert_eq!(solver.check().expect("check"), SolverResult::Unsat);
    }

    #[test]
    fn test_units_rederived_after_backtrack() {
        let mut solver = Solver::new();
        let p = bool_var(&mut solver, "p");
        let q = bool_var(&mut solver, "q");
        let r = bool_var(&mut solver, "r");
        let s = bool_var(&mut solver, "s");
        let tm = solver.terms_mut();
        let not_p = tm.mk_not(p);
        let not_q = tm.mk_not(q);
        let not_r = tm.mk_not(r);
        let clauses = [
            tm.mk_or([p, q]),
            tm.mk_or([not_p, r]),
            tm.mk_or([not_p, not_r]),
            tm.mk_or([not_q, s]),
        ];
        for clause in clauses {
            solver.assert(clause).expect("bool");
        }

        assert_eq!(solver.check().expect("check"), SolverResult::Sat);
        assert!(solver.stats().conflicts >= 1);
        let model = solver.model().expect("model");
        assert!(!model.bool_value(p));
        assert!(model.bool_value(q));
        assert!(model.bool_value(s));
    }

    #[test]
    fn test_merged_class_fixes_atom() {
        let mut solver = Solver::new();
        let x = str_var(&mut solver, "x");
        let y = str_var(&mut solver, "y");
        let p = bool_var(&mut solver, "p");
        let tm = solver.terms_mut();
        let ab = tm.mk_string_lit("ab");
        let cd = tm.mk_string_lit("cd");
        let x_ab = tm.mk_eq(x, ab);
        let y_x = tm.mk_eq(y, x);
        let y_cd = tm.mk_eq(y, cd);
        let either = tm.mk_or([y_cd, p]);
        for f in [x_ab, y_x, either] {
            solver.assert(f).expect("bool");
        }

        assert_eq!(solver.check().expect("check"), SolverResult::Sat);
        assert!(solver.stats().theory_propagations >= 1);
        assert!(solver.model().is_some_and(|m| m.bool_value(p)));
    }

    #[test]
    fn test_length_domain_fixes_comparison() {
        let mut solver = Solver::new();
        let x = str_var(&mut solver, "x");
        let p = bool_var(&mut solver, "p");
        let tm = solver.terms_mut();
        let len = tm.mk_str_len(x);
        let two = tm.mk_int(2);
        let three = tm.mk_int(3);
        let len_three = tm.mk_eq(len, three);
        let short = tm.mk_le(len, two);
        let either = tm.mk_or([short, p]);
        solver.assert(len_three).expect("bool");
        solver.assert(either).expect("bool");

        assert_eq!(solver.check().expect("check"), SolverResult::Sat);
        assert!(solver.model().is_some_and(|m| m.bool_value(p)));
        assert_eq!(solver.model().and_then(|m| m.string_value(x)).map(str::len), Some(3));
    }

    #[test]
    fn test_string_equalities_through_egraph() {
        let mut solver = Solver::new();
        let x = str_var(&mut solver, "x");
        let y = str_var(&mut solver, "y");
        let tm = solver.terms_mut();
        let ab = tm.mk_string_lit("ab");
        let cd = tm.mk_string_lit("cd");
        let x_ab = tm.mk_eq(x, ab);
        let x_y = tm.mk_eq(x, y);
        let y_cd = tm.mk_eq(y, cd);
        solver.assert(x_ab).expect("bool");
        solver.assert(x_y).expect("bool");
        assert_eq!(solver.check().expect("check"), SolverResult::Sat);
        assert_eq!(solver.model().and_then(|m| m.string_value(y)), Some("ab"));

        solver.assert(y_cd).expect("bool");
        assert_eq!(solver.check().expect("check"), SolverResult::Unsat);
    }

    #[test]
    fn test_length_bound_conflict() {
        let mut solver = Solver::new();
        let x = str_var(&mut solver, "x");
        let tm = solver.terms_mut();
        let abc = tm.mk_string_lit("abc");
        let len = tm.mk_str_len(x);
        let two = tm.mk_int(2);
        let eq = tm.mk_eq(x, abc);
        let le = tm.mk_le(len, two);
        solver.assert(eq).expect("bool");
        solver.assert(le).expect("bool");
        assert_eq!(solver.check().expect("check"), SolverResult::Unsat);
    }

    #[test]
    fn test_decision_limit() {
        let config = SolverConfig::default().with_limits(0, 1);
        let mut solver = Solver::with_config(config);
        let tm = solver.terms_mut();
        let sort = tm.sorts.bool_sort;
        let vars: Vec<TermId> = ["p", "q", "r", "s"]
            .iter()
            .map(|n| tm.mk_var(n, sort))
            .collect();
        let first = tm.mk_or([vars[0], vars[1]]);
        let second = tm.mk_or([vars[2], vars[3]]);
        solver.assert(first).expect("bool");
        solver.assert(second).expect("bool");
        assert_eq!(
            solver.check().expect("check"),
            SolverResult::Unknown(UnknownReason::ResourceLimit)
        );
    }

    #[test]
    fn test_reset_keeps_terms() {
        let mut solver = Solver::new();
        let f = solver.terms().mk_false();
        let x = str_var(&mut solver, "x");
        solver.assert(f).expect("bool");
        solver.reset();
        assert_eq!(solver.num_clauses(), 0);
        assert_eq!(solver.terms().lookup_var("x"), Some(x));
        assert_eq!(solver.check().expect("check"), SolverResult::Sat);
    }

    #[test]
    fn test_result_display() {
        assert_eq!(SolverResult::Sat.to_string(), "sat");
        assert_eq!(
            SolverResult::Unknown(UnknownReason::LoopCut).to_string(),
            "unknown (loop cut)"
        );
    }
}
