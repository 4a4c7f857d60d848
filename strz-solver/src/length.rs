//! Interval propagation over integer classes.
//!
//! Integer terms are string lengths, constants, sums and integer variables.
//! Each e-graph class of such terms gets a domain `[min, max]`, refined
//! from:
//!
//! - constants (`n` is `[n, n]`), lengths (`[0, ∞)`, or exact when the
//!   string class holds a literal)
//! - sums, in both directions (`a + b` from `a` and `b`, and each operand
//!   from the sum and the other operands)
//! - asserted comparisons `a <= b` and `a < b`
//! - asserted disequalities, which shave a bound equal to a fixed value
//!
//! Domains are recomputed from scratch on every call to
//! [`LengthPropagator::propagate`], so backtracking only has to drop
//! constraints.

use crate::egraph::EGraph;
use rustc_hash::{FxHashMap, FxHashSet};
use strz_core::ast::{TermId, TermKind, TermManager};
use tracing::{debug, trace};

/// Refinement rounds before propagation gives up on a fixpoint.
const MAX_ROUNDS: usize = 64;

/// Domain of an integer class (possible value range).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthDomain {
    /// Minimum possible value (inclusive). `i64::MIN` means unbounded.
    pub min: i64,
    /// Maximum possible value (inclusive, None = unbounded).
    pub max: Option<i64>,
}

impl LengthDomain {
    /// Domain of a string length, [0, ∞).
    pub fn unbounded() -> Self {
        Self { min: 0, max: None }
    }

    /// Domain of an arbitrary integer, (-∞, ∞).
    pub fn full() -> Self {
        Self {
            min: i64::MIN,
            max: None,
        }
    }

    /// Create a point domain [n, n].
    pub fn point(n: i64) -> Self {
        Self {
            min: n,
            max: Some(n),
        }
    }

    /// Create a bounded domain [min, max].
    pub fn bounded(min: i64, max: i64) -> Self {
        Self {
            min,
            max: Some(max),
        }
    }

    /// Check if domain is empty (inconsistent).
    pub fn is_empty(&self) -> bool {
        self.max.is_some_and(|max| max < self.min)
    }

    /// The single value of a point domain.
    pub fn as_point(&self) -> Option<i64> {
        self.max.filter(|&max| max == self.min)
    }

    /// Check whether `value` lies in the domain.
    pub fn contains(&self, value: i64) -> bool {
        self.min <= value && self.max.is_none_or(|max| value <= max)
    }

    /// Intersect with another domain.
    pub fn intersect(&self, other: &LengthDomain) -> LengthDomain {
        let max = match (self.max, other.max) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        LengthDomain {
            min: self.min.max(other.min),
            max,
        }
    }

    /// Domain of `x + y` for `x` in `self` and `y` in `other`.
    pub fn plus(&self, other: &LengthDomain) -> LengthDomain {
        let min = if self.min == i64::MIN || other.min == i64::MIN {
            i64::MIN
        } else {
            self.min.saturating_add(other.min)
        };
        let max = match (self.max, other.max) {
            (Some(a), Some(b)) => Some(a.saturating_add(b)),
            _ => None,
        };
        LengthDomain { min, max }
    }

    /// Domain of `x - y` for `x` in `self` and `y` in `other`.
    pub fn minus(&self, other: &LengthDomain) -> LengthDomain {
        let min = match other.max {
            Some(b) if self.min != i64::MIN => self.min.saturating_sub(b),
            _ => i64::MIN,
        };
        let max = match self.max {
            Some(a) if other.min != i64::MIN => Some(a.saturating_sub(other.min)),
            _ => None,
        };
        LengthDomain { min, max }
    }

    /// Some value of the domain, preferring the smallest.
    pub fn pick(&self) -> Option<i64> {
        if self.is_empty() {
            return None;
        }
        if self.min != i64::MIN {
            return Some(self.min);
        }
        Some(self.max.map_or(0, |max| max.min(0)))
    }
}

/// Comparison between two integer terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthConstraint {
    /// lhs <= rhs
    LessEq(TermId, TermId),
    /// lhs < rhs
    Less(TermId, TermId),
}

impl LengthConstraint {
    fn parts(self) -> (TermId, TermId, i64) {
        match self {
            LengthConstraint::LessEq(a, b) => (a, b, 0),
            LengthConstraint::Less(a, b) => (a, b, 1),
        }
    }
}

/// A class whose domain became empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthConflict {
    /// Representative of the class.
    pub root: TermId,
}

/// Statistics for length propagation.
#[derive(Debug, Clone, Default)]
pub struct LengthPropStats {
    /// Number of domain refinements.
    pub domain_refinements: u64,
    /// Number of length conflicts detected.
    pub length_conflicts: u64,
    /// Propagation calls.
    pub propagations: u64,
    /// Calls that hit the round limit before a fixpoint.
    pub saturations: u64,
}

/// Integer interval propagator.
#[derive(Debug, Default)]
pub struct LengthPropagator {
    /// Domains keyed by class representative.
    domains: FxHashMap<TermId, LengthDomain>,
    int_terms: Vec<TermId>,
    seen: FxHashSet<TermId>,
    constraints: Vec<LengthConstraint>,
    scopes: Vec<usize>,
    gave_up: bool,
    stats: LengthPropStats,
}

impl LengthPropagator {
    /// Create a new length propagator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get statistics.
    pub fn stats(&self) -> &LengthPropStats {
        &self.stats
    }

    /// Track an integer term.
    pub fn register(&mut self, term: TermId) {
        if self.seen.insert(term) {
            self.int_terms.push(term);
        }
    }

    /// Add a comparison for the current scope.
    pub fn add_constraint(&mut self, constraint: LengthConstraint) {
        trace!(?constraint, "length constraint");
        self.constraints.push(constraint);
    }

    /// Open a backtracking scope.
    pub fn push_scope(&mut self) {
        self.scopes.push(self.constraints.len());
    }

    /// Drop the constraints of the last `num_scopes` scopes. Domains are
    /// stale until the next [`LengthPropagator::propagate`].
    pub fn pop_scope(&mut self, num_scopes: usize) {
        for _ in 0..num_scopes {
            if let Some(len) = self.scopes.pop() {
                self.constraints.truncate(len);
            }
        }
        self.domains.clear();
    }

    /// Check whether some propagation stopped short of a fixpoint.
    pub fn gave_up(&self) -> bool {
        self.gave_up
    }

    /// Get the domain of the class of `term`.
    pub fn get_domain(&self, egraph: &EGraph, term: TermId) -> LengthDomain {
        self.domains
            .get(&egraph.root(term))
            .cloned()
            .unwrap_or_else(LengthDomain::full)
    }

    /// Intersect the domain of class `root` with `domain`.
    ///
    /// Returns true if the domain shrank.
    fn refine(&mut self, root: TermId, domain: LengthDomain) -> bool {
        let current = self
            .domains
            .get(&root)
            .cloned()
            .unwrap_or_else(LengthDomain::full);
        let refined = current.intersect(&domain);
        if refined == current {
            return false;
        }
        self.stats.domain_refinements += 1;
        self.domains.insert(root, refined);
        true
    }

    /// Remove `value` from the domain of `root` if it is a bound.
    fn exclude(&mut self, root: TermId, value: i64) -> bool {
        let Some(mut domain) = self.domains.get(&root).cloned() else {
            return false;
        };
        let mut changed = false;
        if domain.min == value {
            domain.min = value.saturating_add(1);
            changed = true;
        }
        if domain.max == Some(value) {
            domain.max = Some(value.saturating_sub(1));
            changed = true;
        }
        if changed {
            self.stats.domain_refinements += 1;
            self.domains.insert(root, domain);
        }
        changed
    }

    fn base_domain(tm: &TermManager, egraph: &EGraph, term: TermId) -> LengthDomain {
        match tm.kind(term) {
            Some(TermKind::IntConst(n)) => LengthDomain::point(*n),
            Some(TermKind::StrLen(s)) => egraph
                .value(*s)
                .and_then(|v| tm.string_lit(v))
                .map_or_else(LengthDomain::unbounded, |text| {
                    LengthDomain::point(text.chars().count() as i64)
                }),
            _ => LengthDomain::full(),
        }
    }

    /// Recompute all domains for the current classes and constraints.
    ///
    /// Returns true if some domain differs from the previous call.
    pub fn propagate(
        &mut self,
        tm: &TermManager,
        egraph: &EGraph,
    ) -> Result<bool, LengthConflict> {
        self.stats.propagations += 1;
        let previous = std::mem::take(&mut self.domains);
        for i in 0..self.int_terms.len() {
            let term = self.int_terms[i];
            let base = Self::base_domain(tm, egraph, term);
            self.refine(egraph.root(term), base);
        }

        for _ in 0..MAX_ROUNDS {
            let mut changed = false;

            for i in 0..self.int_terms.len() {
                let term = self.int_terms[i];
                if let Some(TermKind::Add(args)) = tm.kind(term) {
                    changed |= self.propagate_sum(egraph, term, args);
                }
            }

            for i in 0..self.constraints.len() {
                let (lhs, rhs, gap) = self.constraints[i].parts();
                let dl = self.get_domain(egraph, lhs);
                let dr = self.get_domain(egraph, rhs);
                let upper = LengthDomain {
                    min: i64::MIN,
                    max: dr.max.map(|m| m.saturating_sub(gap)),
                };
                let lower = LengthDomain {
                    min: if dl.min == i64::MIN {
                        i64::MIN
                    } else {
                        dl.min.saturating_add(gap)
                    },
                    max: None,
                };
                changed |= self.refine(egraph.root(lhs), upper);
                changed |= self.refine(egraph.root(rhs), lower);
            }

            for &(a, b) in egraph.disequalities() {
                if !tm.is_int_sort(a) {
                    continue;
                }
                if let Some(p) = self.get_domain(egraph, a).as_point() {
                    changed |= self.exclude(egraph.root(b), p);
                }
                if let Some(p) = self.get_domain(egraph, b).as_point() {
                    changed |= self.exclude(egraph.root(a), p);
                }
            }

            if let Some((&root, _)) = self.domains.iter().find(|(_, d)| d.is_empty()) {
                self.stats.length_conflicts += 1;
                debug!(root = %root, "empty integer domain");
                return Err(LengthConflict { root });
            }
            if !changed {
                return Ok(self.domains != previous);
            }
        }

        self.stats.saturations += 1;
        self.gave_up = true;
        debug!("interval propagation stopped before a fixpoint");
        Ok(self.domains != previous)
    }

    fn propagate_sum(&mut self, egraph: &EGraph, sum: TermId, args: &[TermId]) -> bool {
        let domains: Vec<LengthDomain> =
            args.iter().map(|&a| self.get_domain(egraph, a)).collect();
        let total = domains
            .iter()
            .fold(LengthDomain::point(0), |acc, d| acc.plus(d));
        let mut changed = self.refine(egraph.root(sum), total);

        let sum_domain = self.get_domain(egraph, sum);
        for (i, &arg) in args.iter().enumerate() {
            let others = domains
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .fold(LengthDomain::point(0), |acc, (_, d)| acc.plus(d));
            changed |= self.refine(egraph.root(arg), sum_domain.minus(&others));
        }
        changed
    }

    /// Truth value of `lhs <= rhs` (or `<` if `strict`) forced by the
    /// current domains.
    pub fn decide_le(
        &self,
        egraph: &EGraph,
        lhs: TermId,
        rhs: TermId,
        strict: bool,
    ) -> Option<bool> {
        let gap = i64::from(strict);
        let dl = self.get_domain(egraph, lhs);
        let dr = self.get_domain(egraph, rhs);
        if let Some(max) = dl.max
            && dr.min != i64::MIN
            && max.saturating_add(gap) <= dr.min
        {
            return Some(true);
        }
        if let Some(max) = dr.max
            && dl.min != i64::MIN
            && dl.min.saturating_add(gap) > max
        {
            return Some(false);
        }
        None
    }

    /// Check whether the domains of two classes are disjoint.
    pub fn disjoint(&self, egraph: &EGraph, a: TermId, b: TermId) -> bool {
        self.get_domain(egraph, a)
            .intersect(&self.get_domain(egraph, b))
            .is_empty()
    }

    /// Clear all domains, terms and constraints.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
