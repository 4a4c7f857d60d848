//! Theory plugin contract for the DPLL(T) host.
//!
//! A theory plugin never owns the equivalence classes or the clause store.
//! The host hands it a [`TheoryContext`] on every callback; the plugin
//! queries class information through it and proposes new facts with
//! [`TheoryContext::assert_axiom`].

use crate::ast::{TermId, TermManager};
use crate::error::Result;
use rustc_hash::FxHashMap;

/// Outcome of a final consistency check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalCheckResult {
    /// The theory has no objection to the current branch.
    Sat,
    /// New axioms were asserted; the host must propagate and check again.
    Continue,
    /// The current branch is inconsistent for the theory.
    Conflict,
}

/// Services the host offers to a theory plugin during a callback.
pub trait TheoryContext {
    /// Shared term manager.
    fn terms(&self) -> &TermManager;

    /// Shared term manager, for building axiom terms.
    fn terms_mut(&mut self) -> &mut TermManager;

    /// Current decision level (0 = no decisions).
    fn scope_level(&self) -> usize;

    /// Representative of the equivalence class of `term`.
    fn root(&self, term: TermId) -> TermId;

    /// All terms currently in the class of `term` (including itself).
    fn eqc_members(&self, term: TermId) -> Vec<TermId>;

    /// Check whether two terms are currently forced equal.
    fn are_equal(&self, a: TermId, b: TermId) -> bool {
        self.root(a) == self.root(b)
    }

    /// Check whether two terms are currently forced disequal.
    fn are_disequal(&self, a: TermId, b: TermId) -> bool;

    /// Bounds `[min, max]` currently known for `len(term)`.
    fn length_bounds(&self, term: TermId) -> (i64, Option<i64>);

    /// Value of `len(term)` if it is fixed.
    fn length_value(&self, term: TermId) -> Option<i64> {
        match self.length_bounds(term) {
            (min, Some(max)) if min == max => Some(min),
            _ => None,
        }
    }

    /// Add a valid formula to the host's clause store.
    fn assert_axiom(&mut self, fact: TermId);

    /// Add `premise -> conclusion` to the host's clause store.
    fn assert_implication(&mut self, premise: TermId, conclusion: TermId) {
        let axiom = self.terms_mut().mk_implies(premise, conclusion);
        self.assert_axiom(axiom);
    }
}

/// Core trait for theory plugins in DPLL(T).
///
/// The host calls these methods at fixed extension points. All of them run
/// to completion synchronously; the host guarantees no two calls overlap.
pub trait Theory {
    /// Name of the theory (e.g. "strings").
    fn name(&self) -> &str;

    /// Drop every piece of state, including counters and caches.
    fn reset(&mut self);

    /// Register a term of the theory's sort.
    ///
    /// Fails if the term is not well sorted for this theory.
    fn internalize_term(&mut self, ctx: &mut dyn TheoryContext, term: TermId) -> Result<()>;

    /// Two terms were merged into one class.
    fn new_eq(&mut self, ctx: &mut dyn TheoryContext, lhs: TermId, rhs: TermId);

    /// Two terms were asserted disequal.
    fn new_diseq(&mut self, ctx: &mut dyn TheoryContext, lhs: TermId, rhs: TermId);

    /// A decision level was opened.
    fn push_scope(&mut self);

    /// `num_scopes` decision levels were closed.
    fn pop_scope(&mut self, num_scopes: usize);

    /// Check whether [`Theory::propagate`] has pending work.
    fn can_propagate(&self) -> bool;

    /// Perform cheap propagation. Returns true if anything was asserted.
    fn propagate(&mut self, ctx: &mut dyn TheoryContext) -> bool;

    /// Exhaustive check once the host reached a propagation fixpoint.
    fn final_check(&mut self, ctx: &mut dyn TheoryContext) -> FinalCheckResult;

    /// Prepare model construction for the current branch.
    fn init_model(&mut self, _ctx: &mut dyn TheoryContext) {}

    /// Literal value of a term, or `None` if not (yet) known.
    fn value_for(&mut self, ctx: &mut dyn TheoryContext, term: TermId) -> Result<Option<TermId>>;

    /// Assign a literal to every class of the theory.
    fn finalize_model(&mut self, ctx: &mut dyn TheoryContext) -> Result<TheoryModel>;

    /// Check whether the theory dropped cases, making "unsat" unreliable.
    fn is_incomplete(&self) -> bool {
        false
    }
}

/// Model produced by a theory plugin.
#[derive(Debug, Clone, Default)]
pub struct TheoryModel {
    /// Term -> literal value term.
    pub assignments: FxHashMap<TermId, TermId>,
}

impl TheoryModel {
    /// Create an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a value.
    pub fn assign(&mut self, term: TermId, value: TermId) {
        self.assignments.insert(term, value);
    }

    /// Value of a term.
    pub fn get(&self, term: TermId) -> Option<TermId> {
        self.assignments.get(&term).copied()
    }

    /// Check if a term has a value.
    pub fn contains(&self, term: TermId) -> bool {
        self.assignments.contains_key(&term)
    }

    /// Number of assignments.
    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    /// Check if the model is empty.
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedContext {
        tm: TermManager,
        axioms: Vec<TermId>,
    }

    impl TheoryContext for FixedContext {
        fn terms(&self) -> &TermManager {
            &self.tm
        }

        fn terms_mut(&mut self) -> &mut TermManager {
            &mut self.tm
        }

        fn scope_level(&self) -> usize {
            0
        }

        fn root(&self, term: TermId) -> TermId {
            term
        }

        fn eqc_members(&self, term: TermId) -> Vec<TermId> {
            vec![term]
        }

        fn are_disequal(&self, _a: TermId, _b: TermId) -> bool {
            false
        }

        fn length_bounds(&self, term: TermId) -> (i64, Option<i64>) {
            match self.tm.string_lit(term) {
                Some(s) => {
                    let n = s.chars().count() as i64;
                    (n, Some(n))
                }
                None => (0, None),
            }
        }

        fn assert_axiom(&mut self, fact: TermId) {
            self.axioms.push(fact);
        }
    }

    #[test]
    fn test_default_length_value() {
        let mut tm = TermManager::new();
        let abc = tm.mk_string_lit("abc");
        let x = tm.mk_var("x", tm.sorts.string_sort);
        let ctx = FixedContext {
            tm,
            axioms: Vec::new(),
        };
        assert_eq!(ctx.length_value(abc), Some(3));
        assert_eq!(ctx.length_value(x), None);
        assert!(ctx.are_equal(x, x));
        assert!(!ctx.are_equal(x, abc));
    }

    #[test]
    fn test_assert_implication_builds_formula() {
        let mut tm = TermManager::new();
        let p = tm.mk_var("p", tm.sorts.bool_sort);
        let q = tm.mk_var("q", tm.sorts.bool_sort);
        let mut ctx = FixedContext {
            tm,
            axioms: Vec::new(),
        };
        ctx.assert_implication(p, q);
        let expected = ctx.terms_mut().mk_implies(p, q);
        assert_eq!(ctx.axioms, vec![expected]);
    }

    #[test]
    fn test_theory_model() {
        let mut model = TheoryModel::new();
        assert!(model.is_empty());

        model.assign(TermId::new(0), TermId::new(1));
        assert_eq!(model.len(), 1);
        assert!(model.contains(TermId::new(0)));
        assert_eq!(model.get(TermId::new(0)), Some(TermId::new(1)));
    }
}
