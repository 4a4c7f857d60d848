//! Lazy axiom instantiation for string terms.
//!
//! Three families of axioms are produced, each at most once per key:
//!
//! - basic axioms for every string term: `len(s) >= 0` and
//!   `len(s) = 0 <-> s = ""` (or `len(lit) = |lit|` for literals)
//! - concat axioms for every `concat(a, b)`: length additivity and the
//!   empty-operand rules, plus constant folding when both operands are
//!   literals
//! - equality-length axioms `a = b -> len(a) = len(b)` for every pair of
//!   string terms reported equal
//!
//! Requests are queued when terms are internalized or merged and drained
//! during propagation. The queues follow the host's scopes, while the
//! "done" sets live for the whole solving session: an axiom is valid, so
//! asserting it once is enough.

use super::queue::ScopedQueue;
use rustc_hash::FxHashSet;
use strz_core::ast::TermId;
use strz_core::traits::TheoryContext;
use tracing::trace;

/// Counters for instantiated axioms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AxiomStats {
    /// Basic (length) axiom groups.
    pub basic: u64,
    /// Concatenation axiom groups.
    pub concat: u64,
    /// Equality-length axioms.
    pub eq_length: u64,
}

/// Queues and instantiates string axioms.
#[derive(Debug, Clone)]
pub struct AxiomEngine {
    basic_todo: ScopedQueue<TermId>,
    concat_todo: ScopedQueue<TermId>,
    eq_len_todo: ScopedQueue<(TermId, TermId)>,
    basic_done: FxHashSet<TermId>,
    concat_done: FxHashSet<TermId>,
    eq_len_done: FxHashSet<(TermId, TermId)>,
    fold_constants: bool,
    stats: AxiomStats,
}

impl AxiomEngine {
    /// Create an engine. `fold_constants` enables `concat("a", "b") = "ab"`.
    pub fn new(fold_constants: bool) -> Self {
        Self {
            basic_todo: ScopedQueue::new(),
            concat_todo: ScopedQueue::new(),
            eq_len_todo: ScopedQueue::new(),
            basic_done: FxHashSet::default(),
            concat_done: FxHashSet::default(),
            eq_len_done: FxHashSet::default(),
            fold_constants,
            stats: AxiomStats::default(),
        }
    }

    /// Request the basic axioms of a string term.
    pub fn enqueue_basic(&mut self, term: TermId) {
        if !self.basic_done.contains(&term) {
            self.basic_todo.push(term);
        }
    }

    /// Request the axioms of a concatenation term.
    pub fn enqueue_concat(&mut self, term: TermId) {
        if !self.concat_done.contains(&term) {
            self.concat_todo.push(term);
        }
    }

    /// Request `lhs = rhs -> len(lhs) = len(rhs)`.
    pub fn enqueue_eq_length(&mut self, lhs: TermId, rhs: TermId) {
        if lhs == rhs {
            return;
        }
        let key = ordered(lhs, rhs);
        if !self.eq_len_done.contains(&key) {
            self.eq_len_todo.push(key);
        }
    }

    /// Check whether any request is waiting.
    pub fn has_pending(&self) -> bool {
        !self.basic_todo.is_empty() || !self.concat_todo.is_empty() || !self.eq_len_todo.is_empty()
    }

    /// Check whether the basic axioms of `term` were asserted.
    pub fn has_basic(&self, term: TermId) -> bool {
        self.basic_done.contains(&term)
    }

    /// Check whether the concat axioms of `term` were asserted.
    pub fn has_concat(&self, term: TermId) -> bool {
        self.concat_done.contains(&term)
    }

    /// Instantiate every queued request. Returns true if anything new was
    /// asserted.
    pub fn propagate(&mut self, ctx: &mut dyn TheoryContext) -> bool {
        let mut asserted = false;
        while self.has_pending() {
            for term in self.basic_todo.take_pending() {
                asserted |= self.instantiate_basic(ctx, term);
            }
            for term in self.concat_todo.take_pending() {
                asserted |= self.instantiate_concat(ctx, term);
            }
            for (lhs, rhs) in self.eq_len_todo.take_pending() {
                asserted |= self.instantiate_eq_length(ctx, lhs, rhs);
            }
        }
        asserted
    }

    fn instantiate_basic(&mut self, ctx: &mut dyn TheoryContext, term: TermId) -> bool {
        if !self.basic_done.insert(term) {
            return false;
        }
        self.stats.basic += 1;

        let tm = ctx.terms_mut();
        let len = tm.mk_str_len(term);
        let lit_len = tm.string_lit(term).map(|s| s.chars().count() as i64);
        match lit_len {
            Some(n) => {
                let n = tm.mk_int(n);
                let fact = tm.mk_eq(len, n);
                trace!(term = %term, "length of literal");
                ctx.assert_axiom(fact);
            }
            None => {
                let zero = tm.mk_int(0);
                let non_negative = tm.mk_ge(len, zero);
                let empty = tm.mk_string_lit("");
                let len_zero = tm.mk_eq(len, zero);
                let is_empty = tm.mk_eq(term, empty);
                trace!(term = %term, "basic string axioms");
                ctx.assert_axiom(non_negative);
                ctx.assert_implication(len_zero, is_empty);
                ctx.assert_implication(is_empty, len_zero);
            }
        }
        true
    }

    fn instantiate_concat(&mut self, ctx: &mut dyn TheoryContext, term: TermId) -> bool {
        let Some((lhs, rhs)) = ctx.terms().is_str_concat(term) else {
            return false;
        };
        if !self.concat_done.insert(term) {
            return false;
        }
        self.stats.concat += 1;

        let tm = ctx.terms_mut();
        let len_cat = tm.mk_str_len(term);
        let len_lhs = tm.mk_str_len(lhs);
        let len_rhs = tm.mk_str_len(rhs);
        let sum = tm.mk_add([len_lhs, len_rhs]);
        let additivity = tm.mk_eq(len_cat, sum);

        let empty = tm.mk_string_lit("");
        let lhs_empty = tm.mk_eq(lhs, empty);
        let cat_is_rhs = tm.mk_eq(term, rhs);
        let rhs_empty = tm.mk_eq(rhs, empty);
        let cat_is_lhs = tm.mk_eq(term, lhs);

        let folded = match (tm.string_lit(lhs), tm.string_lit(rhs)) {
            (Some(a), Some(b)) if self.fold_constants => Some(format!("{a}{b}")),
            _ => None,
        };
        let folded = folded.map(|text| {
            let lit = tm.mk_string_lit(&text);
            tm.mk_eq(term, lit)
        });

        trace!(term = %term, "concat axioms");
        ctx.assert_axiom(additivity);
        ctx.assert_implication(lhs_empty, cat_is_rhs);
        ctx.assert_implication(rhs_empty, cat_is_lhs);
        if let Some(fact) = folded {
            ctx.assert_axiom(fact);
        }
        true
    }

    fn instantiate_eq_length(
        &mut self,
        ctx: &mut dyn TheoryContext,
        lhs: TermId,
        rhs: TermId,
    ) -> bool {
        if !self.eq_len_done.insert((lhs, rhs)) {
            return false;
        }
        self.stats.eq_length += 1;

        let tm = ctx.terms_mut();
        let eq = tm.mk_eq(lhs, rhs);
        let len_lhs = tm.mk_str_len(lhs);
        let len_rhs = tm.mk_str_len(rhs);
        let len_eq = tm.mk_eq(len_lhs, len_rhs);
        ctx.assert_implication(eq, len_eq);
        true
    }

    /// Open a scope on every queue.
    pub fn push_scope(&mut self) {
        self.basic_todo.push_scope();
        self.concat_todo.push_scope();
        self.eq_len_todo.push_scope();
    }

    /// Close `num_scopes` scopes. Requests queued inside them are forgotten.
    pub fn pop_scope(&mut self, num_scopes: usize) {
        self.basic_todo.pop_scope(num_scopes);
        self.concat_todo.pop_scope(num_scopes);
        self.eq_len_todo.pop_scope(num_scopes);
    }

    /// Statistics.
    pub fn stats(&self) -> AxiomStats {
        self.stats
    }

    /// Forget everything, including what was already asserted.
    pub fn reset(&mut self) {
        self.basic_todo.clear();
        self.concat_todo.clear();
        self.eq_len_todo.clear();
        self.basic_done.clear();
        self.concat_done.clear();
        self.eq_len_done.clear();
        self.stats = AxiomStats::default();
    }
}

fn ordered(a: TermId, b: TermId) -> (TermId, TermId) {
    if a <= b { (a, b) } else { (b, a) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::string::test_support::MockContext;

    #[test]
    fn test_basic_axioms_for_variable() {
        let mut ctx = MockContext::new();
        let x = ctx.str_var("x");
        let mut engine = AxiomEngine::new(true);

        engine.enqueue_basic(x);
        assert!(engine.has_pending());
        assert!(engine.propagate(&mut ctx));
        assert!(!engine.has_pending());
        assert!(engine.has_basic(x));

        let tm = &mut ctx.tm;
        let len = tm.mk_str_len(x);
        let zero = tm.mk_int(0);
        let non_negative = tm.mk_ge(len, zero);
        assert!(ctx.axioms.contains(&non_negative));
        assert_eq!(ctx.axioms.len(), 3);
    }

    #[test]
    fn test_literal_length_counts_chars() {
        let mut ctx = MockContext::new();
        let lit = ctx.tm.mk_string_lit("héé");
        let mut engine = AxiomEngine::new(true);

        engine.enqueue_basic(lit);
        engine.propagate(&mut ctx);

        let len = ctx.tm.mk_str_len(lit);
        let three = ctx.tm.mk_int(3);
        let expected = ctx.tm.mk_eq(len, three);
        assert_eq!(ctx.axioms, vec![expected]);
    }

    #[test]
    fn test_axioms_asserted_once() {
        let mut ctx = MockContext::new();
        let x = ctx.str_var("x");
        let mut engine = AxiomEngine::new(true);

        engine.enqueue_basic(x);
        engine.enqueue_basic(x);
        engine.propagate(&mut ctx);
        let count = ctx.axioms.len();

        engine.enqueue_basic(x);
        assert!(!engine.has_pending());
        assert!(!engine.propagate(&mut ctx));
        assert_eq!(ctx.axioms.len(), count);
        assert_eq!(engine.stats().basic, 1);
    }

    #[test]
    fn test_concat_length_additivity() {
        let mut ctx = MockContext::new();
        let x = ctx.str_var("x");
        let y = ctx.str_var("y");
        let cat = ctx.tm.mk_str_concat(x, y);
        let mut engine = AxiomEngine::new(true);

        engine.enqueue_concat(cat);
        assert!(engine.propagate(&mut ctx));
        assert!(engine.has_concat(cat));

        let tm = &mut ctx.tm;
        let len_cat = tm.mk_str_len(cat);
        let len_x = tm.mk_str_len(x);
        let len_y = tm.mk_str_len(y);
        let sum = tm.mk_add([len_x, len_y]);
        let additivity = tm.mk_eq(len_cat, sum);
        assert!(ctx.axioms.contains(&additivity));
        // additivity + two empty-operand rules
        assert_eq!(ctx.axioms.len(), 3);
    }

    #[test]
    fn test_concat_constant_folding() {
        let mut ctx = MockContext::new();
        let ab = ctx.tm.mk_string_lit("ab");
        let cd = ctx.tm.mk_string_lit("cd");
        let cat = ctx.tm.mk_str_concat(ab, cd);

        let mut engine = AxiomEngine::new(true);
        engine.enqueue_concat(cat);
        engine.propagate(&mut ctx);
        let abcd = ctx.tm.mk_string_lit("abcd");
        let folded = ctx.tm.mk_eq(cat, abcd);
        assert!(ctx.axioms.contains(&folded));

        let mut ctx = MockContext::new();
        let ab = ctx.tm.mk_string_lit("ab");
        let cd = ctx.tm.mk_string_lit("cd");
        let cat = ctx.tm.mk_str_concat(ab, cd);
        let mut engine = AxiomEngine::new(false);
        engine.enqueue_concat(cat);
        engine.propagate(&mut ctx);
        let abcd = ctx.tm.mk_string_lit("abcd");
        let folded = ctx.tm.mk_eq(cat, abcd);
        assert!(!ctx.axioms.contains(&folded));
    }

    #[test]
    fn test_eq_length_is_symmetric() {
        let mut ctx = MockContext::new();
        let x = ctx.str_var("x");
        let y = ctx.str_var("y");
        let mut engine = AxiomEngine::new(true);

        engine.enqueue_eq_length(x, y);
        engine.propagate(&mut ctx);
        engine.enqueue_eq_length(y, x);
        engine.enqueue_eq_length(x, x);
        assert!(!engine.has_pending());
        assert_eq!(engine.stats().eq_length, 1);
        assert_eq!(ctx.axioms.len(), 1);
    }

    #[test]
    fn test_pop_scope_drops_pending_requests() {
        let mut ctx = MockContext::new();
        let x = ctx.str_var("x");
        let mut engine = AxiomEngine::new(true);

        engine.push_scope();
        engine.enqueue_basic(x);
        engine.pop_scope(1);
        assert!(!engine.has_pending());
        assert!(!engine.propagate(&mut ctx));
        assert!(ctx.axioms.is_empty());
    }
}
