//! Internal variables introduced by word equation splitting.

use rustc_hash::{FxHashMap, FxHashSet};
use strz_core::ast::{TermId, TermManager};
use strz_core::sort::SortId;
use strz_core::traits::TheoryContext;
use tracing::trace;

const STR_PREFIX: &str = "$$_str";
const SELECTOR_PREFIX: &str = "$$_xor";

/// Generator of internal string variables and split selectors.
///
/// Break variables are cached per (equation, slot) so that decomposing the
/// same equation again reuses the variables of the first decomposition.
#[derive(Debug, Clone, Default)]
pub struct FreshVars {
    next_str: u32,
    next_selector: u32,
    internal: FxHashSet<TermId>,
    break_vars: FxHashMap<(TermId, TermId, u8), TermId>,
}

impl FreshVars {
    /// Create a generator.
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh string variable constrained by `len(t) > 0`.
    pub fn mk_nonempty_str(&mut self, ctx: &mut dyn TheoryContext) -> TermId {
        let tm = ctx.terms_mut();
        let sort = tm.sorts.string_sort;
        let var = Self::mk_unused(tm, STR_PREFIX, &mut self.next_str, sort);
        let len = tm.mk_str_len(var);
        let zero = tm.mk_int(0);
        let positive = tm.mk_gt(len, zero);
        self.internal.insert(var);
        trace!(var = %var, "fresh nonempty string");
        ctx.assert_axiom(positive);
        var
    }

    /// A fresh Boolean selecting one arrangement of a split.
    pub fn mk_selector(&mut self, ctx: &mut dyn TheoryContext) -> TermId {
        let tm = ctx.terms_mut();
        let sort = tm.sorts.bool_sort;
        let var = Self::mk_unused(tm, SELECTOR_PREFIX, &mut self.next_selector, sort);
        self.internal.insert(var);
        var
    }

    /// The nonempty variable of `slot` for the equation between `lhs` and
    /// `rhs`, created on first use.
    pub fn break_var(
        &mut self,
        ctx: &mut dyn TheoryContext,
        lhs: TermId,
        rhs: TermId,
        slot: u8,
    ) -> TermId {
        let key = if lhs <= rhs { (lhs, rhs, slot) } else { (rhs, lhs, slot) };
        if let Some(&var) = self.break_vars.get(&key) {
            return var;
        }
        let var = self.mk_nonempty_str(ctx);
        self.break_vars.insert(key, var);
        var
    }

    /// Check whether a term was created by this generator.
    pub fn is_internal(&self, term: TermId) -> bool {
        self.internal.contains(&term)
    }

    /// Number of internal variables created so far.
    pub fn len(&self) -> usize {
        self.internal.len()
    }

    /// Check if no internal variable exists.
    pub fn is_empty(&self) -> bool {
        self.internal.is_empty()
    }

    /// Forget all variables and restart the counters.
    pub fn reset(&mut self) {
        self.next_str = 0;
        self.next_selector = 0;
        self.internal.clear();
        self.break_vars.clear();
    }

    // Names already taken (by the user or an earlier session) are skipped.
    fn mk_unused(tm: &mut TermManager, prefix: &str, counter: &mut u32, sort: SortId) -> TermId {
        loop {
            let name = format!("{prefix}{counter}");
            *counter += 1;
            if tm.lookup_var(&name).is_none() {
                return tm.mk_var(&name, sort);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::string::test_support::MockContext;

    #[test]
    fn test_fresh_names_are_distinct() {
        let mut ctx = MockContext::new();
        let mut fresh = FreshVars::new();

        let a = fresh.mk_nonempty_str(&mut ctx);
        let b = fresh.mk_nonempty_str(&mut ctx);
        assert_ne!(a, b);
        assert_eq!(ctx.tm.var_name(a), Some("$$_str0"));
        assert_eq!(ctx.tm.var_name(b), Some("$$_str1"));
        assert!(fresh.is_internal(a));
        assert_eq!(fresh.len(), 2);
    }

    #[test]
    fn test_nonempty_axiom() {
        let mut ctx = MockContext::new();
        let mut fresh = FreshVars::new();

        let t = fresh.mk_nonempty_str(&mut ctx);
        let len = ctx.tm.mk_str_len(t);
        let zero = ctx.tm.mk_int(0);
        let positive = ctx.tm.mk_gt(len, zero);
        assert_eq!(ctx.axioms, vec![positive]);
    }

    #[test]
    fn test_user_names_are_skipped() {
        let mut ctx = MockContext::new();
        let user = ctx.str_var("$$_str0");
        let mut fresh = FreshVars::new();

        let t = fresh.mk_nonempty_str(&mut ctx);
        assert_ne!(t, user);
        assert!(!fresh.is_internal(user));
        assert_eq!(ctx.tm.var_name(t), Some("$$_str1"));
    }

    #[test]
    fn test_break_vars_are_cached() {
        let mut ctx = MockContext::new();
        let x = ctx.str_var("x");
        let y = ctx.str_var("y");
        let mut fresh = FreshVars::new();

        let t0 = fresh.break_var(&mut ctx, x, y, 0);
        assert_eq!(fresh.break_var(&mut ctx, y, x, 0), t0);
        let t1 = fresh.break_var(&mut ctx, x, y, 1);
        assert_ne!(t0, t1);
        assert_eq!(ctx.axioms.len(), 2);
    }

    #[test]
    fn test_selectors_are_boolean() {
        let mut ctx = MockContext::new();
        let mut fresh = FreshVars::new();

        let sel = fresh.mk_selector(&mut ctx);
        assert!(ctx.tm.is_bool_sort(sel));
        assert_eq!(ctx.tm.var_name(sel), Some("$$_xor0"));
        assert!(ctx.axioms.is_empty());
    }
}
