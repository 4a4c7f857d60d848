//! The host side of the plugin contract.

use crate::egraph::EGraph;
use crate::length::LengthPropagator;
use strz_core::ast::{TermId, TermKind, TermManager};
use strz_core::traits::TheoryContext;

/// View of the solver state handed to the string plugin for one callback.
///
/// Borrows the solver's fields separately so the plugin itself can be
/// borrowed mutably next to it. Asserted axioms are buffered and turned
/// into clauses once the callback returns.
pub(crate) struct HostContext<'a> {
    pub(crate) tm: &'a mut TermManager,
    pub(crate) egraph: &'a EGraph,
    pub(crate) lengths: &'a LengthPropagator,
    pub(crate) level: usize,
    pub(crate) axioms: &'a mut Vec<TermId>,
}

impl HostContext<'_> {
    fn literal_of(&self, term: TermId) -> Option<TermId> {
        self.egraph
            .value(term)
            .or_else(|| self.tm.is_value(term).then_some(term))
    }
}

impl TheoryContext for HostContext<'_> {
    fn terms(&self) -> &TermManager {
        &*self.tm
    }

    fn terms_mut(&mut self) -> &mut TermManager {
        &mut *self.tm
    }

    fn scope_level(&self) -> usize {
        self.level
    }

    fn root(&self, term: TermId) -> TermId {
        self.egraph.root(term)
    }

    fn eqc_members(&self, term: TermId) -> Vec<TermId> {
        self.egraph.members(term)
    }

    fn are_disequal(&self, a: TermId, b: TermId) -> bool {
        if self.egraph.are_disequal(a, b) {
            return true;
        }
        match (self.literal_of(a), self.literal_of(b)) {
            (Some(va), Some(vb)) => va != vb,
            _ => false,
        }
    }

    fn length_bounds(&self, term: TermId) -> (i64, Option<i64>) {
        if let Some(text) = self.literal_of(term).and_then(|v| self.tm.string_lit(v)) {
            let n = text.chars().count() as i64;
            return (n, Some(n));
        }
        let int_sort = self.tm.sorts.int_sort;
        for member in self.egraph.members(term) {
            let Some(len) = self.tm.lookup(TermKind::StrLen(member), int_sort) else {
                continue;
            };
            if self.egraph.contains(len) {
                let domain = self.lengths.get_domain(self.egraph, len);
                return (domain.min.max(0), domain.max);
            }
        }
        (0, None)
    }

    fn assert_axiom(&mut self, fact: TermId) {
        self.axioms.push(fact);
    }
}
