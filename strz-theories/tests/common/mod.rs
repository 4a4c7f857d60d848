//! Shared helpers for the strz-theories integration tests.

#![allow(dead_code)]

use rustc_hash::FxHashMap;
use strz_core::ast::{TermId, TermManager};
use strz_core::traits::TheoryContext;

/// A minimal host: union-find over terms, fixed lengths, recorded axioms.
pub struct TestContext {
    pub tm: TermManager,
    pub axioms: Vec<TermId>,
    parent: FxHashMap<TermId, TermId>,
    lengths: FxHashMap<TermId, i64>,
}

impl TestContext {
    pub fn new() -> Self {
        Self {
            tm: TermManager::new(),
            axioms: Vec::new(),
            parent: FxHashMap::default(),
            lengths: FxHashMap::default(),
        }
    }

    pub fn var(&mut self, name: &str) -> TermId {
        let sort = self.tm.sorts.string_sort;
        self.tm.mk_var(name, sort)
    }

    pub fn lit(&mut self, text: &str) -> TermId {
        self.tm.mk_string_lit(text)
    }

    pub fn cat(&mut self, a: TermId, b: TermId) -> TermId {
        self.tm.mk_str_concat(a, b)
    }

    pub fn merge(&mut self, a: TermId, b: TermId) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent.insert(rb, ra);
        }
    }

    pub fn set_length(&mut self, term: TermId, len: i64) {
        let root = self.find(term);
        self.lengths.insert(root, len);
    }

    /// Text of a literal term.
    pub fn text(&self, term: TermId) -> Option<&str> {
        self.tm.string_lit(term)
    }

    fn find(&self, mut term: TermId) -> TermId {
        while let Some(&p) = self.parent.get(&term) {
            term = p;
        }
        term
    }
}

impl TheoryContext for TestContext {
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
        self.find(term)
    }

    fn eqc_members(&self, term: TermId) -> Vec<TermId> {
        let root = self.find(term);
        (0..self.tm.len() as u32)
            .map(TermId::new)
            .filter(|&t| self.find(t) == root)
            .collect()
    }

    fn are_disequal(&self, _a: TermId, _b: TermId) -> bool {
        false
    }

    fn length_bounds(&self, term: TermId) -> (i64, Option<i64>) {
        let root = self.find(term);
        if let Some(&n) = self.lengths.get(&root) {
            return (n, Some(n));
        }
        for member in self.eqc_members(term) {
            if let Some(s) = self.tm.string_lit(member) {
                let n = s.chars().count() as i64;
                return (n, Some(n));
            }
        }
        (0, None)
    }

    fn assert_axiom(&mut self, fact: TermId) {
        self.axioms.push(fact);
    }
}
