//! In-memory [`TheoryContext`] for unit tests.

use rustc_hash::FxHashMap;
use strz_core::ast::{TermId, TermManager};
use strz_core::traits::TheoryContext;

/// Union-find over term ids with explicit length facts. Axioms are
/// recorded, not interpreted.
pub(crate) struct MockContext {
    pub(crate) tm: TermManager,
    pub(crate) axioms: Vec<TermId>,
    pub(crate) level: usize,
    parent: FxHashMap<TermId, TermId>,
    lengths: FxHashMap<TermId, i64>,
    diseqs: Vec<(TermId, TermId)>,
}

impl MockContext {
    pub(crate) fn new() -> Self {
        Self {
            tm: TermManager::new(),
            axioms: Vec::new(),
            level: 0,
            parent: FxHashMap::default(),
            lengths: FxHashMap::default(),
            diseqs: Vec::new(),
        }
    }

    pub(crate) fn str_var(&mut self, name: &str) -> TermId {
        let sort = self.tm.sorts.string_sort;
        self.tm.mk_var(name, sort)
    }

    pub(crate) fn merge(&mut self, a: TermId, b: TermId) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            self.parent.insert(rb, ra);
        }
    }

    pub(crate) fn set_length(&mut self, term: TermId, len: i64) {
        let root = self.find(term);
        self.lengths.insert(root, len);
    }

    pub(crate) fn add_diseq(&mut self, a: TermId, b: TermId) {
        self.diseqs.push((a, b));
    }

    fn find(&self, mut term: TermId) -> TermId {
        while let Some(&p) = self.parent.get(&term) {
            term = p;
        }
        term
    }
}

impl TheoryContext for MockContext {
    fn terms(&self) -> &TermManager {
        &self.tm
    }

    fn terms_mut(&mut self) -> &mut TermManager {
        &mut self.tm
    }

    fn scope_level(&self) -> usize {
        self.level
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

    fn are_disequal(&self, a: TermId, b: TermId) -> bool {
        let (ra, rb) = (self.find(a), self.find(b));
        self.diseqs.iter().any(|&(x, y)| {
            let (rx, ry) = (self.find(x), self.find(y));
            (rx == ra && ry == rb) || (rx == rb && ry == ra)
        })
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
