//! Loop detection for word equation splitting.
//!
//! Every string term taking part in a decomposition carries a stack of cut
//! records. A record says: at decision level `level`, this term was cut
//! together with the variables in `vars`. When an arrangement would equate
//! two terms whose current cut sets intersect, applying it would restate an
//! equation already being split, which is how `concat("b", x) = concat(x, "a")`
//! unfolds forever. Such arrangements are suppressed.
//!
//! Records are pushed lazily at the level where they change and discarded
//! when the host backtracks below that level.

use rustc_hash::{FxHashMap, FxHashSet};
use strz_core::ast::TermId;

#[derive(Debug, Clone)]
struct CutRecord {
    level: usize,
    vars: FxHashSet<TermId>,
}

/// Per-term stacks of cut records.
#[derive(Debug, Clone, Default)]
pub struct CutDetector {
    records: FxHashMap<TermId, Vec<CutRecord>>,
}

impl CutDetector {
    /// Create an empty detector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Give `term` a record containing itself, unless it has one already.
    pub fn check_and_init(&mut self, term: TermId, level: usize) {
        if !self.records.contains_key(&term) {
            self.record_use(term, level, term);
        }
    }

    /// Add `var` to the cut set of `base` at `level`.
    pub fn record_use(&mut self, base: TermId, level: usize, var: TermId) {
        let stack = self.records.entry(base).or_default();
        match stack.last_mut() {
            Some(top) if top.level < level => {
                let mut vars = top.vars.clone();
                vars.insert(var);
                stack.push(CutRecord { level, vars });
            }
            Some(top) => {
                // Deeper records were dropped by `pop_to_level`.
                top.vars.insert(var);
            }
            None => {
                let mut vars = FxHashSet::default();
                vars.insert(var);
                stack.push(CutRecord { level, vars });
            }
        }
    }

    /// Merge the current cut set of `src` into that of `dest` at `level`.
    pub fn record_merge(&mut self, dest: TermId, level: usize, src: TermId) {
        let src_vars = self.top_vars(src).cloned().unwrap_or_default();
        let stack = self.records.entry(dest).or_default();
        match stack.last_mut() {
            Some(top) if top.level < level => {
                let mut vars = top.vars.clone();
                vars.extend(src_vars);
                stack.push(CutRecord { level, vars });
            }
            Some(top) => top.vars.extend(src_vars),
            None => stack.push(CutRecord {
                level,
                vars: src_vars,
            }),
        }
    }

    /// Check whether the current cut sets of `a` and `b` share a variable.
    pub fn has_self_cut(&self, a: TermId, b: TermId) -> bool {
        match (self.top_vars(a), self.top_vars(b)) {
            (Some(va), Some(vb)) => {
                let (small, large) = if va.len() <= vb.len() { (va, vb) } else { (vb, va) };
                small.iter().any(|v| large.contains(v))
            }
            _ => false,
        }
    }

    /// Discard every record made above `level`.
    pub fn pop_to_level(&mut self, level: usize) {
        self.records.retain(|_, stack| {
            while stack.last().is_some_and(|r| r.level > level) {
                stack.pop();
            }
            !stack.is_empty()
        });
    }

    /// Current cut set of `term`, sorted.
    pub fn cut_vars(&self, term: TermId) -> Vec<TermId> {
        let mut vars: Vec<TermId> = self
            .top_vars(term)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default();
        vars.sort_unstable();
        vars
    }

    /// Number of terms with at least one record.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if no term has a record.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop all records.
    pub fn reset(&mut self) {
        self.records.clear();
    }

    fn top_vars(&self, term: TermId) -> Option<&FxHashSet<TermId>> {
        self.records.get(&term)?.last().map(|r| &r.vars)
    }
}
