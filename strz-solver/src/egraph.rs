//! E-graph over string and integer terms.
//!
//! Nodes live in an arena indexed by [`TermId`]. Every node stores its
//! representative directly; a union re-points all members of the smaller
//! class, so `root` is a single lookup and never walks a chain. Members of a
//! class form a circular list through `next`, which makes a union and its
//! undo two pointer swaps.
//!
//! Congruence is maintained for `str.++`, `str.len` and `+`. Classes holding
//! two distinct literals, or two terms asserted disequal, cannot be merged.

use smallvec::SmallVec;
use strz_core::ast::{TermArgs, TermId, TermKind, TermManager};
use tracing::trace;

/// Function symbols closed under congruence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Symbol {
    Concat,
    Len,
    Add,
}

#[derive(Debug, Clone)]
struct Node {
    root: TermId,
    next: TermId,
    size: u32,
    registered: bool,
    /// Literal member of the class; only meaningful on the root.
    value: Option<TermId>,
    app: Option<(Symbol, TermArgs)>,
    /// Applications having this term as an argument.
    parents: SmallVec<[TermId; 2]>,
}

impl Node {
    fn unregistered(id: TermId) -> Self {
        Self {
            root: id,
            next: id,
            size: 1,
            registered: false,
            value: None,
            app: None,
            parents: SmallVec::new(),
        }
    }
}

/// Two terms that cannot be in one class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clash {
    /// First term of the failed merge.
    pub lhs: TermId,
    /// Second term of the failed merge.
    pub rhs: TermId,
}

#[derive(Debug, Clone)]
struct Union {
    root: TermId,
    merged: TermId,
    value: Option<TermId>,
}

#[derive(Debug, Clone, Copy)]
struct Scope {
    trail: usize,
    diseqs: usize,
}

/// E-graph statistics.
#[derive(Debug, Clone, Default)]
pub struct EGraphStats {
    /// Unions performed (including congruence unions).
    pub merges: u64,
    /// Unions triggered by congruence.
    pub congruences: u64,
    /// Unions undone by backtracking.
    pub undone: u64,
}

/// Backtrackable congruence closure.
#[derive(Debug, Default)]
pub struct EGraph {
    nodes: Vec<Node>,
    terms: Vec<TermId>,
    trail: Vec<Union>,
    diseqs: Vec<(TermId, TermId)>,
    scopes: Vec<Scope>,
    /// Applications registered inside a scope. Their congruences are
    /// re-derived after backtracking.
    late: Vec<TermId>,
    needs_rebuild: bool,
    stats: EGraphStats,
}

impl EGraph {
    /// Create an empty e-graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Statistics.
    pub fn stats(&self) -> &EGraphStats {
        &self.stats
    }

    /// Check whether a term was registered.
    pub fn contains(&self, term: TermId) -> bool {
        self.nodes.get(term.index()).is_some_and(|n| n.registered)
    }

    /// Registered terms, in registration order.
    pub fn terms(&self) -> &[TermId] {
        &self.terms
    }

    /// Number of registered terms.
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Check if no term is registered.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Representative of the class of `term`. Unregistered terms are their
    /// own representative.
    pub fn root(&self, term: TermId) -> TermId {
        self.nodes.get(term.index()).map_or(term, |n| n.root)
    }

    /// Check whether two terms are in one class.
    pub fn are_equal(&self, a: TermId, b: TermId) -> bool {
        self.root(a) == self.root(b)
    }

    /// Literal in the class of `term`, if any.
    pub fn value(&self, term: TermId) -> Option<TermId> {
        let root = self.root(term);
        self.nodes.get(root.index()).and_then(|n| n.value)
    }

    /// All members of the class of `term`, starting with `term`.
    pub fn members(&self, term: TermId) -> Vec<TermId> {
        if !self.contains(term) {
            return vec![term];
        }
        let mut out = vec![term];
        let mut current = self.nodes[term.index()].next;
        while current != term {
            out.push(current);
            current = self.nodes[current.index()].next;
        }
        out
    }

    /// Check whether two terms are known to be distinct.
    pub fn are_disequal(&self, a: TermId, b: TermId) -> bool {
        let (ra, rb) = (self.root(a), self.root(b));
        if ra == rb {
            return false;
        }
        if let (Some(va), Some(vb)) = (self.value(ra), self.value(rb))
            && va != vb
        {
            return true;
        }
        self.diseq_between(ra, rb)
    }

    /// Asserted disequalities of the current branch.
    pub fn disequalities(&self) -> &[(TermId, TermId)] {
        &self.diseqs
    }

    fn diseq_between(&self, ra: TermId, rb: TermId) -> bool {
        self.diseqs.iter().any(|&(x, y)| {
            let (rx, ry) = (self.root(x), self.root(y));
            (rx == ra && ry == rb) || (rx == rb && ry == ra)
        })
    }

    /// Register `term` and its subterms.
    ///
    /// Registering an application can make it congruent to an existing
    /// one; the resulting unions are appended to `merged`. Registration
    /// always completes, even if such a union clashes.
    pub fn add_term(
        &mut self,
        tm: &TermManager,
        term: TermId,
        merged: &mut Vec<(TermId, TermId)>,
    ) -> Result<(), Clash> {
        let mut clash = None;
        self.register(tm, term, merged, &mut clash);
        clash.map_or(Ok(()), Err)
    }

    fn register(
        &mut self,
        tm: &TermManager,
        term: TermId,
        merged: &mut Vec<(TermId, TermId)>,
        clash: &mut Option<Clash>,
    ) {
        if self.contains(term) {
            return;
        }
        let app = match tm.kind(term) {
            Some(TermKind::StrConcat(a, b)) => {
                Some((Symbol::Concat, TermArgs::from_slice(&[*a, *b])))
            }
            Some(TermKind::StrLen(a)) => Some((Symbol::Len, TermArgs::from_slice(&[*a]))),
            Some(TermKind::Add(args)) => Some((Symbol::Add, args.clone())),
            _ => None,
        };
        if let Some((_, args)) = &app {
            for &arg in args {
                self.register(tm, arg, merged, clash);
            }
        }

        if self.nodes.len() <= term.index() {
            let start = self.nodes.len();
            self.nodes.extend(
                (start..=term.index()).map(|i| Node::unregistered(TermId::new(i as u32))),
            );
        }
        if let Some((_, args)) = &app {
            for &arg in args {
                let parents = &mut self.nodes[arg.index()].parents;
                if !parents.contains(&term) {
                    parents.push(term);
                }
            }
        }
        let node = &mut self.nodes[term.index()];
        node.registered = true;
        node.value = tm.is_value(term).then_some(term);
        let is_app = app.is_some();
        node.app = app;
        self.terms.push(term);
        trace!(term = %term, "registered term");

        if is_app {
            if !self.scopes.is_empty() {
                self.late.push(term);
            }
            if clash.is_none()
                && let Err(c) = self.close_congruence(term, merged)
            {
                *clash = Some(c);
            }
        }
    }

    fn congruent(&self, p: TermId, q: TermId) -> bool {
        match (&self.nodes[p.index()].app, &self.nodes[q.index()].app) {
            (Some((sp, ap)), Some((sq, aq))) => {
                sp == sq
                    && ap.len() == aq.len()
                    && ap.iter().zip(aq.iter()).all(|(&x, &y)| self.are_equal(x, y))
            }
            _ => false,
        }
    }

    /// Merge `term` with an application congruent to it, if one exists.
    fn close_congruence(
        &mut self,
        term: TermId,
        merged: &mut Vec<(TermId, TermId)>,
    ) -> Result<(), Clash> {
        let Some(first) = self.nodes[term.index()]
            .app
            .as_ref()
            .and_then(|(_, args)| args.first().copied())
        else {
            return Ok(());
        };
        let partner = self
            .class_parents(first)
            .into_iter()
            .find(|&p| p != term && self.congruent(p, term) && !self.are_equal(p, term));
        if let Some(partner) = partner {
            self.stats.congruences += 1;
            self.merge(term, partner, merged)?;
        }
        Ok(())
    }

    fn class_parents(&self, term: TermId) -> Vec<TermId> {
        let mut out = Vec::new();
        for member in self.members(term) {
            out.extend(self.nodes[member.index()].parents.iter().copied());
        }
        out
    }

    /// Merge the classes of `a` and `b` and close under congruence.
    ///
    /// Every union performed is appended to `merged` as the pair of terms
    /// that caused it.
    pub fn merge(
        &mut self,
        a: TermId,
        b: TermId,
        merged: &mut Vec<(TermId, TermId)>,
    ) -> Result<(), Clash> {
        let mut work = vec![(a, b)];
        while let Some((a, b)) = work.pop() {
            debug_assert!(self.contains(a) && self.contains(b));
            if !self.contains(a) || !self.contains(b) {
                continue;
            }
            let (mut ra, mut rb) = (self.root(a), self.root(b));
            if ra == rb {
                continue;
            }
            if let (Some(va), Some(vb)) = (self.value(ra), self.value(rb))
                && va != vb
            {
                return Err(Clash { lhs: a, rhs: b });
            }
            if self.diseq_between(ra, rb) {
                return Err(Clash { lhs: a, rhs: b });
            }
            if self.nodes[ra.index()].size < self.nodes[rb.index()].size {
                std::mem::swap(&mut ra, &mut rb);
            }

            let ra_parents = self.class_parents(ra);
            let rb_parents = self.class_parents(rb);

            for member in self.members(rb) {
                self.nodes[member.index()].root = ra;
            }
            let ra_next = self.nodes[ra.index()].next;
            let rb_next = self.nodes[rb.index()].next;
            self.nodes[ra.index()].next = rb_next;
            self.nodes[rb.index()].next = ra_next;

            let old_value = self.nodes[ra.index()].value;
            let rb_size = self.nodes[rb.index()].size;
            let rb_value = self.nodes[rb.index()].value;
            let root = &mut self.nodes[ra.index()];
            root.size += rb_size;
            root.value = old_value.or(rb_value);
            self.trail.push(Union {
                root: ra,
                merged: rb,
                value: old_value,
            });
            self.stats.merges += 1;
            merged.push((a, b));

            for &p in &rb_parents {
                for &q in &ra_parents {
                    if !self.are_equal(p, q) && self.congruent(p, q) {
                        self.stats.congruences += 1;
                        work.push((p, q));
                    }
                }
            }
        }
        Ok(())
    }

    /// Record that `a` and `b` must stay in different classes.
    pub fn add_diseq(&mut self, a: TermId, b: TermId) -> Result<(), Clash> {
        if self.are_equal(a, b) {
            return Err(Clash { lhs: a, rhs: b });
        }
        self.diseqs.push((a, b));
        Ok(())
    }

    /// Open a backtracking scope.
    pub fn push_scope(&mut self) {
        self.scopes.push(Scope {
            trail: self.trail.len(),
            diseqs: self.diseqs.len(),
        });
    }

    /// Undo the last `num_scopes` scopes.
    ///
    /// Congruences of applications registered inside the popped scopes are
    /// restored by [`EGraph::rebuild`].
    pub fn pop_scope(&mut self, num_scopes: usize) {
        for _ in 0..num_scopes {
            let Some(scope) = self.scopes.pop() else {
                break;
            };
            while self.trail.len() > scope.trail {
                if let Some(union) = self.trail.pop() {
                    self.undo(union);
                }
            }
            self.diseqs.truncate(scope.diseqs);
        }
        self.needs_rebuild = !self.late.is_empty();
    }

    fn undo(&mut self, union: Union) {
        let Union {
            root,
            merged,
            value,
        } = union;
        let merged_size = self.nodes[merged.index()].size;
        let node = &mut self.nodes[root.index()];
        node.size -= merged_size;
        node.value = value;

        let root_next = self.nodes[root.index()].next;
        let merged_next = self.nodes[merged.index()].next;
        self.nodes[root.index()].next = merged_next;
        self.nodes[merged.index()].next = root_next;

        let mut current = merged;
        loop {
            self.nodes[current.index()].root = merged;
            current = self.nodes[current.index()].next;
            if current == merged {
                break;
            }
        }
        self.stats.undone += 1;
    }

    /// Check whether congruences were lost by backtracking.
    pub fn needs_rebuild(&self) -> bool {
        self.needs_rebuild
    }

    /// Re-derive congruences of applications registered inside scopes that
    /// were popped since.
    pub fn rebuild(&mut self, merged: &mut Vec<(TermId, TermId)>) -> Result<(), Clash> {
        self.needs_rebuild = false;
        let late = std::mem::take(&mut self.late);
        let result = late
            .iter()
            .try_for_each(|&term| self.close_congruence(term, merged));
        if !self.scopes.is_empty() {
            self.late = late;
        }
        result
    }

    /// Current scope depth.
    pub fn scope_depth(&self) -> usize {
        self.scopes.len()
    }
}
