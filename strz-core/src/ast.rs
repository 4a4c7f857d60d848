//! Hash-consed terms for the string signature.
//!
//! Every term is stored once in a [`TermManager`] and referred to by a
//! [`TermId`]. Structurally equal terms (same [`TermKind`] and sort) always
//! receive the same id, so term identity can be compared with `==`.

use crate::sort::{SortId, SortKind, SortManager};
use lasso::{Rodeo, Spur};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::fmt;

/// Identifier of an interned term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TermId(pub u32);

impl TermId {
    /// Create a term id from its raw value.
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw value of the id.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Position of the term in the manager's arena.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TermId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Argument list of n-ary operators.
pub type TermArgs = SmallVec<[TermId; 4]>;

/// The operator and payload of a term.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TermKind {
    /// Boolean true.
    True,
    /// Boolean false.
    False,
    /// Free constant (user variable or internal auxiliary variable).
    Var(Spur),
    /// String literal.
    StringLit(String),
    /// Integer literal.
    IntConst(i64),
    /// Binary string concatenation.
    StrConcat(TermId, TermId),
    /// Length of a string term.
    StrLen(TermId),
    /// Integer sum.
    Add(TermArgs),
    /// Equality of two terms of the same sort.
    Eq(TermId, TermId),
    /// Boolean negation.
    Not(TermId),
    /// Conjunction.
    And(TermArgs),
    /// Disjunction.
    Or(TermArgs),
    /// Implication.
    Implies(TermId, TermId),
    /// `lhs <= rhs`
    Le(TermId, TermId),
    /// `lhs < rhs`
    Lt(TermId, TermId),
    /// `lhs >= rhs`
    Ge(TermId, TermId),
    /// `lhs > rhs`
    Gt(TermId, TermId),
}

/// An interned term.
#[derive(Debug, Clone)]
pub struct Term {
    /// Id of this term.
    pub id: TermId,
    /// Operator and payload.
    pub kind: TermKind,
    /// Sort of the term.
    pub sort: SortId,
}

/// Owner of all terms; hands out [`TermId`]s.
#[derive(Debug)]
pub struct TermManager {
    terms: Vec<Term>,
    cache: FxHashMap<(TermKind, SortId), TermId>,
    names: Rodeo,
    vars_by_name: FxHashMap<Spur, TermId>,
    true_id: TermId,
    false_id: TermId,
    /// Builtin sorts.
    pub sorts: SortManager,
}

impl TermManager {
    /// Create a manager holding only `true` and `false`.
    pub fn new() -> Self {
        let sorts = SortManager::new();
        let mut manager = Self {
            terms: Vec::new(),
            cache: FxHashMap::default(),
            names: Rodeo::default(),
            vars_by_name: FxHashMap::default(),
            true_id: TermId(0),
            false_id: TermId(0),
            sorts,
        };
        let bool_sort = manager.sorts.bool_sort;
        manager.true_id = manager.intern(TermKind::True, bool_sort);
        manager.false_id = manager.intern(TermKind::False, bool_sort);
        manager
    }

    fn intern(&mut self, kind: TermKind, sort: SortId) -> TermId {
        let key = (kind, sort);
        if let Some(&id) = self.cache.get(&key) {
            return id;
        }
        let id = TermId(self.terms.len() as u32);
        self.terms.push(Term {
            id,
            kind: key.0.clone(),
            sort,
        });
        self.cache.insert(key, id);
        id
    }

    /// Number of interned terms.
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Check whether no term besides the Boolean constants exists.
    pub fn is_empty(&self) -> bool {
        self.terms.len() <= 2
    }

    /// Look up a term.
    pub fn get(&self, id: TermId) -> Option<&Term> {
        self.terms.get(id.index())
    }

    /// Operator of a term.
    pub fn kind(&self, id: TermId) -> Option<&TermKind> {
        self.get(id).map(|t| &t.kind)
    }

    /// Sort of a term.
    pub fn sort_of(&self, id: TermId) -> Option<SortId> {
        self.get(id).map(|t| t.sort)
    }

    /// Find an already interned term without creating it.
    pub fn lookup(&self, kind: TermKind, sort: SortId) -> Option<TermId> {
        self.cache.get(&(kind, sort)).copied()
    }

    /// The `true` constant.
    pub fn mk_true(&self) -> TermId {
        self.true_id
    }

    /// The `false` constant.
    pub fn mk_false(&self) -> TermId {
        self.false_id
    }

    /// A Boolean constant.
    pub fn mk_bool(&self, value: bool) -> TermId {
        if value { self.true_id } else { self.false_id }
    }

    /// Declare (or fetch) a free constant.
    ///
    /// Names are unique: asking again for an existing name returns the
    /// originally declared term regardless of `sort`.
    pub fn mk_var(&mut self, name: &str, sort: SortId) -> TermId {
        let spur = self.names.get_or_intern(name);
        if let Some(&id) = self.vars_by_name.get(&spur) {
            return id;
        }
        let id = self.intern(TermKind::Var(spur), sort);
        self.vars_by_name.insert(spur, id);
        id
    }

    /// Find a declared free constant by name.
    pub fn lookup_var(&self, name: &str) -> Option<TermId> {
        let spur = self.names.get(name)?;
        self.vars_by_name.get(&spur).copied()
    }

    /// String literal.
    pub fn mk_string_lit(&mut self, text: &str) -> TermId {
        let sort = self.sorts.string_sort;
        self.intern(TermKind::StringLit(text.to_string()), sort)
    }

    /// Integer literal.
    pub fn mk_int(&mut self, value: i64) -> TermId {
        let sort = self.sorts.int_sort;
        self.intern(TermKind::IntConst(value), sort)
    }

    /// `str.++ lhs rhs`
    pub fn mk_str_concat(&mut self, lhs: TermId, rhs: TermId) -> TermId {
        let sort = self.sorts.string_sort;
        self.intern(TermKind::StrConcat(lhs, rhs), sort)
    }

    /// `str.len arg`
    pub fn mk_str_len(&mut self, arg: TermId) -> TermId {
        let sort = self.sorts.int_sort;
        self.intern(TermKind::StrLen(arg), sort)
    }

    /// Integer sum. Constant-only sums are folded.
    pub fn mk_add(&mut self, args: impl IntoIterator<Item = TermId>) -> TermId {
        let args: TermArgs = args.into_iter().collect();
        match args.len() {
            0 => return self.mk_int(0),
            1 => return args[0],
            _ => {}
        }
        let constants: Option<i64> = args
            .iter()
            .map(|&a| self.int_const(a))
            .try_fold(0i64, |acc, c| c.and_then(|c| acc.checked_add(c)));
        if let Some(sum) = constants {
            return self.mk_int(sum);
        }
        let sort = self.sorts.int_sort;
        self.intern(TermKind::Add(args), sort)
    }

    /// Equality. Arguments are ordered so `a = b` and `b = a` share an id.
    pub fn mk_eq(&mut self, lhs: TermId, rhs: TermId) -> TermId {
        if lhs == rhs {
            return self.true_id;
        }
        if self.is_value(lhs) && self.is_value(rhs) {
            // Distinct interned values are distinct.
            return self.false_id;
        }
        let (a, b) = if lhs < rhs { (lhs, rhs) } else { (rhs, lhs) };
        let sort = self.sorts.bool_sort;
        self.intern(TermKind::Eq(a, b), sort)
    }

    /// Negation with constant and double-negation folding.
    pub fn mk_not(&mut self, arg: TermId) -> TermId {
        match self.kind(arg) {
            Some(TermKind::True) => return self.false_id,
            Some(TermKind::False) => return self.true_id,
            Some(TermKind::Not(inner)) => return *inner,
            _ => {}
        }
        let sort = self.sorts.bool_sort;
        self.intern(TermKind::Not(arg), sort)
    }

    /// Conjunction; nested conjunctions are flattened.
    pub fn mk_and(&mut self, args: impl IntoIterator<Item = TermId>) -> TermId {
        let mut flat = TermArgs::new();
        for arg in args {
            match self.kind(arg) {
                Some(TermKind::True) => {}
                Some(TermKind::False) => return self.false_id,
                Some(TermKind::And(inner)) => {
                    for &a in inner {
                        if !flat.contains(&a) {
                            flat.push(a);
                        }
                    }
                }
                _ => {
                    if !flat.contains(&arg) {
                        flat.push(arg);
                    }
                }
            }
        }
        match flat.len() {
            0 => self.true_id,
            1 => flat[0],
            _ => {
                let sort = self.sorts.bool_sort;
                self.intern(TermKind::And(flat), sort)
            }
        }
    }

    /// Disjunction; nested disjunctions are flattened.
    pub fn mk_or(&mut self, args: impl IntoIterator<Item = TermId>) -> TermId {
        let mut flat = TermArgs::new();
        for arg in args {
            match self.kind(arg) {
                Some(TermKind::False) => {}
                Some(TermKind::True) => return self.true_id,
                Some(TermKind::Or(inner)) => {
                    for &a in inner {
                        if !flat.contains(&a) {
                            flat.push(a);
                        }
                    }
                }
                _ => {
                    if !flat.contains(&arg) {
                        flat.push(arg);
                    }
                }
            }
        }
        match flat.len() {
            0 => self.false_id,
            1 => flat[0],
            _ => {
                let sort = self.sorts.bool_sort;
                self.intern(TermKind::Or(flat), sort)
            }
        }
    }

    /// Implication with constant folding.
    pub fn mk_implies(&mut self, premise: TermId, conclusion: TermId) -> TermId {
        if premise == self.true_id {
            return conclusion;
        }
        if premise == self.false_id || conclusion == self.true_id || premise == conclusion {
            return self.true_id;
        }
        if conclusion == self.false_id {
            return self.mk_not(premise);
        }
        let sort = self.sorts.bool_sort;
        self.intern(TermKind::Implies(premise, conclusion), sort)
    }

    /// `lhs <= rhs`
    pub fn mk_le(&mut self, lhs: TermId, rhs: TermId) -> TermId {
        self.mk_cmp(lhs, rhs, |a, b| a <= b, TermKind::Le)
    }

    /// `lhs < rhs`
    pub fn mk_lt(&mut self, lhs: TermId, rhs: TermId) -> TermId {
        self.mk_cmp(lhs, rhs, |a, b| a < b, TermKind::Lt)
    }

    /// `lhs >= rhs`
    pub fn mk_ge(&mut self, lhs: TermId, rhs: TermId) -> TermId {
        self.mk_cmp(lhs, rhs, |a, b| a >= b, TermKind::Ge)
    }

    /// `lhs > rhs`
    pub fn mk_gt(&mut self, lhs: TermId, rhs: TermId) -> TermId {
        self.mk_cmp(lhs, rhs, |a, b| a > b, TermKind::Gt)
    }

    fn mk_cmp(
        &mut self,
        lhs: TermId,
        rhs: TermId,
        eval: fn(i64, i64) -> bool,
        build: fn(TermId, TermId) -> TermKind,
    ) -> TermId {
        if let (Some(a), Some(b)) = (self.int_const(lhs), self.int_const(rhs)) {
            return self.mk_bool(eval(a, b));
        }
        let sort = self.sorts.bool_sort;
        self.intern(build(lhs, rhs), sort)
    }

    /// Check whether a term is a literal value (string, integer, Boolean).
    pub fn is_value(&self, id: TermId) -> bool {
        matches!(
            self.kind(id),
            Some(TermKind::StringLit(_) | TermKind::IntConst(_) | TermKind::True | TermKind::False)
        )
    }

    /// Check whether a term has the string sort.
    pub fn is_string_sort(&self, id: TermId) -> bool {
        self.sort_of(id).is_some_and(|s| self.sorts.is_string(s))
    }

    /// Check whether a term has the integer sort.
    pub fn is_int_sort(&self, id: TermId) -> bool {
        self.sort_of(id) == Some(self.sorts.int_sort)
    }

    /// Check whether a term has the Boolean sort.
    pub fn is_bool_sort(&self, id: TermId) -> bool {
        self.sort_of(id) == Some(self.sorts.bool_sort)
    }

    /// Sort kind of a term.
    pub fn sort_kind(&self, id: TermId) -> Option<SortKind> {
        self.sort_of(id).and_then(|s| self.sorts.kind(s))
    }

    /// Operands of a concatenation.
    pub fn is_str_concat(&self, id: TermId) -> Option<(TermId, TermId)> {
        match self.kind(id) {
            Some(TermKind::StrConcat(a, b)) => Some((*a, *b)),
            _ => None,
        }
    }

    /// Text of a string literal.
    pub fn string_lit(&self, id: TermId) -> Option<&str> {
        match self.kind(id) {
            Some(TermKind::StringLit(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Value of an integer literal.
    pub fn int_const(&self, id: TermId) -> Option<i64> {
        match self.kind(id) {
            Some(TermKind::IntConst(n)) => Some(*n),
            _ => None,
        }
    }

    /// Name of a free constant.
    pub fn var_name(&self, id: TermId) -> Option<&str> {
        match self.kind(id) {
            Some(TermKind::Var(spur)) => Some(self.names.resolve(spur)),
            _ => None,
        }
    }

    /// Direct subterms of a term.
    pub fn children(&self, id: TermId) -> TermArgs {
        let mut out = TermArgs::new();
        match self.kind(id) {
            Some(
                TermKind::StrConcat(a, b)
                | TermKind::Eq(a, b)
                | TermKind::Implies(a, b)
                | TermKind::Le(a, b)
                | TermKind::Lt(a, b)
                | TermKind::Ge(a, b)
                | TermKind::Gt(a, b),
            ) => {
                out.push(*a);
                out.push(*b);
            }
            Some(TermKind::StrLen(a) | TermKind::Not(a)) => out.push(*a),
            Some(TermKind::Add(args) | TermKind::And(args) | TermKind::Or(args)) => {
                out.extend(args.iter().copied());
            }
            _ => {}
        }
        out
    }

    /// SMT-LIB rendering of a term.
    pub fn display(&self, id: TermId) -> TermDisplay<'_> {
        TermDisplay { manager: self, id }
    }
}

impl Default for TermManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Formatter returned by [`TermManager::display`].
pub struct TermDisplay<'a> {
    manager: &'a TermManager,
    id: TermId,
}

impl TermDisplay<'_> {
    fn child(&self, id: TermId) -> Self {
        TermDisplay {
            manager: self.manager,
            id,
        }
    }

    fn write_app(&self, f: &mut fmt::Formatter<'_>, op: &str, args: &[TermId]) -> fmt::Result {
        write!(f, "({}", op)?;
        for &arg in args {
            write!(f, " {}", self.child(arg))?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for TermDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(kind) = self.manager.kind(self.id) else {
            return write!(f, "<unknown {}>", self.id);
        };
        match kind {
            TermKind::True => write!(f, "true"),
            TermKind::False => write!(f, "false"),
            TermKind::Var(spur) => write!(f, "{}", self.manager.names.resolve(spur)),
            TermKind::StringLit(s) => write!(f, "\"{}\"", s.replace('"', "\"\"")),
            TermKind::IntConst(n) if *n < 0 => write!(f, "(- {})", n.unsigned_abs()),
            TermKind::IntConst(n) => write!(f, "{}", n),
            TermKind::StrConcat(a, b) => self.write_app(f, "str.++", &[*a, *b]),
            TermKind::StrLen(a) => self.write_app(f, "str.len", &[*a]),
            TermKind::Add(args) => self.write_app(f, "+", args),
            TermKind::Eq(a, b) => self.write_app(f, "=", &[*a, *b]),
            TermKind::Not(a) => self.write_app(f, "not", &[*a]),
            TermKind::And(args) => self.write_app(f, "and", args),
            TermKind::Or(args) => self.write_app(f, "or", args),
            TermKind::Implies(a, b) => self.write_app(f, "=>", &[*a, *b]),
            TermKind::Le(a, b) => self.write_app(f, "<=", &[*a, *b]),
            TermKind::Lt(a, b) => self.write_app(f, "<", &[*a, *b]),
            TermKind::Ge(a, b) => self.write_app(f, ">=", &[*a, *b]),
            TermKind::Gt(a, b) => self.write_app(f, ">", &[*a, *b]),
        }
    }
}
