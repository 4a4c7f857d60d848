//! Word equations over concatenations.
//!
//! An equation `lhs = rhs` between string terms is first *resolved*: each
//! concatenation operand that is a literal, or whose class contains one,
//! becomes [`Operand::Const`]; everything else stays [`Operand::Var`]. A
//! concatenation of two constants folds into a literal.
//!
//! Equations between two concatenations fall into exactly six categories
//! ([`ConcatEqCase`]), determined by which operands are constant:
//!
//! | case                | shape                               |
//! |---------------------|-------------------------------------|
//! | `VarsOnly`          | `x . y = m . n`                     |
//! | `SuffixConst`       | `x . "s" = m . n`                   |
//! | `PrefixConst`       | `"s" . y = m . n`                   |
//! | `BothPrefixConst`   | `"s1" . y = "s2" . n`               |
//! | `BothSuffixConst`   | `x . "s1" = m . "s2"`               |
//! | `PrefixSuffixConst` | `"s1" . y = m . "s2"`               |
//!
//! Each case yields either a set of implied facts, a conflict, or a split
//! into arrangements of which at least one must hold. Arrangements that
//! need a fresh nonempty remainder are guarded by the [`CutDetector`] so
//! that self-similar equations do not unfold forever.

use super::cut::CutDetector;
use super::fresh::FreshVars;
use smallvec::{SmallVec, smallvec};
use strz_core::ast::TermId;
use strz_core::traits::TheoryContext;
use tracing::trace;

/// A concatenation operand after class-value resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// Known text.
    Const(String),
    /// Unknown string term.
    Var(TermId),
}

/// A concatenation with at least one non-constant operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConcatView {
    /// `x . y`
    VarVar(TermId, TermId),
    /// `x . "s"`
    VarConst(TermId, String),
    /// `"s" . y`
    ConstVar(String, TermId),
}

impl ConcatView {
    /// Left operand.
    pub fn left(&self) -> Operand {
        match self {
            ConcatView::VarVar(x, _) | ConcatView::VarConst(x, _) => Operand::Var(*x),
            ConcatView::ConstVar(s, _) => Operand::Const(s.clone()),
        }
    }

    /// Right operand.
    pub fn right(&self) -> Operand {
        match self {
            ConcatView::VarVar(_, y) | ConcatView::ConstVar(_, y) => Operand::Var(*y),
            ConcatView::VarConst(_, s) => Operand::Const(s.clone()),
        }
    }
}

/// One side of a word equation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Side {
    /// Known text (a literal, or a concatenation of known operands).
    Literal(String),
    /// A string term that is neither a literal nor a concatenation.
    Variable(TermId),
    /// A concatenation with an unknown operand.
    Concat(ConcatView),
}

impl Side {
    /// Build the side of `left . right`, folding two constants.
    pub fn from_operands(left: Operand, right: Operand) -> Self {
        match (left, right) {
            (Operand::Var(x), Operand::Var(y)) => Side::Concat(ConcatView::VarVar(x, y)),
            (Operand::Var(x), Operand::Const(s)) => Side::Concat(ConcatView::VarConst(x, s)),
            (Operand::Const(s), Operand::Var(y)) => Side::Concat(ConcatView::ConstVar(s, y)),
            (Operand::Const(a), Operand::Const(b)) => Side::Literal(a + &b),
        }
    }
}

/// The six structural categories of a concatenation-vs-concatenation
/// equation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConcatEqCase {
    /// `x . y = m . n`
    VarsOnly,
    /// `x . "s" = m . n`
    SuffixConst,
    /// `"s" . y = m . n`
    PrefixConst,
    /// `"s1" . y = "s2" . n`
    BothPrefixConst,
    /// `x . "s1" = m . "s2"`
    BothSuffixConst,
    /// `"s1" . y = m . "s2"`
    PrefixSuffixConst,
}

impl ConcatEqCase {
    /// All cases, in index order.
    pub const ALL: [ConcatEqCase; 6] = [
        ConcatEqCase::VarsOnly,
        ConcatEqCase::SuffixConst,
        ConcatEqCase::PrefixConst,
        ConcatEqCase::BothPrefixConst,
        ConcatEqCase::BothSuffixConst,
        ConcatEqCase::PrefixSuffixConst,
    ];

    /// Position in [`ConcatEqCase::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }
}

/// A classified concatenation equation, oriented to match its case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcatEquation<'a> {
    /// `x . y = m . n`
    VarsOnly {
        /// left of lhs
        x: TermId,
        /// right of lhs
        y: TermId,
        /// left of rhs
        m: TermId,
        /// right of rhs
        n: TermId,
    },
    /// `x . s = m . n`
    SuffixConst {
        /// left of lhs
        x: TermId,
        /// constant suffix of lhs
        s: &'a str,
        /// left of rhs
        m: TermId,
        /// right of rhs
        n: TermId,
    },
    /// `s . y = m . n`
    PrefixConst {
        /// constant prefix of lhs
        s: &'a str,
        /// right of lhs
        y: TermId,
        /// left of rhs
        m: TermId,
        /// right of rhs
        n: TermId,
    },
    /// `s1 . y = s2 . n`
    BothPrefixConst {
        /// constant prefix of lhs
        s1: &'a str,
        /// right of lhs
        y: TermId,
        /// constant prefix of rhs
        s2: &'a str,
        /// right of rhs
        n: TermId,
    },
    /// `x . s1 = m . s2`
    BothSuffixConst {
        /// left of lhs
        x: TermId,
        /// constant suffix of lhs
        s1: &'a str,
        /// left of rhs
        m: TermId,
        /// constant suffix of rhs
        s2: &'a str,
    },
    /// `s1 . y = m . s2`
    PrefixSuffixConst {
        /// constant prefix of lhs
        s1: &'a str,
        /// right of lhs
        y: TermId,
        /// left of rhs
        m: TermId,
        /// constant suffix of rhs
        s2: &'a str,
    },
}

impl ConcatEquation<'_> {
    /// The category of this equation.
    pub fn case(&self) -> ConcatEqCase {
        match self {
            ConcatEquation::VarsOnly { .. } => ConcatEqCase::VarsOnly,
            ConcatEquation::SuffixConst { .. } => ConcatEqCase::SuffixConst,
            ConcatEquation::PrefixConst { .. } => ConcatEqCase::PrefixConst,
            ConcatEquation::BothPrefixConst { .. } => ConcatEqCase::BothPrefixConst,
            ConcatEquation::BothSuffixConst { .. } => ConcatEqCase::BothSuffixConst,
            ConcatEquation::PrefixSuffixConst { .. } => ConcatEqCase::PrefixSuffixConst,
        }
    }
}

/// Classify `lhs = rhs`. Every pair of views maps to exactly one case;
/// sides are swapped where the case pattern requires it.
pub fn classify<'a>(lhs: &'a ConcatView, rhs: &'a ConcatView) -> ConcatEquation<'a> {
    use ConcatView::{ConstVar, VarConst, VarVar};
    match (lhs, rhs) {
        (VarVar(x, y), VarVar(m, n)) => ConcatEquation::VarsOnly {
            x: *x,
            y: *y,
            m: *m,
            n: *n,
        },
        (VarConst(x, s), VarVar(m, n)) | (VarVar(m, n), VarConst(x, s)) => {
            ConcatEquation::SuffixConst {
                x: *x,
                s: s.as_str(),
                m: *m,
                n: *n,
            }
        }
        (ConstVar(s, y), VarVar(m, n)) | (VarVar(m, n), ConstVar(s, y)) => {
            ConcatEquation::PrefixConst {
                s: s.as_str(),
                y: *y,
                m: *m,
                n: *n,
            }
        }
        (ConstVar(s1, y), ConstVar(s2, n)) => ConcatEquation::BothPrefixConst {
            s1: s1.as_str(),
            y: *y,
            s2: s2.as_str(),
            n: *n,
        },
        (VarConst(x, s1), VarConst(m, s2)) => ConcatEquation::BothSuffixConst {
            x: *x,
            s1: s1.as_str(),
            m: *m,
            s2: s2.as_str(),
        },
        (ConstVar(s1, y), VarConst(m, s2)) | (VarConst(m, s2), ConstVar(s1, y)) => {
            ConcatEquation::PrefixSuffixConst {
                s1: s1.as_str(),
                y: *y,
                m: *m,
                s2: s2.as_str(),
            }
        }
    }
}

/// Literal text known for the class of `term`, with the literal's id.
pub fn class_literal(ctx: &dyn TheoryContext, term: TermId) -> Option<(TermId, String)> {
    let tm = ctx.terms();
    ctx.eqc_members(term)
        .into_iter()
        .find_map(|m| tm.string_lit(m).map(|s| (m, s.to_string())))
}

/// A resolved equation between two string terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordEquation {
    /// Left term as asserted.
    pub lhs: TermId,
    /// Right term as asserted.
    pub rhs: TermId,
    /// Resolved shape of `lhs`.
    pub lhs_side: Side,
    /// Resolved shape of `rhs`.
    pub rhs_side: Side,
    /// Equalities `operand = literal` the resolution relied on.
    pub support: Vec<TermId>,
}

impl WordEquation {
    /// Resolve both sides against the current classes.
    pub fn resolve(ctx: &mut dyn TheoryContext, lhs: TermId, rhs: TermId) -> Self {
        let mut support = Vec::new();
        let lhs_side = resolve_side(ctx, lhs, &mut support);
        let rhs_side = resolve_side(ctx, rhs, &mut support);
        Self {
            lhs,
            rhs,
            lhs_side,
            rhs_side,
            support,
        }
    }
}

fn resolve_side(ctx: &mut dyn TheoryContext, term: TermId, support: &mut Vec<TermId>) -> Side {
    let tm = ctx.terms();
    if let Some(s) = tm.string_lit(term) {
        return Side::Literal(s.to_string());
    }
    match tm.is_str_concat(term) {
        Some((a, b)) => {
            let left = resolve_operand(ctx, a, support);
            let right = resolve_operand(ctx, b, support);
            Side::from_operands(left, right)
        }
        None => Side::Variable(term),
    }
}

fn resolve_operand(ctx: &mut dyn TheoryContext, term: TermId, support: &mut Vec<TermId>) -> Operand {
    if let Some(s) = ctx.terms().string_lit(term) {
        return Operand::Const(s.to_string());
    }
    match class_literal(&*ctx, term) {
        Some((lit, text)) => {
            let fact = ctx.terms_mut().mk_eq(term, lit);
            if !support.contains(&fact) {
                support.push(fact);
            }
            Operand::Const(text)
        }
        None => Operand::Var(term),
    }
}

/// Cut bookkeeping owed by an arrangement that introduced `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CutUpdate {
    /// Fresh variable of the arrangement.
    pub target: TermId,
    /// Terms whose cut sets flow into `target`.
    pub sources: SmallVec<[TermId; 2]>,
}

/// What a decomposition concluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing to add.
    Satisfied,
    /// The equation implies all of these facts.
    Implied(Vec<TermId>),
    /// The equation implies one of these conjunctions.
    Split(Vec<Vec<TermId>>),
    /// The equation cannot hold.
    Conflict,
    /// Every arrangement was suppressed by loop detection.
    Blocked,
}

/// Result of decomposing one equation.
#[derive(Debug, Clone)]
pub struct Decomposition {
    /// Category, for concatenation-vs-concatenation equations.
    pub case: Option<ConcatEqCase>,
    /// Conclusion.
    pub outcome: Outcome,
    /// Length facts the conclusion relied on.
    pub support: Vec<TermId>,
    /// Cut bookkeeping to apply if the conclusion is asserted.
    pub cuts: Vec<CutUpdate>,
    /// Number of arrangements suppressed by loop detection.
    pub blocked: usize,
}

struct Arrangement {
    facts: Vec<TermId>,
    cut: Option<CutUpdate>,
}

impl Arrangement {
    fn plain(facts: Vec<TermId>) -> Self {
        Self { facts, cut: None }
    }
}

/// Decomposes resolved word equations.
///
/// A decomposer lives for one equation. It may create fresh variables and
/// cut records for operands, but never asserts the conclusion itself.
pub struct Decomposer<'a> {
    ctx: &'a mut dyn TheoryContext,
    fresh: &'a mut FreshVars,
    cuts: &'a mut CutDetector,
    avoid_loop_cut: bool,
    level: usize,
    support: Vec<TermId>,
    cut_updates: Vec<CutUpdate>,
    blocked: usize,
}

impl<'a> Decomposer<'a> {
    /// Create a decomposer working at decision level `level`.
    pub fn new(
        ctx: &'a mut dyn TheoryContext,
        fresh: &'a mut FreshVars,
        cuts: &'a mut CutDetector,
        avoid_loop_cut: bool,
        level: usize,
    ) -> Self {
        Self {
            ctx,
            fresh,
            cuts,
            avoid_loop_cut,
            level,
            support: Vec::new(),
            cut_updates: Vec::new(),
            blocked: 0,
        }
    }

    /// Decompose `eq`.
    pub fn decompose(mut self, eq: &WordEquation) -> Decomposition {
        let mut case = None;
        let outcome = match (&eq.lhs_side, &eq.rhs_side) {
            (Side::Literal(a), Side::Literal(b)) => {
                if a == b {
                    Outcome::Satisfied
                } else {
                    Outcome::Conflict
                }
            }
            (Side::Variable(v), Side::Concat(_)) => self.occurs_check(*v, eq.rhs),
            (Side::Concat(_), Side::Variable(v)) => self.occurs_check(*v, eq.lhs),
            (Side::Variable(_), _) | (_, Side::Variable(_)) => Outcome::Satisfied,
            (Side::Concat(c), Side::Literal(s)) | (Side::Literal(s), Side::Concat(c)) => {
                self.concat_eq_literal(c, s)
            }
            (Side::Concat(a), Side::Concat(b)) => {
                if eq.lhs == eq.rhs {
                    Outcome::Satisfied
                } else {
                    let equation = classify(a, b);
                    case = Some(equation.case());
                    self.concat_eq_concat((eq.lhs, eq.rhs), a, b, equation)
                }
            }
        };
        trace!(lhs = %eq.lhs, rhs = %eq.rhs, ?case, ?outcome, "decomposed");
        Decomposition {
            case,
            outcome,
            support: self.support,
            cuts: self.cut_updates,
            blocked: self.blocked,
        }
    }

    // `v = t1 . ... . tk` with `v` among the leaves forces every other
    // leaf to be empty.
    fn occurs_check(&mut self, v: TermId, concat: TermId) -> Outcome {
        let leaves = flatten(&*self.ctx, concat);
        let occurrences = leaves.iter().filter(|&&leaf| leaf == v).count();
        if occurrences == 0 {
            return Outcome::Satisfied;
        }
        let empty = self.lit("");
        let mut facts = Vec::new();
        for leaf in leaves {
            if leaf == v {
                continue;
            }
            if self.ctx.terms().string_lit(leaf).is_some_and(|s| !s.is_empty()) {
                return Outcome::Conflict;
            }
            facts.push(self.eq(leaf, empty));
        }
        if occurrences > 1 {
            facts.push(self.eq(v, empty));
        }
        self.conclude(vec![Arrangement::plain(facts)])
    }

    fn concat_eq_literal(&mut self, view: &ConcatView, text: &str) -> Outcome {
        match view {
            ConcatView::ConstVar(prefix, y) => match text.strip_prefix(prefix.as_str()) {
                Some(rest) => {
                    let rest = self.lit(rest);
                    let fact = self.eq(*y, rest);
                    self.conclude(vec![Arrangement::plain(vec![fact])])
                }
                None => Outcome::Conflict,
            },
            ConcatView::VarConst(x, suffix) => match text.strip_suffix(suffix.as_str()) {
                Some(rest) => {
                    let rest = self.lit(rest);
                    let fact = self.eq(*x, rest);
                    self.conclude(vec![Arrangement::plain(vec![fact])])
                }
                None => Outcome::Conflict,
            },
            ConcatView::VarVar(x, y) if x == y => {
                let chars: Vec<char> = text.chars().collect();
                let half = chars.len() / 2;
                if chars.len() % 2 == 0 && chars[..half] == chars[half..] {
                    let root: String = chars[..half].iter().collect();
                    let root = self.lit(&root);
                    let fact = self.eq(*x, root);
                    self.conclude(vec![Arrangement::plain(vec![fact])])
                } else {
                    Outcome::Conflict
                }
            }
            ConcatView::VarVar(x, y) => {
                let chars: Vec<char> = text.chars().collect();
                let total = chars.len() as i64;
                let cut = if let Some(lx) = self.peek_len(*x) {
                    self.justify_len(*x, lx);
                    Some(lx)
                } else if let Some(ly) = self.peek_len(*y) {
                    self.justify_len(*y, ly);
                    Some(total - ly)
                } else {
                    None
                };
                let positions: Vec<usize> = match cut {
                    Some(i) if (0..=total).contains(&i) => vec![i as usize],
                    Some(_) => return Outcome::Conflict,
                    None => (0..=chars.len()).collect(),
                };
                let arrangements = positions
                    .into_iter()
                    .map(|i| {
                        let head: String = chars[..i].iter().collect();
                        let tail: String = chars[i..].iter().collect();
                        let head = self.lit(&head);
                        let tail = self.lit(&tail);
                        Arrangement::plain(vec![self.eq(*x, head), self.eq(*y, tail)])
                    })
                    .collect();
                self.conclude(arrangements)
            }
        }
    }

    fn concat_eq_concat(
        &mut self,
        key: (TermId, TermId),
        lhs: &ConcatView,
        rhs: &ConcatView,
        equation: ConcatEquation<'_>,
    ) -> Outcome {
        if self.same_operand(&lhs.left(), &rhs.left()) {
            let a = self.operand_term(&lhs.right());
            let b = self.operand_term(&rhs.right());
            let fact = self.eq(a, b);
            return self.conclude(vec![Arrangement::plain(vec![fact])]);
        }
        if self.same_operand(&lhs.right(), &rhs.right()) {
            let a = self.operand_term(&lhs.left());
            let b = self.operand_term(&rhs.left());
            let fact = self.eq(a, b);
            return self.conclude(vec![Arrangement::plain(vec![fact])]);
        }

        match equation {
            ConcatEquation::VarsOnly { x, y, m, n } => self.vars_only(key, x, y, m, n),
            ConcatEquation::SuffixConst { x, s, m, n } => self.suffix_const(key, x, s, m, n),
            ConcatEquation::PrefixConst { s, y, m, n } => self.prefix_const(key, s, y, m, n),
            ConcatEquation::BothPrefixConst { s1, y, s2, n } => self.both_prefix(s1, y, s2, n),
            ConcatEquation::BothSuffixConst { x, s1, m, s2 } => self.both_suffix(x, s1, m, s2),
            ConcatEquation::PrefixSuffixConst { s1, y, m, s2 } => {
                self.prefix_suffix(key, s1, y, m, s2)
            }
        }
    }

    /// `x . y = m . n`
    fn vars_only(
        &mut self,
        key: (TermId, TermId),
        x: TermId,
        y: TermId,
        m: TermId,
        n: TermId,
    ) -> Outcome {
        for t in [x, y, m, n] {
            self.init_cut(t);
        }

        // |x| > |m| iff |n| > |y|
        let order = match (self.peek_len(x), self.peek_len(m)) {
            (Some(lx), Some(lm)) => {
                self.justify_len(x, lx);
                self.justify_len(m, lm);
                Some(lx.cmp(&lm))
            }
            _ => match (self.peek_len(y), self.peek_len(n)) {
                (Some(ly), Some(ln)) => {
                    self.justify_len(y, ly);
                    self.justify_len(n, ln);
                    Some(ln.cmp(&ly))
                }
                _ => None,
            },
        };

        let mut arrangements = Vec::new();
        if order.is_none_or(|o| o.is_eq()) {
            let facts = vec![self.eq(x, m), self.eq(y, n)];
            arrangements.push(Arrangement::plain(facts));
        }
        if order.is_none_or(|o| o.is_gt()) {
            // x = m . t, n = t . y
            arrangements.extend(self.with_remainder(key, 0, (m, y), |d, t| {
                let mt = d.cat(m, t);
                let ty = d.cat(t, y);
                vec![d.eq(x, mt), d.eq(n, ty)]
            }));
        }
        if order.is_none_or(|o| o.is_lt()) {
            // m = x . t, y = t . n
            arrangements.extend(self.with_remainder(key, 1, (x, n), |d, t| {
                let xt = d.cat(x, t);
                let tn = d.cat(t, n);
                vec![d.eq(m, xt), d.eq(y, tn)]
            }));
        }
        self.conclude(arrangements)
    }

    /// `x . s = m . n`
    fn suffix_const(
        &mut self,
        key: (TermId, TermId),
        x: TermId,
        s: &str,
        m: TermId,
        n: TermId,
    ) -> Outcome {
        for t in [x, m, n] {
            self.init_cut(t);
        }
        let chars: Vec<char> = s.chars().collect();
        let k = chars.len();

        // n = s[i..], m = x . s[..i]
        let split = |d: &mut Self, i: usize| {
            let tail: String = chars[i..].iter().collect();
            let head: String = chars[..i].iter().collect();
            let tail = d.lit(&tail);
            let head = d.lit(&head);
            let x_head = d.cat(x, head);
            Arrangement::plain(vec![d.eq(n, tail), d.eq(m, x_head)])
        };
        let mut arrangements = Vec::new();
        let known = self.peek_len(n);
        if let Some(ln) = known {
            self.justify_len(n, ln);
        }
        if known.is_none_or(|ln| ln <= k as i64) {
            match known {
                Some(ln) => arrangements.push(split(&mut *self, k - ln as usize)),
                None => {
                    for i in 0..=k {
                        arrangements.push(split(&mut *self, i));
                    }
                }
            }
        }
        if known.is_none_or(|ln| ln > k as i64) {
            // x = m . t, n = t . s
            arrangements.extend(self.with_remainder(key, 0, (m, n), |d, t| {
                let mt = d.cat(m, t);
                let s_lit = d.lit(s);
                let ts = d.cat(t, s_lit);
                vec![d.eq(x, mt), d.eq(n, ts)]
            }));
        }
        self.conclude(arrangements)
    }

    /// `s . y = m . n`
    fn prefix_const(
        &mut self,
        key: (TermId, TermId),
        s: &str,
        y: TermId,
        m: TermId,
        n: TermId,
    ) -> Outcome {
        for t in [y, m, n] {
            self.init_cut(t);
        }
        let chars: Vec<char> = s.chars().collect();
        let k = chars.len();

        // m = s[..i], n = s[i..] . y
        let split = |d: &mut Self, i: usize| {
            let head: String = chars[..i].iter().collect();
            let tail: String = chars[i..].iter().collect();
            let head = d.lit(&head);
            let tail = d.lit(&tail);
            let tail_y = d.cat(tail, y);
            Arrangement::plain(vec![d.eq(m, head), d.eq(n, tail_y)])
        };
        let mut arrangements = Vec::new();
        let known = self.peek_len(m);
        if let Some(lm) = known {
            self.justify_len(m, lm);
        }
        match known {
            Some(lm) if lm <= k as i64 => arrangements.push(split(&mut *self, lm as usize)),
            Some(_) => {}
            None => {
                for i in 0..=k {
                    arrangements.push(split(&mut *self, i));
                }
            }
        }
        if known.is_none_or(|lm| lm > k as i64) {
            // m = s . t, y = t . n
            arrangements.extend(self.with_remainder(key, 0, (m, n), |d, t| {
                let s_lit = d.lit(s);
                let st = d.cat(s_lit, t);
                let tn = d.cat(t, n);
                vec![d.eq(m, st), d.eq(y, tn)]
            }));
        }
        self.conclude(arrangements)
    }

    /// `s1 . y = s2 . n`
    fn both_prefix(&mut self, s1: &str, y: TermId, s2: &str, n: TermId) -> Outcome {
        let fact = if let Some(rest) = s1.strip_prefix(s2) {
            let rest = self.lit(rest);
            let rest_y = self.cat(rest, y);
            self.eq(n, rest_y)
        } else if let Some(rest) = s2.strip_prefix(s1) {
            let rest = self.lit(rest);
            let rest_n = self.cat(rest, n);
            self.eq(y, rest_n)
        } else {
            return Outcome::Conflict;
        };
        self.conclude(vec![Arrangement::plain(vec![fact])])
    }

    /// `x . s1 = m . s2`
    fn both_suffix(&mut self, x: TermId, s1: &str, m: TermId, s2: &str) -> Outcome {
        let fact = if let Some(rest) = s1.strip_suffix(s2) {
            let rest = self.lit(rest);
            let x_rest = self.cat(x, rest);
            self.eq(m, x_rest)
        } else if let Some(rest) = s2.strip_suffix(s1) {
            let rest = self.lit(rest);
            let m_rest = self.cat(m, rest);
            self.eq(x, m_rest)
        } else {
            return Outcome::Conflict;
        };
        self.conclude(vec![Arrangement::plain(vec![fact])])
    }

    /// `s1 . y = m . s2`
    fn prefix_suffix(
        &mut self,
        key: (TermId, TermId),
        s1: &str,
        y: TermId,
        m: TermId,
        s2: &str,
    ) -> Outcome {
        for t in [y, m] {
            self.init_cut(t);
        }
        let chars: Vec<char> = s1.chars().collect();
        let k = chars.len();

        // m = s1[..i], y = s2 without its prefix s1[i..]
        let split = |d: &mut Self, i: usize| -> Option<Arrangement> {
            let rest: String = chars[i..].iter().collect();
            let y_text = s2.strip_prefix(rest.as_str())?;
            let head: String = chars[..i].iter().collect();
            let head = d.lit(&head);
            let y_val = d.lit(y_text);
            Some(Arrangement::plain(vec![d.eq(m, head), d.eq(y, y_val)]))
        };
        let mut arrangements = Vec::new();
        let known = self.peek_len(m);
        if let Some(lm) = known {
            self.justify_len(m, lm);
        }
        match known {
            Some(lm) if lm <= k as i64 => arrangements.extend(split(&mut *self, lm as usize)),
            Some(_) => {}
            None => {
                for i in 0..=k {
                    arrangements.extend(split(&mut *self, i));
                }
            }
        }
        if known.is_none_or(|lm| lm > k as i64) {
            // m = s1 . t, y = t . s2
            arrangements.extend(self.with_remainder(key, 0, (m, y), |d, t| {
                let s1_lit = d.lit(s1);
                let s2_lit = d.lit(s2);
                let s1t = d.cat(s1_lit, t);
                let ts2 = d.cat(t, s2_lit);
                vec![d.eq(m, s1t), d.eq(y, ts2)]
            }));
        }
        self.conclude(arrangements)
    }

    /// Build an arrangement around the fresh nonempty remainder of `slot`,
    /// unless `guard` shows it would re-split the same equation.
    fn with_remainder(
        &mut self,
        key: (TermId, TermId),
        slot: u8,
        guard: (TermId, TermId),
        build: impl FnOnce(&mut Self, TermId) -> Vec<TermId>,
    ) -> Option<Arrangement> {
        if self.cuts.has_self_cut(guard.0, guard.1) && self.avoid_loop_cut {
            trace!(a = %guard.0, b = %guard.1, "arrangement blocked by loop check");
            self.blocked += 1;
            return None;
        }
        let t = self.fresh.break_var(&mut *self.ctx, key.0, key.1, slot);
        let facts = build(self, t);
        Some(Arrangement {
            facts,
            cut: Some(CutUpdate {
                target: t,
                sources: smallvec![guard.0, guard.1],
            }),
        })
    }

    // Drop trivially true facts, discard falsified arrangements, and pick
    // the outcome from what survives.
    fn conclude(&mut self, arrangements: Vec<Arrangement>) -> Outcome {
        let tm = self.ctx.terms();
        let (tt, ff) = (tm.mk_true(), tm.mk_false());
        let mut live: Vec<Vec<TermId>> = Vec::new();
        for arrangement in arrangements {
            if arrangement.facts.contains(&ff) {
                continue;
            }
            let mut facts: Vec<TermId> = Vec::new();
            for fact in arrangement.facts {
                if fact != tt && !facts.contains(&fact) {
                    facts.push(fact);
                }
            }
            if let Some(cut) = arrangement.cut {
                self.cut_updates.push(cut);
            }
            live.push(facts);
        }
        if live.iter().any(|facts| facts.is_empty()) {
            return Outcome::Satisfied;
        }
        match live.len() {
            0 if self.blocked > 0 => Outcome::Blocked,
            0 => Outcome::Conflict,
            1 => Outcome::Implied(live.swap_remove(0)),
            _ => Outcome::Split(live),
        }
    }

    fn same_operand(&mut self, a: &Operand, b: &Operand) -> bool {
        match (a, b) {
            (Operand::Const(x), Operand::Const(y)) => x == y,
            (Operand::Var(x), Operand::Var(y)) if x == y => true,
            (Operand::Var(x), Operand::Var(y)) if self.ctx.are_equal(*x, *y) => {
                let fact = self.eq(*x, *y);
                self.support.push(fact);
                true
            }
            _ => false,
        }
    }

    fn operand_term(&mut self, op: &Operand) -> TermId {
        match op {
            Operand::Const(s) => self.lit(s),
            Operand::Var(t) => *t,
        }
    }

    fn init_cut(&mut self, term: TermId) {
        self.cuts.check_and_init(term, self.level);
    }

    fn peek_len(&self, term: TermId) -> Option<i64> {
        self.ctx.length_value(term)
    }

    fn justify_len(&mut self, term: TermId, len: i64) {
        let tm = self.ctx.terms_mut();
        let len_term = tm.mk_str_len(term);
        let value = tm.mk_int(len);
        let fact = tm.mk_eq(len_term, value);
        if !self.support.contains(&fact) {
            self.support.push(fact);
        }
    }

    fn lit(&mut self, text: &str) -> TermId {
        self.ctx.terms_mut().mk_string_lit(text)
    }

    fn eq(&mut self, a: TermId, b: TermId) -> TermId {
        self.ctx.terms_mut().mk_eq(a, b)
    }

    // Concatenation with empty and constant operands folded away.
    fn cat(&mut self, a: TermId, b: TermId) -> TermId {
        let tm = self.ctx.terms_mut();
        match (tm.string_lit(a), tm.string_lit(b)) {
            (Some(""), _) => b,
            (_, Some("")) => a,
            (Some(x), Some(y)) => {
                let text = format!("{x}{y}");
                tm.mk_string_lit(&text)
            }
            _ => tm.mk_str_concat(a, b),
        }
    }
}

/// Leaves of a nested concatenation, left to right.
pub fn flatten(ctx: &dyn TheoryContext, term: TermId) -> Vec<TermId> {
    let tm = ctx.terms();
    let mut leaves = Vec::new();
    let mut stack = vec![term];
    while let Some(t) = stack.pop() {
        match tm.is_str_concat(t) {
            Some((a, b)) => {
                stack.push(b);
                stack.push(a);
            }
            None => leaves.push(t),
        }
    }
    leaves
}
