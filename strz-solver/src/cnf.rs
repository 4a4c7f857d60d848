//! Formula to clause conversion.
//!
//! Negations are pushed to the atoms while walking the formula (negation
//! normal form by polarity), and disjunctions are distributed over
//! conjunctions. Atoms are Boolean variables, equalities between string or
//! integer terms, and integer comparisons. An equality between Boolean
//! terms is read as an equivalence.
//!
//! Distribution can blow up; a conversion producing more than
//! [`MAX_CLAUSES`] clauses fails with [`StrzError::ResourceLimit`].

use smallvec::SmallVec;
use strz_core::ast::{TermId, TermKind, TermManager};
use strz_core::error::{Result, StrzError};
use strz_core::sort::SortKind;

/// Largest clause set a single formula may produce.
pub const MAX_CLAUSES: usize = 4096;

/// A signed atom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AtomLit {
    /// The atom term.
    pub atom: TermId,
    /// Polarity.
    pub positive: bool,
}

impl AtomLit {
    fn negate(self) -> Self {
        Self {
            atom: self.atom,
            positive: !self.positive,
        }
    }
}

/// A disjunction of signed atoms.
pub type AtomClause = SmallVec<[AtomLit; 4]>;

/// Check whether a term is an atom for the clause store.
pub fn is_atom(tm: &TermManager, term: TermId) -> bool {
    match tm.kind(term) {
        Some(TermKind::Var(_)) => tm.is_bool_sort(term),
        Some(TermKind::Eq(a, _)) => !tm.is_bool_sort(*a),
        Some(TermKind::Le(..) | TermKind::Lt(..) | TermKind::Ge(..) | TermKind::Gt(..)) => true,
        _ => false,
    }
}

/// Convert a Boolean formula to clauses.
///
/// `true` gives no clause, `false` gives the empty clause.
pub fn clausify(tm: &TermManager, formula: TermId) -> Result<Vec<AtomClause>> {
    match tm.sort_kind(formula) {
        Some(SortKind::Bool) => {}
        Some(found) => {
            return Err(StrzError::SortMismatch {
                term: formula.raw(),
                expected: SortKind::Bool.to_string(),
                found: found.to_string(),
            });
        }
        None => return Err(StrzError::UnknownTerm(formula.raw())),
    }
    convert(tm, formula, true)
}

fn convert(tm: &TermManager, term: TermId, positive: bool) -> Result<Vec<AtomClause>> {
    let Some(kind) = tm.kind(term) else {
        return Err(StrzError::UnknownTerm(term.raw()));
    };
    match kind {
        TermKind::True | TermKind::False => {
            let holds = matches!(kind, TermKind::True) == positive;
            Ok(if holds {
                Vec::new()
            } else {
                vec![AtomClause::new()]
            })
        }
        TermKind::Not(inner) => convert(tm, *inner, !positive),
        TermKind::And(args) if positive => conjoin(args.iter().map(|&a| convert(tm, a, true))),
        TermKind::And(args) => disjoin(args.iter().map(|&a| convert(tm, a, false))),
        TermKind::Or(args) if positive => disjoin(args.iter().map(|&a| convert(tm, a, true))),
        TermKind::Or(args) => conjoin(args.iter().map(|&a| convert(tm, a, false))),
        TermKind::Implies(premise, conclusion) if positive => disjoin([
            convert(tm, *premise, false),
            convert(tm, *conclusion, true),
        ]),
        TermKind::Implies(premise, conclusion) => conjoin([
            convert(tm, *premise, true),
            convert(tm, *conclusion, false),
        ]),
        TermKind::Eq(a, b) if tm.is_bool_sort(*a) => {
            // (a <-> b) is (¬a ∨ b) ∧ (a ∨ ¬b); its negation (a ∨ b) ∧ (¬a ∨ ¬b).
            let (a, b) = (*a, *b);
            let first = disjoin([convert(tm, a, false), convert(tm, b, positive)]);
            let second = disjoin([convert(tm, a, true), convert(tm, b, !positive)]);
            conjoin([first, second])
        }
        _ if is_atom(tm, term) => {
            let mut clause = AtomClause::new();
            clause.push(AtomLit {
                atom: term,
                positive,
            });
            Ok(vec![clause])
        }
        _ => Err(StrzError::SortMismatch {
            term: term.raw(),
            expected: SortKind::Bool.to_string(),
            found: tm
                .sort_kind(term)
                .map_or_else(|| "unknown".to_string(), |s| s.to_string()),
        }),
    }
}

fn conjoin(parts: impl IntoIterator<Item = Result<Vec<AtomClause>>>) -> Result<Vec<AtomClause>> {
    let mut out = Vec::new();
    for part in parts {
        out.extend(part?);
        check_size(out.len())?;
    }
    Ok(out)
}

fn disjoin(parts: impl IntoIterator<Item = Result<Vec<AtomClause>>>) -> Result<Vec<AtomClause>> {
    // The neutral element of the product: one empty clause.
    let mut out: Vec<AtomClause> = vec![AtomClause::new()];
    for part in parts {
        let part = part?;
        check_size(out.len().saturating_mul(part.len()))?;
        let mut product = Vec::with_capacity(out.len() * part.len());
        for left in &out {
            for right in &part {
                if let Some(clause) = merge_clauses(left, right) {
                    product.push(clause);
                }
            }
        }
        out = product;
    }
    Ok(out)
}

/// Union of two clauses; `None` if the result is a tautology.
fn merge_clauses(left: &AtomClause, right: &AtomClause) -> Option<AtomClause> {
    let mut clause = left.clone();
    for &lit in right {
        if clause.contains(&lit.negate()) {
            return None;
        }
        if !clause.contains(&lit) {
            clause.push(lit);
        }
    }
    Some(clause)
}

fn check_size(count: usize) -> Result<()> {
    if count > MAX_CLAUSES {
        return Err(StrzError::ResourceLimit(format!(
            "clausification exceeds {MAX_CLAUSES} clauses"
        )));
    }
    Ok(())
}
