//! String model construction.
//!
//! Values are assigned per equivalence class:
//! 1. a class holding a literal takes that literal;
//! 2. a class holding `concat(a, b)` whose operand classes have values takes
//!    their concatenation (repeated to a fixpoint);
//! 3. a class of plain variables takes a fresh string of the smallest
//!    admissible length, distinct from every value handed out so far.
//!
//! A class reaching itself through concat operands, as in `x = y ++ x`,
//! has the same length as every class on the way, so the operands off that
//! path are empty. Those classes are set to `""` first. A concat member with
//! an empty operand then only says that its class equals the other operand,
//! and does not block step 3.
//!
//! Construction fails with [`StrzError::ModelIncomplete`] when classes
//! still depend on each other cyclically, when no fresh string fits the
//! length bounds, or when two members of a class evaluate differently.

use super::fresh::FreshVars;
use super::word_eq::class_literal;
use rustc_hash::{FxHashMap, FxHashSet};
use strz_core::ast::TermId;
use strz_core::error::{Result, StrzError};
use strz_core::traits::{TheoryContext, TheoryModel};
use tracing::debug;

// Fresh strings longer than the lower bound by more than this are not tried.
const MAX_LENGTH_SLACK: usize = 3;

/// Longest fresh string the builder will synthesize.
pub const MAX_SYNTH_LENGTH: usize = 1 << 16;

/// How a concat member of an unassigned class constrains its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum MemberRole {
    /// Not a concat, or `x ++ ""` with `x` in the class itself.
    Free,
    /// `y ++ ""` with `y` in another unassigned class.
    PassThrough,
    /// Anything else.
    Blocking,
}

/// Per-branch value table keyed by class representative.
#[derive(Debug, Clone, Default)]
pub struct ModelBuilder {
    values: FxHashMap<TermId, String>,
}

impl ModelBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the table with the literal of every class that has one.
    pub fn init(&mut self, ctx: &dyn TheoryContext, terms: &[TermId]) {
        self.values.clear();
        for &term in terms {
            let root = ctx.root(term);
            if self.values.contains_key(&root) {
                continue;
            }
            if let Some((_, text)) = class_literal(ctx, term) {
                self.values.insert(root, text);
            }
        }
    }

    /// Value of the class of `term`, if assigned.
    pub fn value_of(&self, ctx: &dyn TheoryContext, term: TermId) -> Option<&str> {
        self.values.get(&ctx.root(term)).map(String::as_str)
    }

    /// Assign every class of `terms` and return the values of the
    /// non-internal terms.
    pub fn build(
        &mut self,
        ctx: &mut dyn TheoryContext,
        terms: &[TermId],
        fresh: &FreshVars,
    ) -> Result<TheoryModel> {
        let classes = group_classes(&*ctx, terms);
        self.empty_cycle_operands(&*ctx, &classes);

        loop {
            if self.derive_concat_values(&*ctx, &classes) {
                continue;
            }
            let pending: Vec<&(TermId, Vec<TermId>)> = classes
                .iter()
                .filter(|(root, _)| !self.values.contains_key(root))
                .collect();
            if pending.is_empty() {
                break;
            }
            let roles = |(root, members): &&&(TermId, Vec<TermId>)| {
                members
                    .iter()
                    .map(|&m| self.member_role(&*ctx, *root, m))
                    .max()
                    .unwrap_or(MemberRole::Free)
            };
            let candidate = pending
                .iter()
                .find(|c| roles(c) == MemberRole::Free)
                .or_else(|| pending.iter().find(|c| roles(c) == MemberRole::PassThrough));
            let Some(&&(root, _)) = candidate else {
                return Err(StrzError::model_incomplete(format!(
                    "{} classes depend on each other cyclically",
                    pending.len()
                )));
            };
            let text = self.synthesize(&*ctx, root)?;
            debug!(class = %root, value = %text, "fresh string value");
            self.values.insert(root, text);
        }

        self.check_consistency(&*ctx, &classes)?;

        let mut model = TheoryModel::new();
        for &term in terms {
            if fresh.is_internal(term) {
                continue;
            }
            let root = ctx.root(term);
            let Some(text) = self.values.get(&root) else {
                return Err(StrzError::internal(format!("class {root} has no value")));
            };
            let value = ctx.terms_mut().mk_string_lit(text);
            model.assign(term, value);
        }
        Ok(model)
    }

    fn derive_concat_values(
        &mut self,
        ctx: &dyn TheoryContext,
        classes: &[(TermId, Vec<TermId>)],
    ) -> bool {
        let tm = ctx.terms();
        let mut progress = false;
        for (root, members) in classes {
            if self.values.contains_key(root) {
                continue;
            }
            let derived = members.iter().find_map(|&m| {
                let (a, b) = tm.is_str_concat(m)?;
                let va = self.values.get(&ctx.root(a))?;
                let vb = self.values.get(&ctx.root(b))?;
                Some(format!("{va}{vb}"))
            });
            if let Some(text) = derived {
                self.values.insert(*root, text);
                progress = true;
            }
        }
        progress
    }

    fn is_empty_class(&self, ctx: &dyn TheoryContext, term: TermId) -> bool {
        self.values
            .get(&ctx.root(term))
            .is_some_and(String::is_empty)
    }

    fn member_role(&self, ctx: &dyn TheoryContext, root: TermId, member: TermId) -> MemberRole {
        let Some((a, b)) = ctx.terms().is_str_concat(member) else {
            return MemberRole::Free;
        };
        let through = if self.is_empty_class(ctx, b) {
            a
        } else if self.is_empty_class(ctx, a) {
            b
        } else {
            return MemberRole::Blocking;
        };
        if ctx.root(through) == root {
            MemberRole::Free
        } else {
            MemberRole::PassThrough
        }
    }

    // Every edge `class -> operand class` on a cycle of concat members keeps
    // the length, so the sibling operand of such an edge is empty.
    fn empty_cycle_operands(&mut self, ctx: &dyn TheoryContext, classes: &[(TermId, Vec<TermId>)]) {
        let tm = ctx.terms();
        let mut edges: FxHashMap<TermId, Vec<TermId>> = FxHashMap::default();
        let mut links = Vec::new();
        for (root, members) in classes {
            for &m in members {
                if let Some((a, b)) = tm.is_str_concat(m) {
                    let (ra, rb) = (ctx.root(a), ctx.root(b));
                    edges.entry(*root).or_default().extend([ra, rb]);
                    links.push((*root, ra, rb));
                    links.push((*root, rb, ra));
                }
            }
        }

        for (from, to, sibling) in links {
            if self.values.contains_key(&sibling) || !reaches(&edges, to, from) {
                continue;
            }
            debug!(class = %sibling, "operand on a concat cycle is empty");
            self.values.insert(sibling, String::new());
        }
    }

    // Shortest unused string within the class's length bounds, falling
    // back to a value only used by classes not known to be disequal.
    fn synthesize(&self, ctx: &dyn TheoryContext, root: TermId) -> Result<String> {
        let (min, max) = ctx.length_bounds(root);
        if max.is_some_and(|max| max < 0) {
            return Err(StrzError::model_incomplete(format!(
                "class {root} has a negative length bound"
            )));
        }
        let min = usize::try_from(min.max(0)).unwrap_or(usize::MAX);
        if min > MAX_SYNTH_LENGTH {
            return Err(StrzError::model_incomplete(format!(
                "class {root} needs a string of at least {min} characters, \
                 longer than {MAX_SYNTH_LENGTH}"
            )));
        }
        let upper = match max {
            Some(max) => usize::try_from(max)
                .unwrap_or(usize::MAX)
                .min(min + MAX_LENGTH_SLACK),
            None => min + MAX_LENGTH_SLACK,
        };

        let used: FxHashSet<&str> = self.values.values().map(String::as_str).collect();
        let mut fallback = None;
        for len in min..=upper {
            let limit = candidate_count(len).min(used.len() as u64 + 1);
            for k in 0..limit {
                let candidate = nth_string(len, k);
                if !used.contains(candidate.as_str()) {
                    return Ok(candidate);
                }
                if fallback.is_none() && !self.clashes(ctx, root, &candidate) {
                    fallback = Some(candidate);
                }
            }
        }
        fallback.ok_or_else(|| {
            StrzError::model_incomplete(format!(
                "no string of length {min}..={upper} is available for class {root}"
            ))
        })
    }

    fn clashes(&self, ctx: &dyn TheoryContext, root: TermId, text: &str) -> bool {
        self.values
            .iter()
            .any(|(&other, value)| value == text && ctx.are_disequal(root, other))
    }

    fn check_consistency(
        &self,
        ctx: &dyn TheoryContext,
        classes: &[(TermId, Vec<TermId>)],
    ) -> Result<()> {
        let tm = ctx.terms();
        for (root, members) in classes {
            let Some(value) = self.values.get(root) else {
                continue;
            };
            for &m in members {
                let actual = if let Some(text) = tm.string_lit(m) {
                    Some(text.to_string())
                } else if let Some((a, b)) = tm.is_str_concat(m) {
                    match (self.values.get(&ctx.root(a)), self.values.get(&ctx.root(b))) {
                        (Some(va), Some(vb)) => Some(format!("{va}{vb}")),
                        _ => None,
                    }
                } else {
                    None
                };
                if let Some(actual) = actual
                    && &actual != value
                {
                    return Err(StrzError::model_incomplete(format!(
                        "class {root} evaluates to both {value:?} and {actual:?}"
                    )));
                }
            }
        }
        Ok(())
    }
}

fn group_classes(ctx: &dyn TheoryContext, terms: &[TermId]) -> Vec<(TermId, Vec<TermId>)> {
    let mut index: FxHashMap<TermId, usize> = FxHashMap::default();
    let mut classes: Vec<(TermId, Vec<TermId>)> = Vec::new();
    let mut seen: FxHashSet<TermId> = FxHashSet::default();
    for &term in terms {
        if !seen.insert(term) {
            continue;
        }
        let root = ctx.root(term);
        let slot = *index.entry(root).or_insert_with(|| {
            classes.push((root, Vec::new()));
            classes.len() - 1
        });
        classes[slot].1.push(term);
    }
    classes
}

// Whether `from` reaches `to` along operand edges, in zero or more steps.
fn reaches(edges: &FxHashMap<TermId, Vec<TermId>>, from: TermId, to: TermId) -> bool {
    let mut seen = FxHashSet::default();
    let mut stack = vec![from];
    while let Some(node) = stack.pop() {
        if node == to {
            return true;
        }
        if seen.insert(node) {
            stack.extend(edges.get(&node).into_iter().flatten().copied());
        }
    }
    false
}

fn candidate_count(len: usize) -> u64 {
    26u64.saturating_pow(len as u32)
}

// The k-th string of length `len` over 'a'..='z' in lexicographic order.
fn nth_string(len: usize, mut k: u64) -> String {
    let mut chars = vec!['a'; len];
    for slot in chars.iter_mut().rev() {
        *slot = char::from(b'a' + (k % 26) as u8);
        k /= 26;
    }
    chars.into_iter().collect()
}
