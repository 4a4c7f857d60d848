//! Final check: word equation dispatch.
//!
//! Each round first makes sure every string term has its axioms. It then
//! collects candidate equations from the host's classes, decomposes all of
//! them, and asserts every deterministic conclusion. Only when no
//! deterministic progress is possible is a single case split asserted,
//! the one with the fewest arrangements.

use super::solver::StringSolver;
use super::word_eq::{CutUpdate, Decomposer, Outcome, WordEquation};
use rustc_hash::{FxHashMap, FxHashSet};
use strz_core::ast::TermId;
use strz_core::traits::{FinalCheckResult, TheoryContext};
use tracing::{debug, trace};

/// A split found during a round but not yet asserted.
struct PendingSplit {
    premise: TermId,
    arrangements: Vec<Vec<TermId>>,
    cuts: Vec<CutUpdate>,
}

/// Members of one class, partitioned by shape.
#[derive(Default)]
struct ClassGroup {
    concats: Vec<TermId>,
    literal: Option<TermId>,
    vars: Vec<TermId>,
}

impl StringSolver {
    pub(super) fn run_final_check(&mut self, ctx: &mut dyn TheoryContext) -> FinalCheckResult {
        self.stats.final_checks += 1;

        self.requeue_missing_axioms();
        if self.axioms.propagate(ctx) {
            return FinalCheckResult::Continue;
        }

        let candidates = self.collect_candidates(&*ctx);
        trace!(count = candidates.len(), "word equation candidates");

        let mut progress = false;
        let mut blocked = false;
        let mut best_split: Option<PendingSplit> = None;

        for (lhs, rhs) in candidates {
            let eq = WordEquation::resolve(&mut *ctx, lhs, rhs);
            let decomposition = Decomposer::new(
                &mut *ctx,
                &mut self.fresh,
                &mut self.cuts,
                self.config.avoid_loop_cut,
                self.level,
            )
            .decompose(&eq);

            if let Some(case) = decomposition.case {
                self.stats.cases[case.index()] += 1;
            }
            if decomposition.blocked > 0 {
                self.loop_detected = true;
                self.stats.loop_blocks += decomposition.blocked as u64;
            }

            let premise = {
                let tm = ctx.terms_mut();
                let eq_atom = tm.mk_eq(eq.lhs, eq.rhs);
                let parts: Vec<TermId> = std::iter::once(eq_atom)
                    .chain(eq.support.iter().copied())
                    .chain(decomposition.support.iter().copied())
                    .collect();
                tm.mk_and(parts)
            };
            if self.processed.contains(&premise) {
                // Keep cut records in step with the current branch.
                self.apply_cuts(&decomposition.cuts);
                continue;
            }

            match decomposition.outcome {
                Outcome::Satisfied => {
                    self.processed.insert(premise);
                    self.apply_cuts(&decomposition.cuts);
                }
                Outcome::Implied(facts) => {
                    let conclusion = ctx.terms_mut().mk_and(facts);
                    ctx.assert_implication(premise, conclusion);
                    self.processed.insert(premise);
                    self.apply_cuts(&decomposition.cuts);
                    self.stats.implied += 1;
                    progress = true;
                }
                Outcome::Conflict => {
                    let conclusion = ctx.terms().mk_false();
                    ctx.assert_implication(premise, conclusion);
                    self.processed.insert(premise);
                    self.stats.conflicts += 1;
                    progress = true;
                }
                Outcome::Split(arrangements) => {
                    let smaller = best_split
                        .as_ref()
                        .is_none_or(|best| arrangements.len() < best.arrangements.len());
                    if smaller {
                        best_split = Some(PendingSplit {
                            premise,
                            arrangements,
                            cuts: decomposition.cuts,
                        });
                    }
                }
                Outcome::Blocked => blocked = true,
            }
        }

        if progress {
            return FinalCheckResult::Continue;
        }
        if let Some(split) = best_split {
            self.assert_split(ctx, split);
            return FinalCheckResult::Continue;
        }
        if blocked {
            debug!("every arrangement of an equation was suppressed");
            return FinalCheckResult::Conflict;
        }
        FinalCheckResult::Sat
    }

    // Requests queued inside scopes that were popped before the queue was
    // drained are lost; put them back.
    fn requeue_missing_axioms(&mut self) {
        for &term in &self.string_terms {
            if !self.axioms.has_basic(term) {
                self.axioms.enqueue_basic(term);
            }
        }
        for &term in &self.concat_terms {
            if !self.axioms.has_concat(term) {
                self.axioms.enqueue_concat(term);
            }
        }
    }

    fn collect_candidates(&mut self, ctx: &dyn TheoryContext) -> Vec<(TermId, TermId)> {
        let mut seen: FxHashSet<(TermId, TermId)> = FxHashSet::default();
        let mut candidates = Vec::new();
        let mut push = |a: TermId, b: TermId| {
            if a == b {
                return;
            }
            let key = if a < b { (a, b) } else { (b, a) };
            if seen.insert(key) {
                candidates.push((a, b));
            }
        };

        for (a, b) in self.pending_eqs.take_pending() {
            if ctx.are_equal(a, b) {
                push(a, b);
            }
        }

        let tm = ctx.terms();
        let mut groups: FxHashMap<TermId, ClassGroup> = FxHashMap::default();
        let mut order: Vec<TermId> = Vec::new();
        for &concat in &self.concat_terms {
            let root = ctx.root(concat);
            if groups.contains_key(&root) {
                continue;
            }
            let mut group = ClassGroup::default();
            for member in ctx.eqc_members(concat) {
                if tm.is_str_concat(member).is_some() {
                    group.concats.push(member);
                } else if tm.string_lit(member).is_some() {
                    group.literal.get_or_insert(member);
                } else if tm.is_string_sort(member) {
                    group.vars.push(member);
                }
            }
            groups.insert(root, group);
            order.push(root);
        }

        for root in order {
            let Some(group) = groups.get(&root) else {
                continue;
            };
            if let Some((&pivot, rest)) = group.concats.split_first() {
                for &other in rest {
                    push(pivot, other);
                }
            }
            for &concat in &group.concats {
                if let Some(lit) = group.literal {
                    push(concat, lit);
                }
                for &var in &group.vars {
                    push(var, concat);
                }
            }
        }
        candidates
    }

    fn assert_split(&mut self, ctx: &mut dyn TheoryContext, split: PendingSplit) {
        let selectors: Vec<TermId> = split
            .arrangements
            .iter()
            .map(|_| self.fresh.mk_selector(&mut *ctx))
            .collect();
        debug!(
            premise = %split.premise,
            arrangements = split.arrangements.len(),
            "asserting case split"
        );

        let disjunction = ctx.terms_mut().mk_or(selectors.iter().copied());
        ctx.assert_implication(split.premise, disjunction);
        for (&selector, facts) in selectors.iter().zip(split.arrangements) {
            let conjunction = ctx.terms_mut().mk_and(facts);
            ctx.assert_implication(selector, conjunction);
        }

        self.processed.insert(split.premise);
        self.apply_cuts(&split.cuts);
        self.stats.splits += 1;
    }

    fn apply_cuts(&mut self, cuts: &[CutUpdate]) {
        for update in cuts {
            for &source in &update.sources {
                self.cuts.record_merge(update.target, self.level, source);
            }
        }
    }
}
