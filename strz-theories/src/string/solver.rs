//! The string theory plugin.

use super::axioms::{AxiomEngine, AxiomStats};
use super::cut::CutDetector;
use super::fresh::FreshVars;
use super::model::ModelBuilder;
use super::queue::ScopedQueue;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use strz_core::ast::{TermId, TermManager};
use strz_core::error::{Result, StrzError};
use strz_core::sort::SortKind;
use strz_core::traits::{FinalCheckResult, Theory, TheoryContext, TheoryModel};
use tracing::{debug, trace};

/// Configuration for the string plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StringConfig {
    /// Suppress split arrangements that would re-split an equation already
    /// being split. Unsat answers become unknown once anything is
    /// suppressed.
    pub avoid_loop_cut: bool,
    /// Assert `concat("a", "b") = "ab"` for constant concatenations.
    pub fold_constant_concats: bool,
}

impl Default for StringConfig {
    fn default() -> Self {
        Self {
            avoid_loop_cut: true,
            fold_constant_concats: true,
        }
    }
}

/// Statistics for the string plugin.
#[derive(Debug, Clone, Default)]
pub struct StringStats {
    /// Instantiated axioms.
    pub axioms: AxiomStats,
    /// Concatenation equations seen, per [`super::ConcatEqCase::index`].
    pub cases: [u64; 6],
    /// Lemmas with a deterministic conclusion.
    pub implied: u64,
    /// Case splits asserted.
    pub splits: u64,
    /// Equations refuted.
    pub conflicts: u64,
    /// Arrangements suppressed by loop detection.
    pub loop_blocks: u64,
    /// Final checks performed.
    pub final_checks: u64,
}

/// Theory plugin for word equations with length constraints.
#[derive(Debug)]
pub struct StringSolver {
    pub(super) config: StringConfig,
    pub(super) stats: StringStats,
    pub(super) axioms: AxiomEngine,
    pub(super) fresh: FreshVars,
    pub(super) cuts: CutDetector,
    /// Equalities reported by the host that involve a concatenation.
    pub(super) pending_eqs: ScopedQueue<(TermId, TermId)>,
    pub(super) string_terms: Vec<TermId>,
    string_seen: FxHashSet<TermId>,
    pub(super) concat_terms: Vec<TermId>,
    /// Premises of lemmas already asserted (or found to need none).
    pub(super) processed: FxHashSet<TermId>,
    pub(super) level: usize,
    pub(super) loop_detected: bool,
    model: ModelBuilder,
}

impl StringSolver {
    /// Create a plugin with the default configuration.
    pub fn new() -> Self {
        Self::with_config(StringConfig::default())
    }

    /// Create a plugin with the given configuration.
    pub fn with_config(config: StringConfig) -> Self {
        let axioms = AxiomEngine::new(config.fold_constant_concats);
        Self {
            config,
            stats: StringStats::default(),
            axioms,
            fresh: FreshVars::new(),
            cuts: CutDetector::new(),
            pending_eqs: ScopedQueue::new(),
            string_terms: Vec::new(),
            string_seen: FxHashSet::default(),
            concat_terms: Vec::new(),
            processed: FxHashSet::default(),
            level: 0,
            loop_detected: false,
            model: ModelBuilder::new(),
        }
    }

    /// Configuration.
    pub fn config(&self) -> &StringConfig {
        &self.config
    }

    /// Statistics.
    pub fn stats(&self) -> StringStats {
        let mut stats = self.stats.clone();
        stats.axioms = self.axioms.stats();
        stats
    }

    /// Check whether loop detection suppressed any arrangement.
    pub fn loop_detected(&self) -> bool {
        self.loop_detected
    }

    /// Check whether a term is an internal variable of the plugin.
    pub fn is_internal(&self, term: TermId) -> bool {
        self.fresh.is_internal(term)
    }

    /// Every string term registered so far.
    pub fn string_terms(&self) -> &[TermId] {
        &self.string_terms
    }

    /// Cut records of the loop detector.
    pub fn cut_detector(&self) -> &CutDetector {
        &self.cuts
    }

    /// Number of concatenation equalities not yet seen by a final check.
    pub fn num_pending_eqs(&self) -> usize {
        self.pending_eqs.num_pending()
    }

    /// Current scope depth.
    pub fn scope_level(&self) -> usize {
        self.level
    }

    fn check_string_sort(ctx: &dyn TheoryContext, term: TermId) -> Result<()> {
        let tm = ctx.terms();
        match tm.sort_kind(term) {
            Some(SortKind::String) => Ok(()),
            Some(found) => Err(StrzError::SortMismatch {
                term: term.raw(),
                expected: SortKind::String.to_string(),
                found: found.to_string(),
            }),
            None => Err(StrzError::UnknownTerm(term.raw())),
        }
    }
}

/// Literal characters at one end of `term`, read from that end inward, and
/// whether they cover the whole term.
fn constant_end(tm: &TermManager, term: TermId, from_start: bool) -> (Vec<char>, bool) {
    if let Some(text) = tm.string_lit(term) {
        let mut chars: Vec<char> = text.chars().collect();
        if !from_start {
            chars.reverse();
        }
        return (chars, true);
    }
    let Some((a, b)) = tm.is_str_concat(term) else {
        return (Vec::new(), false);
    };
    let (outer, inner) = if from_start { (a, b) } else { (b, a) };
    let (mut chars, whole) = constant_end(tm, outer, from_start);
    if !whole {
        return (chars, false);
    }
    let (rest, rest_whole) = constant_end(tm, inner, from_start);
    chars.extend(rest);
    (chars, rest_whole)
}

/// Check whether the literal prefixes or suffixes of two terms already
/// rule out their equality.
fn constant_ends_clash(tm: &TermManager, lhs: TermId, rhs: TermId) -> bool {
    [true, false].into_iter().any(|from_start| {
        let (a, a_whole) = constant_end(tm, lhs, from_start);
        let (b, b_whole) = constant_end(tm, rhs, from_start);
        a.iter().zip(&b).any(|(x, y)| x != y)
            || (a_whole && b.len() > a.len())
            || (b_whole && a.len() > b.len())
    })
}

impl Default for StringSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Theory for StringSolver {
    fn name(&self) -> &str {
        "strings"
    }

    fn reset(&mut self) {
        self.stats = StringStats::default();
        self.axioms.reset();
        self.fresh.reset();
        self.cuts.reset();
        self.pending_eqs.clear();
        self.string_terms.clear();
        self.string_seen.clear();
        self.concat_terms.clear();
        self.processed.clear();
        self.level = 0;
        self.loop_detected = false;
        self.model = ModelBuilder::new();
    }

    fn internalize_term(&mut self, ctx: &mut dyn TheoryContext, term: TermId) -> Result<()> {
        Self::check_string_sort(&*ctx, term)?;
        let concat = ctx.terms().is_str_concat(term);
        if let Some((lhs, rhs)) = concat {
            Self::check_string_sort(&*ctx, lhs)?;
            Self::check_string_sort(&*ctx, rhs)?;
        }
        if !self.string_seen.insert(term) {
            return Ok(());
        }

        if let Some((lhs, rhs)) = concat {
            self.internalize_term(ctx, lhs)?;
            self.internalize_term(ctx, rhs)?;
            self.concat_terms.push(term);
            self.axioms.enqueue_concat(term);
        }
        self.string_terms.push(term);
        self.axioms.enqueue_basic(term);
        trace!(term = %term, "internalized string term");
        Ok(())
    }

    fn new_eq(&mut self, ctx: &mut dyn TheoryContext, lhs: TermId, rhs: TermId) {
        let tm = ctx.terms();
        if !tm.is_string_sort(lhs) || !tm.is_string_sort(rhs) {
            return;
        }
        let concat = tm.is_str_concat(lhs).is_some() || tm.is_str_concat(rhs).is_some();
        let clash = concat && constant_ends_clash(tm, lhs, rhs);
        self.axioms.enqueue_eq_length(lhs, rhs);
        if clash {
            let tm = ctx.terms_mut();
            let eq = tm.mk_eq(lhs, rhs);
            let refuted = tm.mk_not(eq);
            if self.processed.insert(eq) {
                debug!(lhs = %lhs, rhs = %rhs, "constant ends clash");
                ctx.assert_axiom(refuted);
                self.stats.conflicts += 1;
            }
        } else if concat {
            self.pending_eqs.push((lhs, rhs));
        }
    }

    fn new_diseq(&mut self, _ctx: &mut dyn TheoryContext, lhs: TermId, rhs: TermId) {
        // Disequalities are enforced by the host; the model builder reads
        // them back through the context.
        trace!(lhs = %lhs, rhs = %rhs, "string disequality");
    }

    fn push_scope(&mut self) {
        self.level += 1;
        self.axioms.push_scope();
        self.pending_eqs.push_scope();
    }

    fn pop_scope(&mut self, num_scopes: usize) {
        self.level = self.level.saturating_sub(num_scopes);
        self.axioms.pop_scope(num_scopes);
        self.pending_eqs.pop_scope(num_scopes);
        self.cuts.pop_to_level(self.level);
    }

    fn can_propagate(&self) -> bool {
        self.axioms.has_pending()
    }

    fn propagate(&mut self, ctx: &mut dyn TheoryContext) -> bool {
        self.axioms.propagate(ctx)
    }

    fn final_check(&mut self, ctx: &mut dyn TheoryContext) -> FinalCheckResult {
        let result = self.run_final_check(ctx);
        debug!(level = self.level, ?result, "string final check");
        result
    }

    fn init_model(&mut self, ctx: &mut dyn TheoryContext) {
        self.model.init(&*ctx, &self.string_terms);
    }

    fn value_for(&mut self, ctx: &mut dyn TheoryContext, term: TermId) -> Result<Option<TermId>> {
        Self::check_string_sort(&*ctx, term)?;
        let text = self.model.value_of(&*ctx, term).map(str::to_string);
        Ok(text.map(|text| ctx.terms_mut().mk_string_lit(&text)))
    }

    fn finalize_model(&mut self, ctx: &mut dyn TheoryContext) -> Result<TheoryModel> {
        self.model.build(ctx, &self.string_terms, &self.fresh)
    }

    fn is_incomplete(&self) -> bool {
        self.loop_detected
    }
}
