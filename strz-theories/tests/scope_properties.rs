//! Property-based tests for scope handling in the string plugin
//!
//! The plugin is driven through nested scopes of equalities and final
//! checks. Popping back to a depth must leave it exactly as it was when
//! that depth was last current:
//! - Cut records of the loop detector
//! - Concatenation equalities waiting for a final check
//! - Queued axiom requests

mod common;

use common::TestContext;
use proptest::prelude::*;
use strz_core::Theory;
use strz_core::ast::TermId;
use strz_theories::string::StringSolver;

/// Observable scoped state of the plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Snapshot {
    level: usize,
    cut_vars: Vec<Vec<TermId>>,
    cut_terms: usize,
    pending_eqs: usize,
    can_propagate: bool,
}

fn snapshot(solver: &StringSolver, terms: &[TermId]) -> Snapshot {
    let cuts = solver.cut_detector();
    Snapshot {
        level: solver.scope_level(),
        cut_vars: terms.iter().map(|&t| cuts.cut_vars(t)).collect(),
        cut_terms: cuts.len(),
        pending_eqs: solver.num_pending_eqs(),
        can_propagate: solver.can_propagate(),
    }
}

/// Variables, literals and concatenations over them.
fn term_pool(ctx: &mut TestContext) -> Vec<TermId> {
    let x = ctx.var("x");
    let y = ctx.var("y");
    let z = ctx.var("z");
    let a = ctx.lit("a");
    let ab = ctx.lit("ab");
    let xy = ctx.cat(x, y);
    let yx = ctx.cat(y, x);
    let ax = ctx.cat(a, x);
    let xa = ctx.cat(x, a);
    let xyz = ctx.cat(xy, z);
    vec![x, y, z, a, ab, xy, yx, ax, xa, xyz]
}

const POOL_SIZE: usize = 10;

/// Equalities to report at one depth, and whether to run final checks
/// afterwards.
fn level_strategy() -> impl Strategy<Value = (Vec<(usize, usize)>, bool)> {
    (
        prop::collection::vec((0..POOL_SIZE, 0..POOL_SIZE), 0..4),
        any::<bool>(),
    )
}

fn run_level(
    ctx: &mut TestContext,
    solver: &mut StringSolver,
    pool: &[TermId],
    eqs: &[(usize, usize)],
    check: bool,
) {
    for &(i, j) in eqs {
        let (a, b) = (pool[i], pool[j]);
        if a == b {
            continue;
        }
        ctx.merge(a, b);
        solver.new_eq(ctx, a, b);
    }
    solver.propagate(ctx);
    if check {
        for _ in 0..3 {
            solver.final_check(ctx);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn pop_restores_scoped_state(
        levels in prop::collection::vec(level_strategy(), 2..5),
        pops in 1usize..4,
    ) {
        let mut ctx = TestContext::new();
        let mut solver = StringSolver::new();
        let pool = term_pool(&mut ctx);
        for &t in &pool {
            solver.internalize_term(&mut ctx, t).expect("string term");
        }
        solver.propagate(&mut ctx);

        let mut snapshots = Vec::with_capacity(levels.len());
        for (depth, (eqs, check)) in levels.iter().enumerate() {
            if depth > 0 {
                solver.push_scope();
            }
            run_level(&mut ctx, &mut solver, &pool, eqs, *check);
            snapshots.push(snapshot(&solver, &pool));
        }

        let deepest = levels.len() - 1;
        let popped = pops.min(deepest);
        solver.pop_scope(popped);
        prop_assert_eq!(snapshot(&solver, &pool), snapshots[deepest - popped].clone());
    }

    #[test]
    fn pop_undoes_scoped_equalities(
        base in level_strategy(),
        scoped in prop::collection::vec(level_strategy(), 1..4),
    ) {
        let mut ctx = TestContext::new();
        let mut solver = StringSolver::new();
        let pool = term_pool(&mut ctx);
        for &t in &pool {
            solver.internalize_term(&mut ctx, t).expect("string term");
        }
        solver.propagate(&mut ctx);
        run_level(&mut ctx, &mut solver, &pool, &base.0, base.1);
        let before = snapshot(&solver, &pool);

        for (eqs, check) in &scoped {
            solver.push_scope();
            run_level(&mut ctx, &mut solver, &pool, eqs, *check);
        }
        solver.pop_scope(scoped.len());

        prop_assert_eq!(snapshot(&solver, &pool), before);
        prop_assert_eq!(solver.scope_level(), 0);
    }
}
