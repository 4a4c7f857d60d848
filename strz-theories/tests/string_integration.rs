//! Integration tests for the string theory plugin
//!
//! These tests drive the plugin through the public `Theory` interface with
//! a minimal in-memory host and check:
//! - Lazy axiom instantiation
//! - Lemmas produced at final check (implied facts, conflicts, splits)
//! - Loop detection and incompleteness reporting
//! - Model construction

mod common;

use common::TestContext;
use strz_core::ast::{TermId, TermKind};
use strz_core::{FinalCheckResult, Theory};
use strz_theories::string::{ConcatEqCase, StringConfig, StringSolver};

fn setup(ctx: &mut TestContext, solver: &mut StringSolver, terms: &[TermId]) {
    for &t in terms {
        solver.internalize_term(ctx, t).expect("string term");
    }
    solver.propagate(ctx);
}

/// Merge two terms in the host and notify the plugin.
fn assert_equal(ctx: &mut TestContext, solver: &mut StringSolver, a: TermId, b: TermId) {
    ctx.merge(a, b);
    solver.new_eq(ctx, a, b);
    solver.propagate(ctx);
}

// ============================================================================
// Test 1: Constant concatenation folds to a literal
// ============================================================================

#[test]
fn test_constant_concat_folding() {
    let mut ctx = TestContext::new();
    let mut solver = StringSolver::new();

    let fo = ctx.lit("fo");
    let o = ctx.lit("o");
    let cat = ctx.cat(fo, o);
    setup(&mut ctx, &mut solver, &[cat]);

    let foo = ctx.lit("foo");
    let folded = ctx.tm.mk_eq(cat, foo);
    assert!(ctx.axioms.contains(&folded));

    let len = ctx.tm.mk_str_len(cat);
    let len_fo = ctx.tm.mk_str_len(fo);
    let len_o = ctx.tm.mk_str_len(o);
    let sum = ctx.tm.mk_add([len_fo, len_o]);
    let additivity = ctx.tm.mk_eq(len, sum);
    assert!(ctx.axioms.contains(&additivity));
}

#[test]
fn test_folding_can_be_disabled() {
    let mut ctx = TestContext::new();
    let mut solver = StringSolver::with_config(StringConfig {
        fold_constant_concats: false,
        ..StringConfig::default()
    });

    let fo = ctx.lit("fo");
    let o = ctx.lit("o");
    let cat = ctx.cat(fo, o);
    setup(&mut ctx, &mut solver, &[cat]);

    let foo = ctx.lit("foo");
    let folded = ctx.tm.mk_eq(cat, foo);
    assert!(!ctx.axioms.contains(&folded));
}

// ============================================================================
// Test 2: Concatenation against a literal
// ============================================================================

#[test]
fn test_prefix_literal_lemma() {
    let mut ctx = TestContext::new();
    let mut solver = StringSolver::new();

    // concat("ab", "cd") = concat("a", X)
    let ab = ctx.lit("ab");
    let cd = ctx.lit("cd");
    let a = ctx.lit("a");
    let x = ctx.var("X");
    let lhs = ctx.cat(ab, cd);
    let rhs = ctx.cat(a, x);
    setup(&mut ctx, &mut solver, &[lhs, rhs]);
    assert_equal(&mut ctx, &mut solver, lhs, rhs);
    ctx.axioms.clear();

    assert_eq!(solver.final_check(&mut ctx), FinalCheckResult::Continue);
    let bcd = ctx.lit("bcd");
    let fact = ctx.tm.mk_eq(x, bcd);
    let implied = ctx.axioms.iter().any(|&ax| match ctx.tm.kind(ax) {
        Some(TermKind::Implies(_, conclusion)) => *conclusion == fact,
        _ => false,
    });
    assert!(implied, "expected a lemma concluding X = \"bcd\"");
}

#[test]
fn test_prefix_mismatch_is_refuted_on_merge() {
    let mut ctx = TestContext::new();
    let mut solver = StringSolver::new();

    // "cd" = concat("ab", X)
    let ab = ctx.lit("ab");
    let cd = ctx.lit("cd");
    let x = ctx.var("X");
    let rhs = ctx.cat(ab, x);
    setup(&mut ctx, &mut solver, &[cd, rhs]);
    ctx.axioms.clear();

    // No final check is needed to see the clash.
    assert_equal(&mut ctx, &mut solver, cd, rhs);
    let eq = ctx.tm.mk_eq(cd, rhs);
    let refutation = ctx.tm.mk_not(eq);
    assert!(ctx.axioms.contains(&refutation));
    assert_eq!(solver.stats().conflicts, 1);
    assert_eq!(solver.stats().final_checks, 0);
    assert_eq!(solver.num_pending_eqs(), 0);
}

#[test]
fn test_prefix_mismatch_through_class_is_a_conflict() {
    let mut ctx = TestContext::new();
    let mut solver = StringSolver::new();

    // concat("cd", X) = Y and Y = "ab": the clash needs the class of Y.
    let ab = ctx.lit("ab");
    let cd = ctx.lit("cd");
    let x = ctx.var("X");
    let y = ctx.var("Y");
    let cdx = ctx.cat(cd, x);
    setup(&mut ctx, &mut solver, &[ab, cdx, y]);
    assert_equal(&mut ctx, &mut solver, cdx, y);
    assert_equal(&mut ctx, &mut solver, y, ab);
    assert_eq!(solver.stats().conflicts, 0);
    ctx.axioms.clear();

    assert_eq!(solver.final_check(&mut ctx), FinalCheckResult::Continue);
    assert!(solver.stats().conflicts > 0);
    assert!(!ctx.axioms.is_empty());
}

// ============================================================================
// Test 3: Concatenation against concatenation
// ============================================================================

#[test]
fn test_case_statistics() {
    let mut ctx = TestContext::new();
    let mut solver = StringSolver::new();

    // concat(x, "c") = concat(m, "bc")
    let x = ctx.var("x");
    let m = ctx.var("m");
    let c = ctx.lit("c");
    let bc = ctx.lit("bc");
    let lhs = ctx.cat(x, c);
    let rhs = ctx.cat(m, bc);
    setup(&mut ctx, &mut solver, &[lhs, rhs]);
    assert_equal(&mut ctx, &mut solver, lhs, rhs);

    assert_eq!(solver.final_check(&mut ctx), FinalCheckResult::Continue);
    let stats = solver.stats();
    assert_eq!(stats.cases[ConcatEqCase::BothSuffixConst.index()], 1);
    assert_eq!(stats.implied, 1);
}

#[test]
fn test_self_similar_equation_is_cut() {
    let mut ctx = TestContext::new();
    let mut solver = StringSolver::new();

    // concat("b", X) = concat(X, "a")
    let b = ctx.lit("b");
    let a = ctx.lit("a");
    let x = ctx.var("X");
    let lhs = ctx.cat(b, x);
    let rhs = ctx.cat(x, a);
    setup(&mut ctx, &mut solver, &[lhs, rhs]);
    assert_equal(&mut ctx, &mut solver, lhs, rhs);
    ctx.axioms.clear();

    assert_eq!(solver.final_check(&mut ctx), FinalCheckResult::Continue);
    assert!(solver.is_incomplete());
    assert!(solver.loop_detected());

    // The only surviving arrangement needs X = "b" and X = "a".
    let x_b = ctx.tm.mk_eq(x, b);
    let x_a = ctx.tm.mk_eq(x, a);
    let both = ctx.tm.mk_and([x_b, x_a]);
    let concludes_both = ctx.axioms.iter().any(|&ax| {
        matches!(ctx.tm.kind(ax), Some(TermKind::Implies(_, c)) if *c == both)
    });
    assert!(concludes_both);
}

#[test]
fn test_split_is_deferred_to_one_per_round() {
    let mut ctx = TestContext::new();
    let mut solver = StringSolver::new();

    let [x, y, m, n] = ["x", "y", "m", "n"].map(|s| ctx.var(s));
    let lhs = ctx.cat(x, y);
    let rhs = ctx.cat(m, n);
    let [p, q, r, s] = ["p", "q", "r", "s"].map(|v| ctx.var(v));
    let lhs2 = ctx.cat(p, q);
    let rhs2 = ctx.cat(r, s);
    setup(&mut ctx, &mut solver, &[lhs, rhs, lhs2, rhs2]);
    assert_equal(&mut ctx, &mut solver, lhs, rhs);
    assert_equal(&mut ctx, &mut solver, lhs2, rhs2);

    assert_eq!(solver.final_check(&mut ctx), FinalCheckResult::Continue);
    assert_eq!(solver.stats().splits, 1);
    assert_eq!(solver.final_check(&mut ctx), FinalCheckResult::Continue);
    assert_eq!(solver.stats().splits, 2);
    assert_eq!(solver.final_check(&mut ctx), FinalCheckResult::Sat);
}

// ============================================================================
// Test 4: Model construction
// ============================================================================

#[test]
fn test_model_values() {
    let mut ctx = TestContext::new();
    let mut solver = StringSolver::new();

    let x = ctx.var("x");
    let y = ctx.var("y");
    let ab = ctx.lit("ab");
    let xy = ctx.cat(x, y);
    setup(&mut ctx, &mut solver, &[xy, ab]);
    assert_equal(&mut ctx, &mut solver, x, ab);

    solver.init_model(&mut ctx);
    let model = solver.finalize_model(&mut ctx).expect("model");

    let vx = model.get(x).and_then(|v| ctx.text(v)).expect("x value");
    let vy = model.get(y).and_then(|v| ctx.text(v)).expect("y value");
    let vxy = model.get(xy).and_then(|v| ctx.text(v)).expect("xy value");
    assert_eq!(vx, "ab");
    assert_eq!(vxy, format!("{vx}{vy}"));

    let value = solver.value_for(&mut ctx, x).expect("string term");
    assert_eq!(value, Some(ab));
}

#[test]
fn test_model_respects_lengths() {
    let mut ctx = TestContext::new();
    let mut solver = StringSolver::new();

    let x = ctx.var("x");
    setup(&mut ctx, &mut solver, &[x]);
    ctx.set_length(x, 2);

    solver.init_model(&mut ctx);
    let model = solver.finalize_model(&mut ctx).expect("model");
    let vx = model.get(x).and_then(|v| ctx.text(v)).expect("x value");
    assert_eq!(vx.chars().count(), 2);
}
