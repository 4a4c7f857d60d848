//! Property-based tests for AST operations
//!
//! This module tests fundamental properties of the term layer such as:
//! - Term construction and uniqueness
//! - Equality normalization
//! - Constant folding of Boolean and arithmetic operators

use proptest::prelude::*;
use strz_core::ast::{TermKind, TermManager};

/// Strategy for generating short string literals
fn literal_strategy() -> impl Strategy<Value = String> {
    "[a-c]{0,4}"
}

/// Strategy for generating variable names
fn var_name_strategy() -> impl Strategy<Value = String> {
    "[a-z][0-9]?".prop_map(|s| s.to_string())
}

/// Strategy for generating small integers
fn small_int_strategy() -> impl Strategy<Value = i64> {
    -100i64..100i64
}

proptest! {
    // =====================================
    // Term Construction Properties
    // =====================================

    /// Creating the same string literal twice yields the same TermId
    #[test]
    fn string_literal_uniqueness(text in literal_strategy()) {
        let mut tm = TermManager::new();
        let t1 = tm.mk_string_lit(&text);
        let t2 = tm.mk_string_lit(&text);
        prop_assert_eq!(t1, t2);
        prop_assert_eq!(tm.string_lit(t1), Some(text.as_str()));
    }

    /// Distinct literals get distinct ids
    #[test]
    fn string_literal_distinctness(a in literal_strategy(), b in literal_strategy()) {
        let mut tm = TermManager::new();
        let ta = tm.mk_string_lit(&a);
        let tb = tm.mk_string_lit(&b);
        prop_assert_eq!(ta == tb, a == b);
    }

    /// Variables with the same name have the same TermId
    #[test]
    fn variable_uniqueness(name in var_name_strategy()) {
        let mut tm = TermManager::new();
        let sort = tm.sorts.string_sort;
        let v1 = tm.mk_var(&name, sort);
        let v2 = tm.mk_var(&name, sort);
        prop_assert_eq!(v1, v2);
        prop_assert_eq!(tm.lookup_var(&name), Some(v1));
    }

    /// Concatenation is interned structurally
    #[test]
    fn concat_uniqueness(a in literal_strategy(), name in var_name_strategy()) {
        let mut tm = TermManager::new();
        let lit = tm.mk_string_lit(&a);
        let x = tm.mk_var(&name, tm.sorts.string_sort);
        let c1 = tm.mk_str_concat(lit, x);
        let c2 = tm.mk_str_concat(lit, x);
        prop_assert_eq!(c1, c2);
        prop_assert_eq!(tm.is_str_concat(c1), Some((lit, x)));
        prop_assert!(tm.is_string_sort(c1));
    }

    // =====================================
    // Equality Properties
    // =====================================

    /// Equality is symmetric at the term level
    #[test]
    fn eq_symmetry(a in var_name_strategy(), b in var_name_strategy()) {
        let mut tm = TermManager::new();
        let sort = tm.sorts.string_sort;
        let x = tm.mk_var(&a, sort);
        let y = tm.mk_var(&b, sort);
        prop_assert_eq!(tm.mk_eq(x, y), tm.mk_eq(y, x));
    }

    /// Equality between literals folds to a constant
    #[test]
    fn eq_of_literals_folds(a in literal_strategy(), b in literal_strategy()) {
        let mut tm = TermManager::new();
        let ta = tm.mk_string_lit(&a);
        let tb = tm.mk_string_lit(&b);
        let eq = tm.mk_eq(ta, tb);
        prop_assert_eq!(eq, tm.mk_bool(a == b));
    }

    // =====================================
    // Folding Properties
    // =====================================

    /// Double negation of any Boolean term is the term itself
    #[test]
    fn double_negation(name in var_name_strategy()) {
        let mut tm = TermManager::new();
        let p = tm.mk_var(&name, tm.sorts.bool_sort);
        let not_p = tm.mk_not(p);
        prop_assert_eq!(tm.mk_not(not_p), p);
    }

    /// Constant sums fold to their value
    #[test]
    fn add_folds_constants(a in small_int_strategy(), b in small_int_strategy()) {
        let mut tm = TermManager::new();
        let ta = tm.mk_int(a);
        let tb = tm.mk_int(b);
        let sum = tm.mk_add([ta, tb]);
        prop_assert_eq!(tm.int_const(sum), Some(a + b));
    }

    /// Comparisons of constants fold to Booleans
    #[test]
    fn comparisons_fold(a in small_int_strategy(), b in small_int_strategy()) {
        let mut tm = TermManager::new();
        let ta = tm.mk_int(a);
        let tb = tm.mk_int(b);
        let le = tm.mk_le(ta, tb);
        let gt = tm.mk_gt(ta, tb);
        prop_assert_eq!(le, tm.mk_bool(a <= b));
        prop_assert_eq!(gt, tm.mk_bool(a > b));
    }

    /// Conjunctions never contain duplicates or nested conjunctions
    #[test]
    fn and_is_flat(names in prop::collection::vec(var_name_strategy(), 1..6)) {
        let mut tm = TermManager::new();
        let sort = tm.sorts.bool_sort;
        let atoms: Vec<_> = names.iter().map(|n| tm.mk_var(n, sort)).collect();
        let inner = tm.mk_and(atoms.iter().copied());
        let outer = tm.mk_and([inner, atoms[0]]);
        match tm.kind(outer) {
            Some(TermKind::And(args)) => {
                for (i, a) in args.iter().enumerate() {
                    prop_assert!(!matches!(tm.kind(*a), Some(TermKind::And(_))));
                    prop_assert!(!args[i + 1..].contains(a));
                }
            }
            _ => {
                prop_assert_eq!(outer, inner);
            }
        }
    }
}
