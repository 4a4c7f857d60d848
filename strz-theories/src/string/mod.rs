//! String Theory Plugin
//!
//! This module provides a DPLL(T) theory plugin for quantifier-free word
//! equations with length constraints. It supports:
//!
//! - **String terms**: literals, variables, binary concatenation
//! - **Length reasoning**: `str.len` axioms handed to the host's arithmetic
//! - **Word equations**: decomposition of concatenation equalities into
//!   six structural cases, plus concatenation-vs-literal splitting and an
//!   occurs check for concatenation-vs-variable equalities
//! - **Loop detection**: cut records that suppress self-similar splits
//! - **Model construction**: concrete strings for every class
//!
//! ## Implementation Strategy
//!
//! The plugin never asserts anything eagerly. Axioms are instantiated
//! lazily when terms are internalized or merged; word equations are only
//! decomposed at final check, when the host has reached a propagation
//! fixpoint. Deterministic conclusions are asserted first; a case split is
//! asserted only when nothing deterministic is left, one split per round.
//!
//! ## SMT-LIB2 Support
//!
//! ```smt2
//! (declare-const x String)
//! (declare-const y String)
//! (assert (= (str.++ x "ab") (str.++ "ab" y)))
//! (assert (> (str.len x) 2))
//! ```

pub mod axioms;
pub mod cut;
mod final_check;
pub mod fresh;
pub mod model;
mod queue;
mod solver;
#[cfg(test)]
mod test_support;
pub mod word_eq;

pub use axioms::{AxiomEngine, AxiomStats};
pub use cut::CutDetector;
pub use fresh::FreshVars;
pub use model::ModelBuilder;
pub use solver::{StringConfig, StringSolver, StringStats};
pub use word_eq::{
    ConcatEqCase, ConcatEquation, ConcatView, Decomposer, Decomposition, Operand, Outcome, Side,
    WordEquation, classify,
};
