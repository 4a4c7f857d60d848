//! strz Solver - Reference DPLL(T) Host
//!
//! This crate drives the [`StringSolver`](strz_theories::StringSolver)
//! plugin with a small but complete host:
//! - Polarity-based clausification of Boolean structure ([`cnf`])
//! - Chronological DPLL search with unit propagation
//! - A backtrackable congruence closure with disequalities ([`egraph`])
//! - Interval propagation for lengths and other integer terms ([`length`])
//! - Model construction and validation against the assertions ([`model`])
//!
//! # Examples
//!
//! ```
//! use strz_solver::{Solver, SolverResult, Value};
//!
//! let mut solver = Solver::new();
//! let tm = solver.terms_mut();
//! let x = tm.mk_var("x", tm.sorts.string_sort);
//! let ab = tm.mk_string_lit("ab");
//! let abcd = tm.mk_string_lit("abcd");
//! let cat = tm.mk_str_concat(ab, x);
//! let eq = tm.mk_eq(cat, abcd);
//! solver.assert(eq).unwrap();
//!
//! assert_eq!(solver.check().unwrap(), SolverResult::Sat);
//! assert_eq!(solver.eval(x), Some(Value::Str("cd".to_string())));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod cnf;
pub mod config;
pub(crate) mod context;
pub mod egraph;
pub mod length;
pub mod literal;
pub mod model;
mod solver;

pub use config::SolverConfig;
pub use model::{Model, Value};
pub use solver::{Solver, SolverResult, SolverStats, UnknownReason};
