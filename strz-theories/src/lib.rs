//! strz Theories - Theory Plugins for DPLL(T)
//!
//! This crate currently provides one plugin: [`string::StringSolver`], a
//! solver for quantifier-free word equations over string concatenation
//! with length constraints. It implements the
//! [`Theory`](strz_core::Theory) contract and talks to its host only
//! through a [`TheoryContext`](strz_core::TheoryContext).
//!
//! # Examples
//!
//! ```
//! use strz_core::Theory;
//! use strz_theories::string::{StringConfig, StringSolver};
//!
//! let solver = StringSolver::with_config(StringConfig {
//!     avoid_loop_cut: true,
//!     ..StringConfig::default()
//! });
//! assert_eq!(solver.name(), "strings");
//! assert!(!solver.is_incomplete());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod string;

pub use string::{StringConfig, StringSolver, StringStats};
