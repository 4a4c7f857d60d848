//! strz Core - Terms, Sorts and the Theory Contract
//!
//! This crate provides the foundational types shared by the strz string
//! solver crates:
//! - Hash-consed terms with cheap [`TermId`] references
//! - The three builtin sorts (Bool, Int, String)
//! - The [`Theory`] / [`TheoryContext`] contract between a DPLL(T) host and
//!   its theory plugins
//! - The workspace error type
//!
//! # Examples
//!
//! ```
//! use strz_core::ast::TermManager;
//!
//! let mut tm = TermManager::new();
//! let x = tm.mk_var("x", tm.sorts.string_sort);
//! let foo = tm.mk_string_lit("foo");
//! let cat = tm.mk_str_concat(x, foo);
//! let len = tm.mk_str_len(cat);
//!
//! assert_eq!(tm.is_str_concat(cat), Some((x, foo)));
//! assert_eq!(tm.display(len).to_string(), "(str.len (str.++ x \"foo\"))");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod ast;
pub mod error;
pub mod sort;
pub mod traits;

pub use ast::{Term, TermArgs, TermId, TermKind, TermManager};
pub use error::{Result, StrzError};
pub use sort::{SortId, SortKind, SortManager};
pub use traits::{FinalCheckResult, Theory, TheoryContext, TheoryModel};
