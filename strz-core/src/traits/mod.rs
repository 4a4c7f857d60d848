//! Trait seams between the host search and theory plugins.

pub mod theory;

pub use theory::{FinalCheckResult, Theory, TheoryContext, TheoryModel};
