//! Property-based tests for strz-core
//!
//! This module contains property-based tests using proptest to verify the
//! term layer: interning, normalization and constant folding.

mod ast_properties;
