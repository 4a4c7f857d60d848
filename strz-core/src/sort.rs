//! Sorts of the string theory signature.
//!
//! Only three sorts exist: Booleans for atoms and selectors, integers for
//! lengths, and strings.

use std::fmt;

/// Identifier of a sort registered in a [`SortManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SortId(pub u32);

/// The kind of a sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortKind {
    /// Boolean sort.
    Bool,
    /// Mathematical integers (used for string lengths).
    Int,
    /// Strings over Unicode scalar values.
    String,
}

impl fmt::Display for SortKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortKind::Bool => write!(f, "Bool"),
            SortKind::Int => write!(f, "Int"),
            SortKind::String => write!(f, "String"),
        }
    }
}

/// Registry of the builtin sorts.
#[derive(Debug, Clone)]
pub struct SortManager {
    kinds: Vec<SortKind>,
    /// The Boolean sort.
    pub bool_sort: SortId,
    /// The integer sort.
    pub int_sort: SortId,
    /// The string sort.
    pub string_sort: SortId,
}

impl SortManager {
    /// Create the registry with the three builtin sorts.
    pub fn new() -> Self {
        Self {
            kinds: vec![SortKind::Bool, SortKind::Int, SortKind::String],
            bool_sort: SortId(0),
            int_sort: SortId(1),
            string_sort: SortId(2),
        }
    }

    /// Kind of a sort.
    pub fn kind(&self, sort: SortId) -> Option<SortKind> {
        self.kinds.get(sort.0 as usize).copied()
    }

    /// Check whether `sort` is the string sort.
    pub fn is_string(&self, sort: SortId) -> bool {
        sort == self.string_sort
    }
}

impl Default for SortManager {
    fn default() -> Self {
        Self::new()
    }
}
