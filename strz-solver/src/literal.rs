//! Boolean variables and literals of the clause store.
//!
//! Every variable stands for one atom term (an equality, a comparison or a
//! Boolean constant); the mapping lives in the solver.

use std::fmt;

/// A Boolean variable identifier.
pub type Var = u32;

/// A literal (signed Boolean variable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Lit(u32);

impl Lit {
    /// Create a literal of `var` with the given polarity.
    #[must_use]
    pub const fn new(var: Var, positive: bool) -> Self {
        if positive {
            Self::positive(var)
        } else {
            Self::negative(var)
        }
    }

    /// Create a positive literal from a variable.
    #[must_use]
    pub const fn positive(var: Var) -> Self {
        Self(var << 1)
    }

    /// Create a negative literal from a variable.
    #[must_use]
    pub const fn negative(var: Var) -> Self {
        Self((var << 1) | 1)
    }

    /// Get the variable of this literal.
    #[must_use]
    pub const fn var(self) -> Var {
        self.0 >> 1
    }

    /// Check if this literal is positive.
    #[must_use]
    pub const fn is_positive(self) -> bool {
        (self.0 & 1) == 0
    }

    /// Index of the literal in per-literal tables (two entries per
    /// variable).
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Get the negation of this literal.
    #[must_use]
    pub const fn negate(self) -> Self {
        Self(self.0 ^ 1)
    }

    /// Truth value of the literal under a variable assignment.
    #[must_use]
    pub fn value(self, assignment: Option<bool>) -> Option<bool> {
        assignment.map(|v| v == self.is_positive())
    }
}

impl std::ops::Not for Lit {
    type Output = Self;

    fn not(self) -> Self {
        self.negate()
    }
}

impl fmt::Display for Lit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_positive() {
            write!(f, "b{}", self.var())
        } else {
            write!(f, "-b{}", self.var())
        }
    }
}
