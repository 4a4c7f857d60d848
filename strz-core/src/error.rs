//! Error types shared by the strz crates.

use thiserror::Error;

/// Errors reported by the term layer, the theory plugins and the host.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StrzError {
    /// A term has a sort other than the one the operation requires.
    #[error("sort mismatch for term {term}: expected {expected}, found {found}")]
    SortMismatch {
        /// Offending term (raw id).
        term: u32,
        /// Expected sort name.
        expected: String,
        /// Actual sort name.
        found: String,
    },

    /// A term has the wrong number of arguments for its operator.
    #[error("arity mismatch for term {term}: expected {expected}, found {found}")]
    ArityMismatch {
        /// Offending term (raw id).
        term: u32,
        /// Expected arity.
        expected: usize,
        /// Actual arity.
        found: usize,
    },

    /// A term id that no manager ever handed out.
    #[error("unknown term {0}")]
    UnknownTerm(u32),

    /// Model construction could not give a class a concrete value.
    #[error("model construction incomplete: {0}")]
    ModelIncomplete(String),

    /// A host-imposed limit was exhausted.
    #[error("resource limit reached: {0}")]
    ResourceLimit(String),

    /// An internal invariant was violated.
    #[error("internal error: {0}")]
    Internal(String),
}

impl StrzError {
    /// Shorthand for [`StrzError::Internal`].
    pub fn internal(msg: impl Into<String>) -> Self {
        StrzError::Internal(msg.into())
    }

    /// Shorthand for [`StrzError::ModelIncomplete`].
    pub fn model_incomplete(msg: impl Into<String>) -> Self {
        StrzError::ModelIncomplete(msg.into())
    }
}

/// Result alias used across the workspace.
pub type Result<T> = std::result::Result<T, StrzError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = StrzError::SortMismatch {
            term: 3,
            expected: "String".to_string(),
            found: "Int".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "sort mismatch for term 3: expected String, found Int"
        );
        assert_eq!(
            StrzError::model_incomplete("no fresh value").to_string(),
            "model construction incomplete: no fresh value"
        );
    }
}
