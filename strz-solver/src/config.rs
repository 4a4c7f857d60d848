//! Solver configuration.

use serde::{Deserialize, Serialize};
use strz_theories::string::StringConfig;

/// Configuration of the reference host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Maximum number of final checks before giving up (0 = unlimited)
    pub max_final_checks: u64,
    /// Maximum number of decisions before giving up (0 = unlimited)
    pub max_decisions: u64,
    /// String plugin options
    pub string: StringConfig,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_final_checks: 1_000,
            max_decisions: 100_000,
            string: StringConfig::default(),
        }
    }
}

impl SolverConfig {
    /// Configuration without search limits.
    ///
    /// Problems whose word equations keep producing fresh splits will not
    /// terminate under it.
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            max_final_checks: 0,
            max_decisions: 0,
            ..Self::default()
        }
    }

    /// Same configuration with different limits.
    #[must_use]
    pub fn with_limits(mut self, max_final_checks: u64, max_decisions: u64) -> Self {
        self.max_final_checks = max_final_checks;
        self.max_decisions = max_decisions;
        self
    }

    /// Same configuration with loop avoidance switched.
    #[must_use]
    pub fn with_avoid_loop_cut(mut self, enabled: bool) -> Self {
        self.string.avoid_loop_cut = enabled;
        self
    }

    pub(crate) fn exceeded(limit: u64, count: u64) -> bool {
        limit != 0 && count > limit
    }
}
