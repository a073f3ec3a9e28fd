use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of one test step.
///
/// Variants are declared from least to most severe, so the derived ordering
/// is the severity ordering: `Pass < NotRun < Undetermined < Fail`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Pass,
    NotRun,
    Undetermined,
    Fail,
}

impl Verdict {
    /// PASS and FAIL are conclusive, everything else is not.
    pub fn is_conclusive(self) -> bool {
        matches!(self, Verdict::Pass | Verdict::Fail)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Verdict::Pass => "PASS",
            Verdict::NotRun => "NOT_RUN",
            Verdict::Undetermined => "UNDETERMINED",
            Verdict::Fail => "FAIL",
        };
        f.write_str(name)
    }
}

/// More severe of two partial results. An absent result is the identity.
pub fn worst(a: Option<Verdict>, b: Option<Verdict>) -> Option<Verdict> {
    match (a, b) {
        (None, other) | (other, None) => other,
        (Some(a), Some(b)) => Some(a.max(b)),
    }
}
