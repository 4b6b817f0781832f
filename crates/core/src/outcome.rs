//! Result of a non-raising lifecycle operation.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The record transitioned.
    Applied,
    /// The record was already in the requested state; nothing ran.
    Unchanged,
    /// A hook, validation or persist step refused the transition. The
    /// enclosing transaction was rolled back.
    Rejected { reason: String },
}

impl Outcome {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Outcome::Rejected {
            reason: reason.into(),
        }
    }

    /// `false` only for [`Outcome::Rejected`].
    pub fn succeeded(&self) -> bool {
        !matches!(self, Outcome::Rejected { .. })
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Applied => f.write_str("applied"),
            Outcome::Unchanged => f.write_str("unchanged"),
            Outcome::Rejected { reason } => write!(f, "rejected: {reason}"),
        }
    }
}
