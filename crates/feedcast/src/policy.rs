//! Publish-success policy.
//!
//! Decides whether a broadcast counts as published for dedup purposes.

use std::fmt;
use std::str::FromStr;

use crate::error::{CastError, PublishError};
use crate::relay::PublishOutcome;

/// How many relays must accept before an item is considered published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PublishPolicy {
    /// At least one relay accepted.
    #[default]
    Any,
    /// Strictly more than half of the relays accepted.
    Majority,
    /// Every relay accepted.
    All,
}

impl PublishPolicy {
    /// Whether `accepted` of `attempted` relays satisfies the policy.
    #[must_use]
    pub const fn is_satisfied(self, accepted: usize, attempted: usize) -> bool {
        if accepted == 0 {
            return false;
        }
        match self {
            Self::Any => true,
            Self::Majority => accepted * 2 > attempted,
            Self::All => accepted == attempted,
        }
    }

    /// Judge a broadcast outcome.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::AllEndpointsFailed`] when nothing was accepted
    /// and [`PublishError::PolicyNotMet`] when too few relays accepted.
    pub fn evaluate(self, outcome: &PublishOutcome) -> Result<(), PublishError> {
        let accepted = outcome.accepted_count();
        let attempted = outcome.len();
        if accepted == 0 {
            return Err(PublishError::AllEndpointsFailed { attempted });
        }
        if !self.is_satisfied(accepted, attempted) {
            return Err(PublishError::PolicyNotMet {
                policy: self,
                accepted,
                attempted,
            });
        }
        Ok(())
    }

    /// Lowercase name as accepted on the command line.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::Majority => "majority",
            Self::All => "all",
        }
    }
}

impl fmt::Display for PublishPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PublishPolicy {
    type Err = CastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "any" | "one" | "at-least-one" => Ok(Self::Any),
            "majority" => Ok(Self::Majority),
            "all" => Ok(Self::All),
            other => Err(CastError::Config(format!(
                "PUBLISH_POLICY must be one of any, majority, all (got '{other}')"
            ))),
        }
    }
}
