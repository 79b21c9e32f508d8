//! Voting Module
//!
//! Quorum voting for lock acquisition: the per-lock ballot tally and
//! the engine that runs one round against it.

mod tally;
mod engine;

pub use tally::BallotTally;
pub use engine::{RoundOutcome, VotingEngine};

/// A single peer's answer to a vote request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vote {
    Accept,
    Reject,
}

impl std::fmt::Display for Vote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Vote::Accept => write!(f, "ACCEPT"),
            Vote::Reject => write!(f, "REJECT"),
        }
    }
}
