//! Ballot Tally
//!
//! Accept and reject voters per lock name for the round currently in
//! flight. Every round gets a token; votes carrying any other token are
//! dropped so late replies cannot leak into a newer round.

use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

use super::Vote;

/// Ballots for the active round of one lock
#[derive(Debug, Default)]
struct RoundBallots {
    round: u64,
    accept: HashSet<String>,
    reject: HashSet<String>,
}

/// Per-lock ballot tables
#[derive(Debug, Default)]
pub struct BallotTally {
    rounds: RwLock<HashMap<String, RoundBallots>>,
}

impl BallotTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear the ballots for `lock_name` and open a new round.
    ///
    /// Returns the token of the new round.
    pub async fn reset(&self, lock_name: &str) -> u64 {
        let mut rounds = self.rounds.write().await;
        let ballots = rounds.entry(lock_name.to_string()).or_default();
        ballots.round += 1;
        ballots.accept.clear();
        ballots.reject.clear();
        ballots.round
    }

    /// Record an accept vote; returns whether it was counted
    pub async fn record_accept(&self, lock_name: &str, peer: &str, round: u64) -> bool {
        self.record(lock_name, peer, round, Vote::Accept).await
    }

    /// Record a reject vote; returns whether it was counted
    pub async fn record_reject(&self, lock_name: &str, peer: &str, round: u64) -> bool {
        self.record(lock_name, peer, round, Vote::Reject).await
    }

    async fn record(&self, lock_name: &str, peer: &str, round: u64, vote: Vote) -> bool {
        let mut rounds = self.rounds.write().await;
        let Some(ballots) = rounds.get_mut(lock_name) else {
            tracing::debug!("Discarding {} from {} for {}: no round", vote, peer, lock_name);
            return false;
        };

        if ballots.round != round {
            tracing::debug!(
                "Discarding stale {} from {} for {} (round {}, active {})",
                vote,
                peer,
                lock_name,
                round,
                ballots.round
            );
            return false;
        }

        // A peer's first vote in a round is final
        if ballots.accept.contains(peer) || ballots.reject.contains(peer) {
            return false;
        }

        match vote {
            Vote::Accept => ballots.accept.insert(peer.to_string()),
            Vote::Reject => ballots.reject.insert(peer.to_string()),
        }
    }

    /// Number of accept voters in the active round
    pub async fn count_accept(&self, lock_name: &str) -> usize {
        self.counts(lock_name).await.0
    }

    /// Number of reject voters in the active round
    pub async fn count_reject(&self, lock_name: &str) -> usize {
        self.counts(lock_name).await.1
    }

    /// Accept and reject counts read under one lock
    pub async fn counts(&self, lock_name: &str) -> (usize, usize) {
        let rounds = self.rounds.read().await;
        rounds
            .get(lock_name)
            .map(|b| (b.accept.len(), b.reject.len()))
            .unwrap_or((0, 0))
    }

    /// Token of the active round, if any round was ever opened
    pub async fn current_round(&self, lock_name: &str) -> Option<u64> {
        self.rounds.read().await.get(lock_name).map(|b| b.round)
    }
}
