//! Voting Engine
//!
//! Runs one voting round for a lock: opens a fresh tally, asks every
//! peer for a vote and polls the tally against the quorum thresholds
//! until a decision is reached or the poll budget runs out.

use std::sync::Arc;
use serde::{Deserialize, Serialize};
use tokio::time::MissedTickBehavior;

use super::BallotTally;
use crate::config::VotingConfig;
use crate::network::{Message, MessagingGateway};

/// How a round ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundOutcome {
    /// Accept quorum reached
    Accepted,
    /// Reject quorum reached
    Rejected,
    /// Poll budget exhausted without either quorum
    NoDecision,
}

impl RoundOutcome {
    /// Only an explicit accept quorum grants the lock
    pub fn is_accepted(&self) -> bool {
        matches!(self, RoundOutcome::Accepted)
    }
}

impl std::fmt::Display for RoundOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoundOutcome::Accepted => write!(f, "ACCEPTED"),
            RoundOutcome::Rejected => write!(f, "REJECTED"),
            RoundOutcome::NoDecision => write!(f, "NO_DECISION"),
        }
    }
}

/// Coordinates voting rounds for locks requested on this node
pub struct VotingEngine {
    /// This node's ID
    node_id: String,
    /// Ballots shared with the reply handlers
    tally: Arc<BallotTally>,
    /// Outbound messaging
    gateway: MessagingGateway,
    /// Thresholds and polling cadence
    config: VotingConfig,
}

impl VotingEngine {
    /// Create a new voting engine
    pub fn new(
        node_id: String,
        tally: Arc<BallotTally>,
        gateway: MessagingGateway,
        config: VotingConfig,
    ) -> Self {
        Self {
            node_id,
            tally,
            gateway,
            config,
        }
    }

    /// Voting configuration in use
    pub fn config(&self) -> &VotingConfig {
        &self.config
    }

    /// Apply the quorum rule to a tally snapshot.
    ///
    /// Reject is checked first, so a snapshot meeting both thresholds
    /// is a rejection.
    pub fn decide(&self, accepts: usize, rejects: usize) -> Option<RoundOutcome> {
        if rejects >= self.config.reject_quorum {
            Some(RoundOutcome::Rejected)
        } else if accepts >= self.config.accept_quorum {
            Some(RoundOutcome::Accepted)
        } else {
            None
        }
    }

    /// Run a full round for `lock_name`
    pub async fn run_round(&self, lock_name: &str) -> RoundOutcome {
        // Tally must be empty before any request goes out
        let round = self.tally.reset(lock_name).await;

        tracing::info!(
            "Starting voting round {} for lock {} (node: {})",
            round,
            lock_name,
            self.node_id
        );

        self.gateway.send_all(&Message::VotingRequest {
            server_id: self.node_id.clone(),
            lock_name: lock_name.to_string(),
            round,
        });

        let mut ticker = tokio::time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // First tick is immediate; `max_polls` checks in total
        for _ in 0..self.config.max_polls {
            ticker.tick().await;

            let (accepts, rejects) = self.tally.counts(lock_name).await;
            if let Some(outcome) = self.decide(accepts, rejects) {
                tracing::info!(
                    "Round {} for lock {} {} ({} accept / {} reject)",
                    round,
                    lock_name,
                    outcome,
                    accepts,
                    rejects
                );
                return outcome;
            }
        }

        // Wait out the last interval; votes arriving now are too late
        ticker.tick().await;

        let (accepts, rejects) = self.tally.counts(lock_name).await;
        tracing::info!(
            "Round {} for lock {} timed out after {:?} ({} accept / {} reject)",
            round,
            lock_name,
            self.config.round_timeout(),
            accepts,
            rejects
        );
        RoundOutcome::NoDecision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use crate::error::Result;
    use crate::network::{Envelope, Reply, Transport};
    use crate::state::PeerDirectory;

    struct CaptureTransport {
        tx: mpsc::UnboundedSender<Envelope>,
    }

    #[async_trait]
    impl Transport for CaptureTransport {
        async fn send(&self, _address: &str, envelope: &Envelope) -> Result<()> {
            let _ = self.tx.send(envelope.clone());
            Ok(())
        }

        async fn send_reply(&self, _address: &str, _reply: &Reply) -> Result<()> {
            Ok(())
        }
    }

    fn test_config() -> VotingConfig {
        VotingConfig {
            poll_interval_ms: 20,
            max_polls: 5,
            accept_quorum: 3,
            reject_quorum: 2,
        }
    }

    fn engine() -> (Arc<VotingEngine>, Arc<BallotTally>, mpsc::UnboundedReceiver<Envelope>) {
        engine_with(test_config())
    }

    fn engine_with(
        config: VotingConfig,
    ) -> (Arc<VotingEngine>, Arc<BallotTally>, mpsc::UnboundedReceiver<Envelope>) {
        let directory = Arc::new(PeerDirectory::new(
            "dlock1",
            (1..=4).map(|i| (format!("dlock{}", i), format!("10.0.0.{}:8080", i))),
        ));
        let (tx, rx) = mpsc::unbounded_channel();
        let gateway = MessagingGateway::new(directory, Arc::new(CaptureTransport { tx }), None);
        let tally = Arc::new(BallotTally::new());
        let engine = Arc::new(VotingEngine::new(
            "dlock1".to_string(),
            Arc::clone(&tally),
            gateway,
            config,
        ));
        (engine, tally, rx)
    }

    /// Wait for the broadcast and return its round token
    async fn broadcast_round(rx: &mut mpsc::UnboundedReceiver<Envelope>) -> u64 {
        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.kind, "votingRequest");
        assert_eq!(envelope.server_id.as_deref(), Some("dlock1"));
        envelope.round.unwrap()
    }

    #[test]
    fn test_quorum_thresholds() {
        let (engine, _, _) = engine();
        assert_eq!(engine.decide(2, 1), None);
        assert_eq!(engine.decide(3, 0), Some(RoundOutcome::Accepted));
        assert_eq!(engine.decide(3, 1), Some(RoundOutcome::Accepted));
        assert_eq!(engine.decide(0, 2), Some(RoundOutcome::Rejected));
        assert_eq!(engine.decide(1, 2), Some(RoundOutcome::Rejected));
        // Both thresholds met: reject wins
        assert_eq!(engine.decide(3, 2), Some(RoundOutcome::Rejected));
    }

    #[tokio::test]
    async fn test_round_accepts_with_three_votes() {
        let (engine, tally, mut rx) = engine();
        let handle = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.run_round("lockX").await }
        });

        let round = broadcast_round(&mut rx).await;
        for peer in ["dlock1", "dlock2", "dlock4"] {
            tally.record_accept("lockX", peer, round).await;
        }

        assert_eq!(handle.await.unwrap(), RoundOutcome::Accepted);
    }

    #[tokio::test]
    async fn test_round_rejects_on_two_rejects() {
        let (engine, tally, mut rx) = engine();
        let handle = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.run_round("lockX").await }
        });

        let round = broadcast_round(&mut rx).await;
        tally.record_accept("lockX", "dlock1", round).await;
        tally.record_reject("lockX", "dlock2", round).await;
        tally.record_reject("lockX", "dlock3", round).await;

        assert_eq!(handle.await.unwrap(), RoundOutcome::Rejected);
    }

    #[tokio::test]
    async fn test_first_threshold_reached_wins() {
        let (engine, tally, mut rx) = engine();
        let handle = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.run_round("lockX").await }
        });

        let round = broadcast_round(&mut rx).await;
        tally.record_accept("lockX", "dlock1", round).await;
        tally.record_accept("lockX", "dlock2", round).await;
        tally.record_accept("lockX", "dlock3", round).await;

        // Let at least one poll observe the accept quorum
        tokio::time::sleep(Duration::from_millis(60)).await;
        tally.record_reject("lockX", "dlock4", round).await;

        assert_eq!(handle.await.unwrap(), RoundOutcome::Accepted);
    }

    #[tokio::test]
    async fn test_silence_times_out_fail_closed() {
        let (engine, tally, mut rx) = engine();
        let handle = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.run_round("lockX").await }
        });

        let round = broadcast_round(&mut rx).await;
        tally.record_accept("lockX", "dlock1", round).await;
        tally.record_accept("lockX", "dlock2", round).await;
        tally.record_reject("lockX", "dlock3", round).await;

        let outcome = handle.await.unwrap();
        assert_eq!(outcome, RoundOutcome::NoDecision);
        assert!(!outcome.is_accepted());
    }

    #[tokio::test]
    async fn test_round_starts_with_empty_tally() {
        let (engine, tally, mut rx) = engine();

        // Leftover ballots from an earlier round
        let old = tally.reset("lockX").await;
        tally.record_reject("lockX", "dlock2", old).await;
        tally.record_reject("lockX", "dlock3", old).await;

        let handle = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.run_round("lockX").await }
        });

        let round = broadcast_round(&mut rx).await;
        assert_ne!(round, old);
        for peer in ["dlock1", "dlock2", "dlock3"] {
            tally.record_accept("lockX", peer, round).await;
        }
        // Late rejects from the old round do not count
        tally.record_reject("lockX", "dlock4", old).await;

        assert_eq!(handle.await.unwrap(), RoundOutcome::Accepted);
    }

    #[tokio::test]
    async fn test_quorum_after_last_poll_is_too_late() {
        let (engine, tally, mut rx) = engine_with(VotingConfig {
            poll_interval_ms: 50,
            max_polls: 3,
            accept_quorum: 3,
            reject_quorum: 2,
        });
        let started = tokio::time::Instant::now();
        let handle = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.run_round("lockX").await }
        });

        let round = broadcast_round(&mut rx).await;

        // Checks run at 0, 50 and 100ms; the round ends at 150ms
        tokio::time::sleep_until(started + Duration::from_millis(125)).await;
        for peer in ["dlock1", "dlock2", "dlock3"] {
            tally.record_accept("lockX", peer, round).await;
        }

        assert_eq!(handle.await.unwrap(), RoundOutcome::NoDecision);
        assert!(started.elapsed() >= Duration::from_millis(150));
    }
}
