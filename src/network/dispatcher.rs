//! Message Dispatcher
//!
//! Routes each inbound message to the component that owns its state.
//! Unknown types and malformed messages are dropped here.

use std::sync::Arc;
use tokio::task::JoinHandle;

use super::gateway::MessagingGateway;
use super::protocol::{Envelope, Message, Reply};
use crate::lock::LockManager;
use crate::state::HeartbeatTracker;
use crate::voting::{BallotTally, Vote};

/// Inbound message router for one node
pub struct Dispatcher {
    locks: Arc<LockManager>,
    tally: Arc<BallotTally>,
    heartbeat: Arc<HeartbeatTracker>,
    gateway: MessagingGateway,
}

impl Dispatcher {
    /// Create a new dispatcher
    pub fn new(
        locks: Arc<LockManager>,
        tally: Arc<BallotTally>,
        heartbeat: Arc<HeartbeatTracker>,
        gateway: MessagingGateway,
    ) -> Self {
        Self {
            locks,
            tally,
            heartbeat,
            gateway,
        }
    }

    /// Decode and handle a wire message.
    ///
    /// Returns the client reply for lock requests and releases.
    pub async fn dispatch(&self, envelope: Envelope) -> Option<Reply> {
        let kind = envelope.kind.clone();
        match Message::from_envelope(envelope) {
            Ok(Some(message)) => self.handle(message).await,
            Ok(None) => {
                tracing::trace!("Ignoring unknown message type {}", kind);
                None
            }
            Err(e) => {
                tracing::warn!("Ignoring malformed message: {}", e);
                None
            }
        }
    }

    /// Handle a decoded message
    pub async fn handle(&self, message: Message) -> Option<Reply> {
        if let Some(sender) = Self::sender(&message) {
            if !self.gateway.directory().contains(sender) {
                tracing::warn!(
                    "Ignoring {} from {}: not a cluster member",
                    message.type_name(),
                    sender
                );
                return None;
            }
        }

        tracing::debug!("Received {} for lock {}", message.type_name(), message.lock_name());

        match message {
            Message::LockRequest { lock_name } => {
                let locks = Arc::clone(&self.locks);
                let gateway = self.gateway.clone();
                Self::settle(tokio::spawn(async move {
                    let reply = locks.request_lock(&lock_name).await;
                    gateway.reply(&reply).await;
                    reply
                }))
                .await
            }
            Message::LockRelease { lock_name } => {
                let locks = Arc::clone(&self.locks);
                let gateway = self.gateway.clone();
                Self::settle(tokio::spawn(async move {
                    let reply = locks.release_lock(&lock_name).await;
                    gateway.reply(&reply).await;
                    reply
                }))
                .await
            }
            Message::VotingRequest {
                server_id,
                lock_name,
                round,
            } => {
                let vote = self.locks.handle_vote_request(&server_id, &lock_name).await;
                let voter = self.locks.node_id().to_string();
                let response = match vote {
                    Vote::Accept => Message::VotingAccept {
                        server_id: voter,
                        lock_name,
                        round,
                    },
                    Vote::Reject => Message::VotingReject {
                        server_id: voter,
                        lock_name,
                        round,
                    },
                };
                self.gateway.spawn_one(server_id, response);
                None
            }
            Message::VotingAccept {
                server_id,
                lock_name,
                round,
            } => {
                if self.tally.record_accept(&lock_name, &server_id, round).await {
                    tracing::info!("Accepted by {} lock {}", server_id, lock_name);
                }
                None
            }
            Message::VotingReject {
                server_id,
                lock_name,
                round,
            } => {
                if self.tally.record_reject(&lock_name, &server_id, round).await {
                    tracing::info!("Rejected by {} lock {}", server_id, lock_name);
                }
                None
            }
            Message::LockReleased {
                server_id,
                lock_name,
            } => {
                self.locks.handle_remote_release(&server_id, &lock_name).await;
                None
            }
            Message::KeepAlive { server_id } => {
                self.heartbeat.on_keep_alive(&server_id).await;
                None
            }
        }
    }

    /// Wait for a detached client request.
    ///
    /// The request runs on its own task so a caller that goes away
    /// mid-round cannot leave the lock half way through its transitions.
    async fn settle(task: JoinHandle<Reply>) -> Option<Reply> {
        match task.await {
            Ok(reply) => Some(reply),
            Err(e) => {
                tracing::error!("Client request task failed: {}", e);
                None
            }
        }
    }

    fn sender(message: &Message) -> Option<&str> {
        match message {
            Message::LockRequest { .. } | Message::LockRelease { .. } => None,
            Message::VotingRequest { server_id, .. }
            | Message::VotingAccept { server_id, .. }
            | Message::VotingReject { server_id, .. }
            | Message::LockReleased { server_id, .. }
            | Message::KeepAlive { server_id } => Some(server_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use crate::config::VotingConfig;
    use crate::error::Result;
    use crate::lock::{LockState, LockTable};
    use crate::network::{ReplyType, Transport};
    use crate::state::PeerDirectory;
    use crate::voting::{RoundOutcome, VotingEngine};
    use std::time::Duration;

    struct CaptureTransport {
        tx: mpsc::UnboundedSender<(String, Envelope)>,
        replies: mpsc::UnboundedSender<Reply>,
    }

    #[async_trait]
    impl Transport for CaptureTransport {
        async fn send(&self, address: &str, envelope: &Envelope) -> Result<()> {
            let _ = self.tx.send((address.to_string(), envelope.clone()));
            Ok(())
        }

        async fn send_reply(&self, _address: &str, reply: &Reply) -> Result<()> {
            let _ = self.replies.send(reply.clone());
            Ok(())
        }
    }

    struct Harness {
        dispatcher: Arc<Dispatcher>,
        table: Arc<LockTable>,
        tally: Arc<BallotTally>,
        heartbeat: Arc<HeartbeatTracker>,
        rx: mpsc::UnboundedReceiver<(String, Envelope)>,
        replies: mpsc::UnboundedReceiver<Reply>,
    }

    fn harness() -> Harness {
        let directory = Arc::new(PeerDirectory::new(
            "dlock1",
            (1..=4).map(|i| (format!("dlock{}", i), format!("10.0.0.{}:8080", i))),
        ));
        let (tx, rx) = mpsc::unbounded_channel();
        let (reply_tx, replies) = mpsc::unbounded_channel();
        let gateway = MessagingGateway::new(
            directory,
            Arc::new(CaptureTransport { tx, replies: reply_tx }),
            Some("127.0.0.1:9000".to_string()),
        );
        let tally = Arc::new(BallotTally::new());
        let table = Arc::new(LockTable::new("dlock1".to_string()));
        let heartbeat = Arc::new(HeartbeatTracker::new());
        let engine = VotingEngine::new(
            "dlock1".to_string(),
            Arc::clone(&tally),
            gateway.clone(),
            VotingConfig {
                poll_interval_ms: 10,
                max_polls: 2,
                accept_quorum: 3,
                reject_quorum: 2,
            },
        );
        let locks = Arc::new(LockManager::new(
            "dlock1".to_string(),
            Arc::clone(&table),
            engine,
            gateway.clone(),
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            locks,
            Arc::clone(&tally),
            Arc::clone(&heartbeat),
            gateway,
        ));

        Harness {
            dispatcher,
            table,
            tally,
            heartbeat,
            rx,
            replies,
        }
    }

    fn envelope(json: &str) -> Envelope {
        serde_json::from_str(json).unwrap()
    }

    #[tokio::test]
    async fn test_vote_request_replies_to_requester() {
        let mut h = harness();
        let reply = h
            .dispatcher
            .dispatch(envelope(
                r#"{"type":"votingRequest","serverId":"dlock2","lockName":"lockX","round":4}"#,
            ))
            .await;
        assert!(reply.is_none());

        let (address, response) = h.rx.recv().await.unwrap();
        assert_eq!(address, "10.0.0.2:8080");
        assert_eq!(response.kind, "votingAccept");
        assert_eq!(response.server_id.as_deref(), Some("dlock1"));
        assert_eq!(response.round, Some(4));
        assert_eq!(h.table.state("lockX").await, LockState::Tentative("dlock2".into()));

        // A competing requester is turned down
        h.dispatcher
            .dispatch(envelope(
                r#"{"type":"votingRequest","serverId":"dlock3","lockName":"lockX","round":1}"#,
            ))
            .await;
        let (address, response) = h.rx.recv().await.unwrap();
        assert_eq!(address, "10.0.0.3:8080");
        assert_eq!(response.kind, "votingReject");
    }

    #[tokio::test]
    async fn test_vote_replies_feed_the_tally() {
        let h = harness();
        let round = h.tally.reset("lockX").await;

        for (kind, peer) in [("votingAccept", "dlock2"), ("votingReject", "dlock3")] {
            h.dispatcher
                .handle(
                    Message::from_envelope(Envelope {
                        kind: kind.to_string(),
                        server_id: Some(peer.to_string()),
                        lock_name: "lockX".to_string(),
                        round: Some(round),
                    })
                    .unwrap()
                    .unwrap(),
                )
                .await;
        }

        assert_eq!(h.tally.counts("lockX").await, (1, 1));
    }

    #[tokio::test]
    async fn test_lock_release_replies_to_client() {
        let mut h = harness();
        let reply = h
            .dispatcher
            .dispatch(envelope(r#"{"type":"lockRelease","lockName":"lockX"}"#))
            .await
            .unwrap();

        assert_eq!(reply.kind, ReplyType::LockRel);
        assert_eq!(h.replies.recv().await.unwrap(), reply);
    }

    #[tokio::test]
    async fn test_keep_alive_recorded() {
        let h = harness();
        h.dispatcher
            .dispatch(envelope(r#"{"type":"keepAlive","serverId":"dlock4"}"#))
            .await;
        assert_eq!(h.heartbeat.last().await.unwrap().peer, "dlock4");
    }

    #[tokio::test]
    async fn test_unknown_and_malformed_ignored() {
        let mut h = harness();
        assert!(h
            .dispatcher
            .dispatch(envelope(r#"{"type":"becomeLeader","serverId":"dlock2"}"#))
            .await
            .is_none());
        assert!(h
            .dispatcher
            .dispatch(envelope(r#"{"type":"votingRequest","lockName":"lockX","round":1}"#))
            .await
            .is_none());

        assert_eq!(h.table.state("lockX").await, LockState::Vacant);
        assert!(h.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_non_member_ignored() {
        let h = harness();
        h.dispatcher
            .dispatch(envelope(
                r#"{"type":"votingRequest","serverId":"intruder","lockName":"lockX","round":1}"#,
            ))
            .await;
        assert_eq!(h.table.state("lockX").await, LockState::Vacant);
    }

    #[tokio::test]
    async fn test_abandoned_request_still_settles() {
        let mut h = harness();
        let dispatcher = Arc::clone(&h.dispatcher);
        let caller = tokio::spawn(async move {
            dispatcher
                .handle(Message::LockRequest { lock_name: "lockX".into() })
                .await
        });

        // Give up on the request while its round is still polling
        tokio::time::sleep(Duration::from_millis(5)).await;
        caller.abort();

        tokio::time::sleep(Duration::from_millis(100)).await;
        let entry = h.table.get("lockX").await.unwrap();
        assert_eq!(entry.state, LockState::Vacant);
        assert_eq!(entry.last_outcome, Some(RoundOutcome::NoDecision));

        // The failed round still withdraws the promises
        let mut released = 0;
        while let Ok((_, envelope)) = h.rx.try_recv() {
            if envelope.kind == "lockReleased" {
                released += 1;
            }
        }
        assert_eq!(released, 4);
        assert_eq!(h.replies.recv().await.unwrap().kind, ReplyType::LockReject);
    }
}
