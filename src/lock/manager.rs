//! Lock State Machine
//!
//! Drives request → vote → commit/reject → release for locks requested
//! on this node, and answers vote requests and release notices from
//! peers.

use std::sync::Arc;

use super::{LockState, LockTable};
use crate::network::{Message, MessagingGateway, Reply, ReplyType};
use crate::voting::{Vote, VotingEngine};

/// Lock state machine for one node
pub struct LockManager {
    /// This node's ID
    node_id: String,
    /// Local ownership table
    table: Arc<LockTable>,
    /// Runs voting rounds
    engine: VotingEngine,
    /// Outbound messaging
    gateway: MessagingGateway,
}

impl LockManager {
    /// Create a new lock manager
    pub fn new(
        node_id: String,
        table: Arc<LockTable>,
        engine: VotingEngine,
        gateway: MessagingGateway,
    ) -> Self {
        Self {
            node_id,
            table,
            engine,
            gateway,
        }
    }

    /// Get this node's ID
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Local ownership table
    pub fn table(&self) -> &LockTable {
        &self.table
    }

    /// Voting engine used for local requests
    pub fn engine(&self) -> &VotingEngine {
        &self.engine
    }

    /// Try to acquire `lock_name` for this node.
    ///
    /// A lock that is not vacant locally is rejected without a round.
    /// A lost or undecided round is followed by a release broadcast so
    /// peers drop any promise they made for it.
    pub async fn request_lock(&self, lock_name: &str) -> Reply {
        tracing::info!("Got request from client for lock {}", lock_name);

        if let Err(state) = self.table.try_begin(lock_name).await {
            tracing::info!("Lock {} is {}, rejecting without a round", lock_name, state);
            return Reply::new(ReplyType::LockReject, lock_name);
        }

        let outcome = self.engine.run_round(lock_name).await;
        let state = self.table.finish_round(lock_name, outcome).await;

        if state == LockState::Held(self.node_id.clone()) {
            tracing::info!("Lock {} acquired by {}", lock_name, self.node_id);
            Reply::new(ReplyType::LockAccept, lock_name)
        } else {
            tracing::info!("Lock {} not acquired ({})", lock_name, outcome);
            self.broadcast_release(lock_name);
            Reply::new(ReplyType::LockReject, lock_name)
        }
    }

    /// Release `lock_name` on behalf of the local client.
    ///
    /// Only a lock owned by this node changes state. The release notice
    /// goes out unless this node's own round for the lock is in flight,
    /// where it would withdraw the promises that round is collecting.
    pub async fn release_lock(&self, lock_name: &str) -> Reply {
        if self.table.release_local(lock_name).await {
            tracing::info!("Released lock {}", lock_name);
            self.broadcast_release(lock_name);
        } else if self.table.state(lock_name).await == LockState::Pending {
            tracing::info!("Release for lock {} while its round is running, ignored", lock_name);
        } else {
            tracing::info!("Release for lock {} not held by {}, no change", lock_name, self.node_id);
            self.broadcast_release(lock_name);
        }

        Reply::new(ReplyType::LockRel, lock_name)
    }

    /// Decide a peer's vote request
    pub async fn handle_vote_request(&self, requester: &str, lock_name: &str) -> Vote {
        tracing::info!("Got voting request from {} for lock {}", requester, lock_name);

        if self.table.try_promise(lock_name, requester).await {
            tracing::info!("Voted for server {} on lock {}", requester, lock_name);
            Vote::Accept
        } else {
            tracing::info!(
                "Rejected server {} on lock {} (local state {})",
                requester,
                lock_name,
                self.table.state(lock_name).await
            );
            Vote::Reject
        }
    }

    /// Apply a release notice from `requester`
    pub async fn handle_remote_release(&self, requester: &str, lock_name: &str) -> bool {
        let cleared = self.table.release_owned_by(lock_name, requester).await;
        if cleared {
            tracing::info!("Got request from {} to release lock {}", requester, lock_name);
        } else {
            tracing::debug!(
                "Ignoring release of lock {} from {} (not the recorded owner)",
                lock_name,
                requester
            );
        }
        cleared
    }

    fn broadcast_release(&self, lock_name: &str) {
        self.gateway.send_all(&Message::LockReleased {
            server_id: self.node_id.clone(),
            lock_name: lock_name.to_string(),
        });
    }
}
