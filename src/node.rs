//! Node Assembly
//!
//! Wires the components of one cluster member together around a
//! transport.

use std::sync::Arc;

use crate::config::{DlockConfig, VotingConfig};
use crate::error::Result;
use crate::lock::{LockManager, LockTable};
use crate::network::{Dispatcher, HttpTransport, MessagingGateway, Transport};
use crate::state::{HeartbeatTracker, PeerDirectory};
use crate::voting::{BallotTally, VotingEngine};

/// One cluster member
pub struct Node {
    directory: Arc<PeerDirectory>,
    tally: Arc<BallotTally>,
    heartbeat: Arc<HeartbeatTracker>,
    locks: Arc<LockManager>,
    dispatcher: Arc<Dispatcher>,
}

impl Node {
    /// Build a node that talks through `transport`
    pub fn new(config: &DlockConfig, transport: Arc<dyn Transport>) -> Self {
        let node_id = config.node.id.clone();
        let directory = Arc::new(PeerDirectory::from_config(config));
        let gateway = MessagingGateway::new(
            Arc::clone(&directory),
            transport,
            config.client.reply_address.clone(),
        );

        let tally = Arc::new(BallotTally::new());
        let heartbeat = Arc::new(HeartbeatTracker::new());
        let table = Arc::new(LockTable::new(node_id.clone()));

        let engine = VotingEngine::new(
            node_id.clone(),
            Arc::clone(&tally),
            gateway.clone(),
            config.voting.clone(),
        );
        let locks = Arc::new(LockManager::new(node_id, table, engine, gateway.clone()));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&locks),
            Arc::clone(&tally),
            Arc::clone(&heartbeat),
            gateway,
        ));

        Self {
            directory,
            tally,
            heartbeat,
            locks,
            dispatcher,
        }
    }

    /// Build a node using the HTTP transport
    pub fn with_http_transport(config: &DlockConfig) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new(config.request_timeout())?);
        Ok(Self::new(config, transport))
    }

    /// Get this node's ID
    pub fn node_id(&self) -> &str {
        self.directory.local_id()
    }

    pub fn directory(&self) -> &PeerDirectory {
        &self.directory
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::clone(&self.dispatcher)
    }

    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    pub fn tally(&self) -> &BallotTally {
        &self.tally
    }

    pub fn heartbeat(&self) -> &HeartbeatTracker {
        &self.heartbeat
    }

    pub fn voting_config(&self) -> &VotingConfig {
        self.locks.engine().config()
    }
}
