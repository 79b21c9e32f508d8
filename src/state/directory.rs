//! Peer Directory
//!
//! Static mapping from peer identity to wire address for the fixed
//! cluster. Built once at startup and shared read-only afterwards.

use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};

use crate::config::DlockConfig;
use crate::error::{Error, Result};

/// A single cluster member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerEntry {
    /// Peer identity
    pub id: String,
    /// Wire listener address (host:port)
    pub address: String,
}

/// Static peer directory
#[derive(Debug, Clone)]
pub struct PeerDirectory {
    /// This node's ID
    local_id: String,
    /// All cluster members (including self), ordered by ID
    peers: BTreeMap<String, PeerEntry>,
}

impl PeerDirectory {
    /// Create a directory from `(id, address)` pairs
    pub fn new<I>(local_id: impl Into<String>, peers: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let peers = peers
            .into_iter()
            .map(|(id, address)| (id.clone(), PeerEntry { id, address }))
            .collect();

        Self {
            local_id: local_id.into(),
            peers,
        }
    }

    /// Build the directory from a validated configuration
    pub fn from_config(config: &DlockConfig) -> Self {
        Self::new(
            config.node.id.clone(),
            config
                .cluster
                .peers
                .iter()
                .map(|p| (p.id.clone(), p.address.clone())),
        )
    }

    /// Get this node's ID
    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    /// Look up the address of a peer
    pub fn address_of(&self, id: &str) -> Result<&str> {
        self.peers
            .get(id)
            .map(|p| p.address.as_str())
            .ok_or_else(|| Error::UnknownPeer(id.to_string()))
    }

    /// Check whether a peer is a cluster member
    pub fn contains(&self, id: &str) -> bool {
        self.peers.contains_key(id)
    }

    /// Iterate over all peers, self included
    pub fn peers(&self) -> impl Iterator<Item = &PeerEntry> {
        self.peers.values()
    }

    /// Cluster size
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
