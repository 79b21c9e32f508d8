//! Heartbeat Tracker
//!
//! Records the most recent keep-alive. Nothing reads this for failure
//! detection; it is exposed through the status API only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Last keep-alive seen by this node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatRecord {
    /// Peer that sent it
    pub peer: String,
    /// When it arrived
    pub received_at: DateTime<Utc>,
}

/// Single-slot heartbeat store
#[derive(Debug, Default)]
pub struct HeartbeatTracker {
    last: RwLock<Option<HeartbeatRecord>>,
}

impl HeartbeatTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the slot with a keep-alive from `peer`
    pub async fn on_keep_alive(&self, peer: &str) {
        *self.last.write().await = Some(HeartbeatRecord {
            peer: peer.to_string(),
            received_at: Utc::now(),
        });
        tracing::debug!("Received keep alive from server {}", peer);
    }

    /// Most recent keep-alive, if any
    pub async fn last(&self) -> Option<HeartbeatRecord> {
        self.last.read().await.clone()
    }
}
