//! Lock Ownership Table
//!
//! Local view of who owns each lock name. Every transition that first
//! inspects the current state runs under a single write guard.

use std::collections::HashMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::voting::RoundOutcome;

/// State of one lock name on this node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "owner", rename_all = "snake_case")]
pub enum LockState {
    /// Nobody owns or was promised the lock
    Vacant,
    /// This node is running a round for the lock
    Pending,
    /// Promised to a peer that asked for a vote
    Tentative(String),
    /// Won by this node
    Held(String),
}

impl LockState {
    /// Peer recorded as owner or tentative owner
    pub fn owner(&self) -> Option<&str> {
        match self {
            LockState::Tentative(peer) | LockState::Held(peer) => Some(peer),
            LockState::Vacant | LockState::Pending => None,
        }
    }

    pub fn is_vacant(&self) -> bool {
        matches!(self, LockState::Vacant)
    }
}

impl std::fmt::Display for LockState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockState::Vacant => write!(f, "VACANT"),
            LockState::Pending => write!(f, "PENDING"),
            LockState::Tentative(peer) => write!(f, "TENTATIVE({})", peer),
            LockState::Held(peer) => write!(f, "HELD({})", peer),
        }
    }
}

/// Table entry for one lock name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockEntry {
    /// Current ownership state
    pub state: LockState,
    /// Outcome of the last round this node ran for the lock
    pub last_outcome: Option<RoundOutcome>,
    /// Time of the last state change
    pub updated_at: DateTime<Utc>,
}

impl LockEntry {
    fn vacant() -> Self {
        Self {
            state: LockState::Vacant,
            last_outcome: None,
            updated_at: Utc::now(),
        }
    }

    fn set(&mut self, state: LockState) {
        self.state = state;
        self.updated_at = Utc::now();
    }
}

/// Counts of non-vacant entries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockSummary {
    pub total_locks: usize,
    pub held: usize,
    pub tentative: usize,
    pub pending: usize,
}

/// Lock ownership table
pub struct LockTable {
    /// This node's ID
    node_id: String,
    /// Entries are created on first reference and never removed
    entries: RwLock<HashMap<String, LockEntry>>,
}

impl LockTable {
    /// Create an empty table
    pub fn new(node_id: String) -> Self {
        Self {
            node_id,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Current state of a lock (vacant if never referenced)
    pub async fn state(&self, lock_name: &str) -> LockState {
        self.entries
            .read()
            .await
            .get(lock_name)
            .map(|e| e.state.clone())
            .unwrap_or(LockState::Vacant)
    }

    /// Full entry for a lock
    pub async fn get(&self, lock_name: &str) -> Option<LockEntry> {
        self.entries.read().await.get(lock_name).cloned()
    }

    /// All entries, ordered by lock name
    pub async fn snapshot(&self) -> Vec<(String, LockEntry)> {
        let entries = self.entries.read().await;
        let mut all: Vec<_> = entries
            .iter()
            .map(|(name, entry)| (name.clone(), entry.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Move a vacant lock to `Pending` and clear its last outcome.
    ///
    /// Returns the blocking state if the lock is not vacant.
    pub async fn try_begin(&self, lock_name: &str) -> std::result::Result<(), LockState> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .entry(lock_name.to_string())
            .or_insert_with(LockEntry::vacant);

        if !entry.state.is_vacant() {
            return Err(entry.state.clone());
        }

        entry.set(LockState::Pending);
        entry.last_outcome = None;
        Ok(())
    }

    /// Decide a vote for `requester`.
    ///
    /// A vacant lock is promised to the requester. A pending lock only
    /// accepts this node's own request for its running round.
    pub async fn try_promise(&self, lock_name: &str, requester: &str) -> bool {
        let mut entries = self.entries.write().await;
        let entry = entries
            .entry(lock_name.to_string())
            .or_insert_with(LockEntry::vacant);

        let is_self = requester == self.node_id;
        match entry.state {
            LockState::Vacant if !is_self => {
                entry.set(LockState::Tentative(requester.to_string()));
                true
            }
            LockState::Pending => is_self,
            _ => false,
        }
    }

    /// Settle a round started with [`try_begin`](Self::try_begin)
    pub async fn finish_round(&self, lock_name: &str, outcome: RoundOutcome) -> LockState {
        let mut entries = self.entries.write().await;
        let entry = entries
            .entry(lock_name.to_string())
            .or_insert_with(LockEntry::vacant);

        entry.last_outcome = Some(outcome);

        if entry.state != LockState::Pending {
            tracing::warn!(
                "Round for lock {} finished in unexpected state {}",
                lock_name,
                entry.state
            );
            return entry.state.clone();
        }

        if outcome.is_accepted() {
            entry.set(LockState::Held(self.node_id.clone()));
        } else {
            entry.set(LockState::Vacant);
        }
        entry.state.clone()
    }

    /// Clear a lock owned by this node; returns whether anything changed
    pub async fn release_local(&self, lock_name: &str) -> bool {
        self.release_owned_by(lock_name, &self.node_id).await
    }

    /// Clear a lock owned or promised to `requester`
    pub async fn release_owned_by(&self, lock_name: &str, requester: &str) -> bool {
        let mut entries = self.entries.write().await;
        match entries.get_mut(lock_name) {
            Some(entry) if entry.state.owner() == Some(requester) => {
                entry.set(LockState::Vacant);
                true
            }
            _ => false,
        }
    }

    /// Count entries by state
    pub async fn summary(&self) -> LockSummary {
        let entries = self.entries.read().await;
        let mut summary = LockSummary {
            total_locks: entries.len(),
            ..Default::default()
        };

        for entry in entries.values() {
            match entry.state {
                LockState::Held(_) => summary.held += 1,
                LockState::Tentative(_) => summary.tentative += 1,
                LockState::Pending => summary.pending += 1,
                LockState::Vacant => {}
            }
        }

        summary
    }
}
