//! dlock - Quorum-Voting Distributed Lock Service
//!
//! A fixed cluster of peers cooperatively grants named locks to clients.
//! Every peer is both a voter in other peers' rounds and the coordinator
//! of rounds for locks requested through it.
//!
//! # Architecture
//!
//! A lock request runs one voting round: the coordinator asks every peer
//! (itself included) for a vote, each peer promises the lock only if it
//! is vacant in its local table, and the coordinator polls the ballot
//! tally until the accept or reject quorum is met or the poll budget
//! runs out. Messages are delivered best-effort over HTTP; a lost
//! message is a missing vote.
//!
//! # Features
//!
//! - Asymmetric accept/reject quorum with fail-closed timeout
//! - Per-round tokens so late replies never pollute a newer round
//! - Local mutual exclusion before every accept vote
//! - Read-only HTTP status API
//! - Keep-alive recording

pub mod config;
pub mod error;
pub mod state;
pub mod voting;
pub mod lock;
pub mod network;
pub mod node;
pub mod api;

pub use config::DlockConfig;
pub use error::{Error, Result};
pub use node::Node;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::DlockConfig;
    pub use crate::error::{Error, Result};
    pub use crate::lock::{LockManager, LockState};
    pub use crate::network::{Envelope, Message, Reply, ReplyType, Transport};
    pub use crate::node::Node;
    pub use crate::voting::{RoundOutcome, Vote};
}
