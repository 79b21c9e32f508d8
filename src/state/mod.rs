//! State Module
//!
//! Read-mostly cluster state: the static peer directory and the
//! keep-alive tracker.

mod directory;
mod heartbeat;

pub use directory::{PeerDirectory, PeerEntry};
pub use heartbeat::{HeartbeatRecord, HeartbeatTracker};
