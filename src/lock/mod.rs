//! Lock Module
//!
//! Per-lock ownership state on this node and the state machine that
//! drives acquisition, release and voting on behalf of peers.

mod table;
mod manager;

pub use table::{LockEntry, LockState, LockSummary, LockTable};
pub use manager::LockManager;
