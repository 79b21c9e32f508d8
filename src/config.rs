//! dlock Configuration
//!
//! This module provides configuration structures for the dlock
//! distributed lock service.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// Main dlock configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlockConfig {
    /// Node-specific configuration
    pub node: NodeConfig,

    /// Cluster configuration (static peer directory)
    pub cluster: ClusterConfig,

    /// Voting round configuration
    #[serde(default)]
    pub voting: VotingConfig,

    /// Client reply configuration
    #[serde(default)]
    pub client: ClientConfig,

    /// Status API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Node-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Identity of this peer; must be listed in `cluster.peers`
    pub id: String,

    /// Address to bind for peer and client wire messages
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

/// One entry of the static peer directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerConfig {
    /// Peer identity
    pub id: String,

    /// Wire listener address (host:port)
    pub address: String,
}

/// Cluster configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Every cluster member, this node included
    #[serde(default)]
    pub peers: Vec<PeerConfig>,

    /// Timeout for a single outbound message in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

/// Voting round configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VotingConfig {
    /// Interval between tally checks in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Number of intervals to wait before giving up on a round
    #[serde(default = "default_max_polls")]
    pub max_polls: u32,

    /// Accept votes needed to win a round
    #[serde(default = "default_accept_quorum")]
    pub accept_quorum: usize,

    /// Reject votes needed to lose a round
    #[serde(default = "default_reject_quorum")]
    pub reject_quorum: usize,
}

/// Client reply configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Where lockAccept/lockReject/lockRel replies are posted; an empty
    /// string disables posting
    #[serde(default = "default_reply_address")]
    pub reply_address: Option<String>,
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Enable HTTP status API
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// HTTP status API bind address
    #[serde(default = "default_api_address")]
    pub bind_address: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, json)
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log to file path (optional)
    pub file: Option<PathBuf>,
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_request_timeout_ms() -> u64 {
    2000
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_max_polls() -> u32 {
    5
}

fn default_accept_quorum() -> usize {
    3
}

fn default_reject_quorum() -> usize {
    2
}

fn default_reply_address() -> Option<String> {
    Some("127.0.0.1:9000".to_string())
}

fn default_true() -> bool {
    true
}

fn default_api_address() -> String {
    "0.0.0.0:9080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for VotingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_polls: default_max_polls(),
            accept_quorum: default_accept_quorum(),
            reject_quorum: default_reject_quorum(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            reply_address: default_reply_address(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: default_api_address(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}

impl VotingConfig {
    /// Get poll interval as Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Upper bound on how long a round can wait for votes
    pub fn round_timeout(&self) -> Duration {
        self.poll_interval() * self.max_polls
    }
}

impl DlockConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let mut config: DlockConfig = toml::from_str(content)?;
        if config.client.reply_address.as_deref() == Some("") {
            config.client.reply_address = None;
        }
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.node.id.is_empty() {
            return Err(crate::Error::Config("node.id cannot be empty".into()));
        }

        if self.node.bind_address.is_empty() {
            return Err(crate::Error::Config("node.bind_address cannot be empty".into()));
        }

        if self.cluster.peers.is_empty() {
            return Err(crate::Error::Config("cluster.peers cannot be empty".into()));
        }

        let mut seen = HashSet::new();
        for peer in &self.cluster.peers {
            if peer.id.is_empty() || peer.address.is_empty() {
                return Err(crate::Error::Config(
                    "cluster.peers entries need both id and address".into(),
                ));
            }
            if !seen.insert(peer.id.as_str()) {
                return Err(crate::Error::Config(format!(
                    "duplicate peer id in cluster.peers: {}",
                    peer.id
                )));
            }
        }

        if !seen.contains(self.node.id.as_str()) {
            return Err(crate::Error::Config(format!(
                "node.id '{}' must be listed in cluster.peers",
                self.node.id
            )));
        }

        let peers = self.cluster.peers.len();
        for (name, quorum) in [
            ("voting.accept_quorum", self.voting.accept_quorum),
            ("voting.reject_quorum", self.voting.reject_quorum),
        ] {
            if quorum == 0 || quorum > peers {
                return Err(crate::Error::Config(format!(
                    "{} must be between 1 and {} (got {})",
                    name, peers, quorum
                )));
            }
        }

        if self.voting.max_polls == 0 {
            return Err(crate::Error::Config("voting.max_polls must be at least 1".into()));
        }

        if self.voting.poll_interval_ms == 0 {
            return Err(crate::Error::Config("voting.poll_interval_ms must be positive".into()));
        }

        Ok(())
    }

    /// Get per-message request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.cluster.request_timeout_ms)
    }

    /// Address of this node as listed in the peer directory
    pub fn advertise_address(&self) -> Option<&str> {
        self.cluster
            .peers
            .iter()
            .find(|p| p.id == self.node.id)
            .map(|p| p.address.as_str())
    }
}
