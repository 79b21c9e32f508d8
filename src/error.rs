//! dlock Error Types

use thiserror::Error;

/// Result type alias for dlock operations
pub type Result<T> = std::result::Result<T, Error>;

/// dlock error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    #[error("Connection failed to {address}: {reason}")]
    ConnectionFailed { address: String, reason: String },

    #[error("Connection timeout to {0}")]
    ConnectionTimeout(String),

    // Protocol errors
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Unknown peer: {0}")]
    UnknownPeer(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if this error is a delivery failure towards a peer.
    ///
    /// These are swallowed by the gateway: a lost message simply never
    /// contributes a vote.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Network(_)
                | Error::ConnectionFailed { .. }
                | Error::ConnectionTimeout(_)
                | Error::UnknownPeer(_)
        )
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        let address = e
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "<unknown>".to_string());

        if e.is_timeout() {
            Error::ConnectionTimeout(address)
        } else if e.is_connect() {
            Error::ConnectionFailed {
                address,
                reason: e.to_string(),
            }
        } else {
            Error::Network(e.to_string())
        }
    }
}
