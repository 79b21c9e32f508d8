//! Wire Protocol
//!
//! Defines the messages exchanged between peers and with clients.
//! On the wire every message is a flat JSON [`Envelope`]; the
//! dispatcher turns it into a typed [`Message`].

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Inbound message types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Client asks this node to acquire a lock
    LockReq,
    /// Client asks this node to release a lock
    LockRelease,
    /// Peer asks for a vote
    VotingRequest,
    /// Peer voted accept
    VotingAccept,
    /// Peer voted reject
    VotingReject,
    /// Peer released (or abandoned) a lock
    LockReleased,
    /// Peer heartbeat
    KeepAlive,
}

impl MessageType {
    /// Wire name of the type
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::LockReq => "lockReq",
            MessageType::LockRelease => "lockRelease",
            MessageType::VotingRequest => "votingRequest",
            MessageType::VotingAccept => "votingAccept",
            MessageType::VotingReject => "votingReject",
            MessageType::LockReleased => "lockReleased",
            MessageType::KeepAlive => "keepAlive",
        }
    }

    /// Parse a wire name; unknown names yield `None`
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "lockReq" => Some(MessageType::LockReq),
            "lockRelease" => Some(MessageType::LockRelease),
            "votingRequest" => Some(MessageType::VotingRequest),
            "votingAccept" => Some(MessageType::VotingAccept),
            "votingReject" => Some(MessageType::VotingReject),
            "lockReleased" => Some(MessageType::LockReleased),
            "keepAlive" => Some(MessageType::KeepAlive),
            _ => None,
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw wire form of a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Message type name; kept as a string so unknown types still parse
    #[serde(rename = "type")]
    pub kind: String,
    /// Originating peer (absent for client requests)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
    /// Target lock
    #[serde(default)]
    pub lock_name: String,
    /// Voting round token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round: Option<u64>,
}

/// Typed protocol messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    LockRequest {
        lock_name: String,
    },
    LockRelease {
        lock_name: String,
    },
    VotingRequest {
        server_id: String,
        lock_name: String,
        round: u64,
    },
    VotingAccept {
        server_id: String,
        lock_name: String,
        round: u64,
    },
    VotingReject {
        server_id: String,
        lock_name: String,
        round: u64,
    },
    LockReleased {
        server_id: String,
        lock_name: String,
    },
    KeepAlive {
        server_id: String,
    },
}

impl Message {
    /// Get the message type
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::LockRequest { .. } => MessageType::LockReq,
            Message::LockRelease { .. } => MessageType::LockRelease,
            Message::VotingRequest { .. } => MessageType::VotingRequest,
            Message::VotingAccept { .. } => MessageType::VotingAccept,
            Message::VotingReject { .. } => MessageType::VotingReject,
            Message::LockReleased { .. } => MessageType::LockReleased,
            Message::KeepAlive { .. } => MessageType::KeepAlive,
        }
    }

    /// Get the message type name (for logging)
    pub fn type_name(&self) -> &'static str {
        self.message_type().as_str()
    }

    /// Lock the message refers to (empty for keep-alives)
    pub fn lock_name(&self) -> &str {
        match self {
            Message::LockRequest { lock_name }
            | Message::LockRelease { lock_name }
            | Message::VotingRequest { lock_name, .. }
            | Message::VotingAccept { lock_name, .. }
            | Message::VotingReject { lock_name, .. }
            | Message::LockReleased { lock_name, .. } => lock_name,
            Message::KeepAlive { .. } => "",
        }
    }

    /// Convert to wire form
    pub fn to_envelope(&self) -> Envelope {
        let (server_id, round) = match self {
            Message::LockRequest { .. } | Message::LockRelease { .. } => (None, None),
            Message::VotingRequest { server_id, round, .. }
            | Message::VotingAccept { server_id, round, .. }
            | Message::VotingReject { server_id, round, .. } => {
                (Some(server_id.clone()), Some(*round))
            }
            Message::LockReleased { server_id, .. } | Message::KeepAlive { server_id } => {
                (Some(server_id.clone()), None)
            }
        };

        Envelope {
            kind: self.type_name().to_string(),
            server_id,
            lock_name: self.lock_name().to_string(),
            round,
        }
    }

    /// Decode wire form.
    ///
    /// Returns `Ok(None)` for unknown message types and an error for a
    /// known type that is missing a required field.
    pub fn from_envelope(envelope: Envelope) -> Result<Option<Self>> {
        let Some(kind) = MessageType::parse(&envelope.kind) else {
            return Ok(None);
        };

        let Envelope {
            server_id,
            lock_name,
            round,
            ..
        } = envelope;

        let require_server = |server_id: Option<String>| {
            server_id
                .filter(|s| !s.is_empty())
                .ok_or_else(|| Error::Protocol(format!("{} without serverId", kind)))
        };
        let require_round = |round: Option<u64>| {
            round.ok_or_else(|| Error::Protocol(format!("{} without round", kind)))
        };

        let message = match kind {
            MessageType::LockReq => Message::LockRequest { lock_name },
            MessageType::LockRelease => Message::LockRelease { lock_name },
            MessageType::VotingRequest => Message::VotingRequest {
                server_id: require_server(server_id)?,
                lock_name,
                round: require_round(round)?,
            },
            MessageType::VotingAccept => Message::VotingAccept {
                server_id: require_server(server_id)?,
                lock_name,
                round: require_round(round)?,
            },
            MessageType::VotingReject => Message::VotingReject {
                server_id: require_server(server_id)?,
                lock_name,
                round: require_round(round)?,
            },
            MessageType::LockReleased => Message::LockReleased {
                server_id: require_server(server_id)?,
                lock_name,
            },
            MessageType::KeepAlive => Message::KeepAlive {
                server_id: require_server(server_id)?,
            },
        };

        Ok(Some(message))
    }
}

/// Client-facing reply types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplyType {
    #[serde(rename = "lockAccept")]
    LockAccept,
    #[serde(rename = "lockReject")]
    LockReject,
    #[serde(rename = "lockRel")]
    LockRel,
}

impl std::fmt::Display for ReplyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplyType::LockAccept => write!(f, "lockAccept"),
            ReplyType::LockReject => write!(f, "lockReject"),
            ReplyType::LockRel => write!(f, "lockRel"),
        }
    }
}

/// Reply sent to the client that issued a lock request or release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    #[serde(rename = "type")]
    pub kind: ReplyType,
    pub lock_name: String,
}

impl Reply {
    pub fn new(kind: ReplyType, lock_name: impl Into<String>) -> Self {
        Self {
            kind,
            lock_name: lock_name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_wire_shape() {
        let msg = Message::VotingRequest {
            server_id: "dlock1".to_string(),
            lock_name: "lockX".to_string(),
            round: 7,
        };

        let json = serde_json::to_value(msg.to_envelope()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "votingRequest",
                "serverId": "dlock1",
                "lockName": "lockX",
                "round": 7
            })
        );
    }

    #[test]
    fn test_client_request_omits_server_id() {
        let json = serde_json::to_string(
            &Message::LockRequest { lock_name: "lockX".into() }.to_envelope(),
        )
        .unwrap();
        assert!(!json.contains("serverId"));
        assert!(!json.contains("round"));
    }

    #[test]
    fn test_decode_from_json() {
        let envelope: Envelope = serde_json::from_str(
            r#"{"type":"lockReleased","serverId":"dlock2","lockName":"lockX"}"#,
        )
        .unwrap();

        let msg = Message::from_envelope(envelope).unwrap().unwrap();
        assert_eq!(
            msg,
            Message::LockReleased {
                server_id: "dlock2".into(),
                lock_name: "lockX".into()
            }
        );
    }

    #[test]
    fn test_unknown_type_is_ignored() {
        let envelope: Envelope =
            serde_json::from_str(r#"{"type":"becomeLeader","serverId":"dlock2"}"#).unwrap();
        assert!(Message::from_envelope(envelope).unwrap().is_none());
    }

    #[test]
    fn test_missing_fields_are_protocol_errors() {
        let no_server: Envelope =
            serde_json::from_str(r#"{"type":"votingAccept","lockName":"x","round":1}"#).unwrap();
        assert!(matches!(Message::from_envelope(no_server), Err(Error::Protocol(_))));

        let no_round: Envelope =
            serde_json::from_str(r#"{"type":"votingRequest","serverId":"a","lockName":"x"}"#)
                .unwrap();
        assert!(matches!(Message::from_envelope(no_round), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_reply_wire_shape() {
        let json = serde_json::to_value(Reply::new(ReplyType::LockRel, "lockX")).unwrap();
        assert_eq!(json, serde_json::json!({"type": "lockRel", "lockName": "lockX"}));
    }

    #[test]
    fn test_type_names_are_case_sensitive() {
        assert_eq!(MessageType::parse("votingAccept"), Some(MessageType::VotingAccept));
        assert_eq!(MessageType::LockReq.as_str(), "lockReq");
        assert_eq!(MessageType::parse("VotingAccept"), None);
        assert_eq!(MessageType::KeepAlive.to_string(), "keepAlive");
    }
}
