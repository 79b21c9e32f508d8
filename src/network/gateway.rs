//! Messaging Gateway
//!
//! Best-effort delivery of protocol messages to peers and of replies to
//! the client. Failures are logged and dropped; the voting protocol
//! treats a lost message as a missing vote, so nothing is retried.

use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;

use super::protocol::{Envelope, Message, Reply};
use crate::error::Result;
use crate::state::PeerDirectory;

/// Carries wire messages to an address
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver a protocol message to a peer's wire listener
    async fn send(&self, address: &str, envelope: &Envelope) -> Result<()>;

    /// Deliver a reply to a client listener
    async fn send_reply(&self, address: &str, reply: &Reply) -> Result<()>;
}

/// HTTP transport: one JSON `POST /` per message
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport whose requests give up after `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            // Peers talk to each other directly, never through a proxy
            .no_proxy()
            .build()?;

        Ok(Self { client })
    }

    async fn post<T: serde::Serialize + Sync>(&self, address: &str, body: &T) -> Result<()> {
        let url = format!("http://{}/", address);
        let response = self.client.post(&url).json(body).send().await?;
        let response = response.error_for_status()?;
        // Drain the body so the connection can be reused
        response.bytes().await?;
        Ok(())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, address: &str, envelope: &Envelope) -> Result<()> {
        self.post(address, envelope).await
    }

    async fn send_reply(&self, address: &str, reply: &Reply) -> Result<()> {
        self.post(address, reply).await
    }
}

/// Sends messages to peers named in the directory
#[derive(Clone)]
pub struct MessagingGateway {
    directory: Arc<PeerDirectory>,
    transport: Arc<dyn Transport>,
    reply_address: Option<String>,
}

impl MessagingGateway {
    /// Create a new gateway
    pub fn new(
        directory: Arc<PeerDirectory>,
        transport: Arc<dyn Transport>,
        reply_address: Option<String>,
    ) -> Self {
        Self {
            directory,
            transport,
            reply_address,
        }
    }

    /// The peer directory messages are routed through
    pub fn directory(&self) -> &PeerDirectory {
        &self.directory
    }

    /// Send a message to one peer, swallowing delivery errors
    pub async fn send_one(&self, peer: &str, message: &Message) {
        let address = match self.directory.address_of(peer) {
            Ok(address) => address,
            Err(e) => {
                tracing::warn!("Dropping {} for {}: {}", message.type_name(), peer, e);
                return;
            }
        };

        tracing::debug!(
            "SENDING {} for lock {} to {} ({})",
            message.type_name(),
            message.lock_name(),
            peer,
            address
        );

        match self.transport.send(address, &message.to_envelope()).await {
            Ok(()) => {}
            Err(e) if e.is_transport() => {
                tracing::warn!(
                    "FAILED to deliver {} to {}: {}",
                    message.type_name(),
                    peer,
                    e
                );
            }
            Err(e) => {
                tracing::error!(
                    "Dropping {} for {}: {}",
                    message.type_name(),
                    peer,
                    e
                );
            }
        }
    }

    /// Send a message to one peer on a background task
    pub fn spawn_one(&self, peer: String, message: Message) {
        let gateway = self.clone();
        tokio::spawn(async move {
            gateway.send_one(&peer, &message).await;
        });
    }

    /// Send a message to every peer in the directory, self included.
    ///
    /// Each delivery runs on its own task; the caller never waits on a
    /// slow or unreachable peer.
    pub fn send_all(&self, message: &Message) {
        for peer in self.directory.peers() {
            self.spawn_one(peer.id.clone(), message.clone());
        }
    }

    /// Post a reply to the configured client address
    pub async fn reply(&self, reply: &Reply) {
        let Some(address) = self.reply_address.as_deref() else {
            return;
        };

        if let Err(e) = self.transport.send_reply(address, reply).await {
            tracing::warn!(
                "FAILED to deliver {} for lock {} to client at {}: {}",
                reply.kind,
                reply.lock_name,
                address,
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::network::protocol::ReplyType;
    use tokio::sync::mpsc;

    /// Transport that forwards everything into a channel; `down` addresses fail
    struct ChannelTransport {
        tx: mpsc::UnboundedSender<(String, Envelope)>,
        replies: mpsc::UnboundedSender<(String, Reply)>,
        down: Vec<String>,
    }

    #[async_trait]
    impl Transport for ChannelTransport {
        async fn send(&self, address: &str, envelope: &Envelope) -> Result<()> {
            if self.down.iter().any(|d| d == address) {
                return Err(Error::ConnectionFailed {
                    address: address.to_string(),
                    reason: "connection refused".into(),
                });
            }
            let _ = self.tx.send((address.to_string(), envelope.clone()));
            Ok(())
        }

        async fn send_reply(&self, address: &str, reply: &Reply) -> Result<()> {
            let _ = self.replies.send((address.to_string(), reply.clone()));
            Ok(())
        }
    }

    fn gateway(
        down: Vec<String>,
        reply_address: Option<String>,
    ) -> (
        MessagingGateway,
        mpsc::UnboundedReceiver<(String, Envelope)>,
        mpsc::UnboundedReceiver<(String, Reply)>,
    ) {
        let directory = Arc::new(PeerDirectory::new(
            "dlock1",
            (1..=4).map(|i| (format!("dlock{}", i), format!("10.0.0.{}:8080", i))),
        ));
        let (tx, rx) = mpsc::unbounded_channel();
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        let transport = Arc::new(ChannelTransport {
            tx,
            replies: reply_tx,
            down,
        });
        (
            MessagingGateway::new(directory, transport, reply_address),
            rx,
            reply_rx,
        )
    }

    #[tokio::test]
    async fn test_send_all_reaches_every_peer_including_self() {
        let (gateway, mut rx, _) = gateway(vec![], None);
        gateway.send_all(&Message::LockReleased {
            server_id: "dlock1".into(),
            lock_name: "lockX".into(),
        });

        let mut addresses = Vec::new();
        for _ in 0..4 {
            let (address, envelope) = rx.recv().await.unwrap();
            assert_eq!(envelope.kind, "lockReleased");
            addresses.push(address);
        }
        addresses.sort();
        assert_eq!(
            addresses,
            vec!["10.0.0.1:8080", "10.0.0.2:8080", "10.0.0.3:8080", "10.0.0.4:8080"]
        );
    }

    #[tokio::test]
    async fn test_failures_are_swallowed() {
        let (gateway, mut rx, _) = gateway(vec!["10.0.0.3:8080".into()], None);
        let msg = Message::KeepAlive { server_id: "dlock1".into() };

        gateway.send_one("dlock3", &msg).await;
        gateway.send_one("dlock9", &msg).await;
        gateway.send_one("dlock2", &msg).await;

        let (address, _) = rx.recv().await.unwrap();
        assert_eq!(address, "10.0.0.2:8080");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_reply_uses_client_address() {
        let (gateway, _, mut replies) = gateway(vec![], Some("127.0.0.1:9000".into()));
        gateway.reply(&Reply::new(ReplyType::LockAccept, "lockX")).await;

        let (address, reply) = replies.recv().await.unwrap();
        assert_eq!(address, "127.0.0.1:9000");
        assert_eq!(reply.kind, ReplyType::LockAccept);
    }

    #[tokio::test]
    async fn test_reply_disabled_without_address() {
        let (gateway, _, mut replies) = gateway(vec![], None);
        gateway.reply(&Reply::new(ReplyType::LockRel, "lockX")).await;
        assert!(replies.try_recv().is_err());
    }

    struct BrokenTransport;

    #[async_trait]
    impl Transport for BrokenTransport {
        async fn send(&self, _address: &str, _envelope: &Envelope) -> Result<()> {
            Err(Error::Protocol("peer answered garbage".into()))
        }

        async fn send_reply(&self, _address: &str, _reply: &Reply) -> Result<()> {
            Err(Error::Protocol("client answered garbage".into()))
        }
    }

    #[tokio::test]
    async fn test_non_transport_failures_are_swallowed() {
        let directory = Arc::new(PeerDirectory::new(
            "dlock1",
            [("dlock1".to_string(), "10.0.0.1:8080".to_string())],
        ));
        let gateway = MessagingGateway::new(
            directory,
            Arc::new(BrokenTransport),
            Some("127.0.0.1:9000".into()),
        );
        assert!(!Error::Protocol(String::new()).is_transport());

        gateway
            .send_one("dlock1", &Message::KeepAlive { server_id: "dlock1".into() })
            .await;
        gateway.reply(&Reply::new(ReplyType::LockRel, "lockX")).await;
    }
}
