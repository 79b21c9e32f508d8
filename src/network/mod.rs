//! Network Module
//!
//! Wire protocol, outbound gateway, inbound dispatch and the HTTP
//! listener that carries messages between nodes.

pub mod protocol;
mod gateway;
mod dispatcher;
mod server;

pub use protocol::{Envelope, Message, MessageType, Reply, ReplyType};
pub use gateway::{HttpTransport, MessagingGateway, Transport};
pub use dispatcher::Dispatcher;
pub use server::NetworkServer;
