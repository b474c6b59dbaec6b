//! netframe - a generic, bidirectional, message-oriented TCP transport
//!
//! Frames arbitrary typed messages over a stream socket, multiplexes many
//! connections through a single event loop per endpoint, and hands completed
//! messages to the embedding application via a thread-safe inbox.
//!
//! The application supplies its own message-tag enumeration (via
//! [`MessageId`]) and payload layouts, and hooks connection lifecycle events
//! through [`ServerHandler`]. This crate carries no application semantics,
//! no encryption, and no delivery guarantee beyond a best-effort ordered
//! stream with drop-on-disconnect.
//!
//! Log events are emitted through `tracing` under the `"client"` and
//! `"server"` targets; installing a subscriber is the embedder's job.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use netframe::{Client, Message, MessageId, NetworkConfig, OwnedMessage, Server, ServerHandler};
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! enum Msg {
//!     Ping,
//!     Pong,
//! }
//!
//! impl MessageId for Msg {
//!     fn to_wire(self) -> u32 {
//!         self as u32
//!     }
//!
//!     fn from_wire(raw: u32) -> Option<Self> {
//!         match raw {
//!             0 => Some(Msg::Ping),
//!             1 => Some(Msg::Pong),
//!             _ => None,
//!         }
//!     }
//! }
//!
//! struct Pong;
//!
//! impl ServerHandler<Msg> for Pong {
//!     fn on_message(&self, mut message: OwnedMessage<Msg>) {
//!         if let Some(owner) = message.owner.take() {
//!             owner.send(Message::new(Msg::Pong));
//!         }
//!     }
//! }
//!
//! let mut server = Server::new(NetworkConfig::new(52000), Arc::new(Pong));
//! server.start().unwrap();
//!
//! let mut client = Client::new(NetworkConfig::default());
//! client.connect("127.0.0.1", 52000);
//! client.send(Message::new(Msg::Ping));
//!
//! server.process(None);
//! ```

pub mod network;
pub mod protocol;
pub mod queue;

pub use network::{
    resolve_host, Client, ClientId, ConfigError, ConfigResult, ConnectionError, ConnectionHandle,
    NetworkConfig, OwnedMessage, Port, Server, ServerError, ServerHandler, ServerResult,
    DEFAULT_PORT,
};
pub use protocol::{
    CodecError, Decoder, Encoder, Message, MessageError, MessageHeader, MessageId, HEADER_SIZE,
    MAX_BODY_SIZE,
};
pub use queue::ThreadSafeQueue;

#[cfg(test)]
pub(crate) mod test_support {
    use super::MessageId;

    /// Tag enumeration used across the crate's tests.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Probe {
        Ping,
        Pong,
        Data,
    }

    impl MessageId for Probe {
        fn to_wire(self) -> u32 {
            match self {
                Probe::Ping => 0,
                Probe::Pong => 1,
                Probe::Data => 2,
            }
        }

        fn from_wire(raw: u32) -> Option<Self> {
            match raw {
                0 => Some(Probe::Ping),
                1 => Some(Probe::Pong),
                2 => Some(Probe::Data),
                _ => None,
            }
        }
    }
}
