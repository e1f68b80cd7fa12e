//! # Backend Channel
//!
//! The single persistent duplex connection to the processing backend.
//!
//! ## Key Components:
//! - **transport**: raw frame I/O over one connection (WebSocket or in-memory)
//! - **client**: reconnect state machine, heartbeat loop and message dispatch
//! - **backoff**: exponential delay policy between reconnect attempts
//! - **message**: JSON wire messages exchanged with the backend
//! - **events**: notifications published to subscribers

pub mod backoff;
pub mod client;
pub mod events;
pub mod message;
pub mod transport;

pub use backoff::BackoffPolicy;
pub use client::{ChannelClient, ChannelSettings, ConnectionState, ConnectionStatus};
pub use events::ChannelEvent;
pub use message::{AudioFormat, ChannelMessage, InboundMessage};
pub use transport::{ChannelTransport, Frame, WebSocketTransport};

#[cfg(any(test, feature = "memory-transport"))]
pub use transport::MemoryTransport;
