//! Notifications published by the channel client.
//!
//! Subscribers receive events through a bounded `tokio::sync::broadcast` queue.
//! A subscriber that falls behind loses the oldest events and is told how many
//! it missed (`RecvError::Lagged`); it never slows the channel down.

use super::message::{
    AudioDataMessage, ErrorMessage, HeartbeatMessage, InboundMessage, StatusMessage,
};

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The transport opened; the heartbeat loop is running
    Connected,
    /// An open connection was lost
    Disconnected {
        code: Option<u16>,
        reason: Option<String>,
    },
    /// A connect attempt failed or timed out
    ConnectionError(String),
    /// A reconnect is scheduled after `delay_ms`
    Reconnecting { attempt: u32, delay_ms: u64 },
    /// The reconnect budget is spent; no further automatic retries
    MaxReconnectAttemptsReached { attempts: u32 },
    /// The client was shut down deliberately
    Closed,

    /// Processed audio from the backend for one call
    AudioResponse(AudioDataMessage),
    /// Raw audio that arrived without a structured envelope
    BinaryAudio(Vec<u8>),
    Status(StatusMessage),
    RemoteError(ErrorMessage),
    Heartbeat(HeartbeatMessage),
    /// Any other structured message, including unrecognized types
    Message(InboundMessage),
}

impl ChannelEvent {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            ChannelEvent::Connected => "connected",
            ChannelEvent::Disconnected { .. } => "disconnected",
            ChannelEvent::ConnectionError(_) => "connection_error",
            ChannelEvent::Reconnecting { .. } => "reconnecting",
            ChannelEvent::MaxReconnectAttemptsReached { .. } => "max_reconnect_attempts_reached",
            ChannelEvent::Closed => "closed",
            ChannelEvent::AudioResponse(_) => "audio_response",
            ChannelEvent::BinaryAudio(_) => "binary_audio",
            ChannelEvent::Status(_) => "status",
            ChannelEvent::RemoteError(_) => "remote_error",
            ChannelEvent::Heartbeat(_) => "heartbeat",
            ChannelEvent::Message(_) => "message",
        }
    }
}
