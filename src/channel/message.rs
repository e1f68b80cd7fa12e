//! # Channel Wire Messages
//!
//! JSON text frames exchanged with the processing backend. Every message carries a
//! `type` tag and an ISO-8601 `timestamp`; call-scoped messages carry a `callId`.
//!
//! ## Message Format:
//! - `{"type":"init","callId":..,"audioConfig":{..},"timestamp":..}`
//! - `{"type":"audio_data","callId":..,"audioData":<base64>,"timestamp":..,"sequence":n}`
//! - `{"type":"end","callId":..,"timestamp":..,"duration":ms,"bytesProcessed":n}`
//! - `{"type":"heartbeat","timestamp":..}`
//! - `status` / `error` from the backend, plus any other `type` passed through untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Audio format descriptor negotiated in the `init` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_depth: u16,
    pub format: String,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            channels: 1,
            bit_depth: 16,
            format: "pcm".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitMessage {
    pub call_id: String,
    pub audio_config: AudioFormat,
    pub timestamp: DateTime<Utc>,
}

/// A chunk of audio for one call. `sequence` is the byte offset of the chunk
/// within the call's ingress stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioDataMessage {
    pub call_id: String,
    #[serde(with = "base64_bytes")]
    pub audio_data: Vec<u8>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub sequence: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndMessage {
    pub call_id: String,
    pub timestamp: DateTime<Utc>,
    /// Call duration in milliseconds
    pub duration: u64,
    pub bytes_processed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatMessage {
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Every structured message kind the relay understands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelMessage {
    Init(InitMessage),
    AudioData(AudioDataMessage),
    End(EndMessage),
    Heartbeat(HeartbeatMessage),
    Status(StatusMessage),
    Error(ErrorMessage),
}

const KNOWN_KINDS: &[&str] = &["init", "audio_data", "end", "heartbeat", "status", "error"];

impl ChannelMessage {
    pub fn init(call_id: &str, audio_config: AudioFormat) -> Self {
        ChannelMessage::Init(InitMessage {
            call_id: call_id.to_string(),
            audio_config,
            timestamp: Utc::now(),
        })
    }

    pub fn audio_data(call_id: &str, audio_data: Vec<u8>, sequence: u64) -> Self {
        ChannelMessage::AudioData(AudioDataMessage {
            call_id: call_id.to_string(),
            audio_data,
            timestamp: Utc::now(),
            sequence,
        })
    }

    pub fn end(call_id: &str, duration_ms: u64, bytes_processed: u64) -> Self {
        ChannelMessage::End(EndMessage {
            call_id: call_id.to_string(),
            timestamp: Utc::now(),
            duration: duration_ms,
            bytes_processed,
        })
    }

    pub fn heartbeat() -> Self {
        ChannelMessage::Heartbeat(HeartbeatMessage {
            timestamp: Utc::now(),
        })
    }

    /// The wire `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            ChannelMessage::Init(_) => "init",
            ChannelMessage::AudioData(_) => "audio_data",
            ChannelMessage::End(_) => "end",
            ChannelMessage::Heartbeat(_) => "heartbeat",
            ChannelMessage::Status(_) => "status",
            ChannelMessage::Error(_) => "error",
        }
    }

    /// Call id for call-scoped messages.
    pub fn call_id(&self) -> Option<&str> {
        match self {
            ChannelMessage::Init(m) => Some(&m.call_id),
            ChannelMessage::AudioData(m) => Some(&m.call_id),
            ChannelMessage::End(m) => Some(&m.call_id),
            ChannelMessage::Status(m) => m.call_id.as_deref(),
            ChannelMessage::Error(m) => m.call_id.as_deref(),
            ChannelMessage::Heartbeat(_) => None,
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// A decoded inbound text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Known(ChannelMessage),
    /// Valid JSON whose `type` the relay does not handle; forwarded as-is.
    Unrecognized { kind: String, body: serde_json::Value },
}

/// Why an inbound text frame could not be decoded.
#[derive(Debug)]
pub enum DecodeError {
    /// The frame is not JSON at all
    NotJson(serde_json::Error),
    /// The `type` is known but the payload does not match it
    InvalidPayload {
        kind: String,
        source: serde_json::Error,
    },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::NotJson(err) => write!(f, "frame is not JSON: {}", err),
            DecodeError::InvalidPayload { kind, source } => {
                write!(f, "invalid '{}' message: {}", kind, source)
            }
        }
    }
}

impl std::error::Error for DecodeError {}

impl InboundMessage {
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let value: serde_json::Value = serde_json::from_str(text).map_err(DecodeError::NotJson)?;

        let kind = value
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        if !KNOWN_KINDS.contains(&kind.as_str()) {
            return Ok(InboundMessage::Unrecognized { kind, body: value });
        }

        serde_json::from_value(value)
            .map(InboundMessage::Known)
            .map_err(|source| DecodeError::InvalidPayload { kind, source })
    }

    pub fn kind(&self) -> &str {
        match self {
            InboundMessage::Known(message) => message.kind(),
            InboundMessage::Unrecognized { kind, .. } => kind,
        }
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
