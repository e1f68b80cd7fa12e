//! # Configuration Management
//!
//! Loads the relay configuration from multiple sources:
//! - Built-in defaults
//! - An optional `config.toml` in the working directory
//! - Environment variables with the `APP_` prefix (`APP_RECONNECT__MAX_ATTEMPTS=8`)
//! - The flat variable names used by deployment tooling (`WEBSOCKET_URL`, `PORT`, ...)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Flat deployment variables (WEBSOCKET_URL, AUDIO_SAMPLE_RATE, HOST, PORT, ...)
//! 2. `APP_`-prefixed environment variables
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)
//!
//! The channel URL has no default: a missing URL is a fatal startup error.

use crate::channel::backoff::BackoffPolicy;
use crate::channel::client::ChannelSettings;
use crate::channel::message::AudioFormat;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Flat environment variables and the config keys they override.
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("WEBSOCKET_URL", "channel.url"),
    ("WEBSOCKET_PROTOCOL", "channel.protocol"),
    ("CONNECT_TIMEOUT_MS", "channel.connect_timeout_ms"),
    ("HEARTBEAT_INTERVAL_MS", "channel.heartbeat_interval_ms"),
    ("MAX_RECONNECT_ATTEMPTS", "reconnect.max_attempts"),
    ("AUDIO_SAMPLE_RATE", "audio.sample_rate"),
    ("AUDIO_CHANNELS", "audio.channels"),
    ("AUDIO_BIT_DEPTH", "audio.bit_depth"),
    ("HOST", "server.host"),
    ("PORT", "server.port"),
];

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub channel: ChannelConfig,
    pub reconnect: ReconnectConfig,
    pub audio: AudioConfig,
    pub performance: PerformanceConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Largest audio chunk accepted by `POST /api/audio/stream`
    pub max_payload_bytes: usize,
}

/// Settings for the persistent backend channel.
///
/// ## Fields:
/// - `url`: `ws://` or `wss://` endpoint of the processing backend (required)
/// - `protocol`: WebSocket sub-protocol sent during the handshake (empty = none)
/// - `connect_timeout_ms`: watchdog for a single connect attempt
/// - `heartbeat_interval_ms`: how often a heartbeat is sent while connected
/// - `peer_timeout_ms`: treat the channel as lost after this much inbound silence (0 = off)
/// - `event_buffer`: capacity of the channel event queue per subscriber
/// - `legacy_text_fallback`: route non-JSON text frames to the raw-audio subscribers
/// - `resume_streams_on_reconnect`: re-send `init` for live calls after an outage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub url: String,
    pub protocol: String,
    pub connect_timeout_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub peer_timeout_ms: u64,
    pub event_buffer: usize,
    pub legacy_text_fallback: bool,
    pub resume_streams_on_reconnect: bool,
}

/// Exponential backoff settings for reconnects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

/// Audio format negotiated with the backend in the `init` message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_depth: u16,
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    pub max_concurrent_calls: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3978,
                max_payload_bytes: 1024 * 1024,
            },
            channel: ChannelConfig {
                url: String::new(),
                protocol: String::new(),
                connect_timeout_ms: 10_000,
                heartbeat_interval_ms: 30_000,
                peer_timeout_ms: 0,
                event_buffer: 256,
                legacy_text_fallback: true,
                resume_streams_on_reconnect: true,
            },
            reconnect: ReconnectConfig {
                max_attempts: 5,
                base_delay_ms: 1_000,
                max_delay_ms: 30_000,
            },
            audio: AudioConfig {
                sample_rate: 16_000,
                channels: 1,
                bit_depth: 16,
                format: "pcm".to_string(),
            },
            performance: PerformanceConfig {
                max_concurrent_calls: 100,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from every source in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `WEBSOCKET_URL=wss://speech.internal/ws`: backend channel
    /// - `APP_CHANNEL__PEER_TIMEOUT_MS=90000`: enable peer liveness checks
    /// - `PORT=3978`: HTTP port
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        for (var, key) in ENV_OVERRIDES {
            if let Ok(value) = env::var(var) {
                settings = settings.set_override(*key, value)?;
            }
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    pub fn validate(&self) -> Result<()> {
        let url = self.channel.url.trim();
        if url.is_empty() {
            return Err(anyhow::anyhow!(
                "WEBSOCKET_URL environment variable is required (channel.url)"
            ));
        }
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(anyhow::anyhow!(
                "Channel URL must start with ws:// or wss://, got {}",
                url
            ));
        }

        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.server.max_payload_bytes == 0 {
            return Err(anyhow::anyhow!("Max payload size must be greater than 0"));
        }

        if self.channel.connect_timeout_ms == 0 {
            return Err(anyhow::anyhow!("Connect timeout must be greater than 0"));
        }

        if self.channel.heartbeat_interval_ms == 0 {
            return Err(anyhow::anyhow!("Heartbeat interval must be greater than 0"));
        }

        if self.channel.event_buffer == 0 {
            return Err(anyhow::anyhow!("Channel event buffer must be greater than 0"));
        }

        if self.reconnect.base_delay_ms == 0 {
            return Err(anyhow::anyhow!("Reconnect base delay must be greater than 0"));
        }

        if self.reconnect.max_delay_ms < self.reconnect.base_delay_ms {
            return Err(anyhow::anyhow!(
                "Reconnect max delay ({}ms) is below the base delay ({}ms)",
                self.reconnect.max_delay_ms,
                self.reconnect.base_delay_ms
            ));
        }

        if self.audio.sample_rate == 0 || self.audio.channels == 0 || self.audio.bit_depth == 0 {
            return Err(anyhow::anyhow!(
                "Audio sample rate, channels and bit depth must be greater than 0"
            ));
        }

        if self.performance.max_concurrent_calls == 0 {
            return Err(anyhow::anyhow!("Max concurrent calls must be greater than 0"));
        }

        Ok(())
    }

    /// Settings for the channel client derived from this configuration.
    pub fn channel_settings(&self) -> ChannelSettings {
        let protocol = self.channel.protocol.trim();
        ChannelSettings {
            url: self.channel.url.trim().to_string(),
            protocol: if protocol.is_empty() {
                None
            } else {
                Some(protocol.to_string())
            },
            connect_timeout: Duration::from_millis(self.channel.connect_timeout_ms),
            heartbeat_interval: Duration::from_millis(self.channel.heartbeat_interval_ms),
            peer_timeout: match self.channel.peer_timeout_ms {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            },
            event_buffer: self.channel.event_buffer,
            legacy_text_fallback: self.channel.legacy_text_fallback,
            backoff: BackoffPolicy {
                base_delay: Duration::from_millis(self.reconnect.base_delay_ms),
                max_delay: Duration::from_millis(self.reconnect.max_delay_ms),
                max_attempts: self.reconnect.max_attempts,
            },
        }
    }

    /// The audio format descriptor sent in `init` messages.
    pub fn audio_format(&self) -> AudioFormat {
        AudioFormat {
            sample_rate: self.audio.sample_rate,
            channels: self.audio.channels,
            bit_depth: self.audio.bit_depth,
            format: self.audio.format.clone(),
        }
    }
}
