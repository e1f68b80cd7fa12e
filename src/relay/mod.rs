//! # Call-Session Relay
//!
//! Per-call state and the audio paths between the front end and the backend channel.
//!
//! ## Key Components:
//! - **session**: `CallSession` records and the `SessionRegistry` that owns them
//! - **pipeline**: audio transforms and the playback sink
//! - **audio_relay**: `AudioRelay`, ingress/egress orchestration and the event dispatcher

pub mod audio_relay;
pub mod pipeline;
pub mod session;

pub use audio_relay::{AudioRelay, RelayMetricsSnapshot};
pub use pipeline::{AudioTransform, IdentityTransform, LoggingPlaybackSink, PlaybackSink};
pub use session::{CallSession, CallStats, SessionRegistry};
