//! Pluggable stages at the two edges of the relay.
//!
//! An [`AudioTransform`] rewrites audio on its way through the relay (codec or
//! resampling work). A [`PlaybackSink`] receives backend audio for the conferencing
//! adapter to play into the live call.

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Rewrites one audio chunk for a call.
pub trait AudioTransform: Send + Sync {
    fn apply(&self, call_id: &str, audio: Vec<u8>) -> Vec<u8>;
}

/// Passes audio through unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityTransform;

impl AudioTransform for IdentityTransform {
    fn apply(&self, _call_id: &str, audio: Vec<u8>) -> Vec<u8> {
        audio
    }
}

/// Receives processed audio destined for a live call.
pub trait PlaybackSink: Send + Sync {
    fn deliver(&self, call_id: &str, audio: Vec<u8>);
}

/// Default sink: logs and counts what would be played.
#[derive(Debug, Default)]
pub struct LoggingPlaybackSink {
    frames: AtomicU64,
    bytes: AtomicU64,
}

impl LoggingPlaybackSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}

impl PlaybackSink for LoggingPlaybackSink {
    fn deliver(&self, call_id: &str, audio: Vec<u8>) {
        self.frames.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(audio.len() as u64, Ordering::Relaxed);
        debug!(call_id = %call_id, bytes = audio.len(), "Audio ready for playback");
    }
}
