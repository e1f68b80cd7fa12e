//! # Call Lifecycle
//!
//! Turns conferencing callbacks (call or meeting started/ended) into relay operations
//! and produces the text shown to the people in the call. Full error detail goes to
//! the log; the reply only ever carries a short apology.

use crate::error::RelayError;
use crate::relay::{AudioRelay, CallStats};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

/// What kind of conference a callback is about. Only the wording differs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConferenceKind {
    #[default]
    Call,
    Meeting,
}

impl ConferenceKind {
    pub fn label(&self) -> &'static str {
        match self {
            ConferenceKind::Call => "Call",
            ConferenceKind::Meeting => "Meeting",
        }
    }
}

/// Outcome of a lifecycle callback.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleReply {
    pub accepted: bool,
    /// User-visible text
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<CallStats>,
    /// Failure behind a rejected reply, for the HTTP status
    #[serde(skip)]
    pub error: Option<RelayError>,
}

const START_FAILED: &str = "Sorry, there was an error starting the audio processing.";

impl LifecycleReply {
    fn rejected(error: RelayError) -> Self {
        Self {
            accepted: false,
            message: START_FAILED.to_string(),
            stream_id: None,
            stats: None,
            error: Some(error),
        }
    }
}

#[derive(Clone)]
pub struct CallLifecycle {
    relay: Arc<AudioRelay>,
}

impl CallLifecycle {
    pub fn new(relay: Arc<AudioRelay>) -> Self {
        Self { relay }
    }

    /// Register the call and start its audio stream.
    ///
    /// If the stream cannot be started the session stays registered, so it can be
    /// resumed once the channel is back.
    pub async fn on_start(&self, kind: ConferenceKind, call_id: &str) -> LifecycleReply {
        info!(call_id = %call_id, kind = kind.label(), "Conference started");

        if let Err(err) = self.relay.initialize_call(call_id) {
            error!(
                call_id = %call_id,
                error = %err,
                "Error handling {} start",
                kind.label().to_lowercase()
            );
            return LifecycleReply::rejected(err);
        }

        match self.relay.start_audio_stream(call_id).await {
            Ok(stream_id) => LifecycleReply {
                accepted: true,
                message: format!("{} started! Audio is now being processed.", kind.label()),
                stream_id: Some(stream_id),
                stats: None,
                error: None,
            },
            Err(err) => {
                error!(call_id = %call_id, error = %err, "Error starting audio stream");
                LifecycleReply::rejected(err)
            }
        }
    }

    /// Tear the call down. Never fails.
    pub async fn on_end(&self, kind: ConferenceKind, call_id: &str) -> LifecycleReply {
        info!(call_id = %call_id, kind = kind.label(), "Conference ended");
        let stats = self.relay.end_call(call_id).await;

        LifecycleReply {
            accepted: true,
            message: format!("{} ended. Audio processing has been stopped.", kind.label()),
            stream_id: None,
            stats,
            error: None,
        }
    }

    pub async fn on_call_start(&self, call_id: &str) -> LifecycleReply {
        self.on_start(ConferenceKind::Call, call_id).await
    }

    pub async fn on_call_end(&self, call_id: &str) -> LifecycleReply {
        self.on_end(ConferenceKind::Call, call_id).await
    }

    pub async fn on_meeting_start(&self, meeting_id: &str) -> LifecycleReply {
        self.on_start(ConferenceKind::Meeting, meeting_id).await
    }

    pub async fn on_meeting_end(&self, meeting_id: &str) -> LifecycleReply {
        self.on_end(ConferenceKind::Meeting, meeting_id).await
    }
}
