//! # Audio Relay
//!
//! Moves call audio between the conferencing front end and the backend channel.
//!
//! ## Data Flow:
//! ```text
//! front end --ingress()--> [ingress transform] --audio_data--> ChannelClient
//! ChannelClient --AudioResponse--> dispatcher --egress()--> [egress transform] --> PlaybackSink
//! ```
//!
//! ## Sequencing:
//! Every `audio_data` frame carries the session's byte offset *before* the frame, and
//! `bytesProcessed` grows by the size of the audio the front end delivered, regardless
//! of what the transform did to it. A frame that cannot be sent leaves the counters
//! untouched.

use super::pipeline::{AudioTransform, IdentityTransform, LoggingPlaybackSink, PlaybackSink};
use super::session::{CallStats, SessionRegistry};
use crate::channel::{AudioFormat, ChannelClient, ChannelEvent, ChannelMessage};
use crate::channel::message::AudioDataMessage;
use crate::error::RelayError;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Relay-wide counters.
#[derive(Debug, Default)]
pub struct RelayMetrics {
    calls_started: AtomicU64,
    calls_ended: AtomicU64,
    ingress_frames: AtomicU64,
    ingress_bytes: AtomicU64,
    ingress_rejected: AtomicU64,
    egress_frames: AtomicU64,
    egress_bytes: AtomicU64,
    egress_dropped: AtomicU64,
    unrouted_binary_frames: AtomicU64,
    streams_resumed: AtomicU64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RelayMetricsSnapshot {
    pub calls_started: u64,
    pub calls_ended: u64,
    pub ingress_frames: u64,
    pub ingress_bytes: u64,
    pub ingress_rejected: u64,
    pub egress_frames: u64,
    pub egress_bytes: u64,
    pub egress_dropped: u64,
    pub unrouted_binary_frames: u64,
    pub streams_resumed: u64,
}

fn bump(counter: &AtomicU64, by: u64) {
    counter.fetch_add(by, Ordering::Relaxed);
}

impl RelayMetrics {
    pub fn snapshot(&self) -> RelayMetricsSnapshot {
        let read = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        RelayMetricsSnapshot {
            calls_started: read(&self.calls_started),
            calls_ended: read(&self.calls_ended),
            ingress_frames: read(&self.ingress_frames),
            ingress_bytes: read(&self.ingress_bytes),
            ingress_rejected: read(&self.ingress_rejected),
            egress_frames: read(&self.egress_frames),
            egress_bytes: read(&self.egress_bytes),
            egress_dropped: read(&self.egress_dropped),
            unrouted_binary_frames: read(&self.unrouted_binary_frames),
            streams_resumed: read(&self.streams_resumed),
        }
    }
}

/// Orchestrates the session registry and the backend channel.
pub struct AudioRelay {
    registry: SessionRegistry,
    channel: ChannelClient,
    audio_format: AudioFormat,
    ingress_transform: Arc<dyn AudioTransform>,
    egress_transform: Arc<dyn AudioTransform>,
    playback: Arc<dyn PlaybackSink>,
    metrics: RelayMetrics,
}

impl AudioRelay {
    pub fn new(
        channel: ChannelClient,
        audio_format: AudioFormat,
        max_concurrent_calls: usize,
    ) -> Self {
        Self {
            registry: SessionRegistry::new(max_concurrent_calls),
            channel,
            audio_format,
            ingress_transform: Arc::new(IdentityTransform),
            egress_transform: Arc::new(IdentityTransform),
            playback: Arc::new(LoggingPlaybackSink::new()),
            metrics: RelayMetrics::default(),
        }
    }

    pub fn with_ingress_transform(mut self, transform: Arc<dyn AudioTransform>) -> Self {
        self.ingress_transform = transform;
        self
    }

    pub fn with_egress_transform(mut self, transform: Arc<dyn AudioTransform>) -> Self {
        self.egress_transform = transform;
        self
    }

    pub fn with_playback_sink(mut self, playback: Arc<dyn PlaybackSink>) -> Self {
        self.playback = playback;
        self
    }

    pub fn channel(&self) -> &ChannelClient {
        &self.channel
    }

    pub fn audio_format(&self) -> &AudioFormat {
        &self.audio_format
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn metrics(&self) -> RelayMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Register a new call. Re-initializing a live call id is rejected.
    pub fn initialize_call(&self, call_id: &str) -> Result<(), RelayError> {
        info!(call_id = %call_id, "Initializing audio relay for call");
        self.registry.create(call_id)?;
        bump(&self.metrics.calls_started, 1);
        Ok(())
    }

    /// Start (or restart) the audio stream of a call and announce it to the backend.
    ///
    /// The new stream id is assigned before the `init` message is sent, so a failed
    /// send still leaves the session ready to be resumed once the channel is back.
    pub async fn start_audio_stream(&self, call_id: &str) -> Result<String, RelayError> {
        let session = self.registry.get(call_id)?;
        let stream_id = session.begin_stream();

        let init = ChannelMessage::init(call_id, self.audio_format.clone());
        if let Err(err) = self.channel.send(&init).await {
            error!(
                call_id = %call_id,
                stream_id = %stream_id,
                error = %err,
                "Failed to initialize backend audio stream"
            );
            return Err(err);
        }

        info!(call_id = %call_id, stream_id = %stream_id, "Audio stream started");
        Ok(stream_id)
    }

    /// Forward one chunk of front-end audio to the backend.
    ///
    /// ## Returns:
    /// - **Ok(total)**: the call's `bytesProcessed` after this chunk
    /// - **Err(SessionNotFound)**: unknown or ended call
    /// - **Err(NotConnected)**: channel down; the chunk is dropped
    pub async fn ingress(&self, call_id: &str, audio: &[u8]) -> Result<u64, RelayError> {
        let session = self.registry.get(call_id)?;

        let _ingress = session.lock_ingress().await;
        if !session.is_active() {
            return Err(RelayError::SessionNotFound(call_id.to_string()));
        }

        let sequence = session.bytes_processed();
        let outbound = self.ingress_transform.apply(call_id, audio.to_vec());
        let message = ChannelMessage::audio_data(call_id, outbound, sequence);

        if let Err(err) = self.channel.send(&message).await {
            bump(&self.metrics.ingress_rejected, 1);
            debug!(call_id = %call_id, error = %err, "Dropping front-end audio");
            return Err(err);
        }

        let total = session.record_ingress(audio.len());
        bump(&self.metrics.ingress_frames, 1);
        bump(&self.metrics.ingress_bytes, audio.len() as u64);
        debug!(call_id = %call_id, bytes = audio.len(), sequence, "Forwarded front-end audio");
        Ok(total)
    }

    /// Hand backend audio to the playback sink. Audio for an unknown call is dropped.
    pub fn egress(&self, message: AudioDataMessage) -> bool {
        let session = match self.registry.get(&message.call_id) {
            Ok(session) => session,
            Err(_) => {
                bump(&self.metrics.egress_dropped, 1);
                warn!(call_id = %message.call_id, "Received audio for unknown call");
                return false;
            }
        };

        let audio = self.egress_transform.apply(&message.call_id, message.audio_data);
        session.record_egress(audio.len());
        bump(&self.metrics.egress_frames, 1);
        bump(&self.metrics.egress_bytes, audio.len() as u64);
        self.playback.deliver(&message.call_id, audio);
        true
    }

    /// Tear a call down. Always completes locally; a failed `end` message is only logged.
    /// Returns the final stats, or `None` for an unknown call.
    pub async fn end_call(&self, call_id: &str) -> Option<CallStats> {
        info!(call_id = %call_id, "Ending audio relay for call");

        let session = self.registry.remove(call_id)?;

        // Wait for an in-flight ingress so the totals below are final.
        let _ingress = session.lock_ingress().await;
        let stats = session.stats();

        let end = ChannelMessage::end(call_id, stats.duration_ms, stats.bytes_processed);
        if let Err(err) = self.channel.send(&end).await {
            warn!(call_id = %call_id, error = %err, "End of call not delivered to backend");
        }

        bump(&self.metrics.calls_ended, 1);
        info!(
            call_id = %call_id,
            duration_ms = stats.duration_ms,
            bytes = stats.bytes_processed,
            "Audio relay ended for call"
        );
        Some(stats)
    }

    pub fn active_calls(&self) -> Vec<String> {
        self.registry.ids()
    }

    pub fn call_stats(&self, call_id: &str) -> Option<CallStats> {
        self.registry.get(call_id).ok().map(|session| session.stats())
    }

    /// End every call, then close the channel.
    pub async fn shutdown(&self) {
        let calls = self.registry.ids();
        info!(active_calls = calls.len(), "Shutting down audio relay");
        for call_id in calls {
            self.end_call(&call_id).await;
        }
        self.channel.disconnect().await;
    }

    /// Re-announce every stream that was started before the channel came (back) up.
    async fn resume_streams(&self) {
        for session in self.registry.sessions() {
            if session.stream_id().is_none() {
                continue;
            }
            match self.start_audio_stream(session.id()).await {
                Ok(_) => bump(&self.metrics.streams_resumed, 1),
                Err(err) => {
                    warn!(call_id = %session.id(), error = %err, "Could not resume audio stream")
                }
            }
        }
    }

    /// `outage` is set while the channel is down and cleared once streams were resumed.
    async fn handle_event(&self, event: ChannelEvent, resume_streams: bool, outage: &mut bool) {
        match event {
            ChannelEvent::AudioResponse(message) => {
                self.egress(message);
            }
            ChannelEvent::BinaryAudio(bytes) => {
                bump(&self.metrics.unrouted_binary_frames, 1);
                debug!(bytes = bytes.len(), "Binary audio without a call id, not routed");
            }
            ChannelEvent::Disconnected { .. } | ChannelEvent::ConnectionError(_) => {
                *outage = true;
                debug!(
                    active_calls = self.registry.len(),
                    "Channel down, front-end audio is dropped"
                );
            }
            ChannelEvent::Connected if resume_streams && *outage => {
                *outage = false;
                self.resume_streams().await;
            }
            ChannelEvent::MaxReconnectAttemptsReached { attempts } => {
                error!(
                    attempts,
                    active_calls = self.registry.len(),
                    "Backend channel is gone for good, calls cannot be relayed until restart"
                );
            }
            other => debug!(event = other.name(), "Channel event"),
        }
    }

    /// Consume channel events until the channel is closed or gives up reconnecting.
    pub fn spawn_dispatcher(self: &Arc<Self>, resume_streams: bool) -> JoinHandle<()> {
        let relay = self.clone();
        let mut events = self.channel.subscribe();

        tokio::spawn(async move {
            let mut outage = false;
            loop {
                match events.recv().await {
                    Ok(ChannelEvent::Closed) => break,
                    Ok(event) => {
                        // No further events follow once the reconnect budget is spent.
                        let terminal =
                            matches!(event, ChannelEvent::MaxReconnectAttemptsReached { .. });
                        relay.handle_event(event, resume_streams, &mut outage).await;
                        if terminal {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Relay dispatcher fell behind channel events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("Relay dispatcher stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelSettings, ConnectionState, Frame, MemoryTransport};
    use crate::channel::transport::MemoryPeer;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde_json::json;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    struct Harness {
        relay: Arc<AudioRelay>,
        transport: MemoryTransport,
        peers: mpsc::UnboundedReceiver<MemoryPeer>,
    }

    fn harness(configure: impl FnOnce(AudioRelay) -> AudioRelay) -> Harness {
        let (transport, peers) = MemoryTransport::new();
        let client = ChannelClient::new(
            ChannelSettings::new("ws://backend.test/audio"),
            Arc::new(transport.clone()),
        );
        let relay = configure(AudioRelay::new(client, AudioFormat::default(), 100));
        Harness {
            relay: Arc::new(relay),
            transport,
            peers,
        }
    }

    impl Harness {
        async fn connect(&mut self) -> MemoryPeer {
            self.relay.channel().connect().unwrap();
            let peer = self.peers.recv().await.unwrap();
            self.relay
                .channel()
                .wait_for_state(ConnectionState::Connected)
                .await
                .unwrap();
            peer
        }
    }

    struct Doubling;

    impl AudioTransform for Doubling {
        fn apply(&self, _call_id: &str, audio: Vec<u8>) -> Vec<u8> {
            audio.iter().flat_map(|b| [*b, *b]).collect()
        }
    }

    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<(String, Vec<u8>)>>);

    impl PlaybackSink for RecordingSink {
        fn deliver(&self, call_id: &str, audio: Vec<u8>) {
            self.0.lock().unwrap().push((call_id.to_string(), audio));
        }
    }

    struct ForwardingSink(mpsc::UnboundedSender<(String, Vec<u8>)>);

    impl PlaybackSink for ForwardingSink {
        fn deliver(&self, call_id: &str, audio: Vec<u8>) {
            let _ = self.0.send((call_id.to_string(), audio));
        }
    }

    fn decoded_audio(message: &serde_json::Value) -> Vec<u8> {
        STANDARD
            .decode(message["audioData"].as_str().unwrap())
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_audio_flows_once_channel_connects() {
        let mut h = harness(|relay| relay);
        let relay = h.relay.clone();

        relay.initialize_call("call_1").unwrap();
        assert_eq!(
            relay.start_audio_stream("call_1").await,
            Err(RelayError::NotConnected)
        );
        assert!(relay.call_stats("call_1").unwrap().stream_id.is_some());

        let chunk = vec![7u8; 100];
        assert_eq!(relay.ingress("call_1", &chunk).await, Err(RelayError::NotConnected));
        assert_eq!(relay.call_stats("call_1").unwrap().bytes_processed, 0);

        let mut peer = h.connect().await;

        assert_eq!(relay.ingress("call_1", &chunk).await, Ok(100));
        assert_eq!(relay.call_stats("call_1").unwrap().bytes_processed, 100);

        let frame = peer.next_message().await.unwrap();
        assert_eq!(frame["type"], "audio_data");
        assert_eq!(frame["callId"], "call_1");
        assert_eq!(frame["sequence"], 0);
        assert_eq!(decoded_audio(&frame), chunk);

        assert_eq!(relay.ingress("call_1", &[1u8; 50]).await, Ok(150));
        let frame = peer.next_message().await.unwrap();
        assert_eq!(frame["sequence"], 100);

        let metrics = relay.metrics();
        assert_eq!(metrics.ingress_frames, 2);
        assert_eq!(metrics.ingress_rejected, 1);
    }

    #[tokio::test]
    async fn test_initialize_call_twice_is_rejected() {
        let h = harness(|relay| relay);
        h.relay.initialize_call("call_1").unwrap();
        assert_eq!(
            h.relay.initialize_call("call_1"),
            Err(RelayError::DuplicateSession("call_1".to_string()))
        );
        assert_eq!(h.relay.active_calls(), vec!["call_1".to_string()]);
    }

    #[tokio::test]
    async fn test_operations_on_unknown_call() {
        let h = harness(|relay| relay);
        let missing = RelayError::SessionNotFound("ghost".to_string());
        assert_eq!(h.relay.start_audio_stream("ghost").await, Err(missing.clone()));
        assert_eq!(h.relay.ingress("ghost", &[1, 2]).await, Err(missing));
        assert_eq!(h.relay.call_stats("ghost"), None);
        assert_eq!(h.relay.end_call("ghost").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bytes_processed_is_sum_of_chunks() {
        let mut h = harness(|relay| relay);
        let _peer = h.connect().await;
        let relay = h.relay.clone();

        relay.initialize_call("call_1").unwrap();
        relay.start_audio_stream("call_1").await.unwrap();

        let sizes = [320usize, 1, 0, 640, 17];
        for size in sizes {
            relay.ingress("call_1", &vec![0u8; size]).await.unwrap();
        }
        let stats = relay.call_stats("call_1").unwrap();
        assert_eq!(stats.bytes_processed, sizes.iter().sum::<usize>() as u64);
        assert_eq!(stats.frames_sent, sizes.len() as u64);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transform_does_not_change_accounting() {
        let mut h = harness(|relay| relay.with_ingress_transform(Arc::new(Doubling)));
        let mut peer = h.connect().await;
        let relay = h.relay.clone();

        relay.initialize_call("call_1").unwrap();
        relay.ingress("call_1", &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]).await.unwrap();
        relay.ingress("call_1", &[1]).await.unwrap();

        let first = peer.next_message().await.unwrap();
        assert_eq!(decoded_audio(&first).len(), 20);
        assert_eq!(first["sequence"], 0);
        let second = peer.next_message().await.unwrap();
        assert_eq!(second["sequence"], 10);
        assert_eq!(relay.call_stats("call_1").unwrap().bytes_processed, 11);
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_call_reports_totals_and_removes_session() {
        let mut h = harness(|relay| relay);
        let mut peer = h.connect().await;
        let relay = h.relay.clone();

        relay.initialize_call("call_1").unwrap();
        relay.start_audio_stream("call_1").await.unwrap();
        relay.ingress("call_1", &[0u8; 64]).await.unwrap();
        tokio::time::advance(std::time::Duration::from_millis(1500)).await;

        let stats = relay.end_call("call_1").await.unwrap();
        assert_eq!(stats.bytes_processed, 64);
        assert!(!stats.active);

        assert_eq!(peer.next_message().await.unwrap()["type"], "init");
        assert_eq!(peer.next_message().await.unwrap()["type"], "audio_data");
        let end = peer.next_message().await.unwrap();
        assert_eq!(end["type"], "end");
        assert_eq!(end["callId"], "call_1");
        assert_eq!(end["bytesProcessed"], 64);
        assert!(end["duration"].as_u64().unwrap() >= 1500);

        assert!(relay.active_calls().is_empty());
        assert_eq!(relay.call_stats("call_1"), None);
        assert_eq!(
            relay.ingress("call_1", &[1]).await,
            Err(RelayError::SessionNotFound("call_1".to_string()))
        );
    }

    #[tokio::test]
    async fn test_end_call_while_disconnected_still_tears_down() {
        let h = harness(|relay| relay);
        h.relay.initialize_call("call_1").unwrap();

        let stats = h.relay.end_call("call_1").await;
        assert!(stats.is_some());
        assert!(h.relay.active_calls().is_empty());
        assert_eq!(h.relay.metrics().calls_ended, 1);
    }

    #[tokio::test]
    async fn test_egress_routes_known_calls_only() {
        let sink = Arc::new(RecordingSink::default());
        let h = harness(|relay| relay.with_playback_sink(sink.clone()));
        h.relay.initialize_call("call_1").unwrap();

        let known = AudioDataMessage {
            call_id: "call_1".to_string(),
            audio_data: vec![5, 6, 7],
            timestamp: chrono::Utc::now(),
            sequence: 0,
        };
        let unknown = AudioDataMessage {
            call_id: "ended".to_string(),
            ..known.clone()
        };

        assert!(h.relay.egress(known));
        assert!(!h.relay.egress(unknown));

        let delivered = sink.0.lock().unwrap().clone();
        assert_eq!(delivered, vec![("call_1".to_string(), vec![5, 6, 7])]);
        let stats = h.relay.call_stats("call_1").unwrap();
        assert_eq!(stats.egress_bytes, 3);
        assert_eq!(stats.bytes_processed, 0);
        assert_eq!(h.relay.metrics().egress_dropped, 1);
    }

    #[tokio::test]
    async fn test_capacity_is_enforced() {
        let (transport, _peers) = MemoryTransport::new();
        let settings = ChannelSettings::new("ws://backend.test");
        let client = ChannelClient::new(settings, Arc::new(transport));
        let relay = AudioRelay::new(client, AudioFormat::default(), 1);

        relay.initialize_call("a").unwrap();
        assert_eq!(relay.initialize_call("b"), Err(RelayError::CapacityExceeded(1)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_initialize_distinct_ids() {
        let h = harness(|relay| relay);
        let tasks: Vec<_> = (0..32)
            .map(|i| {
                let relay = h.relay.clone();
                tokio::spawn(async move { relay.initialize_call(&format!("call_{}", i)) })
            })
            .collect();

        for task in tasks {
            assert!(task.await.unwrap().is_ok());
        }
        assert_eq!(h.relay.active_calls().len(), 32);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_ingress_keeps_sequences_consistent() {
        let mut h = harness(|relay| relay);
        let mut peer = h.connect().await;
        h.relay.initialize_call("call_1").unwrap();

        let tasks: Vec<_> = (0..10)
            .map(|_| {
                let relay = h.relay.clone();
                tokio::spawn(async move { relay.ingress("call_1", &[0u8; 10]).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let mut sequences = Vec::new();
        for _ in 0..10 {
            sequences.push(peer.next_message().await.unwrap()["sequence"].as_u64().unwrap());
        }
        assert_eq!(sequences, (0..10).map(|i| i * 10).collect::<Vec<u64>>());
        assert_eq!(h.relay.call_stats("call_1").unwrap().bytes_processed, 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatcher_plays_audio_and_resumes_streams() {
        let (tx, mut played) = mpsc::unbounded_channel();
        let mut h = harness(|relay| relay.with_playback_sink(Arc::new(ForwardingSink(tx))));
        let dispatcher = h.relay.spawn_dispatcher(true);
        let mut peer = h.connect().await;
        let relay = h.relay.clone();

        relay.initialize_call("call_1").unwrap();
        let first_stream = relay.start_audio_stream("call_1").await.unwrap();
        assert_eq!(peer.next_message().await.unwrap()["type"], "init");

        let response = json!({"type": "audio_data", "callId": "call_1", "audioData": "AQID"});
        peer.push(Frame::Text(response.to_string())).await.unwrap();
        assert_eq!(played.recv().await.unwrap(), ("call_1".to_string(), vec![1, 2, 3]));

        peer.close(1006, "").await;
        let mut peer = h.peers.recv().await.unwrap();
        let init = peer.next_message().await.unwrap();
        assert_eq!(init["type"], "init");
        assert_eq!(init["callId"], "call_1");
        assert_ne!(relay.call_stats("call_1").unwrap().stream_id.unwrap(), first_stream);
        assert_eq!(h.transport.open_count(), 2);

        relay.shutdown().await;
        dispatcher.await.unwrap();
        assert_eq!(relay.metrics().streams_resumed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatcher_stops_when_channel_gives_up() {
        let h = harness(|relay| relay);
        h.transport.set_reachable(false);
        let dispatcher = h.relay.spawn_dispatcher(true);

        h.relay.channel().connect().unwrap();
        dispatcher.await.unwrap();

        assert_eq!(h.relay.channel().state(), ConnectionState::Closed);
        assert_eq!(h.transport.open_count(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_ends_calls_and_closes_channel() {
        let mut h = harness(|relay| relay);
        let mut peer = h.connect().await;
        let relay = h.relay.clone();

        relay.initialize_call("a").unwrap();
        relay.initialize_call("b").unwrap();
        relay.shutdown().await;

        assert_eq!(peer.next_message().await.unwrap()["callId"], "a");
        assert_eq!(peer.next_message().await.unwrap()["callId"], "b");
        assert!(matches!(peer.next_frame().await, Some(Frame::Close { code: 1000, .. })));
        assert!(relay.active_calls().is_empty());
        assert_eq!(relay.channel().state(), ConnectionState::Closed);
    }
}
