//! # Channel Client
//!
//! Keeps the single backend connection alive and multiplexes every call over it.
//!
//! ## Connection Lifecycle:
//! ```text
//! Disconnected --connect()--> Connecting --open--> Connected
//!                                  |                   |
//!                         error / timeout        close / error
//!                                  v                   v
//!                             Reconnecting <-----------+
//!                                  |
//!              backoff elapsed --> Connecting
//!              attempts spent  --> Closed
//! any state --disconnect()--> Closed
//! ```
//!
//! One driver task owns the whole lifecycle: the connect watchdog, the heartbeat
//! ticker and the reconnect sleep all live inside it, so there is never more than
//! one transport in flight and `disconnect()` stops every timer by stopping that task.
//!
//! ## Delivery:
//! `send` is at-most-once. It fails fast with `NotConnected` unless the channel is
//! Connected, and nothing is queued for later.

use super::backoff::BackoffPolicy;
use super::events::ChannelEvent;
use super::message::{ChannelMessage, DecodeError, InboundMessage};
use super::transport::{ChannelTransport, Frame, FrameSink, FrameStream, NORMAL_CLOSURE};
use crate::error::RelayError;
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Static settings for one channel client.
#[derive(Debug, Clone)]
pub struct ChannelSettings {
    pub url: String,
    pub protocol: Option<String>,
    pub connect_timeout: Duration,
    pub heartbeat_interval: Duration,
    /// Inbound silence after which a Connected channel counts as lost
    pub peer_timeout: Option<Duration>,
    pub event_buffer: usize,
    pub legacy_text_fallback: bool,
    pub backoff: BackoffPolicy,
}

impl ChannelSettings {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            protocol: None,
            connect_timeout: Duration::from_millis(10_000),
            heartbeat_interval: Duration::from_millis(30_000),
            peer_timeout: None,
            event_buffer: 256,
            legacy_text_fallback: true,
            backoff: BackoffPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Terminal
    Closed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Closed => "closed",
        }
    }
}

/// Snapshot of the connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    /// Reset to 0 on every successful connect
    pub reconnect_attempts: u32,
}

/// Handle to the process-wide backend channel. Clones share the same connection.
#[derive(Clone)]
pub struct ChannelClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    settings: ChannelSettings,
    transport: Arc<dyn ChannelTransport>,
    status: watch::Sender<ConnectionStatus>,
    writer: Mutex<Option<FrameSink>>,
    events: broadcast::Sender<ChannelEvent>,
    shutdown: watch::Sender<bool>,
    driver: std::sync::Mutex<Option<JoinHandle<()>>>,
    /// Set when the client closed itself after spending its reconnect budget.
    exhausted: AtomicBool,
}

/// How a Connected period ended.
enum ConnectionEnd {
    Shutdown,
    Lost {
        code: Option<u16>,
        reason: Option<String>,
    },
}

impl ChannelClient {
    pub fn new(settings: ChannelSettings, transport: Arc<dyn ChannelTransport>) -> Self {
        let (status, _) = watch::channel(ConnectionStatus {
            state: ConnectionState::Disconnected,
            reconnect_attempts: 0,
        });
        let (events, _) = broadcast::channel(settings.event_buffer.max(1));
        let (shutdown, _) = watch::channel(false);

        Self {
            inner: Arc::new(ClientInner {
                settings,
                transport,
                status,
                writer: Mutex::new(None),
                events,
                shutdown,
                driver: std::sync::Mutex::new(None),
                exhausted: AtomicBool::new(false),
            }),
        }
    }

    /// Start connecting. Only valid from Disconnected; a second call while a
    /// connection is active or in flight is a no-op. Fails once the client is Closed,
    /// with `MaxReconnectAttemptsExceeded` if it closed after running out of retries.
    pub fn connect(&self) -> Result<(), RelayError> {
        let mut current = ConnectionState::Disconnected;
        let mut attempts = 0;
        let started = self.inner.status.send_if_modified(|status| {
            current = status.state;
            attempts = status.reconnect_attempts;
            if status.state == ConnectionState::Disconnected {
                status.state = ConnectionState::Connecting;
                true
            } else {
                false
            }
        });

        if !started {
            return match current {
                ConnectionState::Closed if self.inner.exhausted.load(Ordering::SeqCst) => {
                    Err(RelayError::MaxReconnectAttemptsExceeded(attempts))
                }
                ConnectionState::Closed => Err(RelayError::ConnectionError(
                    "channel client is closed".to_string(),
                )),
                state => {
                    warn!(state = state.as_str(), "Channel already active, ignoring connect");
                    Ok(())
                }
            };
        }

        info!(url = %self.inner.settings.url, "Connecting to backend channel");
        let inner = self.inner.clone();
        let shutdown = self.inner.shutdown.subscribe();
        let handle = tokio::spawn(inner.drive(shutdown));
        *self
            .inner
            .driver
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(())
    }

    /// Shut the channel down for good: stop the heartbeat and any pending
    /// reconnect, then close the transport with a normal-closure code.
    pub async fn disconnect(&self) {
        info!("Disconnecting backend channel");

        let transitioned = self.inner.status.send_if_modified(|status| {
            if status.state == ConnectionState::Closed {
                false
            } else {
                status.state = ConnectionState::Closed;
                true
            }
        });
        self.inner.shutdown.send_replace(true);

        let driver = self
            .inner
            .driver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = driver {
            if let Err(err) = handle.await {
                warn!(error = %err, "Channel driver task ended abnormally");
            }
        }

        self.inner.close_writer().await;

        if transitioned {
            self.inner.emit(ChannelEvent::Closed);
        }
    }

    /// Serialize and write one message. At-most-once; never queued.
    pub async fn send(&self, message: &ChannelMessage) -> Result<(), RelayError> {
        if !self.is_connected() {
            return Err(RelayError::NotConnected);
        }
        let text = message.encode()?;
        self.inner.write(Frame::Text(text)).await?;
        debug!(kind = message.kind(), call_id = ?message.call_id(), "Sent message");
        Ok(())
    }

    /// Route one inbound frame to subscribers.
    pub fn dispatch(&self, frame: Frame) {
        self.inner.dispatch(frame);
    }

    /// Subscribe to connection and message events. Events published before the
    /// call are not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.inner.events.subscribe()
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.inner.status.borrow()
    }

    pub fn state(&self) -> ConnectionState {
        self.status().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn settings(&self) -> &ChannelSettings {
        &self.inner.settings
    }

    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status.subscribe()
    }

    /// Resolve once the state machine reaches `state`.
    pub async fn wait_for_state(&self, state: ConnectionState) -> Result<(), RelayError> {
        let mut status = self.inner.status.subscribe();
        status
            .wait_for(|current| current.state == state)
            .await
            .map(|_| ())
            .map_err(|_| RelayError::ConnectionError("channel client dropped".to_string()))
    }
}

impl ClientInner {
    async fn drive(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let backoff = self.settings.backoff;
        let mut attempts: u32 = 0;

        loop {
            if !self.transition(ConnectionState::Connecting, attempts) {
                return;
            }

            let open = self
                .transport
                .open(&self.settings.url, self.settings.protocol.as_deref());
            let outcome = tokio::select! {
                _ = stopped(&mut shutdown) => return,
                outcome = tokio::time::timeout(self.settings.connect_timeout, open) => outcome,
            };

            match outcome {
                Ok(Ok(connection)) => {
                    attempts = 0;
                    *self.writer.lock().await = Some(connection.outbound);
                    if self.transition(ConnectionState::Connected, 0) {
                        info!(url = %self.settings.url, "Backend channel connected");
                        self.emit(ChannelEvent::Connected);
                    }

                    match self.run_connected(connection.inbound, &mut shutdown).await {
                        ConnectionEnd::Shutdown => return,
                        ConnectionEnd::Lost { code, reason } => {
                            self.writer.lock().await.take();
                            warn!(
                                code = ?code,
                                reason = ?reason,
                                "Backend channel connection closed"
                            );
                            self.emit(ChannelEvent::Disconnected { code, reason });
                        }
                    }
                }
                Ok(Err(err)) => {
                    error!(error = %err, "Backend channel connection failed");
                    self.emit(ChannelEvent::ConnectionError(err.to_string()));
                }
                Err(_) => {
                    let detail = format!(
                        "connection timed out after {}ms",
                        self.settings.connect_timeout.as_millis()
                    );
                    error!("Backend channel {}", detail);
                    self.emit(ChannelEvent::ConnectionError(detail));
                }
            }

            if backoff.is_exhausted(attempts) {
                error!(attempts, "Max reconnection attempts reached");
                self.exhausted.store(true, Ordering::SeqCst);
                if self.transition(ConnectionState::Closed, attempts) {
                    self.emit(ChannelEvent::MaxReconnectAttemptsReached { attempts });
                }
                return;
            }

            attempts += 1;
            let delay = backoff.delay_for(attempts);
            if !self.transition(ConnectionState::Reconnecting, attempts) {
                return;
            }
            info!(
                attempt = attempts,
                max_attempts = backoff.max_attempts,
                delay_ms = delay.as_millis() as u64,
                "Attempting to reconnect"
            );
            self.emit(ChannelEvent::Reconnecting {
                attempt: attempts,
                delay_ms: delay.as_millis() as u64,
            });

            tokio::select! {
                _ = stopped(&mut shutdown) => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn run_connected(
        &self,
        mut inbound: FrameStream,
        shutdown: &mut watch::Receiver<bool>,
    ) -> ConnectionEnd {
        let period = self.settings.heartbeat_interval;
        let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_inbound = Instant::now();

        loop {
            let silence_deadline = self.settings.peer_timeout.map(|timeout| last_inbound + timeout);

            tokio::select! {
                _ = stopped(shutdown) => {
                    self.close_writer().await;
                    return ConnectionEnd::Shutdown;
                }
                _ = heartbeat.tick() => {
                    let sent = match ChannelMessage::heartbeat().encode() {
                        Ok(text) => self.write(Frame::Text(text)).await,
                        Err(err) => Err(RelayError::from(err)),
                    };
                    match sent {
                        Ok(()) => debug!("Heartbeat sent"),
                        Err(err) => {
                            return ConnectionEnd::Lost {
                                code: None,
                                reason: Some(format!("heartbeat failed: {}", err)),
                            };
                        }
                    }
                }
                _ = wait_until(silence_deadline) => {
                    warn!("No traffic from backend within the peer timeout");
                    return ConnectionEnd::Lost {
                        code: None,
                        reason: Some("peer silent past timeout".to_string()),
                    };
                }
                frame = inbound.next() => match frame {
                    Some(Ok(Frame::Close { code, reason })) => {
                        return ConnectionEnd::Lost {
                            code: Some(code),
                            reason: if reason.is_empty() { None } else { Some(reason) },
                        };
                    }
                    Some(Ok(frame)) => {
                        last_inbound = Instant::now();
                        self.dispatch(frame);
                    }
                    Some(Err(err)) => {
                        return ConnectionEnd::Lost { code: None, reason: Some(err.to_string()) };
                    }
                    None => return ConnectionEnd::Lost { code: None, reason: None },
                }
            }
        }
    }

    fn dispatch(&self, frame: Frame) {
        match frame {
            Frame::Binary(bytes) => {
                debug!(bytes = bytes.len(), "Received binary audio frame");
                self.emit(ChannelEvent::BinaryAudio(bytes));
            }
            Frame::Text(text) => self.dispatch_text(text),
            Frame::Close { code, .. } => debug!(code, "Close frame reached dispatch, ignoring"),
        }
    }

    fn dispatch_text(&self, text: String) {
        match InboundMessage::decode(&text) {
            Ok(InboundMessage::Known(message)) => {
                let event = match message {
                    ChannelMessage::AudioData(audio) => {
                        debug!(
                            call_id = %audio.call_id,
                            bytes = audio.audio_data.len(),
                            "Received audio response"
                        );
                        ChannelEvent::AudioResponse(audio)
                    }
                    ChannelMessage::Status(status) => {
                        info!(status = ?status.status, "Status from backend");
                        ChannelEvent::Status(status)
                    }
                    ChannelMessage::Error(remote) => {
                        error!(error = ?remote.error, code = ?remote.code, "Error from backend");
                        ChannelEvent::RemoteError(remote)
                    }
                    ChannelMessage::Heartbeat(heartbeat) => {
                        debug!("Received heartbeat from backend");
                        ChannelEvent::Heartbeat(heartbeat)
                    }
                    other => {
                        debug!(kind = other.kind(), "Received message");
                        ChannelEvent::Message(InboundMessage::Known(other))
                    }
                };
                self.emit(event);
            }
            Ok(unrecognized) => {
                warn!(kind = %unrecognized.kind(), "Unknown message type");
                self.emit(ChannelEvent::Message(unrecognized));
            }
            Err(DecodeError::NotJson(err)) if self.settings.legacy_text_fallback => {
                debug!(
                    error = %err,
                    bytes = text.len(),
                    "Text frame is not JSON, treating as raw audio"
                );
                self.emit(ChannelEvent::BinaryAudio(text.into_bytes()));
            }
            Err(err) => warn!(error = %err, "Dropping undecodable frame"),
        }
    }

    async fn write(&self, frame: Frame) -> Result<(), RelayError> {
        let mut writer = self.writer.lock().await;
        let sink = writer.as_mut().ok_or(RelayError::NotConnected)?;
        let result = sink.send(frame).await;
        if let Err(err) = result {
            warn!(error = %err, "Channel write failed");
            writer.take();
            return Err(RelayError::NotConnected);
        }
        Ok(())
    }

    async fn close_writer(&self) {
        let sink = self.writer.lock().await.take();
        if let Some(mut sink) = sink {
            let close = Frame::Close {
                code: NORMAL_CLOSURE,
                reason: "Client disconnecting".to_string(),
            };
            if let Err(err) = sink.send(close).await {
                debug!(error = %err, "Close frame not delivered");
            }
            let _ = sink.close().await;
        }
    }

    /// Move the state machine, unless it already reached Closed.
    fn transition(&self, state: ConnectionState, attempts: u32) -> bool {
        self.status.send_if_modified(|status| {
            if status.state == ConnectionState::Closed {
                return false;
            }
            status.state = state;
            status.reconnect_attempts = attempts;
            true
        })
    }

    fn emit(&self, event: ChannelEvent) {
        // Err only means nobody is subscribed.
        let _ = self.events.send(event);
    }
}

/// Resolves once shutdown has been requested.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    loop {
        let stop = *shutdown.borrow_and_update();
        if stop {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => futures_util::future::pending::<()>().await,
    }
}
