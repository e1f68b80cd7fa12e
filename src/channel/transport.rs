//! # Channel Transport
//!
//! One duplex, message-oriented connection to one remote endpoint. A transport only
//! knows how to open a connection and move frames; reconnects, heartbeats and message
//! decoding belong to [`ChannelClient`](super::client::ChannelClient).
//!
//! Opening a connection yields a frame sink (outbound) and a frame stream (inbound).
//! The stream ends, or yields a [`Frame::Close`], when the connection goes away.

use crate::error::RelayError;
use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use futures_util::{Sink, SinkExt, StreamExt};
use std::pin::Pin;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info};

/// Close code for a deliberate, normal shutdown.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Close code reported when the peer closed without a status.
pub const NO_STATUS_RECEIVED: u16 = 1005;

/// One unit on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Structured JSON message
    Text(String),
    /// Raw audio bytes
    Binary(Vec<u8>),
    /// Connection close with status code and reason
    Close { code: u16, reason: String },
}

pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = RelayError> + Send>>;
pub type FrameStream = BoxStream<'static, Result<Frame, RelayError>>;

/// An open connection, split into its two directions.
pub struct TransportConnection {
    pub outbound: FrameSink,
    pub inbound: FrameStream,
}

/// Opens connections to the backend endpoint.
pub trait ChannelTransport: Send + Sync + 'static {
    fn open(
        &self,
        url: &str,
        protocol: Option<&str>,
    ) -> BoxFuture<'static, Result<TransportConnection, RelayError>>;
}

/// Production transport: a WebSocket connection via tokio-tungstenite.
///
/// Pings from the server are answered by tungstenite itself; pong and ping frames
/// never reach the client.
#[derive(Debug, Default, Clone)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    pub fn new() -> Self {
        Self
    }
}

fn connection_error(err: impl std::fmt::Display) -> RelayError {
    RelayError::ConnectionError(err.to_string())
}

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => Message::Text(text),
            Frame::Binary(bytes) => Message::Binary(bytes),
            Frame::Close { code, reason } => Message::Close(Some(CloseFrame {
                code: CloseCode::from(code),
                reason: reason.into(),
            })),
        }
    }
}

fn frame_from_message(message: Message) -> Option<Frame> {
    match message {
        Message::Text(text) => Some(Frame::Text(text)),
        Message::Binary(bytes) => Some(Frame::Binary(bytes)),
        Message::Close(Some(close)) => Some(Frame::Close {
            code: u16::from(close.code),
            reason: close.reason.into_owned(),
        }),
        Message::Close(None) => Some(Frame::Close {
            code: NO_STATUS_RECEIVED,
            reason: String::new(),
        }),
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {
            debug!("Control frame handled by transport");
            None
        }
    }
}

impl ChannelTransport for WebSocketTransport {
    fn open(
        &self,
        url: &str,
        protocol: Option<&str>,
    ) -> BoxFuture<'static, Result<TransportConnection, RelayError>> {
        let url = url.to_string();
        let protocol = protocol.map(str::to_string);

        Box::pin(async move {
            let mut request = url.as_str().into_client_request().map_err(connection_error)?;
            if let Some(protocol) = protocol {
                let value = HeaderValue::from_str(&protocol).map_err(connection_error)?;
                request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
            }

            let (stream, response) = tokio_tungstenite::connect_async(request)
                .await
                .map_err(connection_error)?;
            info!(url = %url, status = %response.status(), "WebSocket handshake completed");

            let (write, read) = stream.split();

            let outbound = write
                .with(|frame: Frame| {
                    futures_util::future::ready(Ok::<Message, WsError>(frame.into()))
                })
                .sink_map_err(connection_error);

            let inbound = read.filter_map(|message| {
                futures_util::future::ready(match message {
                    Ok(message) => frame_from_message(message).map(Ok),
                    Err(err) => Some(Err(connection_error(err))),
                })
            });

            Ok(TransportConnection {
                outbound: Box::pin(outbound),
                inbound: inbound.boxed(),
            })
        })
    }
}

#[cfg(any(test, feature = "memory-transport"))]
pub use memory::{MemoryPeer, MemoryTransport};

/// In-process transport for tests and local wiring.
#[cfg(any(test, feature = "memory-transport"))]
mod memory {
    use super::{ChannelTransport, Frame, TransportConnection};
    use crate::error::RelayError;
    use futures_util::future::BoxFuture;
    use futures_util::StreamExt;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::ReceiverStream;

    const MEMORY_BUFFER: usize = 1024;

    /// In-process transport. Every successful `open` hands the far end of the
    /// connection to whoever holds the peer receiver, which then plays the backend.
    #[derive(Clone)]
    pub struct MemoryTransport {
        reachable: Arc<AtomicBool>,
        hang: Arc<AtomicBool>,
        opens: Arc<AtomicUsize>,
        peers: mpsc::UnboundedSender<MemoryPeer>,
    }

    /// The backend side of one in-memory connection.
    pub struct MemoryPeer {
        /// Frames written by the client
        pub outbound: mpsc::Receiver<Frame>,
        inbound: mpsc::Sender<Result<Frame, RelayError>>,
    }

    impl MemoryTransport {
        pub fn new() -> (Self, mpsc::UnboundedReceiver<MemoryPeer>) {
            let (peers, peer_rx) = mpsc::unbounded_channel();
            let transport = Self {
                reachable: Arc::new(AtomicBool::new(true)),
                hang: Arc::new(AtomicBool::new(false)),
                opens: Arc::new(AtomicUsize::new(0)),
                peers,
            };
            (transport, peer_rx)
        }

        /// When false, `open` fails immediately with a connection error.
        pub fn set_reachable(&self, reachable: bool) {
            self.reachable.store(reachable, Ordering::SeqCst);
        }

        /// When true, `open` never completes.
        pub fn set_hang(&self, hang: bool) {
            self.hang.store(hang, Ordering::SeqCst);
        }

        /// Number of connection attempts so far.
        pub fn open_count(&self) -> usize {
            self.opens.load(Ordering::SeqCst)
        }
    }

    impl ChannelTransport for MemoryTransport {
        fn open(
            &self,
            url: &str,
            _protocol: Option<&str>,
        ) -> BoxFuture<'static, Result<TransportConnection, RelayError>> {
            self.opens.fetch_add(1, Ordering::SeqCst);

            if self.hang.load(Ordering::SeqCst) {
                return Box::pin(futures_util::future::pending());
            }
            if !self.reachable.load(Ordering::SeqCst) {
                let err = RelayError::ConnectionError(format!("{} is unreachable", url));
                return Box::pin(futures_util::future::ready(Err(err)));
            }

            let (client_tx, peer_rx) = mpsc::channel::<Frame>(MEMORY_BUFFER);
            let (peer_tx, client_rx) = mpsc::channel::<Result<Frame, RelayError>>(MEMORY_BUFFER);

            let registered = self.peers.send(MemoryPeer {
                outbound: peer_rx,
                inbound: peer_tx,
            });
            if registered.is_err() {
                let err = RelayError::ConnectionError("no peer is listening".to_string());
                return Box::pin(futures_util::future::ready(Err(err)));
            }

            let outbound = futures_util::sink::unfold(client_tx, |tx, frame: Frame| async move {
                tx.send(frame)
                    .await
                    .map_err(|_| RelayError::ConnectionError("peer went away".to_string()))?;
                Ok::<_, RelayError>(tx)
            });

            let connection = TransportConnection {
                outbound: Box::pin(outbound),
                inbound: ReceiverStream::new(client_rx).boxed(),
            };
            Box::pin(futures_util::future::ready(Ok(connection)))
        }
    }

    impl MemoryPeer {
        /// Next frame written by the client, if the connection is still open.
        pub async fn next_frame(&mut self) -> Option<Frame> {
            self.outbound.recv().await
        }

        /// Next text frame that is not a heartbeat, decoded as JSON.
        pub async fn next_message(&mut self) -> Option<serde_json::Value> {
            while let Some(frame) = self.outbound.recv().await {
                if let Frame::Text(text) = frame {
                    let value: serde_json::Value = serde_json::from_str(&text).ok()?;
                    if value["type"] != "heartbeat" {
                        return Some(value);
                    }
                }
            }
            None
        }

        /// Deliver a frame to the client.
        pub async fn push(&self, frame: Frame) -> Result<(), RelayError> {
            self.inbound
                .send(Ok(frame))
                .await
                .map_err(|_| RelayError::ConnectionError("client went away".to_string()))
        }

        /// Deliver a transport error to the client.
        pub async fn fail(&self, detail: &str) -> Result<(), RelayError> {
            self.inbound
                .send(Err(RelayError::ConnectionError(detail.to_string())))
                .await
                .map_err(|_| RelayError::ConnectionError("client went away".to_string()))
        }

        /// Close from the backend side with a status code.
        pub async fn close(self, code: u16, reason: &str) {
            let _ = self
                .inbound
                .send(Ok(Frame::Close {
                    code,
                    reason: reason.to_string(),
                }))
                .await;
        }
    }
}
