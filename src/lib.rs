//! # Call Audio Relay
//!
//! Relays call audio between a conferencing front end and a speech processing backend
//! over one persistent WebSocket channel.
//!
//! ## Architecture:
//! - **channel**: the backend connection, with reconnect, heartbeat and message dispatch
//! - **relay**: per-call sessions and the ingress/egress audio paths
//! - **lifecycle**: conferencing callbacks turned into relay operations
//! - **config**: layered configuration (defaults, config file, environment)
//! - **state**: the context object shared by HTTP handlers
//! - **health**, **handlers**, **middleware**: the HTTP surface
//! - **error**: relay error taxonomy and its HTTP mapping

pub mod channel;
pub mod config;
pub mod error;
pub mod handlers;
pub mod health;
pub mod lifecycle;
pub mod middleware;
pub mod relay;
pub mod state;

pub use channel::{ChannelClient, ChannelEvent, ConnectionState};
pub use config::AppConfig;
pub use error::{AppError, RelayError};
pub use lifecycle::{CallLifecycle, ConferenceKind, LifecycleReply};
pub use relay::{AudioRelay, CallStats};
pub use state::AppState;
