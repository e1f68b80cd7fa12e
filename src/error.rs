//! # Error Handling
//!
//! Two layers of errors live here:
//!
//! - [`RelayError`]: the failure taxonomy of the relay core (channel client,
//!   session registry, audio relay). Session-layer variants are returned
//!   synchronously to callers; connection-layer variants are normally absorbed
//!   by the channel state machine and only observed through events.
//! - [`AppError`]: what HTTP handlers return. It knows how to render itself as a
//!   JSON response with the right status code.
//!
//! ## JSON Response Format:
//! ```json
//! {
//!   "error": {
//!     "type": "session_not_found",
//!     "message": "Call session not found: call_123",
//!     "timestamp": "2025-01-01T12:00:00Z"
//!   }
//! }
//! ```

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Failures produced by the relay core.
///
/// ## Propagation policy:
/// - **NotConnected**: `send` attempted while the channel is down. Callers drop or retry.
/// - **SessionNotFound / DuplicateSession / CapacityExceeded**: caller-side sequencing
///   problems, returned directly from relay operations.
/// - **ConnectionError / MaxReconnectAttemptsExceeded**: transport failures. These drive
///   the reconnect state machine and reach the outside world as channel events.
/// - **Protocol**: a wire message could not be encoded or decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// The channel is not in the Connected state
    NotConnected,

    /// No active session exists for the call id
    SessionNotFound(String),

    /// A live session already exists for the call id
    DuplicateSession(String),

    /// The relay already tracks the maximum number of concurrent calls
    CapacityExceeded(usize),

    /// Transport-level failure (connect, read, write, timeout)
    ConnectionError(String),

    /// The reconnect budget is spent; the channel is closed for good
    MaxReconnectAttemptsExceeded(u32),

    /// Wire encoding/decoding failure
    Protocol(String),
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayError::NotConnected => write!(f, "Channel not connected"),
            RelayError::SessionNotFound(id) => write!(f, "Call session not found: {}", id),
            RelayError::DuplicateSession(id) => write!(f, "Call session already active: {}", id),
            RelayError::CapacityExceeded(limit) => {
                write!(f, "Maximum concurrent calls ({}) reached", limit)
            }
            RelayError::ConnectionError(detail) => {
                write!(f, "Channel connection error: {}", detail)
            }
            RelayError::MaxReconnectAttemptsExceeded(attempts) => {
                write!(f, "Max reconnection attempts reached ({})", attempts)
            }
            RelayError::Protocol(detail) => write!(f, "Channel protocol error: {}", detail),
        }
    }
}

impl std::error::Error for RelayError {}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::Protocol(err.to_string())
    }
}

/// Errors returned from HTTP handlers.
///
/// ## HTTP Status Code Mapping:
/// - Internal/ConfigError → 500
/// - BadRequest → 400
/// - NotFound → 404
/// - Conflict → 409
/// - TooManyCalls → 429
/// - ServiceUnavailable → 503
#[derive(Debug)]
pub enum AppError {
    /// Internal server errors
    Internal(String),

    /// Client sent invalid or malformed data
    BadRequest(String),

    /// Requested resource was not found
    NotFound(String),

    /// The request conflicts with current state (e.g. call already started)
    Conflict(String),

    /// The relay is at capacity
    TooManyCalls(String),

    /// The backend channel is unavailable
    ServiceUnavailable(String),

    /// Configuration file or environment variable problems
    ConfigError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            AppError::TooManyCalls(msg) => write!(f, "Too many calls: {}", msg),
            AppError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, &str) {
        match self {
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            AppError::TooManyCalls(msg) => (StatusCode::TOO_MANY_REQUESTS, "too_many_calls", msg),
            AppError::ServiceUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", msg)
            }
            AppError::ConfigError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error", msg),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        self.parts().0
    }

    fn error_response(&self) -> HttpResponse {
        let (status, error_type, message) = self.parts();

        HttpResponse::build(status).json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

/// Relay failures reaching the HTTP layer.
///
/// Internal protocol details stay in the log; the client only sees a short message.
impl From<RelayError> for AppError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::SessionNotFound(_) => {
                AppError::NotFound("Call session not found".to_string())
            }
            RelayError::DuplicateSession(_) => AppError::Conflict(err.to_string()),
            RelayError::CapacityExceeded(_) => AppError::TooManyCalls(err.to_string()),
            RelayError::NotConnected
            | RelayError::ConnectionError(_)
            | RelayError::MaxReconnectAttemptsExceeded(_) => {
                AppError::ServiceUnavailable("Audio backend is not connected".to_string())
            }
            RelayError::Protocol(_) => AppError::Internal("Internal server error".to_string()),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON parsing error: {}", err))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

/// Shorthand for `Result<T, AppError>`.
pub type AppResult<T> = Result<T, AppError>;
