pub mod logging;
pub mod metrics;

pub use logging::{request_call_id, RequestLogging, CALL_ID_HEADER};
pub use metrics::MetricsMiddleware;
