use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    web, Error,
};
use futures_util::future::LocalBoxFuture;
use serde::Deserialize;
use std::{
    future::{ready, Ready},
    time::Instant,
};
use tracing::{debug, error, info, warn};

/// Header carrying the call id on audio delivery requests.
pub const CALL_ID_HEADER: &str = "X-Call-Id";

/// Call id of a request, from the `X-Call-Id` header or the `callId` query parameter.
pub fn request_call_id(req: &actix_web::HttpRequest) -> Option<String> {
    let from_header = req
        .headers()
        .get(CALL_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string);

    from_header.or_else(|| {
        web::Query::<CallIdQuery>::from_query(req.query_string())
            .ok()
            .and_then(|query| query.into_inner().call_id)
            .filter(|value| !value.is_empty())
    })
}

#[derive(Deserialize)]
struct CallIdQuery {
    #[serde(rename = "callId")]
    call_id: Option<String>,
}

/// Logs every request with its call id, status and latency.
///
/// Audio delivery requests arrive many times per second per call, so they are
/// logged at debug level unless they fail.
pub struct RequestLogging;

impl<S, B> Transform<S, ServiceRequest> for RequestLogging
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RequestLoggingMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestLoggingMiddleware { service }))
    }
}

pub struct RequestLoggingMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for RequestLoggingMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let start_time = Instant::now();
        let method = req.method().to_string();
        let path = req.path().to_string();
        let call_id = request_call_id(req.request()).unwrap_or_default();
        let is_audio = path.ends_with("/audio/stream");

        if !is_audio {
            debug!(method = %method, path = %path, call_id = %call_id, "Request started");
        }

        let fut = self.service.call(req);

        Box::pin(async move {
            let result = fut.await;
            let duration_ms = start_time.elapsed().as_millis() as u64;

            match &result {
                Ok(response) => {
                    let status = response.status();
                    if status.is_server_error() || status.is_client_error() {
                        warn!(
                            method = %method,
                            path = %path,
                            call_id = %call_id,
                            status = status.as_u16(),
                            duration_ms,
                            "Request rejected"
                        );
                    } else if is_audio {
                        debug!(
                            call_id = %call_id,
                            status = status.as_u16(),
                            duration_ms,
                            "Audio delivered"
                        );
                    } else {
                        info!(
                            method = %method,
                            path = %path,
                            call_id = %call_id,
                            status = status.as_u16(),
                            duration_ms,
                            "Request completed"
                        );
                    }
                }
                Err(err) => {
                    error!(
                        method = %method,
                        path = %path,
                        call_id = %call_id,
                        duration_ms,
                        error = %err,
                        "Request failed"
                    );
                }
            }

            result
        })
    }
}
