use crate::{error::AppResult, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

/// Effective configuration. The channel URL is reported without credentials.
pub async fn get_config(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let config = &state.config;

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": {
            "server": {
                "host": config.server.host,
                "port": config.server.port,
                "max_payload_bytes": config.server.max_payload_bytes
            },
            "channel": {
                "url": redact_url(&config.channel.url),
                "protocol": config.channel.protocol,
                "connect_timeout_ms": config.channel.connect_timeout_ms,
                "heartbeat_interval_ms": config.channel.heartbeat_interval_ms,
                "peer_timeout_ms": config.channel.peer_timeout_ms,
                "legacy_text_fallback": config.channel.legacy_text_fallback,
                "resume_streams_on_reconnect": config.channel.resume_streams_on_reconnect
            },
            "reconnect": {
                "max_attempts": config.reconnect.max_attempts,
                "base_delay_ms": config.reconnect.base_delay_ms,
                "max_delay_ms": config.reconnect.max_delay_ms
            },
            "audio": state.relay.audio_format(),
            "performance": {
                "max_concurrent_calls": config.performance.max_concurrent_calls
            }
        }
    })))
}

/// Drop `user:password@` from a URL.
fn redact_url(url: &str) -> String {
    match (url.find("://"), url.find('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}***@{}", &url[..scheme_end + 3], &url[at + 1..])
        }
        _ => url.to_string(),
    }
}
