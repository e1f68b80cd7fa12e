use crate::channel::ConnectionState;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;
use std::process;

/// Liveness plus backend channel status.
///
/// Answers 503 once the channel is Closed, since no call can be relayed until the
/// process is restarted. Any other channel state is reported but answered with 200.
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let channel = state.channel();
    let status = channel.status();
    let settings = channel.settings();
    let connected = status.state == ConnectionState::Connected;
    let active_calls = state.relay.registry().len();

    let overall = match status.state {
        ConnectionState::Connected => "healthy",
        ConnectionState::Closed => "unhealthy",
        _ => "degraded",
    };

    let body = json!({
        "status": overall,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.get_uptime_seconds(),
        "service": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        },
        "websocket": if connected { "connected" } else { "disconnected" },
        "channel": {
            "state": status.state.as_str(),
            "connected": connected,
            "reconnect_attempts": status.reconnect_attempts,
            "max_reconnect_attempts": settings.backoff.max_attempts,
            "url": settings.url,
        },
        "active_calls": active_calls,
        "system": get_system_status(active_calls, state.config.performance.max_concurrent_calls),
    });

    if status.state == ConnectionState::Closed {
        HttpResponse::ServiceUnavailable().json(body)
    } else {
        HttpResponse::Ok().json(body)
    }
}

pub async fn detailed_metrics(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let uptime_seconds = state.get_uptime_seconds();

    let mut endpoint_stats = Vec::new();
    for (endpoint, metric) in metrics.endpoint_metrics.iter() {
        endpoint_stats.push(json!({
            "endpoint": endpoint,
            "request_count": metric.request_count,
            "error_count": metric.error_count,
            "error_rate": metric.error_rate(),
            "average_duration_ms": metric.average_duration_ms(),
            "total_duration_ms": metric.total_duration_ms
        }));
    }

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "overall": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": if metrics.request_count > 0 {
                metrics.error_count as f64 / metrics.request_count as f64
            } else {
                0.0
            },
            "requests_per_second": if uptime_seconds > 0 {
                metrics.request_count as f64 / uptime_seconds as f64
            } else {
                0.0
            }
        },
        "endpoints": endpoint_stats,
        "relay": state.relay.metrics(),
        "channel": {
            "state": state.channel().state().as_str(),
            "reconnect_attempts": state.channel().status().reconnect_attempts,
        },
        "memory": get_memory_info(),
        "performance": {
            "active_calls": state.relay.registry().len(),
            "max_concurrent_calls": state.config.performance.max_concurrent_calls,
        }
    }))
}

fn get_memory_info() -> serde_json::Value {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string(format!("/proc/{}/status", process::id())) {
            let read_kb = |prefix: &str| {
                status
                    .lines()
                    .find(|line| line.starts_with(prefix))
                    .and_then(|line| line.split_whitespace().nth(1))
                    .and_then(|kb| kb.parse::<u64>().ok())
                    .unwrap_or(0)
                    * 1024
            };

            return json!({
                "resident_memory_bytes": read_kb("VmRSS:"),
                "virtual_memory_bytes": read_kb("VmSize:"),
                "available": true
            });
        }
    }

    json!({
        "pid": process::id(),
        "available": false,
        "note": "Memory info not available on this platform"
    })
}

fn get_system_status(active_calls: usize, max_calls: usize) -> serde_json::Value {
    let call_usage = if max_calls > 0 {
        active_calls as f64 / max_calls as f64
    } else {
        0.0
    };

    let status = if call_usage > 0.9 {
        "high_load"
    } else if call_usage > 0.7 {
        "moderate_load"
    } else {
        "normal"
    };

    json!({
        "status": status,
        "call_usage_percent": (call_usage * 100.0).round(),
        "max_calls": max_calls,
        "current_calls": active_calls,
        "load_warnings": if call_usage > 0.8 {
            vec!["High call usage - consider increasing performance.max_concurrent_calls"]
        } else {
            vec![]
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::memory_state;
    use actix_web::{test, App};

    #[actix_web::test]
    async fn test_health_reports_channel_state() {
        let (state, _transport, _peers) = memory_state();
        state.relay.initialize_call("call_1").unwrap();

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/health", web::get().to(health_check)),
        )
        .await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["websocket"], "disconnected");
        assert_eq!(body["channel"]["state"], "disconnected");
        assert_eq!(body["channel"]["max_reconnect_attempts"], 5);
        assert_eq!(body["active_calls"], 1);
    }

    #[actix_web::test]
    async fn test_health_when_connected_and_closed() {
        let (state, _transport, mut peers) = memory_state();
        state.channel().connect().unwrap();
        let _peer = peers.recv().await.unwrap();
        state
            .channel()
            .wait_for_state(ConnectionState::Connected)
            .await
            .unwrap();

        let data = web::Data::new(state.clone());
        let app = test::init_service(
            App::new()
                .app_data(data)
                .route("/health", web::get().to(health_check)),
        )
        .await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["websocket"], "connected");

        state.channel().disconnect().await;
        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::SERVICE_UNAVAILABLE);
    }

    #[actix_web::test]
    async fn test_system_status_thresholds() {
        assert_eq!(get_system_status(10, 100)["status"], "normal");
        assert_eq!(get_system_status(80, 100)["status"], "moderate_load");
        assert_eq!(get_system_status(95, 100)["status"], "high_load");
        assert_eq!(get_system_status(0, 0)["call_usage_percent"], 0.0);
    }
}
