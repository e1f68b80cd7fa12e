//! Call lifecycle callbacks and per-call stats.

use crate::{error::{AppError, AppResult}, lifecycle::ConferenceKind, state::AppState};
use actix_web::{http::StatusCode, web, HttpResponse, ResponseError};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Default, Deserialize)]
pub struct KindQuery {
    #[serde(default)]
    pub kind: ConferenceKind,
}

pub async fn start_call(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<KindQuery>,
) -> HttpResponse {
    let call_id = path.into_inner();
    let reply = state.lifecycle.on_start(query.kind, &call_id).await;

    let status = match &reply.error {
        Some(err) if !reply.accepted => AppError::from(err.clone()).status_code(),
        _ => StatusCode::OK,
    };
    HttpResponse::build(status).json(reply)
}

pub async fn end_call(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<KindQuery>,
) -> HttpResponse {
    let call_id = path.into_inner();
    let reply = state.lifecycle.on_end(query.kind, &call_id).await;
    HttpResponse::Ok().json(reply)
}

pub async fn list_calls(state: web::Data<AppState>) -> HttpResponse {
    let calls = state.relay.active_calls();
    HttpResponse::Ok().json(json!({
        "count": calls.len(),
        "calls": calls,
    }))
}

pub async fn get_call(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let stats = state
        .relay
        .call_stats(&path)
        .ok_or_else(|| AppError::NotFound("Call session not found".to_string()))?;
    Ok(HttpResponse::Ok().json(stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ConnectionState;
    use crate::state::tests::memory_state;
    use actix_web::{test, App};

    macro_rules! calls_app {
        ($state:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($state))
                    .route("/api/calls", web::get().to(list_calls))
                    .route("/api/calls/{id}", web::get().to(get_call))
                    .route("/api/calls/{id}/start", web::post().to(start_call))
                    .route("/api/calls/{id}/end", web::post().to(end_call)),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_call_lifecycle_over_http() {
        let (state, _transport, mut peers) = memory_state();
        state.channel().connect().unwrap();
        let _peer = peers.recv().await.unwrap();
        state
            .channel()
            .wait_for_state(ConnectionState::Connected)
            .await
            .unwrap();
        let app = calls_app!(state);

        let resp = test::call_service(
            &app,
            test::TestRequest::post().uri("/api/calls/call_1/start").to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["accepted"], true);
        assert!(body["streamId"].is_string());

        let req = test::TestRequest::get().uri("/api/calls").to_request();
        let resp = test::call_service(&app, req).await;
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["calls"], json!(["call_1"]));

        let req = test::TestRequest::get().uri("/api/calls/call_1").to_request();
        let resp = test::call_service(&app, req).await;
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["id"], "call_1");
        assert_eq!(body["bytesProcessed"], 0);

        let resp = test::call_service(
            &app,
            test::TestRequest::post().uri("/api/calls/call_1/end?kind=meeting").to_request(),
        )
        .await;
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["message"], "Meeting ended. Audio processing has been stopped.");

        let req = test::TestRequest::get().uri("/api/calls/call_1").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_start_failures_map_to_status() {
        let (state, _transport, _peers) = memory_state();
        let app = calls_app!(state);

        // Channel down: the call is registered but the stream could not start.
        let resp = test::call_service(
            &app,
            test::TestRequest::post().uri("/api/calls/call_1/start").to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["accepted"], false);
        assert_eq!(body["message"], "Sorry, there was an error starting the audio processing.");

        let resp = test::call_service(
            &app,
            test::TestRequest::post().uri("/api/calls/call_1/start").to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }
}
