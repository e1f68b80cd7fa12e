use crate::{error::{AppError, AppResult}, middleware::request_call_id, state::AppState};
use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::json;

/// Inbound audio delivery from the conferencing adapter.
///
/// The body is the raw audio chunk; the call is named by the `X-Call-Id` header or
/// the `callId` query parameter.
pub async fn stream_audio(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let call_id = request_call_id(&req)
        .ok_or_else(|| AppError::BadRequest("Call ID is required".to_string()))?;

    if body.is_empty() {
        return Err(AppError::BadRequest("Audio data is required".to_string()));
    }

    let total = state.relay.ingress(&call_id, &body).await?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "bytesProcessed": body.len(),
        "totalBytesProcessed": total
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ConnectionState;
    use crate::middleware::CALL_ID_HEADER;
    use crate::state::tests::memory_state;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};

    fn audio_request(call_id: Option<&str>, body: &'static [u8]) -> test::TestRequest {
        let req = test::TestRequest::post().uri("/api/audio/stream").set_payload(body);
        match call_id {
            Some(id) => req.insert_header((CALL_ID_HEADER, id)),
            None => req,
        }
    }

    #[actix_web::test]
    async fn test_audio_request_validation() {
        let (state, _transport, _peers) = memory_state();
        state.relay.initialize_call("call_1").unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/api/audio/stream", web::post().to(stream_audio)),
        )
        .await;

        let resp = test::call_service(&app, audio_request(None, b"abc").to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = test::call_service(&app, audio_request(Some("call_1"), b"").to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = audio_request(Some("ghost"), b"abc").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["message"], "Call session not found");

        // Known call, channel down.
        let req = audio_request(Some("call_1"), b"abc").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[actix_web::test]
    async fn test_audio_is_forwarded_when_connected() {
        let (state, _transport, mut peers) = memory_state();
        state.channel().connect().unwrap();
        let mut peer = peers.recv().await.unwrap();
        state
            .channel()
            .wait_for_state(ConnectionState::Connected)
            .await
            .unwrap();
        state.relay.initialize_call("call_1").unwrap();

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .route("/api/audio/stream", web::post().to(stream_audio)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/audio/stream?callId=call_1")
            .set_payload(&b"0123456789"[..])
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["bytesProcessed"], 10);

        let frame = peer.next_message().await.unwrap();
        assert_eq!(frame["type"], "audio_data");
        assert_eq!(frame["callId"], "call_1");
        assert_eq!(state.relay.call_stats("call_1").unwrap().bytes_processed, 10);
    }
}
