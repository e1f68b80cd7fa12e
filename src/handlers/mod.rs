pub mod audio;
pub mod calls;
pub mod config;

use crate::health;
use actix_web::web;

pub use audio::*;
pub use calls::*;
pub use config::*;

/// Every HTTP route of the relay.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(health::health_check))
            .route("/metrics", web::get().to(health::detailed_metrics))
            .route("/config", web::get().to(get_config))
            .route("/audio/stream", web::post().to(stream_audio))
            .route("/calls", web::get().to(list_calls))
            .route("/calls/{id}", web::get().to(get_call))
            .route("/calls/{id}/start", web::post().to(start_call))
            .route("/calls/{id}/end", web::post().to(end_call)),
    )
    .route("/health", web::get().to(health::health_check));
}
