//! # Call Audio Relay - Main Application Entry Point
//!
//! Boots the relay service:
//! 1. **Loads configuration** from `.env`, `config.toml` and environment variables
//! 2. **Sets up logging** with `tracing`
//! 3. **Opens the backend channel** and starts the relay dispatcher
//! 4. **Serves HTTP** for call lifecycle callbacks, audio delivery and health checks
//! 5. **Shuts down gracefully** on SIGTERM/SIGINT: stop HTTP, end every call, close the channel
//!
//! A missing or invalid channel URL aborts startup.

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Result;
use call_audio_relay::channel::{ChannelClient, WebSocketTransport};
use call_audio_relay::config::AppConfig;
use call_audio_relay::relay::AudioRelay;
use call_audio_relay::state::AppState;
use call_audio_relay::{handlers, middleware};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[actix_web::main]
async fn main() -> Result<()> {
    // A missing .env file is fine.
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    // Crypto backend for wss:// connections.
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        warn!("TLS crypto provider was already installed");
    }

    info!("Starting call-audio-relay v{}", env!("CARGO_PKG_VERSION"));
    info!(
        url = %config.channel.url,
        max_reconnect_attempts = config.reconnect.max_attempts,
        heartbeat_interval_ms = config.channel.heartbeat_interval_ms,
        "Backend channel configured"
    );

    let client = ChannelClient::new(config.channel_settings(), Arc::new(WebSocketTransport::new()));
    let relay = Arc::new(AudioRelay::new(
        client,
        config.audio_format(),
        config.performance.max_concurrent_calls,
    ));
    let dispatcher = relay.spawn_dispatcher(config.channel.resume_streams_on_reconnect);
    relay.channel().connect()?;

    let app_state = AppState::new(config.clone(), relay.clone());
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let max_payload_bytes = config.server.max_payload_bytes;

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::PayloadConfig::new(max_payload_bytes))
            .wrap(cors)
            .wrap(TracingLogger::default())
            .wrap(middleware::MetricsMiddleware)
            .wrap(middleware::RequestLogging)
            .configure(handlers::routes)
    })
    .bind(&bind_addr)?
    .disable_signals()
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
                Ok(Ok(())) => info!("Server exited"),
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    relay.shutdown().await;
    if let Err(e) = dispatcher.await {
        warn!("Relay dispatcher ended abnormally: {}", e);
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Structured logging to stdout.
///
/// ## Environment Variables:
/// - `RUST_LOG`: log filter, defaults to "call_audio_relay=debug,actix_web=info"
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "call_audio_relay=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}

/// Resolves on SIGTERM or SIGINT.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                    _ = sigint.recv() => info!("Received SIGINT"),
                }
                return;
            }
            _ => error!("Failed to install signal handlers, falling back to Ctrl+C"),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}
