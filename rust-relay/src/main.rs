//! SMS Bot Relay - Telnyx webhook receiver.
//!
//! This binary serves:
//! - `GET /health`
//! - `POST /webhooks/telnyx` and `POST /webhooks/telnyx/failover`
//!
//! Webhook signatures are verified in the handler, where the raw body is
//! available. The middleware in front of it only pre-filters on headers.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use smsbot::{create_router, key_cache_from_config, AppState, Config, LoggingSink, WebhookVerifier};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("relay_starting");

    // Load configuration
    let config = Config::from_env();
    info!(
        port = config.port,
        environment = %config.environment,
        signature_header = %config.signature_header,
        timestamp_header = %config.timestamp_header,
        public_key_secret = %config.public_key_secret,
        secret_store = ?config.secret_store,
        tolerance_secs = config.signature_tolerance_secs,
        secret_fetch_timeout_ms = config.secret_fetch_timeout_ms,
        allowed_source_cidrs = config.allowed_source_cidrs.len(),
        enforce_source_ip = config.enforce_source_ip,
        "config_loaded"
    );

    let keys = key_cache_from_config(&config);

    // Warm the key cache; a failure here is retried on the first request.
    if let Err(e) = keys.get_trusted_key().await {
        error!(error = %e, "public_key_prefetch_failed");
    }

    let verifier = WebhookVerifier::from_config(&config, keys);
    let state = AppState::new(config.clone(), verifier, Arc::new(LoggingSink));

    let app = create_router(state);

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "relay_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("relay_shutdown_complete");

    Ok(())
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("relay_shutting_down");
}
