//! hookrelay - Authenticated webhook relay server.
//!
//! This binary:
//! - Loads the sender allowlist (override, remote directory, or local file)
//! - Serves `/status`, `/forward_webhook` and `/receive_webhook`
//! - Optionally refreshes the allowlist in the background

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use hookrelay::allowlist::{bootstrap, configured_source, spawn_refresh_task};
use hookrelay::web::router;
use hookrelay::{AllowlistCache, AppState, Config, HttpForwarder};

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
    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        port = config.port,
        target_url = %config.target_url,
        insecure_defaults = config.insecure_defaults,
        meta_api_url = %config.meta_api_url,
        allowlist_path = %config.allowlist_path.display(),
        allowlist_override = config.allowlist_override.is_some(),
        allowlist_refresh_secs = config.allowlist_refresh_secs,
        forward_timeout_ms = config.forward_timeout_ms,
        max_body_bytes = config.max_body_bytes,
        "config_loaded"
    );

    // One HTTP client for directory fetches and forwarding
    let client = Client::builder()
        .pool_max_idle_per_host(16)
        .build()
        .context("Failed to create HTTP client")?;

    let allowlist = AllowlistCache::new(
        client.clone(),
        Duration::from_millis(config.allowlist_fetch_timeout_ms),
    );
    bootstrap(&allowlist, &config)
        .await
        .context("Failed to load sender allowlist")?;

    let refresh_task = if config.allowlist_refresh_secs > 0 {
        Some(spawn_refresh_task(
            allowlist.clone(),
            configured_source(&config),
            config.allowlist_path.clone(),
            Duration::from_secs(config.allowlist_refresh_secs),
        ))
    } else {
        None
    };

    let forwarder = HttpForwarder::new(client, Duration::from_millis(config.forward_timeout_ms));
    let port = config.port;

    let state = AppState::new(config, allowlist, Arc::new(forwarder));
    let app = router(state);

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "relay_listening");

    // Run server with graceful shutdown
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    if let Some(task) = refresh_task {
        task.abort();
    }

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
