//! hookrelay-allowlist - Fetch the sender allowlist and save it for offline bootstrap.
//!
//! Queries `META_API_URL` once and writes the published webhook ranges to
//! `ALLOWLIST_PATH`, the file the relay falls back to when the directory
//! service is unreachable at startup.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use hookrelay::allowlist::persist_to_disk;
use hookrelay::{AllowlistCache, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        meta_api_url = %config.meta_api_url,
        allowlist_path = %config.allowlist_path.display(),
        "allowlist_export_starting"
    );

    let client = Client::builder()
        .build()
        .context("Failed to create HTTP client")?;
    let cache = AllowlistCache::new(
        client,
        Duration::from_millis(config.allowlist_fetch_timeout_ms),
    );

    let snapshot = cache
        .refresh_from_remote(&config.meta_api_url)
        .await
        .context("Failed to fetch allowlist")?;

    persist_to_disk(&snapshot, &config.allowlist_path)
        .with_context(|| format!("Failed to write {}", config.allowlist_path.display()))?;

    info!(ranges = snapshot.len(), "allowlist_export_complete");

    Ok(())
}
