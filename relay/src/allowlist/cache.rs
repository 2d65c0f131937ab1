//! Shared allowlist cache with remote, file and override sources.
//!
//! The cache holds one `Arc<AllowlistSnapshot>` behind a lock that is only
//! ever held long enough to clone or replace the pointer. Readers get a
//! consistent snapshot; a refresh builds a complete new one off to the side
//! and publishes it with a single swap.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use reqwest::{header::USER_AGENT, Client};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::types::{AllowlistSnapshot, AllowlistSource, HooksDocument, SnapshotOrigin};
use crate::config::Config;
use crate::error::{RelayError, Result};

/// User agent sent to the directory service, which rejects anonymous clients.
const FETCH_USER_AGENT: &str = concat!("hookrelay/", env!("CARGO_PKG_VERSION"));

/// Process-wide holder of the current allowlist snapshot.
#[derive(Clone)]
pub struct AllowlistCache {
    inner: Arc<CacheInner>,
}

struct CacheInner {
    current: RwLock<Option<Arc<AllowlistSnapshot>>>,
    client: Client,
    fetch_timeout: Duration,
}

impl AllowlistCache {
    /// Create an empty cache that fetches with `client`.
    pub fn new(client: Client, fetch_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                current: RwLock::new(None),
                client,
                fetch_timeout,
            }),
        }
    }

    /// The snapshot in effect right now, if any has been installed.
    pub fn current(&self) -> Option<Arc<AllowlistSnapshot>> {
        self.inner.current.read().clone()
    }

    /// Publish `snapshot`, replacing whatever was there.
    pub fn install(&self, snapshot: AllowlistSnapshot) -> Arc<AllowlistSnapshot> {
        let snapshot = Arc::new(snapshot);
        *self.inner.current.write() = Some(Arc::clone(&snapshot));

        info!(
            origin = snapshot.origin().as_str(),
            ranges = snapshot.len(),
            "allowlist_installed"
        );

        snapshot
    }

    /// Build a snapshot from `source` without installing it.
    pub async fn resolve(&self, source: &AllowlistSource) -> Result<AllowlistSnapshot> {
        match source {
            AllowlistSource::Remote(url) => self.refresh_from_remote(url).await,
            AllowlistSource::CachedFile(path) => load_from_disk(path),
            AllowlistSource::Override(entries) => {
                AllowlistSnapshot::parse_strict(entries, SnapshotOrigin::Override)
            }
        }
    }

    /// Resolve `source` and install the result.
    ///
    /// On error the previous snapshot stays in place.
    pub async fn refresh(&self, source: &AllowlistSource) -> Result<Arc<AllowlistSnapshot>> {
        let snapshot = self.resolve(source).await?;
        Ok(self.install(snapshot))
    }

    /// Query the directory service for the current webhook sender ranges.
    ///
    /// Connection failures, timeouts, non-2xx responses, undecodable bodies
    /// and lists with no usable range all surface as
    /// [`RelayError::RemoteFetch`], so callers keep what they already have.
    pub async fn refresh_from_remote(&self, url: &str) -> Result<AllowlistSnapshot> {
        info!(
            url = url,
            timeout_seconds = self.inner.fetch_timeout.as_secs_f64(),
            "allowlist_fetch_starting"
        );

        let fetch_error = |reason: String| RelayError::RemoteFetch {
            url: url.to_string(),
            reason,
        };

        let response = self
            .inner
            .client
            .get(url)
            .timeout(self.inner.fetch_timeout)
            .header(USER_AGENT, FETCH_USER_AGENT)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    fetch_error(format!("timed out: {}", e))
                } else {
                    fetch_error(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_error(format!("unexpected status {}", status)));
        }

        let document: HooksDocument = response
            .json()
            .await
            .map_err(|e| fetch_error(format!("invalid response body: {}", e)))?;

        let snapshot = AllowlistSnapshot::parse_lenient(&document.hooks, SnapshotOrigin::Remote);

        info!(
            url = url,
            status_code = status.as_u16(),
            published = document.hooks.len(),
            ranges = snapshot.len(),
            "allowlist_fetch_complete"
        );

        if snapshot.is_empty() {
            return Err(fetch_error(format!(
                "no usable ranges among {} published entries",
                document.hooks.len()
            )));
        }

        Ok(snapshot)
    }
}

/// Write `snapshot` to `path` as `{"hooks": [...]}`.
///
/// The document is written to a sibling temp file first and renamed over
/// the target, so a reader never sees a half-written file.
pub fn persist_to_disk(snapshot: &AllowlistSnapshot, path: &Path) -> Result<()> {
    let body = serde_json::to_vec_pretty(&HooksDocument::from(snapshot))?;

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    std::fs::write(&tmp_path, &body)?;
    std::fs::rename(&tmp_path, path)?;

    info!(
        path = %path.display(),
        ranges = snapshot.len(),
        "allowlist_persisted"
    );

    Ok(())
}

/// Read a snapshot previously written by [`persist_to_disk`].
pub fn load_from_disk(path: &Path) -> Result<AllowlistSnapshot> {
    let body = std::fs::read(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => RelayError::NotFound {
            path: path.to_path_buf(),
        },
        _ => RelayError::Io(e),
    })?;

    let document: HooksDocument = serde_json::from_slice(&body)?;
    let snapshot = AllowlistSnapshot::parse_lenient(&document.hooks, SnapshotOrigin::CachedFile);

    info!(
        path = %path.display(),
        ranges = snapshot.len(),
        "allowlist_loaded_from_disk"
    );

    Ok(snapshot)
}

/// The source the relay should keep refreshing from.
pub fn configured_source(config: &Config) -> AllowlistSource {
    match &config.allowlist_override {
        Some(entries) => AllowlistSource::Override(entries.clone()),
        None => AllowlistSource::Remote(config.meta_api_url.clone()),
    }
}

/// Populate the cache at startup.
///
/// 1. A configured override wins outright; a malformed entry is fatal.
/// 2. Otherwise fetch remotely and persist the result for the next start.
/// 3. If that fails, fall back to the persisted file.
/// 4. If there is no file either, carry on empty. `/status` still works and
///    sender checks report the allowlist as unavailable.
pub async fn bootstrap(cache: &AllowlistCache, config: &Config) -> Result<()> {
    let source = configured_source(config);

    if let AllowlistSource::Override(_) = source {
        cache.refresh(&source).await?;
        return Ok(());
    }

    match cache.refresh(&source).await {
        Ok(snapshot) => {
            if let Err(e) = persist_to_disk(&snapshot, &config.allowlist_path) {
                warn!(
                    path = %config.allowlist_path.display(),
                    error = %e,
                    "allowlist_persist_failed"
                );
            }
            return Ok(());
        }
        Err(e) => {
            warn!(error = %e, "allowlist_remote_unavailable_falling_back");
        }
    }

    let fallback = AllowlistSource::CachedFile(config.allowlist_path.clone());
    if let Err(e) = cache.refresh(&fallback).await {
        error!(
            path = %config.allowlist_path.display(),
            error = %e,
            "allowlist_unavailable"
        );
    }

    Ok(())
}

/// Periodically re-resolve `source` until the task is aborted.
///
/// Failures keep the previous snapshot. Successful remote refreshes are
/// persisted to `persist_path`.
pub fn spawn_refresh_task(
    cache: AllowlistCache,
    source: AllowlistSource,
    persist_path: PathBuf,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick fires immediately; bootstrap already covered it.
        ticker.tick().await;

        loop {
            ticker.tick().await;

            match cache.refresh(&source).await {
                Ok(snapshot) => {
                    if snapshot.origin() == SnapshotOrigin::Remote {
                        if let Err(e) = persist_to_disk(&snapshot, &persist_path) {
                            warn!(error = %e, "allowlist_persist_failed");
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "allowlist_refresh_failed_keeping_previous");
                }
            }
        }
    })
}
