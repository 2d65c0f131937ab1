//! Error types for the relay.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while building the allowlist, verifying, or forwarding.
///
/// Rejections of a webhook (sender not in range, bad signature) are plain
/// booleans and never show up here.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Invalid network range {range:?}: {reason}")]
    InvalidRange { range: String, reason: String },

    #[error("Failed to fetch allowlist from {url}: {reason}")]
    RemoteFetch { url: String, reason: String },

    #[error("Allowlist file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("No allowlist snapshot is available")]
    AllowlistUnavailable,

    #[error("Forwarding to {url} failed: {reason}")]
    Forward { url: String, reason: String },

    #[error("Invalid signing key")]
    SigningKey,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;
