//! Configuration module for environment variable parsing.
//!
//! Everything is read once at startup. The two security-relevant values,
//! `TARGET_URL` and `WEBHOOK_TOKEN_SECRET`, fall back to test defaults when
//! unset; that is recorded in [`Config::insecure_defaults`] and logged at
//! error level rather than substituted silently.

use std::env;
use std::fmt;
use std::path::PathBuf;

use tracing::{error, warn};
use url::Url;

use crate::error::{RelayError, Result};

/// Test forward target used when `TARGET_URL` is unset.
pub const DEFAULT_TARGET_URL: &str = "http://receiver:9001";

/// Test secret used when `WEBHOOK_TOKEN_SECRET` is unset.
pub const DEFAULT_WEBHOOK_SECRET: &str = "hello";

/// GitHub's published metadata endpoint, which lists webhook sender ranges under `hooks`.
pub const DEFAULT_META_API_URL: &str = "https://api.github.com/meta";

/// Where the last good allowlist is persisted for offline bootstrap.
pub const DEFAULT_ALLOWLIST_PATH: &str = "meta_api_output.json";

/// GitHub caps webhook payloads at 25 MB.
pub const DEFAULT_MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

/// Shared HMAC key. `Debug` output never contains the value.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port for the web server to listen on
    pub port: u16,

    /// Downstream endpoint that verified payloads are POSTed to
    pub target_url: String,

    /// HMAC-SHA256 key shared with the webhook sender
    pub webhook_secret: Secret,

    /// True when either `TARGET_URL` or `WEBHOOK_TOKEN_SECRET` fell back to a test default
    pub insecure_defaults: bool,

    // =========================================================================
    // Allowlist
    // =========================================================================

    /// Directory service queried for the sender ranges
    pub meta_api_url: String,

    /// Local snapshot file
    pub allowlist_path: PathBuf,

    /// Operator-supplied ranges; when set, no remote call is made
    pub allowlist_override: Option<Vec<String>>,

    /// Timeout for the directory service request in milliseconds
    pub allowlist_fetch_timeout_ms: u64,

    /// Background refresh interval in seconds, 0 disables it
    pub allowlist_refresh_secs: u64,

    // =========================================================================
    // Timeouts
    // =========================================================================

    /// Timeout for the downstream POST in milliseconds
    pub forward_timeout_ms: u64,

    /// Upper bound on handling one inbound request in milliseconds
    pub request_timeout_ms: u64,

    /// Largest accepted request body in bytes
    pub max_body_bytes: usize,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let target_url = non_empty(lookup("TARGET_URL"));
        let webhook_secret = non_empty(lookup("WEBHOOK_TOKEN_SECRET"));
        let insecure_defaults = target_url.is_none() || webhook_secret.is_none();

        if insecure_defaults {
            error!(
                target_url_set = target_url.is_some(),
                webhook_secret_set = webhook_secret.is_some(),
                "config_insecure_defaults_active"
            );
        }

        let config = Config {
            port: parse_number(&lookup, "PORT", 8080),
            target_url: target_url.unwrap_or_else(|| DEFAULT_TARGET_URL.to_string()),
            webhook_secret: Secret::new(
                webhook_secret.unwrap_or_else(|| DEFAULT_WEBHOOK_SECRET.to_string()),
            ),
            insecure_defaults,
            meta_api_url: non_empty(lookup("META_API_URL"))
                .unwrap_or_else(|| DEFAULT_META_API_URL.to_string()),
            allowlist_path: non_empty(lookup("ALLOWLIST_PATH"))
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_ALLOWLIST_PATH)),
            allowlist_override: parse_csv(lookup("ALLOWLIST_OVERRIDE")),
            allowlist_fetch_timeout_ms: parse_number(&lookup, "ALLOWLIST_FETCH_TIMEOUT_MS", 5000),
            allowlist_refresh_secs: parse_number(&lookup, "ALLOWLIST_REFRESH_SECS", 0),
            forward_timeout_ms: parse_number(&lookup, "FORWARD_TIMEOUT_MS", 8000),
            request_timeout_ms: parse_number(&lookup, "REQUEST_TIMEOUT_MS", 30_000),
            max_body_bytes: parse_number(&lookup, "MAX_BODY_BYTES", DEFAULT_MAX_BODY_BYTES),
        };

        validate_url("TARGET_URL", &config.target_url)?;
        validate_url("META_API_URL", &config.meta_api_url)?;

        Ok(config)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn validate_url(name: &str, value: &str) -> Result<()> {
    let url = Url::parse(value)
        .map_err(|e| RelayError::Config(format!("{} is not a valid URL ({}): {}", name, value, e)))?;

    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(RelayError::Config(format!(
            "{} must use http or https, got {}",
            name, other
        ))),
    }
}

/// Parse a numeric variable, warning and falling back on garbage.
fn parse_number<F, T>(lookup: &F, name: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr + Copy,
{
    let raw = match lookup(name) {
        Some(v) => v,
        None => return default,
    };

    match raw.trim().parse() {
        Ok(v) => v,
        Err(_) => {
            warn!(env_var = name, value = %raw, "Invalid numeric value, using default");
            default
        }
    }
}

/// Parse a comma-separated list of strings.
fn parse_csv(raw: Option<String>) -> Option<Vec<String>> {
    raw.map(|raw| {
        raw.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
    })
    .filter(|list| !list.is_empty())
}
