//! Sender authentication against the allowlist.
//!
//! Behind a reverse proxy the socket peer is the proxy itself, so the
//! address a proxy reports in a header is checked too. Either address being
//! in range is enough.

use axum::http::HeaderMap;

use crate::allowlist::{is_in_range, AllowlistCache, AllowlistSnapshot};
use crate::error::{RelayError, Result};

/// Preferred header for the originating client address.
pub const CLIENT_IP_HEADER: &str = "x-client-ip";

/// Fallback header, e.g. when running behind ngrok.
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// True if either address is inside `allowlist`.
pub fn is_trusted_sender(
    declared_ip: Option<&str>,
    forwarded_ip: Option<&str>,
    allowlist: &AllowlistSnapshot,
) -> bool {
    is_in_range(declared_ip, allowlist.ranges()) || is_in_range(forwarded_ip, allowlist.ranges())
}

/// Check the sender against whatever snapshot the cache currently holds.
///
/// Returns [`RelayError::AllowlistUnavailable`] when no snapshot has ever
/// been installed, which is not the same as the sender being rejected.
pub fn check_sender(
    cache: &AllowlistCache,
    declared_ip: Option<&str>,
    forwarded_ip: Option<&str>,
) -> Result<bool> {
    let snapshot = cache.current().ok_or(RelayError::AllowlistUnavailable)?;
    Ok(is_trusted_sender(declared_ip, forwarded_ip, &snapshot))
}

/// The proxy-reported client address.
///
/// `X-Client-IP` wins; otherwise the leftmost `X-Forwarded-For` entry, which
/// is the address the first proxy saw.
pub fn forwarded_client_ip(headers: &HeaderMap) -> Option<String> {
    if let Some(client_ip) = header_value(headers, CLIENT_IP_HEADER) {
        return Some(client_ip.to_string());
    }

    header_value(headers, FORWARDED_FOR_HEADER)
        .and_then(|list| list.split(',').next())
        .map(|first| first.trim().to_string())
        .filter(|first| !first.is_empty())
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
