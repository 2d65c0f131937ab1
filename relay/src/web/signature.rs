//! GitHub webhook signature verification.
//!
//! GitHub signs the raw request body with HMAC-SHA256 using the webhook
//! secret and sends `sha256=<lowercase hex>` in `X-Hub-Signature-256`.
//! Reference: https://docs.github.com/en/webhooks/using-webhooks/validating-webhook-deliveries

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::error::{RelayError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the body signature.
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Prefix in front of the hex digest.
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// HMAC-SHA256 of `body` under `key`, as lowercase hex.
pub fn compute_digest(key: &[u8], body: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| RelayError::SigningKey)?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verify a GitHub webhook signature.
///
/// # Arguments
///
/// * `body` - The request body exactly as received, before any JSON parsing
/// * `key` - The shared webhook secret
/// * `supplied` - The `X-Hub-Signature-256` header value, if present
///
/// # Returns
///
/// `true` only if `supplied` equals `sha256=` + the locally computed digest.
pub fn verify_signature(body: &[u8], key: &str, supplied: Option<&str>) -> bool {
    let supplied = match supplied {
        Some(s) if !s.is_empty() => s,
        _ => {
            warn!(body_length = body.len(), "signature_missing");
            return false;
        }
    };

    let expected = match compute_digest(key.as_bytes(), body) {
        Ok(digest) => format!("{}{}", SIGNATURE_PREFIX, digest),
        Err(e) => {
            warn!(error = %e, "signature_invalid_key");
            return false;
        }
    };

    let valid = constant_time_eq(&expected, supplied);

    if !valid {
        warn!(
            expected_length = expected.len(),
            actual_length = supplied.len(),
            has_prefix = supplied.starts_with(SIGNATURE_PREFIX),
            "signature_mismatch"
        );
    }

    valid
}

/// Equality whose running time does not depend on where the inputs differ.
fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
