//! hookrelay - Authenticated webhook relay.
//!
//! Receives GitHub webhooks, checks that they come from a published sender
//! range and carry a valid HMAC-SHA256 signature, then forwards the body
//! unchanged to a configured target.
//!
//! ## Architecture
//!
//! ```text
//! POST /forward_webhook
//!   → sender check (AllowlistCache + CIDR match)   ─ 403 Invalid sender IP
//!   → signature check (raw body, constant time)    ─ 403 Invalid signature
//!   → Forwarder::forward(TARGET_URL, body)         ─ 502 Forwarding failed
//!   → 200 Webhook accepted
//! ```

pub mod allowlist;
pub mod config;
pub mod error;
pub mod forward;
pub mod web;

// Re-export commonly used types
pub use allowlist::{AllowlistCache, AllowlistSnapshot, AllowlistSource, NetworkRange};
pub use config::{Config, Secret};
pub use error::{RelayError, Result};
pub use forward::{Forwarder, HttpForwarder};
pub use web::AppState;
