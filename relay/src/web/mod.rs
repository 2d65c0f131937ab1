//! Web server module for the relay endpoints.
//!
//! - `GET /status`: aliveness plus a source checksum for deployment checks
//! - `POST /forward_webhook`: sender allowlist + signature check, then forward
//! - `POST /receive_webhook`: diagnostic sink that only logs
//!
//! The router must be served with connect info (`SocketAddr`) so the socket
//! peer address can be checked against the allowlist.

pub mod handlers;
pub mod sender;
pub mod signature;

use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

pub use handlers::{
    forward_webhook, receive_webhook, source_checksum, status, AppState, DetailResponse,
    StatusResponse,
};
pub use sender::{check_sender, forwarded_client_ip, is_trusted_sender};
pub use signature::{compute_digest, verify_signature, SIGNATURE_HEADER, SIGNATURE_PREFIX};

/// Build the relay router.
///
/// Bodies up to `MAX_BODY_BYTES` reach the handlers, which run the sender
/// check before anything else.
pub fn router(state: AppState) -> Router {
    let request_timeout = Duration::from_millis(state.config.request_timeout_ms);
    let max_body_bytes = state.config.max_body_bytes;

    Router::new()
        .route("/status", get(status))
        .route("/forward_webhook", post(forward_webhook))
        .route("/receive_webhook", post(receive_webhook))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}
