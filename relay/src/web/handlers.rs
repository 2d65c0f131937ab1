//! HTTP endpoint handlers.
//!
//! `/forward_webhook` runs the checks in a fixed order and stops at the
//! first failure:
//! 1. Sender address in the allowlist
//! 2. Signature over the raw body
//! 3. Body is JSON
//! 4. Forward to the target
//!
//! Nothing is forwarded unless both trust checks pass.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};

use crate::allowlist::{AllowlistCache, SnapshotOrigin};
use crate::forward::Forwarder;
use crate::web::sender::{check_sender, forwarded_client_ip};
use crate::web::signature::{verify_signature, SIGNATURE_HEADER};
use crate::Config;

/// Sources hashed into the `/status` checksum.
const RELAY_SOURCES: &[&str] = &[
    include_str!("handlers.rs"),
    include_str!("sender.rs"),
    include_str!("signature.rs"),
];

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub allowlist: AllowlistCache,
    pub forwarder: Arc<dyn Forwarder>,
    checksum: Arc<str>,
}

impl AppState {
    pub fn new(config: Config, allowlist: AllowlistCache, forwarder: Arc<dyn Forwarder>) -> Self {
        Self {
            config: Arc::new(config),
            allowlist,
            forwarder,
            checksum: source_checksum().into(),
        }
    }
}

/// SHA-256 over the request-handling sources compiled into this binary.
///
/// Lets a deployment be checked against a given checkout.
pub fn source_checksum() -> String {
    let mut hasher = Sha256::new();
    for source in RELAY_SOURCES {
        hasher.update(source.as_bytes());
    }
    hex::encode(hasher.finalize())
}

// =============================================================================
// Status
// =============================================================================

/// Status response.
#[derive(Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub checksum: String,
    pub insecure_defaults: bool,
    pub allowlist_source: Option<SnapshotOrigin>,
    pub allowlist_ranges: usize,
}

/// Aliveness check.
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let snapshot = state.allowlist.current();

    Json(StatusResponse {
        status: "alive",
        checksum: state.checksum.to_string(),
        insecure_defaults: state.config.insecure_defaults,
        allowlist_source: snapshot.as_ref().map(|s| s.origin()),
        allowlist_ranges: snapshot.as_ref().map(|s| s.len()).unwrap_or(0),
    })
}

// =============================================================================
// Webhooks
// =============================================================================

/// Body of every webhook response.
#[derive(Debug, Serialize)]
pub struct DetailResponse {
    pub detail: &'static str,
}

fn detail(status: StatusCode, detail: &'static str) -> (StatusCode, Json<DetailResponse>) {
    (status, Json(DetailResponse { detail }))
}

/// Verify a webhook and forward it to the configured target.
pub async fn forward_webhook(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<DetailResponse>) {
    let sender_ip = connect_info.map(|ConnectInfo(addr)| addr.ip().to_string());
    let sender_x_ip = forwarded_client_ip(&headers);

    // First check: sender address
    match check_sender(
        &state.allowlist,
        sender_ip.as_deref(),
        sender_x_ip.as_deref(),
    ) {
        Ok(true) => {
            info!(
                sender_ip = ?sender_ip,
                sender_x_ip = ?sender_x_ip,
                "webhook_sender_valid"
            );
        }
        Ok(false) => {
            warn!(
                sender_ip = ?sender_ip,
                sender_x_ip = ?sender_x_ip,
                "webhook_sender_invalid"
            );
            return detail(StatusCode::FORBIDDEN, "Invalid sender IP");
        }
        Err(e) => {
            error!(error = %e, "webhook_sender_check_failed");
            return detail(StatusCode::INTERNAL_SERVER_ERROR, "Error checking sender IPs");
        }
    }

    // Second check: signature over the exact received bytes
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    if !verify_signature(&body, state.config.webhook_secret.expose(), signature) {
        warn!(
            has_signature = signature.is_some(),
            body_length = body.len(),
            "webhook_signature_invalid"
        );
        return detail(StatusCode::FORBIDDEN, "Invalid signature");
    }

    let event = headers
        .get("x-github-event")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");

    if let Err(e) = serde_json::from_slice::<serde_json::Value>(&body) {
        warn!(error = %e, event = event, "webhook_payload_not_json");
        return detail(StatusCode::BAD_REQUEST, "Invalid JSON payload");
    }

    info!(event = event, body_length = body.len(), "webhook_signature_valid_forwarding");

    if let Err(e) = state.forwarder.forward(&state.config.target_url, body).await {
        error!(error = %e, event = event, "webhook_forward_failed");
        return detail(StatusCode::BAD_GATEWAY, "Forwarding failed");
    }

    info!(event = event, "webhook_accepted");

    detail(StatusCode::OK, "Webhook accepted")
}

/// Diagnostic endpoint: log the payload and acknowledge it.
pub async fn receive_webhook(Json(payload): Json<serde_json::Value>) -> Json<DetailResponse> {
    info!("webhook_received");
    debug!(payload = %payload, "webhook_received_payload");

    Json(DetailResponse {
        detail: "Webhook received",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{header::CONTENT_TYPE, Request},
        Router,
    };
    use parking_lot::Mutex;
    use tower::ServiceExt;

    use crate::allowlist::AllowlistSnapshot;
    use crate::error::{RelayError, Result};
    use crate::web::signature::compute_digest;

    const SECRET: &str = "test-secret";
    const GITHUB_IP: &str = "192.30.252.7";
    const NON_GITHUB_IP: &str = "14.197.102.222";
    const PAYLOAD: &str = r#"{"zen":"Keep it logically awesome.","hook_id":1}"#;

    #[derive(Default)]
    struct RecordingForwarder {
        calls: Mutex<Vec<(String, Bytes)>>,
        fail: bool,
    }

    #[async_trait]
    impl Forwarder for RecordingForwarder {
        async fn forward(&self, url: &str, payload: Bytes) -> Result<()> {
            self.calls.lock().push((url.to_string(), payload));
            if self.fail {
                return Err(RelayError::Forward {
                    url: url.to_string(),
                    reason: "downstream returned 503".to_string(),
                });
            }
            Ok(())
        }
    }

    fn config() -> Config {
        Config::from_vars(|name| match name {
            "TARGET_URL" => Some("http://downstream.test/hook".to_string()),
            "WEBHOOK_TOKEN_SECRET" => Some(SECRET.to_string()),
            _ => None,
        })
        .unwrap()
    }

    fn app_with(forwarder: Arc<RecordingForwarder>, allowlist: Option<&[&str]>) -> Router {
        let cache = AllowlistCache::new(reqwest::Client::new(), Duration::from_secs(1));
        if let Some(entries) = allowlist {
            cache.install(
                AllowlistSnapshot::parse_strict(entries, SnapshotOrigin::Override).unwrap(),
            );
        }
        let state = AppState::new(config(), cache, forwarder);
        crate::web::router(state)
    }

    fn app(forwarder: Arc<RecordingForwarder>) -> Router {
        app_with(forwarder, Some(&["192.30.252.0/22"][..]))
    }

    fn sign(body: &str) -> String {
        format!("sha256={}", compute_digest(SECRET.as_bytes(), body.as_bytes()).unwrap())
    }

    fn webhook(peer: &str, signature: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/forward_webhook")
            .header(CONTENT_TYPE, "application/json")
            .header("x-github-event", "ping");
        if let Some(signature) = signature {
            builder = builder.header(SIGNATURE_HEADER, signature);
        }
        let mut request = builder.body(Body::from(body.to_string())).unwrap();
        let addr: SocketAddr = format!("{}:443", peer).parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));
        request
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_status() {
        let app = app(Arc::new(RecordingForwarder::default()));
        let request = Request::builder()
            .uri("/status")
            .body(Body::empty())
            .unwrap();

        let (status, body) = send(app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "alive");
        assert_eq!(body["checksum"], source_checksum());
        assert_eq!(body["insecure_defaults"], false);
        assert_eq!(body["allowlist_source"], "override");
        assert_eq!(body["allowlist_ranges"], 1);
    }

    #[tokio::test]
    async fn test_status_without_allowlist() {
        let app = app_with(Arc::new(RecordingForwarder::default()), None);
        let request = Request::builder()
            .uri("/status")
            .body(Body::empty())
            .unwrap();

        let (status, body) = send(app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "alive");
        assert!(body["allowlist_source"].is_null());
        assert_eq!(body["allowlist_ranges"], 0);
    }

    #[test]
    fn test_source_checksum_is_stable_hex() {
        let checksum = source_checksum();
        assert_eq!(checksum.len(), 64);
        assert!(checksum.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(checksum, source_checksum());
    }

    #[tokio::test]
    async fn test_invalid_sender_invalid_signature() {
        let forwarder = Arc::new(RecordingForwarder::default());
        let request = webhook(NON_GITHUB_IP, Some("sha256=deadbeef"), PAYLOAD);

        let (status, body) = send(app(forwarder.clone()), request).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["detail"], "Invalid sender IP");
        assert!(forwarder.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_sender_valid_signature_checks_sender_first() {
        let forwarder = Arc::new(RecordingForwarder::default());
        let request = webhook(NON_GITHUB_IP, Some(&sign(PAYLOAD)), PAYLOAD);

        let (status, body) = send(app(forwarder.clone()), request).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["detail"], "Invalid sender IP");
        assert!(forwarder.calls.lock().is_empty());
    }

    /// A JSON document of roughly `size` bytes.
    fn large_payload(size: usize) -> String {
        format!(r#"{{"zen":"Large delivery.","padding":"{}"}}"#, "a".repeat(size))
    }

    #[tokio::test]
    async fn test_large_body_from_invalid_sender_is_rejected_as_sender() {
        let forwarder = Arc::new(RecordingForwarder::default());
        let payload = large_payload(3 * 1024 * 1024);
        let request = webhook(NON_GITHUB_IP, Some(&sign(&payload)), &payload);

        let (status, body) = send(app(forwarder.clone()), request).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["detail"], "Invalid sender IP");
        assert!(forwarder.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_large_body_from_valid_sender_is_forwarded() {
        let forwarder = Arc::new(RecordingForwarder::default());
        let payload = large_payload(3 * 1024 * 1024);
        let request = webhook(GITHUB_IP, Some(&sign(&payload)), &payload);

        let (status, body) = send(app(forwarder.clone()), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["detail"], "Webhook accepted");

        let calls = forwarder.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1.len(), payload.len());
    }

    #[tokio::test]
    async fn test_valid_sender_invalid_signature() {
        let forwarder = Arc::new(RecordingForwarder::default());
        let request = webhook(GITHUB_IP, Some(&sign("a different body")), PAYLOAD);

        let (status, body) = send(app(forwarder.clone()), request).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["detail"], "Invalid signature");
        assert!(forwarder.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_valid_sender_missing_signature() {
        let forwarder = Arc::new(RecordingForwarder::default());
        let request = webhook(GITHUB_IP, None, PAYLOAD);

        let (status, body) = send(app(forwarder.clone()), request).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["detail"], "Invalid signature");
    }

    #[tokio::test]
    async fn test_valid_sender_valid_signature_forwards_exact_bytes() {
        let forwarder = Arc::new(RecordingForwarder::default());
        let request = webhook(GITHUB_IP, Some(&sign(PAYLOAD)), PAYLOAD);

        let (status, body) = send(app(forwarder.clone()), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["detail"], "Webhook accepted");

        let calls = forwarder.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "http://downstream.test/hook");
        assert_eq!(calls[0].1, Bytes::from(PAYLOAD));
    }

    #[tokio::test]
    async fn test_proxy_header_alone_is_enough() {
        let forwarder = Arc::new(RecordingForwarder::default());
        let mut request = webhook(NON_GITHUB_IP, Some(&sign(PAYLOAD)), PAYLOAD);
        request
            .headers_mut()
            .insert("x-forwarded-for", GITHUB_IP.parse().unwrap());

        let (status, body) = send(app(forwarder), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["detail"], "Webhook accepted");
    }

    #[tokio::test]
    async fn test_no_peer_address_and_no_headers_is_rejected() {
        let forwarder = Arc::new(RecordingForwarder::default());
        let mut request = webhook(GITHUB_IP, Some(&sign(PAYLOAD)), PAYLOAD);
        request.extensions_mut().remove::<ConnectInfo<SocketAddr>>();

        let (status, body) = send(app(forwarder), request).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["detail"], "Invalid sender IP");
    }

    #[tokio::test]
    async fn test_missing_allowlist_is_internal_error() {
        let forwarder = Arc::new(RecordingForwarder::default());
        let request = webhook(GITHUB_IP, Some(&sign(PAYLOAD)), PAYLOAD);

        let (status, body) = send(app_with(forwarder.clone(), None), request).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["detail"], "Error checking sender IPs");
        assert!(forwarder.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_signed_non_json_body_is_rejected() {
        let forwarder = Arc::new(RecordingForwarder::default());
        let body = "payload=not-json";
        let request = webhook(GITHUB_IP, Some(&sign(body)), body);

        let (status, response) = send(app(forwarder.clone()), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response["detail"], "Invalid JSON payload");
        assert!(forwarder.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_forward_failure_is_bad_gateway() {
        let forwarder = Arc::new(RecordingForwarder {
            fail: true,
            ..Default::default()
        });
        let request = webhook(GITHUB_IP, Some(&sign(PAYLOAD)), PAYLOAD);

        let (status, body) = send(app(forwarder.clone()), request).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["detail"], "Forwarding failed");
        assert_eq!(forwarder.calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_receive_webhook() {
        let app = app(Arc::new(RecordingForwarder::default()));
        let request = Request::builder()
            .method("POST")
            .uri("/receive_webhook")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"body":"test"}"#))
            .unwrap();

        let (status, body) = send(app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["detail"], "Webhook received");
    }
}
