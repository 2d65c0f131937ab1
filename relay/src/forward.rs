//! Downstream delivery of verified payloads.

use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use reqwest::{header::CONTENT_TYPE, Client};
use tracing::{error, info};

use crate::error::{RelayError, Result};

/// Delivers a verified payload to the configured target.
#[async_trait]
pub trait Forwarder: Send + Sync {
    /// POST `payload` to `url`. Any failure, including a non-2xx status,
    /// is an error.
    async fn forward(&self, url: &str, payload: Bytes) -> Result<()>;
}

/// [`Forwarder`] backed by a shared reqwest client.
#[derive(Clone)]
pub struct HttpForwarder {
    client: Client,
    timeout: Duration,
}

impl HttpForwarder {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl Forwarder for HttpForwarder {
    async fn forward(&self, url: &str, payload: Bytes) -> Result<()> {
        let body_length = payload.len();

        info!(
            url = url,
            body_length = body_length,
            timeout_seconds = self.timeout.as_secs_f64(),
            "forward_starting"
        );

        let result = self
            .client
            .post(url)
            .timeout(self.timeout)
            .header(CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await;

        let response = match result {
            Ok(resp) => resp,
            Err(e) => {
                if e.is_timeout() {
                    error!(
                        url = url,
                        timeout_seconds = self.timeout.as_secs_f64(),
                        error = %e,
                        "forward_timeout"
                    );
                } else {
                    error!(url = url, error = %e, "forward_request_error");
                }
                return Err(RelayError::Forward {
                    url: url.to_string(),
                    reason: e.to_string(),
                });
            }
        };

        let status = response.status();
        if !status.is_success() {
            error!(url = url, status_code = status.as_u16(), "forward_rejected");
            return Err(RelayError::Forward {
                url: url.to_string(),
                reason: format!("downstream returned {}", status),
            });
        }

        info!(
            url = url,
            status_code = status.as_u16(),
            body_length = body_length,
            "forward_complete"
        );

        Ok(())
    }
}
