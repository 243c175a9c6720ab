//! Shared HTTP plumbing for the remote embedding and completion providers.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! Retries default to zero; they are enabled per provider in the config.

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::warn;

/// Why a request never produced a successful response.
#[derive(Debug)]
pub(crate) enum SendFailure {
    Network(String),
    Status { status: u16, body: String },
}

/// Build a client with a whole-request timeout.
pub(crate) fn build_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .context("Failed to build HTTP client")
}

/// Join a base URL and a path without doubling the slash.
pub(crate) fn endpoint(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Send the request produced by `build`, retrying transient failures.
pub(crate) async fn send_with_retry<F>(
    service: &str,
    max_retries: u32,
    build: F,
) -> std::result::Result<reqwest::Response, SendFailure>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            warn!(service, attempt, ?delay, "retrying request");
            tokio::time::sleep(delay).await;
        }

        match build().send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return Ok(response);
                }

                let body = response.text().await.unwrap_or_default();
                let failure = SendFailure::Status {
                    status: status.as_u16(),
                    body,
                };
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(failure);
                    continue;
                }
                return Err(failure);
            }
            Err(e) => {
                last_err = Some(SendFailure::Network(format!("{service}: {e}")));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| SendFailure::Network(format!("{service}: no attempts made"))))
}
