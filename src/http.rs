//! JSON-over-HTTP calls with retry and exponential backoff.
//!
//! Shared by the embedding providers and the remote vector index:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors (including timeouts) → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// A request that failed after any retries.
#[derive(Debug, Error)]
#[error("{message}")]
pub(crate) struct HttpError {
    /// Status of the last response, or `None` if the server never answered.
    pub status: Option<u16>,
    message: String,
}

impl HttpError {
    fn network(message: String) -> Self {
        Self {
            status: None,
            message,
        }
    }

    fn from_status(status: reqwest::StatusCode, message: String) -> Self {
        Self {
            status: Some(status.as_u16()),
            message,
        }
    }
}

/// Build a client whose every request is bounded by `timeout_secs`.
pub(crate) fn client(timeout_secs: u64) -> Result<reqwest::Client, String> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| format!("failed to build HTTP client: {}", e))
}

/// POST `body` to `url` and decode the JSON response.
///
/// Each caller wraps the [`HttpError`] in its own error variant; the
/// status is kept for callers that treat particular codes as benign.
pub(crate) async fn post_json(
    client: &reqwest::Client,
    url: &str,
    headers: &[(&str, &str)],
    body: &serde_json::Value,
    max_retries: u32,
) -> Result<serde_json::Value, HttpError> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            debug!(url, attempt, ?delay, "retrying request");
            tokio::time::sleep(delay).await;
        }

        let mut request = client.post(url).json(body);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response.json::<serde_json::Value>().await.map_err(|e| {
                        HttpError::from_status(status, format!("invalid JSON from {}: {}", url, e))
                    });
                }

                let body_text = response.text().await.unwrap_or_default();
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(HttpError::from_status(
                        status,
                        format!("{} returned {}: {}", url, status, body_text),
                    ));
                    continue;
                }

                return Err(HttpError::from_status(
                    status,
                    format!("{} returned {}: {}", url, status, body_text),
                ));
            }
            Err(e) => {
                last_err = Some(HttpError::network(format!("request to {} failed: {}", url, e)));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| {
        HttpError::network(format!("request to {} failed after retries", url))
    }))
}
