//! Blocking HTTP plumbing shared by the provider clients.

use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::{RequestBuilder, Response};
use reqwest::StatusCode;
use thiserror::Error;
use tracing::warn;

/// Non-success response that survived all retries.
#[derive(Debug, Error)]
#[error("{label} request failed ({status}): {body}")]
pub struct StatusError {
    /// Which call failed (e.g. "OpenAI embeddings").
    pub label: String,
    /// Final HTTP status.
    pub status: StatusCode,
    /// Response body, or a placeholder when unreadable.
    pub body: String,
}

/// Returns the HTTP status carried by an error chain, if any.
pub fn status_of(err: &anyhow::Error) -> Option<StatusCode> {
    err.downcast_ref::<StatusError>().map(|e| e.status)
}

/// Sends the request built by `build`, retrying rate limits, server errors
/// and transport failures with exponential backoff. At most `max_attempts`
/// requests go out.
pub fn send_with_retry<F>(label: &str, max_attempts: usize, mut build: F) -> Result<Response>
where
    F: FnMut() -> RequestBuilder,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0usize;
    loop {
        match build().send() {
            Ok(resp) => {
                let status = resp.status();
                if status.is_success() {
                    return Ok(resp);
                }
                let body = resp
                    .text()
                    .unwrap_or_else(|_| "<body unavailable>".to_string());
                if should_retry(status) && attempt + 1 < max_attempts {
                    attempt += 1;
                    let delay = retry_backoff(attempt);
                    warn!(%label, %status, attempt, delay_ms = delay.as_millis() as u64, "retrying request");
                    thread::sleep(delay);
                    continue;
                }
                return Err(StatusError {
                    label: label.to_string(),
                    status,
                    body,
                }
                .into());
            }
            Err(err) => {
                if is_retryable_error(&err) && attempt + 1 < max_attempts {
                    attempt += 1;
                    let delay = retry_backoff(attempt);
                    warn!(%label, error = %err, attempt, delay_ms = delay.as_millis() as u64, "retrying request");
                    thread::sleep(delay);
                    continue;
                }
                return Err(err).with_context(|| format!("{label} request failed"));
            }
        }
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_body() || err.is_request()
}

#[cfg(not(test))]
fn retry_backoff(attempt: usize) -> Duration {
    let capped = attempt.min(5) as u32;
    Duration::from_millis(500 * (1 << capped))
}

#[cfg(test)]
fn retry_backoff(attempt: usize) -> Duration {
    Duration::from_millis(attempt.min(5) as u64)
}
