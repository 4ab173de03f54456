use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};
use tokio::time::sleep;
use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryConfig {
    pub timeout_secs: Option<u64>,
    pub retries: u32,
    pub retry_delay_ms: u64,
}

impl RetryConfig {
    /// Single attempt with no timeout.
    pub const ONCE: RetryConfig = RetryConfig {
        timeout_secs: None,
        retries: 0,
        retry_delay_ms: 0,
    };
}

#[derive(Debug)]
pub(crate) enum RequestFailure {
    Request(reqwest::Error),
    Api { status: StatusCode, body: String },
}

/// Sends the request produced by `build` until it succeeds or the retry
/// budget runs out. `build` is called once per attempt because a
/// `RequestBuilder` is consumed by `send`.
pub(crate) async fn send_with_retry<F>(
    build: F,
    config: RetryConfig,
) -> Result<Response, RequestFailure>
where
    F: Fn() -> RequestBuilder,
{
    let max_attempts = config.retries.saturating_add(1);
    let mut attempt = 0;

    loop {
        let mut request = build();
        if let Some(timeout_secs) = config.timeout_secs {
            request = request.timeout(Duration::from_secs(timeout_secs));
        }

        let failure = match request.send().await {
            Ok(response) if response.status().is_success() => return Ok(response),
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                let retryable = is_retryable_status(status);
                (RequestFailure::Api { status, body }, retryable)
            }
            Err(source) => {
                let retryable = is_retryable_request_error(&source);
                (RequestFailure::Request(source), retryable)
            }
        };

        match failure {
            (failure, true) if attempt + 1 < max_attempts => {
                let delay = retry_delay(attempt, config.retry_delay_ms);
                warn!(
                    attempt = attempt + 1,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %describe(&failure),
                    "retrying chat request"
                );
                sleep(delay).await;
                attempt += 1;
            }
            (failure, _) => return Err(failure),
        }
    }
}

fn describe(failure: &RequestFailure) -> String {
    match failure {
        RequestFailure::Request(source) => source.to_string(),
        RequestFailure::Api { status, .. } => format!("status {status}"),
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_retryable_request_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

fn retry_delay(attempt: u32, base_ms: u64) -> Duration {
    let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    let delay_ms = base_ms.saturating_mul(factor).min(30_000);
    Duration::from_millis(delay_ms)
}
