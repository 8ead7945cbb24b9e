//! Request sending with an optional retry policy.
//!
//! Every upstream call goes through [`send_json`]. With the default policy a
//! request is attempted exactly once; a non-zero [`RetryPolicy`] retries
//! transient failures (timeouts, connection resets, HTTP 429, HTTP 5xx) with
//! exponential backoff. HTTP 4xx other than 429 is permanent and never
//! retried.

use std::time::Duration;

use crate::CartoError;

/// Maximum length of the response body preview kept in errors and logs.
const BODY_PREVIEW_LEN: usize = 500;

/// How many times to retry a transient failure, and how long to wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first one.
    pub max_retries: u32,
    /// Delay before the first retry. Doubles on every further retry.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::from_secs(1),
        }
    }

    fn delay(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

/// Sends the request built by `build_request` and decodes the body as JSON.
///
/// The closure is called once per attempt since a
/// [`reqwest::RequestBuilder`] is consumed by `.send()`.
///
/// # Errors
///
/// Returns [`CartoError`] if the request still fails after the policy's
/// retries, the status is not 2xx, or the body is not JSON.
#[allow(clippy::future_not_send)]
pub async fn send_json<F>(
    build_request: F,
    policy: &RetryPolicy,
    timeout: Duration,
) -> Result<serde_json::Value, CartoError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let response = send_inner(&build_request, policy, timeout).await?;
    let url = response.url().to_string();
    let status = response.status();

    let text = response
        .text()
        .await
        .map_err(|e| classify(e, timeout))?;

    serde_json::from_str(&text).map_err(|e| {
        log::error!(
            "JSON parse failed.\n  \
             url: {url}\n  \
             status: {status}\n  \
             received: {} bytes\n  \
             parse error: {e}\n  \
             body preview: {}",
            text.len(),
            preview(&text),
        );
        CartoError::Json(e)
    })
}

#[allow(clippy::future_not_send)]
async fn send_inner<F>(
    build_request: &F,
    policy: &RetryPolicy,
    timeout: Duration,
) -> Result<reqwest::Response, CartoError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut attempt = 0;

    loop {
        if attempt > 0 {
            let delay = policy.delay(attempt);
            log::warn!("  retry {attempt}/{} in {delay:?}...", policy.max_retries);
            tokio::time::sleep(delay).await;
        }
        let can_retry = attempt < policy.max_retries;
        attempt += 1;

        let response = match build_request().send().await {
            Ok(response) => response,
            Err(e) if can_retry && is_transient(&e) => {
                log::warn!("  transient error: {e}");
                continue;
            }
            Err(e) => return Err(classify(e, timeout)),
        };

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retryable =
            status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
        if retryable && can_retry {
            log::warn!("  HTTP {status}");
            continue;
        }

        let body = response.text().await.unwrap_or_default();
        return Err(CartoError::Status {
            status: status.as_u16(),
            body: preview(&body),
        });
    }
}

fn classify(e: reqwest::Error, timeout: Duration) -> CartoError {
    if e.is_timeout() {
        CartoError::Timeout { timeout }
    } else {
        CartoError::Http(e)
    }
}

/// Returns `true` if the error is likely transient and worth retrying.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_request()
}

fn preview(text: &str) -> String {
    if text.len() > BODY_PREVIEW_LEN {
        let mut end = BODY_PREVIEW_LEN;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &text[..end])
    } else {
        text.to_string()
    }
}
