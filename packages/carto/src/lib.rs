#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Client for the Carto SQL API.
//!
//! The SQL API executes a single statement passed as the `q` query
//! parameter and answers with `{"rows": [...], "total_rows": N}`. Successful
//! bodies are returned untouched so callers can relay them verbatim.

mod retry;

use std::time::Duration;

use airquality_query::SqlQuery;
use async_trait::async_trait;

pub use retry::RetryPolicy;

/// Default Carto SQL API endpoint for the air-quality dataset.
pub const DEFAULT_API_URL: &str = "https://aasuero.carto.com:443/api/v2/sql";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur while talking to the analytics service.
#[derive(Debug, thiserror::Error)]
pub enum CartoError {
    /// Connection or protocol failure.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// No response within the configured timeout.
    #[error("Request timed out after {timeout:?}")]
    Timeout {
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The service answered with a non-2xx status.
    #[error("Upstream returned HTTP {status}: {body}")]
    Status {
        /// Upstream status code.
        status: u16,
        /// Leading part of the upstream response body.
        body: String,
    },

    /// The response body was not valid JSON.
    #[error("Invalid JSON from upstream: {0}")]
    Json(#[from] serde_json::Error),
}

impl CartoError {
    /// The upstream HTTP status, when the service answered at all.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http(_) | Self::Timeout { .. } | Self::Json(_) => None,
        }
    }
}

/// Executes composed queries against a SQL-over-HTTP service.
#[async_trait]
pub trait SqlApi: Send + Sync {
    /// Runs `query` and returns the decoded response body.
    ///
    /// # Errors
    ///
    /// Returns [`CartoError`] if the request fails, times out, the service
    /// answers with a non-2xx status, or the body is not JSON.
    async fn query(&self, query: &SqlQuery) -> Result<serde_json::Value, CartoError>;
}

/// Connection settings for [`CartoClient`].
#[derive(Debug, Clone)]
pub struct CartoConfig {
    /// SQL API URL (e.g., `"https://aasuero.carto.com:443/api/v2/sql"`).
    pub api_url: String,
    /// API key, sent as the `api_key` parameter when set.
    pub api_key: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Retry behaviour for transient failures.
    pub retry: RetryPolicy,
}

impl Default for CartoConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: None,
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

/// [`SqlApi`] implementation backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct CartoClient {
    client: reqwest::Client,
    config: CartoConfig,
}

impl CartoClient {
    /// Creates a client with the configured timeout applied to every request.
    ///
    /// # Errors
    ///
    /// Returns [`CartoError::Http`] if the underlying HTTP client cannot be
    /// constructed.
    pub fn new(config: CartoConfig) -> Result<Self, CartoError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    /// The settings this client was built with.
    #[must_use]
    pub const fn config(&self) -> &CartoConfig {
        &self.config
    }
}

#[async_trait]
impl SqlApi for CartoClient {
    async fn query(&self, query: &SqlQuery) -> Result<serde_json::Value, CartoError> {
        let sql = query.to_inline_sql();
        log::trace!("Carto query: {sql}");

        let mut params: Vec<(&str, &str)> = vec![("q", sql.as_str())];
        if let Some(key) = &self.config.api_key {
            params.push(("api_key", key.as_str()));
        }

        retry::send_json(
            || self.client.get(&self.config.api_url).query(&params),
            &self.config.retry,
            self.config.timeout,
        )
        .await
    }
}
