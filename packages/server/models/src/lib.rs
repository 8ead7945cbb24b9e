#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API request and response types for the air-quality server.
//!
//! Query parameters are received as raw strings so that validation can
//! report every bad field at once instead of failing on the first one
//! `serde` cannot convert.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Query parameters for `GET /measurements`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MeasurementsQueryParams {
    /// Measurement variable (`so2`, `no2`, ...).
    pub variable: Option<String>,
    /// Aggregation function (`avg`, `max`, ...).
    pub measurement: Option<String>,
    /// Inclusive window start (ISO 8601).
    pub from: Option<String>,
    /// Exclusive window end (ISO 8601).
    pub to: Option<String>,
    /// Comma-separated station ids.
    pub stations: Option<String>,
}

/// Query parameters for `GET /timeseries`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimeseriesQueryParams {
    /// Measurement variable (`so2`, `no2`, ...).
    pub variable: Option<String>,
    /// Aggregation function (`avg`, `max`, ...).
    pub measurement: Option<String>,
    /// Inclusive window start (ISO 8601).
    pub from: Option<String>,
    /// Exclusive window end (ISO 8601).
    pub to: Option<String>,
    /// Time-bucket grain (`hour`, `day`, `week`).
    pub step: Option<String>,
    /// Comma-separated station ids.
    pub stations: Option<String>,
    /// `GeoJSON` Polygon restricting stations by location.
    pub geom: Option<String>,
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiHealth {
    /// Whether the service is healthy.
    pub healthy: bool,
    /// Service version.
    pub version: String,
}

/// Error body for rejected query parameters:
/// `{"errors": {"query": {"<field>": ["<message>", ...]}}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiValidationErrors {
    pub errors: QueryErrors,
}

/// Per-location validation messages. Only query-string parameters exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryErrors {
    /// Messages keyed by parameter name.
    pub query: BTreeMap<String, Vec<String>>,
}

impl ApiValidationErrors {
    #[must_use]
    pub const fn query(fields: BTreeMap<String, Vec<String>>) -> Self {
        Self {
            errors: QueryErrors { query: fields },
        }
    }
}

/// Error body for analytics service failures:
/// `{"errors": {"upstream": {"status": 500, "message": "..."}}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiUpstreamErrors {
    pub errors: UpstreamErrors,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamErrors {
    pub upstream: UpstreamErrorDetail,
}

/// What went wrong calling the analytics service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamErrorDetail {
    /// Upstream HTTP status, absent for transport failures and timeouts.
    pub status: Option<u16>,
    /// Human-readable description.
    pub message: String,
}

impl ApiUpstreamErrors {
    #[must_use]
    pub const fn new(status: Option<u16>, message: String) -> Self {
        Self {
            errors: UpstreamErrors {
                upstream: UpstreamErrorDetail { status, message },
            },
        }
    }
}
