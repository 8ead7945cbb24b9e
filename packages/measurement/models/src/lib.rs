#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Air-quality measurement taxonomy and typed request definitions.
//!
//! The enums in this crate are the closed sets that query parameters are
//! validated against. Because they are closed, their string forms are the
//! only client-influenced tokens allowed into aggregation query text.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Physical quantity recorded by a station. Each variant names a column of
/// the measurements table.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MeasurementVariable {
    /// Sulphur dioxide
    So2,
    /// Nitrogen dioxide
    No2,
    /// Carbon monoxide
    Co,
    /// Ozone
    O3,
    /// Particulate matter below 10 µm
    Pm10,
    /// Particulate matter below 2.5 µm
    #[serde(rename = "pm2_5")]
    #[strum(serialize = "pm2_5")]
    Pm25,
}

impl MeasurementVariable {
    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::So2,
            Self::No2,
            Self::Co,
            Self::O3,
            Self::Pm10,
            Self::Pm25,
        ]
    }
}

/// SQL aggregation function applied to a [`MeasurementVariable`].
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StatisticalAggregate {
    Avg,
    Max,
    Min,
    Sum,
    Count,
}

impl StatisticalAggregate {
    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Avg, Self::Max, Self::Min, Self::Sum, Self::Count]
    }
}

/// Time-bucket grain used by the timeseries endpoint.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TimeStep {
    Hour,
    Day,
    Week,
}

impl TimeStep {
    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Hour, Self::Day, Self::Week]
    }
}

/// Half-open time window: `from` is inclusive, `to` exclusive.
///
/// No ordering is enforced. A window with `from > to` matches nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Inclusive lower bound.
    pub from: DateTime<Utc>,
    /// Exclusive upper bound.
    pub to: DateTime<Utc>,
}

impl TimeRange {
    /// Creates a new time range.
    #[must_use]
    pub const fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }

    /// Returns whether `instant` falls inside the window.
    #[must_use]
    pub fn contains(&self, instant: &DateTime<Utc>) -> bool {
        *instant >= self.from && *instant < self.to
    }
}

/// Ordered list of station identifiers, duplicates allowed, every one of
/// which was present in the station directory at validation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationFilter {
    ids: Vec<String>,
}

impl StationFilter {
    /// Builds a filter after checking every id against `known`.
    ///
    /// # Errors
    ///
    /// Returns the ids not present in `known`, in request order and
    /// without duplicates, if there are any.
    pub fn from_known(ids: Vec<String>, known: &BTreeSet<String>) -> Result<Self, Vec<String>> {
        let mut unknown: Vec<String> = Vec::new();
        for id in &ids {
            if !known.contains(id) && !unknown.contains(id) {
                unknown.push(id.clone());
            }
        }

        if unknown.is_empty() {
            Ok(Self { ids })
        } else {
            Err(unknown)
        }
    }

    /// Station ids in request order.
    #[must_use]
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Returns whether `station_id` is selected by this filter.
    #[must_use]
    pub fn contains(&self, station_id: &str) -> bool {
        self.ids.iter().any(|id| id == station_id)
    }
}

/// A parsed `GeoJSON` Polygon used as a spatial containment predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryFilter {
    geometry: geojson::Geometry,
}

impl GeometryFilter {
    /// Wraps `geometry` if it is a Polygon.
    #[must_use]
    pub fn polygon(geometry: geojson::Geometry) -> Option<Self> {
        matches!(geometry.value, geojson::Value::Polygon(_)).then_some(Self { geometry })
    }

    /// The underlying geometry.
    #[must_use]
    pub const fn geometry(&self) -> &geojson::Geometry {
        &self.geometry
    }

    /// Serializes the polygon back to compact `GeoJSON` text.
    #[must_use]
    pub fn to_geojson_string(&self) -> String {
        self.geometry.to_string()
    }
}

/// Validated parameters for `GET /measurements`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementsRequest {
    pub variable: MeasurementVariable,
    pub aggregate: StatisticalAggregate,
    pub range: TimeRange,
    pub stations: Option<StationFilter>,
}

/// Validated parameters for `GET /timeseries`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeseriesRequest {
    pub variable: MeasurementVariable,
    pub aggregate: StatisticalAggregate,
    pub range: TimeRange,
    pub step: TimeStep,
    pub stations: Option<StationFilter>,
    pub geometry: Option<GeometryFilter>,
}
