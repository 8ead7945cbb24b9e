//! Single-parameter checks. Each returns the message to report under the
//! parameter's name on failure.

use std::fmt::Display;
use std::str::FromStr;

use airquality_measurement_models::GeometryFilter;
use chrono::{DateTime, NaiveDateTime, Utc};

pub const MISSING: &str = "Missing data for required field.";
pub const INVALID_DATETIME: &str = "Not a valid datetime.";
pub const INVALID_JSON: &str = "Not a valid JSON string.";
pub const NOT_A_POLYGON: &str = "Invalid GeoJSON type: expected Polygon.";
pub const INVALID_POLYGON: &str = "Not a valid Polygon geometry.";

/// Offset forms RFC 3339 leaves out: minute precision and `+hhmm`.
/// `%z` accepts the offset with or without a colon.
const AWARE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M%z",
    "%Y-%m-%d %H:%M%z",
];

/// Naive forms, interpreted as UTC. `%.f` also matches no fraction.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

pub fn required(value: Option<&str>) -> Result<&str, String> {
    value.ok_or_else(|| MISSING.to_string())
}

/// Parses `value` as one of `allowed`.
pub fn one_of<T>(value: &str, allowed: &[T]) -> Result<T, String>
where
    T: FromStr + Display,
{
    value.parse().map_err(|_| {
        let names: Vec<String> = allowed.iter().map(ToString::to_string).collect();
        format!("Must be one of: {}.", names.join(", "))
    })
}

pub fn timestamp(value: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(aware) = DateTime::parse_from_rfc3339(value) {
        return Ok(aware.with_timezone(&Utc));
    }

    let zoned = value
        .strip_suffix(['Z', 'z'])
        .map_or_else(|| value.to_string(), |rest| format!("{rest}+00:00"));
    if let Some(aware) = AWARE_FORMATS
        .iter()
        .find_map(|format| DateTime::parse_from_str(&zoned, format).ok())
    {
        return Ok(aware.with_timezone(&Utc));
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| INVALID_DATETIME.to_string())
}

/// Splits a comma-separated list, keeping order and duplicates.
pub fn station_ids(value: &str) -> Vec<String> {
    value.split(',').map(|id| id.trim().to_string()).collect()
}

pub fn unknown_stations(unknown: &[String]) -> String {
    format!("Unknown station id(s): {}.", unknown.join(", "))
}

/// Parses a `GeoJSON` Polygon. The `type` member must be exactly
/// `"Polygon"`; every ring needs at least four positions and must be closed.
pub fn polygon(value: &str) -> Result<GeometryFilter, String> {
    let json: serde_json::Value =
        serde_json::from_str(value).map_err(|_| INVALID_JSON.to_string())?;

    if json.get("type").and_then(serde_json::Value::as_str) != Some("Polygon") {
        return Err(NOT_A_POLYGON.to_string());
    }

    let geometry: geojson::Geometry =
        serde_json::from_value(json).map_err(|_| INVALID_POLYGON.to_string())?;

    let geojson::Value::Polygon(rings) = &geometry.value else {
        return Err(NOT_A_POLYGON.to_string());
    };

    let well_formed = !rings.is_empty()
        && rings.iter().all(|ring| {
            ring.len() >= 4
                && ring.iter().all(|position| position.len() >= 2)
                && ring.first() == ring.last()
        });
    if !well_formed {
        return Err(INVALID_POLYGON.to_string());
    }

    GeometryFilter::polygon(geometry).ok_or_else(|| NOT_A_POLYGON.to_string())
}
