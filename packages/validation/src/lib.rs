#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Validation of `/measurements` and `/timeseries` query parameters.
//!
//! Every parameter is checked independently and all failures are collected
//! into one [`FieldErrors`] map, so a client sees every mistake in a single
//! response. Only a fully valid set of parameters produces a typed request.

pub mod fields;

use std::collections::BTreeMap;
use std::fmt;

use airquality_measurement_models::{
    GeometryFilter, MeasurementVariable, MeasurementsRequest, StationFilter,
    StatisticalAggregate, TimeRange, TimeStep, TimeseriesRequest,
};
use airquality_server_models::{MeasurementsQueryParams, TimeseriesQueryParams};
use airquality_stations::{StationDirectory, StationDirectoryError};

/// Validation messages keyed by parameter name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `message` under `field`.
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    /// Keeps the value of a successful check, or records its message under
    /// `field` and yields `None`.
    pub fn check<T>(&mut self, field: &str, result: Result<T, String>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(message) => {
                self.add(field, message);
                None
            }
        }
    }

    /// Moves every message of `other` into `self`.
    pub fn merge(&mut self, other: Self) {
        for (field, messages) in other.0 {
            self.0.entry(field).or_default().extend(messages);
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Messages recorded for `field`.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    #[must_use]
    pub fn into_inner(self) -> BTreeMap<String, Vec<String>> {
        self.0
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (field, messages)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{field}: {}", messages.join(" "))?;
        }
        Ok(())
    }
}

/// Errors that can occur while validating a request.
#[derive(Debug, thiserror::Error)]
pub enum ValidateError {
    /// One or more parameters were rejected.
    #[error("Invalid query parameters: {0}")]
    Invalid(FieldErrors),

    /// The station directory could not be consulted.
    #[error("Station lookup failed: {0}")]
    Stations(#[from] StationDirectoryError),
}

/// Fields shared by both endpoints.
struct Common {
    variable: MeasurementVariable,
    aggregate: StatisticalAggregate,
    range: TimeRange,
}

fn common(
    errors: &mut FieldErrors,
    variable: Option<&str>,
    measurement: Option<&str>,
    from: Option<&str>,
    to: Option<&str>,
) -> Option<Common> {
    let variable = errors.check(
        "variable",
        fields::required(variable).and_then(|v| fields::one_of(v, MeasurementVariable::all())),
    );
    let aggregate = errors.check(
        "measurement",
        fields::required(measurement)
            .and_then(|v| fields::one_of(v, StatisticalAggregate::all())),
    );
    let from = errors.check(
        "from",
        fields::required(from).and_then(fields::timestamp),
    );
    let to = errors.check("to", fields::required(to).and_then(fields::timestamp));

    Some(Common {
        variable: variable?,
        aggregate: aggregate?,
        range: TimeRange::new(from?, to?),
    })
}

/// Checks `stations` against the directory. The directory is only
/// consulted when the parameter is present.
///
/// A lookup failure is only returned when no other parameter has been
/// rejected; otherwise the field errors already collected are reported.
async fn stations(
    errors: &mut FieldErrors,
    value: Option<&str>,
    directory: &dyn StationDirectory,
) -> Result<Option<StationFilter>, StationDirectoryError> {
    let Some(value) = value else {
        return Ok(None);
    };

    let known = match directory.list_ids().await {
        Ok(known) => known,
        Err(e) if errors.is_empty() => return Err(e),
        Err(e) => {
            log::warn!("Station lookup failed, reporting parameter errors only: {e}");
            return Ok(None);
        }
    };
    let filter = StationFilter::from_known(fields::station_ids(value), &known)
        .map_err(|unknown| fields::unknown_stations(&unknown));
    Ok(errors.check("stations", filter))
}

fn geometry(errors: &mut FieldErrors, value: Option<&str>) -> Option<Option<GeometryFilter>> {
    match value {
        None => Some(None),
        Some(value) => errors.check("geom", fields::polygon(value)).map(Some),
    }
}

fn finish<T>(errors: FieldErrors, request: Option<T>) -> Result<T, ValidateError> {
    match request {
        Some(request) if errors.is_empty() => Ok(request),
        _ => {
            log::debug!("Rejected query parameters: {errors}");
            Err(ValidateError::Invalid(errors))
        }
    }
}

/// Validates `GET /measurements` parameters.
///
/// # Errors
///
/// * [`ValidateError::Invalid`] with every rejected parameter
/// * [`ValidateError::Stations`] if `stations` was given and the station
///   directory lookup failed
pub async fn validate_measurements(
    params: &MeasurementsQueryParams,
    directory: &dyn StationDirectory,
) -> Result<MeasurementsRequest, ValidateError> {
    let mut errors = FieldErrors::new();

    let common = common(
        &mut errors,
        params.variable.as_deref(),
        params.measurement.as_deref(),
        params.from.as_deref(),
        params.to.as_deref(),
    );
    let stations = stations(&mut errors, params.stations.as_deref(), directory).await?;

    let request = common.map(|common| MeasurementsRequest {
        variable: common.variable,
        aggregate: common.aggregate,
        range: common.range,
        stations,
    });
    finish(errors, request)
}

/// Validates `GET /timeseries` parameters.
///
/// # Errors
///
/// * [`ValidateError::Invalid`] with every rejected parameter
/// * [`ValidateError::Stations`] if `stations` was given and the station
///   directory lookup failed
pub async fn validate_timeseries(
    params: &TimeseriesQueryParams,
    directory: &dyn StationDirectory,
) -> Result<TimeseriesRequest, ValidateError> {
    let mut errors = FieldErrors::new();

    let common = common(
        &mut errors,
        params.variable.as_deref(),
        params.measurement.as_deref(),
        params.from.as_deref(),
        params.to.as_deref(),
    );
    let step = errors.check(
        "step",
        fields::required(params.step.as_deref())
            .and_then(|v| fields::one_of(v, TimeStep::all())),
    );
    let geometry = geometry(&mut errors, params.geom.as_deref());
    let stations = stations(&mut errors, params.stations.as_deref(), directory).await?;

    let request = match (common, step, geometry) {
        (Some(common), Some(step), Some(geometry)) => Some(TimeseriesRequest {
            variable: common.variable,
            aggregate: common.aggregate,
            range: common.range,
            step,
            stations,
            geometry,
        }),
        _ => None,
    };
    finish(errors, request)
}
