//! HTTP handler functions for the air-quality API.

use actix_web::{HttpResponse, ResponseError as _, web};
use airquality_query::{SqlQuery, measurements_query, timeseries_query};
use airquality_server_models::{ApiHealth, MeasurementsQueryParams, TimeseriesQueryParams};
use airquality_validation::{validate_measurements, validate_timeseries};

use crate::AppState;
use crate::error::ApiError;

/// `GET /health`
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `GET /measurements`
///
/// Aggregates one variable per station over a time window.
pub async fn measurements(
    state: web::Data<AppState>,
    params: web::Query<MeasurementsQueryParams>,
) -> HttpResponse {
    let request = match validate_measurements(&params, state.stations.as_ref()).await {
        Ok(request) => request,
        Err(e) => return reject(e.into()),
    };

    forward(&state, &measurements_query(&state.tables, &request), "measurements").await
}

/// `GET /timeseries`
///
/// Aggregates one variable per station and time bucket, optionally limited
/// to stations inside a polygon.
pub async fn timeseries(
    state: web::Data<AppState>,
    params: web::Query<TimeseriesQueryParams>,
) -> HttpResponse {
    let request = match validate_timeseries(&params, state.stations.as_ref()).await {
        Ok(request) => request,
        Err(e) => return reject(e.into()),
    };

    forward(&state, &timeseries_query(&state.tables, &request), "timeseries").await
}

/// Runs `query` and relays the upstream body unchanged.
async fn forward(state: &AppState, query: &SqlQuery, what: &str) -> HttpResponse {
    log::trace!("Querying {what}: {}", query.text());

    match state.api.query(query).await {
        Ok(body) => HttpResponse::Ok().json(body),
        Err(e) => {
            log::error!("Failed to query {what}: {e}");
            ApiError::Upstream(e).error_response()
        }
    }
}

fn reject(error: ApiError) -> HttpResponse {
    if !matches!(error, ApiError::Validation(_)) {
        log::error!("Failed to validate request: {error}");
    }
    error.error_response()
}
