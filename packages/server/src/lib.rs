#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for the air-quality application.
//!
//! Validates `/measurements` and `/timeseries` query parameters, composes
//! the matching aggregate SQL and relays the Carto SQL API response to the
//! caller. Known station ids are listed from the same service and cached.

pub mod config;
pub mod error;
mod handlers;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use airquality_carto::{CartoClient, SqlApi};
use airquality_query::TableConfig;
use airquality_stations::{CachedStationDirectory, CartoStationDirectory, StationDirectory};

pub use config::{ConfigError, ServerConfig};
pub use error::ApiError;

/// Shared application state.
pub struct AppState {
    /// Analytics service that executes the composed queries.
    pub api: Arc<dyn SqlApi>,
    /// Source of valid station ids for the `stations` parameter.
    pub stations: Arc<dyn StationDirectory>,
    /// Upstream dataset tables.
    pub tables: TableConfig,
}

impl AppState {
    /// Builds the production state: a [`CartoClient`] for queries and a
    /// cached Carto-backed station directory.
    ///
    /// # Errors
    ///
    /// Returns an `std::io::Error` if the HTTP client cannot be built.
    pub fn from_config(config: &ServerConfig) -> std::io::Result<Self> {
        let client = CartoClient::new(config.carto.clone()).map_err(std::io::Error::other)?;
        let api: Arc<dyn SqlApi> = Arc::new(client);

        let stations = CachedStationDirectory::new(
            CartoStationDirectory::new(api.clone(), config.tables.clone()),
            config.station_cache_ttl,
        );

        Ok(Self {
            api,
            stations: Arc::new(stations),
            tables: config.tables.clone(),
        })
    }
}

/// Registers the API routes and the query-string error handler.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::QueryConfig::default().error_handler(|err, _req| {
        log::debug!("Rejected query string: {err}");
        ApiError::BadRequest {
            message: err.to_string(),
        }
        .into()
    }))
    .route("/health", web::get().to(handlers::health))
    .route("/measurements", web::get().to(handlers::measurements))
    .route("/timeseries", web::get().to(handlers::timeseries));
}

/// Starts the air-quality API server.
///
/// This is a regular async function. The caller is responsible for
/// providing the async runtime (e.g. via `#[actix_web::main]`).
///
/// # Errors
///
/// Returns an `std::io::Result` error if the HTTP client cannot be built,
/// the server fails to bind, or it encounters a runtime error.
#[allow(clippy::future_not_send)]
pub async fn run_server(config: ServerConfig) -> std::io::Result<()> {
    log::info!(
        "Using Carto SQL API at {} (timeout {:?}, {} retries)",
        config.carto.api_url,
        config.carto.timeout,
        config.carto.retry.max_retries,
    );
    let state = web::Data::new(AppState::from_config(&config)?);

    log::info!("Starting server on {}:{}", config.bind_addr, config.port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((config.bind_addr.as_str(), config.port))?
    .run()
    .await
}
