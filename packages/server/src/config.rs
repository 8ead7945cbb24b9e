//! Server configuration read from the environment at startup.

use std::time::Duration;

use airquality_carto::{CartoConfig, RetryPolicy};
use airquality_query::{Identifier, QueryError, TableConfig};

/// Default time-to-live of the cached station id set.
pub const DEFAULT_STATION_CACHE_TTL: Duration = Duration::from_secs(60);

/// Errors that can occur while reading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A numeric variable did not parse.
    #[error("{var} must be a non-negative integer, got {value:?}")]
    InvalidNumber {
        /// Environment variable name.
        var: &'static str,
        /// The rejected value.
        value: String,
    },

    /// A table name variable is not a plain SQL identifier.
    #[error("{var}: {source}")]
    InvalidIdentifier {
        /// Environment variable name.
        var: &'static str,
        /// Underlying identifier error.
        source: QueryError,
    },
}

/// Everything the server needs to start.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind (`BIND_ADDR`).
    pub bind_addr: String,
    /// Port to bind (`PORT`).
    pub port: u16,
    /// Analytics service connection (`CARTO_*`).
    pub carto: CartoConfig,
    /// Upstream dataset tables (`STATIONS_TABLE`, `MEASUREMENTS_TABLE`,
    /// `POPULATION_TABLE`).
    pub tables: TableConfig,
    /// How long station ids are cached (`STATION_CACHE_TTL_SECS`, `0`
    /// disables caching).
    pub station_cache_ttl: Duration,
}

impl ServerConfig {
    /// Reads configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is set to an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Reads configuration through `lookup`, falling back to defaults for
    /// unset variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is set to an invalid value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = CartoConfig::default();
        let tables = TableConfig::default();

        let carto = CartoConfig {
            api_url: lookup("CARTO_SQL_API_URL").unwrap_or(defaults.api_url),
            api_key: lookup("CARTO_API_KEY").filter(|key| !key.is_empty()),
            timeout: number(&lookup, "CARTO_TIMEOUT_SECS")?
                .map_or(defaults.timeout, Duration::from_secs),
            retry: number(&lookup, "CARTO_MAX_RETRIES")?.map_or(defaults.retry, |n| {
                RetryPolicy {
                    max_retries: u32::try_from(n).unwrap_or(u32::MAX),
                    ..defaults.retry
                }
            }),
        };

        let tables = TableConfig {
            stations_table: identifier(&lookup, "STATIONS_TABLE")?
                .unwrap_or(tables.stations_table),
            measurements_table: identifier(&lookup, "MEASUREMENTS_TABLE")?
                .unwrap_or(tables.measurements_table),
            population_table: identifier(&lookup, "POPULATION_TABLE")?
                .unwrap_or(tables.population_table),
            ..tables
        };

        let port = match number(&lookup, "PORT")? {
            None => 8080,
            Some(port) => u16::try_from(port).map_err(|_| ConfigError::InvalidNumber {
                var: "PORT",
                value: port.to_string(),
            })?,
        };

        Ok(Self {
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| "127.0.0.1".to_string()),
            port,
            carto,
            tables,
            station_cache_ttl: number(&lookup, "STATION_CACHE_TTL_SECS")?
                .map_or(DEFAULT_STATION_CACHE_TTL, Duration::from_secs),
        })
    }
}

fn number(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<u64>, ConfigError> {
    lookup(var)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidNumber { var, value })
        })
        .transpose()
}

fn identifier(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<Identifier>, ConfigError> {
    lookup(var)
        .map(|value| Identifier::new(value).map_err(|source| ConfigError::InvalidIdentifier { var, source }))
        .transpose()
}
