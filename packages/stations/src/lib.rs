#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! The set of station ids a `stations` filter may reference.
//!
//! Validation depends on the [`StationDirectory`] capability rather than on
//! the analytics service directly, so the lookup can be cached
//! ([`CachedStationDirectory`]) or replaced by a fixed set in tests.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use airquality_carto::{CartoError, SqlApi};
use airquality_query::{TableConfig, station_ids_query};
use async_trait::async_trait;
use tokio::sync::Mutex;

/// Errors that can occur while listing station ids.
#[derive(Debug, thiserror::Error)]
pub enum StationDirectoryError {
    /// The analytics service call failed.
    #[error(transparent)]
    Upstream(#[from] CartoError),

    /// The service answered with an unexpected body shape.
    #[error("Malformed station listing: {message}")]
    Malformed {
        /// Description of what was wrong.
        message: String,
    },
}

/// Source of the current set of known station ids.
#[async_trait]
pub trait StationDirectory: Send + Sync {
    /// Returns every known station id.
    ///
    /// # Errors
    ///
    /// Returns [`StationDirectoryError`] if the ids cannot be retrieved.
    async fn list_ids(&self) -> Result<BTreeSet<String>, StationDirectoryError>;
}

#[async_trait]
impl<T: StationDirectory + ?Sized> StationDirectory for Arc<T> {
    async fn list_ids(&self) -> Result<BTreeSet<String>, StationDirectoryError> {
        (**self).list_ids().await
    }
}

/// A fixed set of ids.
#[async_trait]
impl StationDirectory for BTreeSet<String> {
    async fn list_ids(&self) -> Result<BTreeSet<String>, StationDirectoryError> {
        Ok(self.clone())
    }
}

/// Lists station ids with `SELECT station_id FROM <stations>`.
pub struct CartoStationDirectory {
    api: Arc<dyn SqlApi>,
    tables: TableConfig,
}

impl CartoStationDirectory {
    #[must_use]
    pub fn new(api: Arc<dyn SqlApi>, tables: TableConfig) -> Self {
        Self { api, tables }
    }
}

#[async_trait]
impl StationDirectory for CartoStationDirectory {
    async fn list_ids(&self) -> Result<BTreeSet<String>, StationDirectoryError> {
        let body = self.api.query(&station_ids_query(&self.tables)).await?;
        parse_station_ids(&body, self.tables.station_id_column.as_str())
    }
}

fn parse_station_ids(
    body: &serde_json::Value,
    column: &str,
) -> Result<BTreeSet<String>, StationDirectoryError> {
    let rows = body
        .get("rows")
        .and_then(serde_json::Value::as_array)
        .ok_or_else(|| StationDirectoryError::Malformed {
            message: "response has no rows array".to_string(),
        })?;

    let mut ids = BTreeSet::new();
    for row in rows {
        match row.get(column).and_then(serde_json::Value::as_str) {
            Some(id) => {
                ids.insert(id.to_string());
            }
            None => log::warn!("Skipping station row without a string {column}: {row}"),
        }
    }

    log::debug!("Station directory lists {} ids", ids.len());
    Ok(ids)
}

/// Memoises another directory's id set for a fixed time-to-live.
///
/// A zero TTL disables caching. Concurrent callers share a single refresh.
pub struct CachedStationDirectory<D> {
    inner: D,
    ttl: Duration,
    cached: Mutex<Option<(Instant, BTreeSet<String>)>>,
}

impl<D: StationDirectory> CachedStationDirectory<D> {
    #[must_use]
    pub fn new(inner: D, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            cached: Mutex::new(None),
        }
    }
}

#[async_trait]
impl<D: StationDirectory> StationDirectory for CachedStationDirectory<D> {
    async fn list_ids(&self) -> Result<BTreeSet<String>, StationDirectoryError> {
        if self.ttl.is_zero() {
            return self.inner.list_ids().await;
        }

        let mut cached = self.cached.lock().await;
        if let Some((fetched_at, ids)) = cached.as_ref() {
            if fetched_at.elapsed() < self.ttl {
                return Ok(ids.clone());
            }
        }

        let ids = self.inner.list_ids().await?;
        *cached = Some((Instant::now(), ids.clone()));
        Ok(ids)
    }
}
