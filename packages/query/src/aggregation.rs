//! Station aggregation queries for the `/measurements` and `/timeseries`
//! endpoints.
//!
//! Both endpoints share the same source: station metadata joined to its
//! measurement records by station id, and to the population grid cell that
//! contains the station location.

use airquality_measurement_models::{
    GeometryFilter, MeasurementVariable, MeasurementsRequest, StationFilter, StatisticalAggregate,
    TimeRange, TimeseriesRequest,
};

use crate::{Identifier, QueryBuilder, SqlQuery, SqlValue};

/// Table and column names of the upstream dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableConfig {
    /// Station metadata (id and point geometry).
    pub stations_table: Identifier,
    /// Measurement records, one column per [`MeasurementVariable`].
    pub measurements_table: Identifier,
    /// Population grid cells.
    pub population_table: Identifier,
    pub station_id_column: Identifier,
    pub geometry_column: Identifier,
    pub timestamp_column: Identifier,
    pub population_column: Identifier,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            stations_table: Identifier::from_static("aasuero.test_airquality_stations"),
            measurements_table: Identifier::from_static("aasuero.test_airquality_measurements"),
            population_table: Identifier::from_static("aasuero.esp_grid_1km_demographics"),
            station_id_column: Identifier::from_static("station_id"),
            geometry_column: Identifier::from_static("the_geom"),
            timestamp_column: Identifier::from_static("timeinstant"),
            population_column: Identifier::from_static("population"),
        }
    }
}

/// `SELECT station_id FROM <stations>`, used to enumerate valid station ids.
#[must_use]
pub fn station_ids_query(tables: &TableConfig) -> SqlQuery {
    let mut q = QueryBuilder::new();
    q.sql("SELECT ")
        .ident(&tables.station_id_column)
        .sql(" FROM ")
        .ident(&tables.stations_table);
    q.build()
}

/// Aggregates `request.variable` per station over the requested window.
#[must_use]
pub fn measurements_query(tables: &TableConfig, request: &MeasurementsRequest) -> SqlQuery {
    let mut q = QueryBuilder::new();

    projection(&mut q, tables, request.aggregate, request.variable);
    source(&mut q, tables);
    time_predicate(&mut q, tables, &request.range);
    if let Some(stations) = &request.stations {
        station_predicate(&mut q, tables, stations);
    }
    group_by_station(&mut q, tables);

    q.sql(" ORDER BY s.").ident(&tables.station_id_column);
    q.build()
}

/// Aggregates `request.variable` per station and per `request.step` bucket.
#[must_use]
pub fn timeseries_query(tables: &TableConfig, request: &TimeseriesRequest) -> SqlQuery {
    let mut q = QueryBuilder::new();

    projection(&mut q, tables, request.aggregate, request.variable);
    q.sql(", ");
    time_bucket(&mut q, tables, request);
    q.sql(" AS interval_start");

    source(&mut q, tables);
    time_predicate(&mut q, tables, &request.range);
    if let Some(stations) = &request.stations {
        station_predicate(&mut q, tables, stations);
    }
    if let Some(geometry) = &request.geometry {
        geometry_predicate(&mut q, tables, geometry);
    }

    group_by_station(&mut q, tables);
    q.sql(", ");
    time_bucket(&mut q, tables, request);

    q.sql(" ORDER BY s.")
        .ident(&tables.station_id_column)
        .sql(", interval_start");
    q.build()
}

fn projection(
    q: &mut QueryBuilder,
    tables: &TableConfig,
    aggregate: StatisticalAggregate,
    variable: MeasurementVariable,
) {
    q.sql("SELECT s.")
        .ident(&tables.station_id_column)
        .sql(", g.")
        .ident(&tables.population_column)
        .sql(" AS population, ")
        .token(&aggregate)
        .sql("(m.")
        .token(&variable)
        .sql(") AS ")
        .token(&aggregate)
        .sql("_")
        .token(&variable);
}

fn time_bucket(q: &mut QueryBuilder, tables: &TableConfig, request: &TimeseriesRequest) {
    q.sql("date_trunc(")
        .token(&request.step)
        .sql(", m.")
        .ident(&tables.timestamp_column)
        .sql(")");
}

fn source(q: &mut QueryBuilder, tables: &TableConfig) {
    q.sql(" FROM ")
        .ident(&tables.stations_table)
        .sql(" s JOIN ")
        .ident(&tables.measurements_table)
        .sql(" m ON m.")
        .ident(&tables.station_id_column)
        .sql(" = s.")
        .ident(&tables.station_id_column)
        .sql(" JOIN ")
        .ident(&tables.population_table)
        .sql(" g ON ST_Contains(g.")
        .ident(&tables.geometry_column)
        .sql(", s.")
        .ident(&tables.geometry_column)
        .sql(")");
}

fn time_predicate(q: &mut QueryBuilder, tables: &TableConfig, range: &TimeRange) {
    q.sql(" WHERE m.")
        .ident(&tables.timestamp_column)
        .sql(" >= ")
        .bind(SqlValue::Timestamp(range.from))
        .sql(" AND m.")
        .ident(&tables.timestamp_column)
        .sql(" < ")
        .bind(SqlValue::Timestamp(range.to));
}

fn station_predicate(q: &mut QueryBuilder, tables: &TableConfig, stations: &StationFilter) {
    q.sql(" AND s.")
        .ident(&tables.station_id_column)
        .sql(" IN (")
        .bind_list(stations.ids().iter().cloned().map(SqlValue::Text))
        .sql(")");
}

fn geometry_predicate(q: &mut QueryBuilder, tables: &TableConfig, geometry: &GeometryFilter) {
    q.sql(" AND ST_Contains(ST_SetSRID(ST_GeomFromGeoJSON(")
        .bind(SqlValue::GeoJson(geometry.to_geojson_string()))
        .sql("), 4326), s.")
        .ident(&tables.geometry_column)
        .sql(")");
}

fn group_by_station(q: &mut QueryBuilder, tables: &TableConfig) {
    q.sql(" GROUP BY s.")
        .ident(&tables.station_id_column)
        .sql(", s.")
        .ident(&tables.geometry_column)
        .sql(", g.")
        .ident(&tables.population_column);
}
