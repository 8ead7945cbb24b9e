//! End-to-end tests against an in-memory stand-in for the Carto SQL API.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use actix_web::http::StatusCode;
use actix_web::{App, test, web};
use airquality_carto::{CartoError, SqlApi};
use airquality_query::{SqlQuery, SqlValue, TableConfig};
use airquality_stations::CartoStationDirectory;
use async_trait::async_trait;
use chrono::{DateTime, Datelike as _, DurationRound as _, TimeDelta, Utc};
use geo::{Contains as _, LineString, Point, Polygon};

use crate::{AppState, configure};

const POLYGON: &str = concat!(
    r#"{"type":"Polygon","coordinates":[[[-3.63289587199688,40.56439731247202],"#,
    "[-3.661734983325005,40.55618117044514],[-3.66310827434063,40.53583209794804],",
    "[-3.6378740519285206,40.52421992151271],[-3.6148714274168015,40.5239589506112],",
    "[-3.60543005168438,40.547181381686634],[-3.63289587199688,40.56439731247202]]]}",
);

struct Station {
    id: &'static str,
    population: u32,
    lon: f64,
    lat: f64,
    so2: &'static [(&'static str, f64)],
}

const STATIONS: &[Station] = &[
    Station {
        id: "aq_jaen",
        population: 1200,
        lon: -3.635,
        lat: 40.545,
        so2: &[
            ("2017-06-01T00:00:00Z", 10.0),
            ("2017-06-01T12:00:00Z", 20.0),
            ("2017-06-15T06:00:00Z", 30.0),
        ],
    },
    Station {
        id: "aq_salvia",
        population: 800,
        lon: -3.645,
        lat: 40.540,
        so2: &[("2017-06-02T08:00:00Z", 4.0), ("2017-06-20T08:00:00Z", 6.0)],
    },
    Station {
        id: "aq_nevero",
        population: 450,
        lon: -3.625,
        lat: 40.535,
        so2: &[("2017-06-10T10:00:00Z", 7.5)],
    },
    Station {
        id: "aq_uam",
        population: 3100,
        lon: -3.690,
        lat: 40.545,
        so2: &[("2017-06-05T00:00:00Z", 2.0), ("2017-06-06T00:00:00Z", 3.0)],
    },
    Station {
        id: "aq_villaverde",
        population: 9400,
        lon: -3.710,
        lat: 40.350,
        so2: &[("2017-05-31T23:00:00Z", 50.0), ("2017-06-03T00:00:00Z", 40.0)],
    },
];

/// Answers the station listing and the aggregate queries by evaluating
/// their bound parameters against [`STATIONS`].
#[derive(Default)]
struct FakeCarto {
    failure: Option<fn() -> CartoError>,
    listings: AtomicUsize,
    aggregates: AtomicUsize,
}

impl FakeCarto {
    fn failing(failure: fn() -> CartoError) -> Self {
        Self {
            failure: Some(failure),
            ..Self::default()
        }
    }

    fn aggregate(query: &SqlQuery) -> serde_json::Value {
        let text = query.text();
        let alias = text
            .split_once(") AS ")
            .and_then(|(_, rest)| rest.split([',', ' ']).next())
            .unwrap();
        let function = text
            .split_once("AS population, ")
            .and_then(|(_, rest)| rest.split_once('('))
            .map(|(function, _)| function)
            .unwrap();
        let step = ["hour", "day", "week"]
            .into_iter()
            .find(|step| text.contains(&format!("date_trunc('{step}'")));

        let mut instants = Vec::new();
        let mut ids = Vec::new();
        let mut area = None;
        for param in query.params() {
            match param {
                SqlValue::Timestamp(at) => instants.push(*at),
                SqlValue::Text(id) => ids.push(id.as_str()),
                SqlValue::GeoJson(json) => area = Some(polygon(json)),
            }
        }
        let (from, to) = (instants[0], instants[1]);

        let mut groups: BTreeMap<(&str, Option<DateTime<Utc>>), (u32, Vec<f64>)> =
            BTreeMap::new();
        for station in STATIONS {
            if !ids.is_empty() && !ids.contains(&station.id) {
                continue;
            }
            if let Some(area) = &area {
                if !area.contains(&Point::new(station.lon, station.lat)) {
                    continue;
                }
            }
            for (at, value) in station.so2 {
                let at = at.parse::<DateTime<Utc>>().unwrap();
                if at < from || at >= to {
                    continue;
                }
                groups
                    .entry((station.id, step.map(|step| bucket(at, step))))
                    .or_insert_with(|| (station.population, Vec::new()))
                    .1
                    .push(*value);
            }
        }

        let rows: Vec<serde_json::Value> = groups
            .into_iter()
            .map(|((id, interval), (population, values))| {
                let mut row = serde_json::json!({
                    "station_id": id,
                    "population": population,
                });
                row[alias] = serde_json::json!(reduce(function, &values));
                if let Some(interval) = interval {
                    row["interval_start"] = serde_json::json!(interval.to_rfc3339());
                }
                row
            })
            .collect();

        serde_json::json!({
            "rows": rows,
            "time": 0.012,
            "fields": {},
            "total_rows": rows.len(),
        })
    }
}

#[async_trait]
impl SqlApi for FakeCarto {
    async fn query(&self, query: &SqlQuery) -> Result<serde_json::Value, CartoError> {
        if let Some(failure) = self.failure {
            return Err(failure());
        }

        if query.text().starts_with("SELECT station_id FROM ") {
            self.listings.fetch_add(1, Ordering::SeqCst);
            let rows: Vec<_> = STATIONS
                .iter()
                .map(|station| serde_json::json!({ "station_id": station.id }))
                .collect();
            return Ok(serde_json::json!({ "rows": rows, "total_rows": rows.len() }));
        }

        self.aggregates.fetch_add(1, Ordering::SeqCst);
        Ok(Self::aggregate(query))
    }
}

fn polygon(json: &str) -> Polygon<f64> {
    let geometry: geojson::Geometry = serde_json::from_str(json).unwrap();
    let geojson::Value::Polygon(rings) = geometry.value else {
        panic!("expected a polygon, got {json}");
    };
    let exterior: Vec<(f64, f64)> = rings[0].iter().map(|p| (p[0], p[1])).collect();
    Polygon::new(LineString::from(exterior), vec![])
}

fn bucket(at: DateTime<Utc>, step: &str) -> DateTime<Utc> {
    let midnight = at.duration_trunc(TimeDelta::days(1)).unwrap();
    match step {
        "hour" => at.duration_trunc(TimeDelta::hours(1)).unwrap(),
        "week" => midnight - TimeDelta::days(i64::from(at.weekday().num_days_from_monday())),
        _ => midnight,
    }
}

#[allow(clippy::cast_precision_loss)]
fn reduce(function: &str, values: &[f64]) -> f64 {
    match function {
        "max" => values.iter().copied().fold(f64::MIN, f64::max),
        "min" => values.iter().copied().fold(f64::MAX, f64::min),
        "sum" => values.iter().sum(),
        "count" => values.len() as f64,
        _ => values.iter().sum::<f64>() / values.len() as f64,
    }
}

fn uri(path: &str, params: &[(&str, &str)]) -> String {
    let url = reqwest::Url::parse_with_params(&format!("http://localhost{path}"), params).unwrap();
    match url.query() {
        Some(query) => format!("{}?{query}", url.path()),
        None => url.path().to_string(),
    }
}

async fn get_uri(fake: Arc<FakeCarto>, uri: &str) -> (StatusCode, serde_json::Value) {
    let api: Arc<dyn SqlApi> = fake;
    let state = AppState {
        stations: Arc::new(CartoStationDirectory::new(
            api.clone(),
            TableConfig::default(),
        )),
        api,
        tables: TableConfig::default(),
    };
    let app =
        test::init_service(App::new().app_data(web::Data::new(state)).configure(configure)).await;

    let response = test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
    let status = response.status();
    (status, test::read_body_json(response).await)
}

async fn get(
    fake: Arc<FakeCarto>,
    path: &str,
    params: &[(&str, &str)],
) -> (StatusCode, serde_json::Value) {
    get_uri(fake, &uri(path, params)).await
}

const JUNE: &[(&str, &str)] = &[
    ("variable", "so2"),
    ("measurement", "avg"),
    ("from", "2017-06-01T00:00:00"),
    ("to", "2017-07-01T00:00:00"),
];

fn june(extra: &[(&'static str, &'static str)]) -> Vec<(&'static str, &'static str)> {
    JUNE.iter().chain(extra).copied().collect()
}

fn station_ids(body: &serde_json::Value) -> Vec<&str> {
    body["rows"]
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["station_id"].as_str().unwrap())
        .collect()
}

fn error_fields(body: &serde_json::Value) -> Vec<&str> {
    body["errors"]["query"]
        .as_object()
        .unwrap()
        .keys()
        .map(String::as_str)
        .collect()
}

#[actix_web::test]
async fn health_reports_version() {
    let (status, body) = get(Arc::default(), "/health", &[]).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["healthy"], true);
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[actix_web::test]
async fn measurements_rows_carry_population() {
    let (status, body) = get(Arc::default(), "/measurements", JUNE).await;

    assert_eq!(status, StatusCode::OK);
    let rows = body["rows"].as_array().unwrap();
    assert!(!rows.is_empty());
    for row in rows {
        assert!(row["population"].is_number(), "{row}");
        assert!(row["avg_so2"].is_number(), "{row}");
    }
    // The upstream body is relayed as-is.
    assert_eq!(body["time"], 0.012);
    assert_eq!(body["total_rows"], rows.len());
}

#[actix_web::test]
async fn measurements_aggregate_inside_the_window() {
    let (_, body) = get(Arc::default(), "/measurements", JUNE).await;

    assert_eq!(
        station_ids(&body),
        ["aq_jaen", "aq_nevero", "aq_salvia", "aq_uam", "aq_villaverde"]
    );
    assert_eq!(body["rows"][0]["avg_so2"], 20.0);
    // The 2017-05-31 reading is before `from`.
    assert_eq!(body["rows"][4]["avg_so2"], 40.0);
}

#[actix_web::test]
async fn measurements_outside_data_window_is_empty() {
    let params = [
        ("variable", "so2"),
        ("measurement", "avg"),
        ("from", "2030-06-01T00:00:00"),
        ("to", "2030-07-01T00:00:00"),
    ];
    let (status, body) = get(Arc::default(), "/measurements", &params).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_rows"], 0);
}

#[actix_web::test]
async fn measurements_single_station_filter() {
    let (status, body) = get(
        Arc::default(),
        "/measurements",
        &june(&[("stations", "aq_jaen")]),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_rows"], 1);
    assert_eq!(station_ids(&body), ["aq_jaen"]);
}

#[actix_web::test]
async fn measurements_aggregate_function_names_the_column() {
    let params = [
        ("variable", "so2"),
        ("measurement", "max"),
        ("from", "2017-06-01T00:00:00"),
        ("to", "2017-07-01T00:00:00"),
        ("stations", "aq_salvia"),
    ];
    let (status, body) = get(Arc::default(), "/measurements", &params).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rows"][0]["max_so2"], 6.0);
}

#[actix_web::test]
async fn unknown_station_rejects_the_request() {
    let params = june(&[
        ("stations", "aq_jaen,aq_salvia,aq_nevero,invalid"),
        ("step", "day"),
    ]);

    for path in ["/measurements", "/timeseries"] {
        let fake = Arc::new(FakeCarto::default());
        let (status, body) = get(fake.clone(), path, &params).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{path}");
        assert_eq!(error_fields(&body), ["stations"], "{path}");
        assert_eq!(fake.aggregates.load(Ordering::SeqCst), 0, "{path}");
    }
}

#[actix_web::test]
async fn hostile_station_id_never_reaches_the_query() {
    let fake = Arc::new(FakeCarto::default());
    let (status, body) = get(
        fake.clone(),
        "/measurements",
        &june(&[("stations", "aq_jaen'); DROP TABLE stations; --")]),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error_fields(&body), ["stations"]);
    assert_eq!(fake.aggregates.load(Ordering::SeqCst), 0);
}

#[actix_web::test]
async fn station_listing_is_skipped_without_a_filter() {
    let fake = Arc::new(FakeCarto::default());
    get(fake.clone(), "/measurements", JUNE).await;
    assert_eq!(fake.listings.load(Ordering::SeqCst), 0);

    get(fake.clone(), "/measurements", &june(&[("stations", "aq_uam")])).await;
    assert_eq!(fake.listings.load(Ordering::SeqCst), 1);
}

#[actix_web::test]
async fn timeseries_buckets_by_step() {
    let (status, body) = get(
        Arc::default(),
        "/timeseries",
        &june(&[("step", "day"), ("stations", "aq_jaen")]),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_rows"], 2);
    assert_eq!(body["rows"][0]["interval_start"], "2017-06-01T00:00:00+00:00");
    assert_eq!(body["rows"][0]["avg_so2"], 15.0);
    assert_eq!(body["rows"][1]["interval_start"], "2017-06-15T00:00:00+00:00");
    assert_eq!(body["rows"][1]["avg_so2"], 30.0);
}

#[actix_web::test]
async fn timeseries_geometry_filter_keeps_contained_stations() {
    let (status, body) = get(
        Arc::default(),
        "/timeseries",
        &june(&[("step", "day"), ("geom", POLYGON)]),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let mut ids = station_ids(&body);
    ids.dedup();
    assert_eq!(ids, ["aq_jaen", "aq_nevero", "aq_salvia"]);
}

#[actix_web::test]
async fn timeseries_stations_and_geometry_both_apply() {
    let (status, body) = get(
        Arc::default(),
        "/timeseries",
        &june(&[
            ("step", "day"),
            ("stations", "aq_jaen,aq_salvia,aq_uam"),
            ("geom", POLYGON),
        ]),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let mut ids = station_ids(&body);
    ids.dedup();
    assert_eq!(ids, ["aq_jaen", "aq_salvia"]);
}

#[actix_web::test]
async fn timeseries_rejects_malformed_geometry() {
    let truncated = &POLYGON[..POLYGON.len() - 1];
    let wrong_type = POLYGON.replace("\"Polygon\"", "\"Invalid\"");

    for geom in [truncated, wrong_type.as_str()] {
        let (status, body) = get(
            Arc::default(),
            "/timeseries",
            &[
                ("variable", "so2"),
                ("measurement", "avg"),
                ("from", "2017-06-01T00:00:00"),
                ("to", "2017-07-01T00:00:00"),
                ("step", "day"),
                ("geom", geom),
            ],
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{geom}");
        assert_eq!(error_fields(&body), ["geom"], "{geom}");
    }
}

#[actix_web::test]
async fn missing_parameters_are_reported_together() {
    let (status, body) = get(Arc::default(), "/timeseries", &[]).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        error_fields(&body),
        ["from", "measurement", "step", "to", "variable"]
    );
    assert_eq!(
        body["errors"]["query"]["step"][0],
        "Missing data for required field."
    );
}

#[actix_web::test]
async fn invalid_values_are_reported_per_field() {
    let params = [
        ("variable", "invalid"),
        ("measurement", "median"),
        ("from", "invalid"),
        ("to", "2017-07-01T00:00:00"),
        ("step", "month"),
    ];
    let (status, body) = get(Arc::default(), "/timeseries", &params).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        error_fields(&body),
        ["from", "measurement", "step", "variable"]
    );
    assert_eq!(
        body["errors"]["query"]["variable"][0],
        "Must be one of: so2, no2, co, o3, pm10, pm2_5."
    );
    assert_eq!(body["errors"]["query"]["from"][0], "Not a valid datetime.");
}

#[actix_web::test]
async fn measurements_ignores_unrelated_parameters() {
    let (status, _) = get(
        Arc::default(),
        "/measurements",
        &june(&[("step", "fortnight"), ("geom", "not json"), ("page", "2")]),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
}

#[actix_web::test]
async fn repeated_parameter_is_a_bad_request() {
    let (status, body) = get_uri(
        Arc::default(),
        "/measurements?variable=so2&variable=no2&measurement=avg",
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_fields(&body), ["_schema"]);
}

#[actix_web::test]
async fn upstream_status_failure_is_bad_gateway() {
    let fake = Arc::new(FakeCarto::failing(|| CartoError::Status {
        status: 500,
        body: "relation does not exist".to_string(),
    }));
    let (status, body) = get(fake, "/measurements", JUNE).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["errors"]["upstream"]["status"], 500);
}

#[actix_web::test]
async fn upstream_timeout_is_gateway_timeout() {
    let fake = Arc::new(FakeCarto::failing(|| CartoError::Timeout {
        timeout: std::time::Duration::from_secs(30),
    }));
    let (status, _) = get(fake, "/timeseries", &june(&[("step", "week")])).await;

    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
}

#[actix_web::test]
async fn station_listing_failure_is_bad_gateway() {
    let fake = Arc::new(FakeCarto::failing(|| CartoError::Status {
        status: 503,
        body: String::new(),
    }));
    let (status, body) = get(fake, "/measurements", &june(&[("stations", "aq_jaen")])).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["errors"].get("query").is_none());
}
