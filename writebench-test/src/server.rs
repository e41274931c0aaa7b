//! Exposes an in-process fake InfluxDB server for use in integration tests.
//!
//! The server speaks just enough of the InfluxDB 1.x and 2.x HTTP APIs to exercise the backend
//! adapters: it accepts line protocol writes, keeps a count of points per measurement and answers
//! the count queries the adapters send.
//!
//! ```
//! use writebench_test::server::FakeInflux;
//!
//! #[tokio::main]
//! async fn main() {
//!    let server = FakeInflux::new().await;
//!    let url = server.url();
//!    // point an adapter at the URL...
//! }
//! ```

use std::collections::HashMap;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::{Json, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::Deserialize;
use serde_json::json;

/// The token the fake server expects on InfluxDB 2.x requests.
pub const TOKEN: &str = "test-token";

#[derive(Debug, Default)]
struct Store {
    points: Mutex<HashMap<String, u64>>,
    write_requests: AtomicUsize,
    fail_writes: AtomicBool,
    fail_queries: AtomicBool,
}

impl Store {
    fn ingest(&self, body: &str) -> Result<(), StatusCode> {
        self.write_requests.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StatusCode::SERVICE_UNAVAILABLE);
        }

        let mut points = self.points.lock().unwrap();
        for line in body.lines().filter(|line| !line.trim().is_empty()) {
            let measurement = parse_measurement(line).ok_or(StatusCode::BAD_REQUEST)?;
            *points.entry(measurement).or_default() += 1;
        }
        Ok(())
    }

    fn count(&self, measurement: &str) -> u64 {
        let points = self.points.lock().unwrap();
        points.get(measurement).copied().unwrap_or_default()
    }
}

/// Reads the unescaped measurement name at the start of a line protocol line.
fn parse_measurement(line: &str) -> Option<String> {
    let mut measurement = String::new();
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => measurement.push(chars.next()?),
            ',' | ' ' => return Some(measurement).filter(|m| !m.is_empty()),
            c => measurement.push(c),
        }
    }
    None
}

/// Reads an escaped string literal that starts right after `prefix` in `text`.
fn quoted_after(text: &str, prefix: &str) -> Option<String> {
    let start = text.find(prefix)? + prefix.len();
    let mut value = String::new();
    let mut chars = text[start..].chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => value.push(chars.next()?),
            '"' => return Some(value),
            c => value.push(c),
        }
    }
    None
}

type AppState = Arc<Store>;

#[derive(Debug, Deserialize)]
struct V1Query {
    q: String,
}

#[derive(Debug, Deserialize)]
struct FluxQuery {
    query: String,
}

async fn write_v1(State(store): State<AppState>, body: String) -> StatusCode {
    match store.ingest(&body) {
        Ok(()) => StatusCode::NO_CONTENT,
        Err(status) => status,
    }
}

async fn query_v1(State(store): State<AppState>, Query(query): Query<V1Query>) -> Response {
    if store.fail_queries.load(Ordering::SeqCst) {
        let body = json!({ "results": [{ "statement_id": 0, "error": "query failed" }] });
        return Json(body).into_response();
    }

    let Some(measurement) = quoted_after(&query.q, "FROM \"") else {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "bad query" }))).into_response();
    };

    let count = store.count(&measurement);
    let body = if count == 0 {
        json!({ "results": [{ "statement_id": 0 }] })
    } else {
        json!({ "results": [{
            "statement_id": 0,
            "series": [{
                "name": measurement,
                "columns": ["time", "count_temperature"],
                "values": [["1970-01-01T00:00:00Z", count]],
            }],
        }] })
    };
    Json(body).into_response()
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == format!("Token {TOKEN}"))
}

async fn write_v2(State(store): State<AppState>, headers: HeaderMap, body: String) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    match store.ingest(&body) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(status) => (status, Json(json!({ "code": "internal error" }))).into_response(),
    }
}

async fn query_v2(
    State(store): State<AppState>,
    headers: HeaderMap,
    Json(query): Json<FluxQuery>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    if store.fail_queries.load(Ordering::SeqCst) {
        let body = json!({ "code": "invalid", "message": "query failed" });
        return (StatusCode::BAD_REQUEST, Json(body)).into_response();
    }

    let Some(measurement) = quoted_after(&query.query, "r._measurement == \"") else {
        let body = json!({ "code": "invalid", "message": "missing measurement filter" });
        return (StatusCode::BAD_REQUEST, Json(body)).into_response();
    };

    let count = store.count(&measurement);
    let csv = if count == 0 {
        "\r\n".to_owned()
    } else {
        count_table(&measurement, count)
    };
    ([(header::CONTENT_TYPE, "text/csv; charset=utf-8")], csv).into_response()
}

/// Renders a count result the way InfluxDB 2.x does, keeping the group key columns.
fn count_table(measurement: &str, count: u64) -> String {
    let count = count.to_string();
    let rows: [[&str; 7]; 5] = [
        ["#datatype", "string", "long", "dateTime:RFC3339", "dateTime:RFC3339", "string", "long"],
        ["#group", "false", "false", "true", "true", "true", "false"],
        ["#default", "_result", "", "", "", "", ""],
        ["", "result", "table", "_start", "_stop", "_measurement", "temperature"],
        ["", "", "0", "1970-01-01T00:00:00Z", "2026-01-01T00:00:00Z", measurement, &count],
    ];

    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::CRLF)
        .from_writer(Vec::new());
    for row in rows {
        writer.write_record(row).unwrap();
    }

    let mut csv = String::from_utf8(writer.into_inner().unwrap()).unwrap();
    csv.push_str("\r\n");
    csv
}

fn unauthorized() -> Response {
    let body = json!({ "code": "unauthorized", "message": "unauthorized access" });
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}

/// An in-process fake InfluxDB server for use in integration tests.
///
/// The server listens on a random available port on localhost and stops when dropped.
#[derive(Debug)]
pub struct FakeInflux {
    handle: tokio::task::JoinHandle<()>,
    socket: SocketAddr,
    store: AppState,
}

impl FakeInflux {
    /// Starts a new server.
    pub async fn new() -> Self {
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let listener = TcpListener::bind(addr).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();

        let store = AppState::default();
        let router = Router::new()
            .route("/write", post(write_v1))
            .route("/query", get(query_v1))
            .route("/api/v2/write", post(write_v2))
            .route("/api/v2/query", post(query_v2))
            .with_state(Arc::clone(&store));

        let handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, router).await.unwrap();
        });

        Self {
            handle,
            socket,
            store,
        }
    }

    /// Returns the base URL of the server.
    pub fn url(&self) -> String {
        format!("http://{}", self.socket)
    }

    /// Returns the number of points stored for a measurement.
    pub fn points(&self, measurement: &str) -> u64 {
        self.store.count(measurement)
    }

    /// Returns the number of write requests received, including rejected ones.
    pub fn write_requests(&self) -> usize {
        self.store.write_requests.load(Ordering::SeqCst)
    }

    /// Makes all subsequent writes fail with `503 Service Unavailable`.
    pub fn fail_writes(&self, fail: bool) {
        self.store.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Makes all subsequent count queries fail.
    pub fn fail_queries(&self, fail: bool) {
        self.store.fail_queries.store(fail, Ordering::SeqCst);
    }
}

impl Drop for FakeInflux {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_escaped_measurement() {
        assert_eq!(
            parse_measurement(r#"a\,b\ c,id=1 temperature="1" 5"#).as_deref(),
            Some("a,b c")
        );
        assert_eq!(parse_measurement("no-tags value=1").as_deref(), Some("no-tags"));
        assert_eq!(parse_measurement("incomplete"), None);
    }

    #[test]
    fn count_table_quotes_measurement() {
        let csv = count_table(r#"a,"b""#, 3);
        assert!(csv.contains(",result,table,_start,_stop,_measurement,temperature\r\n"));
        assert!(csv.contains(r#","a,""b""",3"#));
        assert!(csv.ends_with("\r\n\r\n"));
    }

    #[test]
    fn reads_quoted_measurement() {
        let q = r#"SELECT count(*) FROM "sensor \"1\"""#;
        assert_eq!(quoted_after(q, "FROM \"").as_deref(), Some(r#"sensor "1""#));
    }
}
