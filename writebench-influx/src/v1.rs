//! Adapter for InfluxDB 1.x.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::Deserialize;
use writebench_harness::{Backend, BackendError, BackendResult, Record};

use crate::common::{base_url, escape_quoted, reqwest_client, send};

/// Default URL of an InfluxDB 1.x server.
pub const DEFAULT_URL: &str = "http://localhost:8086";

/// Default database records are written to.
pub const DEFAULT_DATABASE: &str = "iot_writes";

/// A backend for InfluxDB 1.x.
///
/// Every record is written with a dedicated request, so submission latency is the round trip of one
/// HTTP write.
#[derive(Debug)]
pub struct InfluxV1 {
    client: reqwest::Client,
    url: String,
    database: String,
    closed: AtomicBool,
}

impl InfluxV1 {
    /// Creates a backend writing to `database` on the server at `url`.
    pub fn new(url: &str, database: &str) -> BackendResult<Self> {
        Ok(Self {
            client: reqwest_client()?,
            url: base_url(url),
            database: database.to_owned(),
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> BackendResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BackendError::Closed);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Backend for InfluxV1 {
    fn name(&self) -> &'static str {
        "influxdb1"
    }

    async fn submit(&self, record: Record) -> BackendResult<()> {
        self.ensure_open()?;

        let request = self
            .client
            .post(format!("{}/write", self.url))
            .query(&[("db", self.database.as_str()), ("precision", "ns")])
            .body(record.line_protocol().to_string());

        send(request, "failed to send write request").await?;
        Ok(())
    }

    async fn count(&self, label: &str) -> BackendResult<u64> {
        self.ensure_open()?;

        let query = format!("SELECT count(*) FROM \"{}\"", escape_quoted(label));
        tracing::debug!(%query, database = %self.database, "counting records");

        let request = self
            .client
            .get(format!("{}/query", self.url))
            .query(&[("db", self.database.as_str()), ("q", query.as_str())]);

        let response: QueryResponse = send(request, "failed to send count query")
            .await?
            .json()
            .await
            .map_err(|cause| BackendError::request("failed to read count response", cause))?;

        response.count()
    }

    async fn close(&self) -> BackendResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// Body of an InfluxQL `/query` response.
#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatementResult {
    #[serde(default)]
    series: Vec<Series>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Series {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

impl QueryResponse {
    /// Reads the count from the first column after `time` of the first row.
    ///
    /// A statement without series means the measurement does not exist, which counts as zero.
    fn count(self) -> BackendResult<u64> {
        if let Some(error) = self.error {
            return Err(BackendError::UnexpectedResponse(error));
        }

        let statement = self
            .results
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::UnexpectedResponse("missing statement result".into()))?;

        if let Some(error) = statement.error {
            return Err(BackendError::UnexpectedResponse(error));
        }

        let Some(series) = statement.series.into_iter().next() else {
            return Ok(0);
        };

        series
            .values
            .first()
            .and_then(|row| row.get(1))
            .and_then(|value| value.as_u64())
            .ok_or_else(|| BackendError::UnexpectedResponse("missing count value".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> BackendResult<u64> {
        serde_json::from_str::<QueryResponse>(json).unwrap().count()
    }

    #[test]
    fn reads_count() {
        let json = r#"{"results":[{"statement_id":0,"series":[{"name":"sensor","columns":["time","count_temperature"],"values":[["1970-01-01T00:00:00Z",6000]]}]}]}"#;
        assert_eq!(parse(json).unwrap(), 6000);
    }

    #[test]
    fn missing_series_is_zero() {
        assert_eq!(parse(r#"{"results":[{"statement_id":0}]}"#).unwrap(), 0);
    }

    #[test]
    fn statement_error_fails() {
        let json = r#"{"results":[{"statement_id":0,"error":"database not found: iot_writes"}]}"#;
        assert!(matches!(
            parse(json),
            Err(BackendError::UnexpectedResponse(message)) if message.contains("database not found")
        ));
    }

    #[test]
    fn top_level_error_fails() {
        assert!(parse(r#"{"error":"error parsing query"}"#).is_err());
        assert!(parse(r#"{"results":[]}"#).is_err());
    }
}
