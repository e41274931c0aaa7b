//! Adapter for InfluxDB 2.x.

use std::mem;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use reqwest::header;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use writebench_harness::record::VALUE_FIELD;
use writebench_harness::{Backend, BackendError, BackendResult, Record};

use crate::common::{base_url, escape_flux, reqwest_client, send};

/// Default URL of an InfluxDB 2.x server.
pub const DEFAULT_URL: &str = "http://localhost:9999";

/// Default organization.
pub const DEFAULT_ORG: &str = "my-org";

/// Default bucket.
pub const DEFAULT_BUCKET: &str = "my-bucket";

/// Default number of lines written per request.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Connection settings for [`InfluxV2`].
#[derive(Debug)]
pub struct InfluxV2Options {
    /// Base URL of the server.
    pub url: String,
    /// Organization owning the bucket.
    pub org: String,
    /// Bucket records are written to.
    pub bucket: String,
    /// API token.
    pub token: SecretString,
    /// Number of records buffered before they are written in one request.
    pub batch_size: usize,
}

/// A backend for InfluxDB 2.x.
///
/// Records are buffered and written in batches of [`InfluxV2Options::batch_size`] lines. The
/// submission that fills the buffer performs the write and receives its outcome; all other
/// submissions return immediately. Pending lines are flushed before counting and when closing.
#[derive(Debug)]
pub struct InfluxV2 {
    client: reqwest::Client,
    url: String,
    org: String,
    bucket: String,
    token: SecretString,
    batch_size: usize,
    pending: Mutex<Vec<String>>,
    closed: AtomicBool,
}

impl InfluxV2 {
    /// Creates a backend from the given options.
    pub fn new(options: InfluxV2Options) -> BackendResult<Self> {
        let batch_size = options.batch_size.max(1);
        Ok(Self {
            client: reqwest_client()?,
            url: base_url(&options.url),
            org: options.org,
            bucket: options.bucket,
            token: options.token,
            batch_size,
            pending: Mutex::new(Vec::with_capacity(batch_size)),
            closed: AtomicBool::new(false),
        })
    }

    fn authorization(&self) -> String {
        format!("Token {}", self.token.expose_secret())
    }

    fn ensure_open(&self) -> BackendResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BackendError::Closed);
        }
        Ok(())
    }

    async fn write(&self, lines: Vec<String>) -> BackendResult<()> {
        let request = self
            .client
            .post(format!("{}/api/v2/write", self.url))
            .query(&[
                ("org", self.org.as_str()),
                ("bucket", self.bucket.as_str()),
                ("precision", "ns"),
            ])
            .header(header::AUTHORIZATION, self.authorization())
            .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(lines.join("\n"));

        send(request, "failed to send write request").await?;
        tracing::trace!(lines = lines.len(), "wrote batch");
        Ok(())
    }

    /// Writes all pending lines.
    async fn flush(&self) -> BackendResult<()> {
        let lines = mem::take(&mut *self.pending.lock().unwrap());
        if lines.is_empty() {
            return Ok(());
        }
        self.write(lines).await
    }
}

#[async_trait::async_trait]
impl Backend for InfluxV2 {
    fn name(&self) -> &'static str {
        "influxdb2"
    }

    async fn submit(&self, record: Record) -> BackendResult<()> {
        self.ensure_open()?;

        let line = record.line_protocol().to_string();
        let batch = {
            let mut pending = self.pending.lock().unwrap();
            pending.push(line);
            if pending.len() >= self.batch_size {
                Some(mem::replace(
                    &mut *pending,
                    Vec::with_capacity(self.batch_size),
                ))
            } else {
                None
            }
        };

        match batch {
            Some(lines) => self.write(lines).await,
            None => Ok(()),
        }
    }

    async fn count(&self, label: &str) -> BackendResult<u64> {
        self.ensure_open()?;

        // Lines lost here show up as missing records rather than a failed query.
        if let Err(error) = self.flush().await {
            tracing::warn!(
                error = &error as &dyn std::error::Error,
                "failed to flush pending records before counting"
            );
        }

        let query = flux_count_query(&self.bucket, label);
        tracing::debug!(%query, org = %self.org, "counting records");

        let body = json!({
            "query": query,
            "type": "flux",
            "dialect": {
                "header": true,
                "annotations": ["datatype", "group", "default"],
            },
        });
        let request = self
            .client
            .post(format!("{}/api/v2/query", self.url))
            .query(&[("org", self.org.as_str())])
            .header(header::AUTHORIZATION, self.authorization())
            .header(header::ACCEPT, "application/csv")
            .json(&body);

        let csv = send(request, "failed to send count query")
            .await?
            .text()
            .await
            .map_err(|cause| BackendError::request("failed to read count response", cause))?;

        parse_count_csv(&csv, VALUE_FIELD)
    }

    async fn close(&self) -> BackendResult<()> {
        let flushed = self.flush().await;
        self.closed.store(true, Ordering::Release);
        flushed
    }
}

fn flux_count_query(bucket: &str, measurement: &str) -> String {
    format!(
        r#"from(bucket: "{bucket}")
  |> range(start: 0)
  |> filter(fn: (r) => r._measurement == "{measurement}")
  |> pivot(rowKey: ["_time"], columnKey: ["_field"], valueColumn: "_value")
  |> drop(columns: ["id", "host"])
  |> count(column: "{VALUE_FIELD}")"#,
        bucket = escape_flux(bucket),
        measurement = escape_flux(measurement),
    )
}

/// Sums `column` over all data rows of an annotated CSV query response.
///
/// Annotation rows start with `#`, every table starts with a header row, and tables are separated
/// by blank lines. A response without tables means nothing matched, which counts as zero.
fn parse_count_csv(body: &str, column: &str) -> BackendResult<u64> {
    let mut total = 0u64;

    for table in split_tables(body) {
        let mut reader = csv::ReaderBuilder::new()
            .comment(Some(b'#'))
            .flexible(true)
            .from_reader(table.as_bytes());

        let headers = reader.headers().map_err(invalid_csv)?;
        if headers.is_empty() {
            continue;
        }
        let index = headers
            .iter()
            .position(|name| name == column)
            .ok_or_else(|| {
                BackendError::UnexpectedResponse(format!("missing `{column}` column"))
            })?;

        for record in reader.records() {
            let record = record.map_err(invalid_csv)?;
            let value = record.get(index).unwrap_or_default();
            let count: u64 = value.parse().map_err(|_| {
                BackendError::UnexpectedResponse(format!("invalid count value `{value}`"))
            })?;
            total += count;
        }
    }

    Ok(total)
}

/// Splits a response into its tables, which the CSV reader cannot tell apart by itself since it
/// skips blank lines.
fn split_tables(body: &str) -> Vec<String> {
    let mut tables = Vec::new();
    let mut table = String::new();

    for line in body.lines() {
        if line.trim().is_empty() {
            if !table.is_empty() {
                tables.push(mem::take(&mut table));
            }
            continue;
        }
        table.push_str(line);
        table.push('\n');
    }
    if !table.is_empty() {
        tables.push(table);
    }

    tables
}

fn invalid_csv(error: csv::Error) -> BackendError {
    BackendError::UnexpectedResponse(format!("invalid count response: {error}"))
}
