//! Creates the backend selected in the configuration.

use std::sync::Arc;

use anyhow::{Context, Result};
use secrecy::ExposeSecret;
use writebench_harness::SharedBackend;
use writebench_harness::backend::InMemoryBackend;
use writebench_influx::{InfluxV1, InfluxV2, InfluxV2Options, v1, v2};

use crate::config::Backend;

/// Instantiates the configured backend.
pub fn create(config: &Backend) -> Result<SharedBackend> {
    let backend: SharedBackend = match config {
        Backend::Memory => Arc::new(InMemoryBackend::new()),
        Backend::InfluxDb1 { url, database } => {
            let url = url.as_deref().unwrap_or(v1::DEFAULT_URL);
            Arc::new(InfluxV1::new(url, database).context("failed to create InfluxDB 1.x client")?)
        }
        Backend::InfluxDb2 {
            url,
            org,
            bucket,
            token,
            batch_size,
        } => {
            let options = InfluxV2Options {
                url: url.as_deref().unwrap_or(v2::DEFAULT_URL).to_owned(),
                org: org.clone(),
                bucket: bucket.clone(),
                token: token.expose_secret().as_str().to_owned().into(),
                batch_size: *batch_size,
            };
            Arc::new(InfluxV2::new(options).context("failed to create InfluxDB 2.x client")?)
        }
    };

    tracing::debug!(backend = backend.name(), "created backend");
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_selected_backend() {
        assert_eq!(create(&Backend::Memory).unwrap().name(), "memory");
        assert_eq!(create(&Backend::default()).unwrap().name(), "influxdb2");

        let v1 = Backend::InfluxDb1 {
            url: Some("http://localhost:8086".into()),
            database: "iot_writes".into(),
        };
        assert_eq!(create(&v1).unwrap().name(), "influxdb1");
    }
}
