//! Configuration for the writebench binary.
//!
//! Configuration is layered from the following sources, later ones overriding earlier ones:
//!
//! 1. Defaults
//! 2. YAML configuration file (specified via `-c` or `--config` flag)
//! 3. Environment variables (prefixed with `WB__`)
//! 4. Command line flags
//!
//! # Environment Variables
//!
//! Environment variables use `WB__` as a prefix and double underscores (`__`) to denote nested
//! configuration structures. For example:
//!
//! - `WB__RUN__THREADS_COUNT=10` sets the number of workers
//! - `WB__BACKEND__TYPE=influxdb1` selects the InfluxDB 1.x backend
//! - `WB__BACKEND__URL=http://influx:8086` sets its URL
//!
//! # YAML Configuration File
//!
//! The above configuration in YAML format would look like this:
//!
//! ```yaml
//! run:
//!   threads_count: 10
//!   pace: 500ms
//!
//! backend:
//!   type: influxdb1
//!   url: http://influx:8086
//! ```

use std::fmt;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Result;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use secrecy::{CloneableSecret, SecretBox, SerializableSecret, zeroize::Zeroize};
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;
use writebench_harness::RunConfig;
use writebench_harness::config::{
    DEFAULT_PACE, DEFAULT_SECONDS, DEFAULT_TICKS_PER_SECOND, DEFAULT_WORKERS,
};
use writebench_influx::{v1, v2};

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "WB__";

/// Default InfluxDB 2.x API token.
const DEFAULT_TOKEN: &str = "my-token";

/// Newtype around `String` that protects against accidental logging of secrets. Use with
/// [`secrecy::SecretBox`].
#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConfigSecret(String);

impl ConfigSecret {
    /// Returns the secret value.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for ConfigSecret {
    fn from(str: &str) -> Self {
        ConfigSecret(str.to_owned())
    }
}

impl fmt::Debug for ConfigSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[redacted]")
    }
}

impl CloneableSecret for ConfigSecret {}
impl SerializableSecret for ConfigSecret {}
impl Zeroize for ConfigSecret {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

/// Sizing and behavior of a run.
///
/// Used in: [`Config::run`]
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Run {
    /// Number of concurrent workers.
    ///
    /// # Default
    ///
    /// `2000`
    ///
    /// # Environment Variable
    ///
    /// `WB__RUN__THREADS_COUNT`
    pub threads_count: usize,

    /// Run duration in seconds.
    ///
    /// # Default
    ///
    /// `30`
    pub seconds_count: u64,

    /// Number of records each worker writes per second.
    ///
    /// # Default
    ///
    /// `100`
    pub line_protocols_count: u64,

    /// Measurement name used to tag and count the records of this run.
    ///
    /// # Default
    ///
    /// `sensor_<unix nanos>`, unique per run.
    pub measurement_name: Option<String>,

    /// Skip counting the accepted records after the run.
    pub skip_count: bool,

    /// Pause between two batches of the same worker, as a humantime string like `1s` or `250ms`.
    ///
    /// # Default
    ///
    /// `1s`
    #[serde(with = "humantime_serde")]
    pub pace: Duration,
}

impl Default for Run {
    fn default() -> Self {
        Self {
            threads_count: DEFAULT_WORKERS,
            seconds_count: DEFAULT_SECONDS,
            line_protocols_count: DEFAULT_TICKS_PER_SECOND,
            measurement_name: None,
            skip_count: false,
            pace: DEFAULT_PACE,
        }
    }
}

fn default_database() -> String {
    v1::DEFAULT_DATABASE.to_owned()
}

fn default_org() -> String {
    v2::DEFAULT_ORG.to_owned()
}

fn default_bucket() -> String {
    v2::DEFAULT_BUCKET.to_owned()
}

fn default_token() -> SecretBox<ConfigSecret> {
    SecretBox::new(Box::new(ConfigSecret::from(DEFAULT_TOKEN)))
}

fn default_batch_size() -> usize {
    v2::DEFAULT_BATCH_SIZE
}

/// Backend configuration.
///
/// The `type` field in YAML or `__TYPE` in environment variables determines which variant is used.
///
/// Used in: [`Config::backend`]
#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Backend {
    /// In-process backend that keeps counts in memory (type `"memory"`).
    ///
    /// Useful to measure the overhead of the harness itself.
    Memory,

    /// InfluxDB 1.x (type `"influxdb1"`).
    ///
    /// # Example
    ///
    /// ```yaml
    /// backend:
    ///   type: influxdb1
    ///   url: http://localhost:8086
    ///   database: iot_writes
    /// ```
    InfluxDb1 {
        /// Server URL, defaults to `http://localhost:8086`.
        url: Option<String>,
        /// Target database.
        #[serde(default = "default_database")]
        database: String,
    },

    /// InfluxDB 2.x (type `"influxdb2"`).
    ///
    /// # Example
    ///
    /// ```yaml
    /// backend:
    ///   type: influxdb2
    ///   url: http://localhost:9999
    ///   org: my-org
    ///   bucket: my-bucket
    ///   token: my-token
    ///   batch_size: 1000
    /// ```
    InfluxDb2 {
        /// Server URL, defaults to `http://localhost:9999`.
        url: Option<String>,
        /// Organization owning the bucket.
        #[serde(default = "default_org")]
        org: String,
        /// Target bucket.
        #[serde(default = "default_bucket")]
        bucket: String,
        /// API token. Never logged.
        ///
        /// # Environment Variable
        ///
        /// `WB__BACKEND__TOKEN`
        #[serde(default = "default_token")]
        token: SecretBox<ConfigSecret>,
        /// Number of records written per request.
        #[serde(default = "default_batch_size")]
        batch_size: usize,
    },
}

impl Default for Backend {
    fn default() -> Self {
        Backend::InfluxDb2 {
            url: None,
            org: default_org(),
            bucket: default_bucket(),
            token: default_token(),
            batch_size: default_batch_size(),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Memory => write!(f, "memory"),
            Backend::InfluxDb1 { url, database } => write!(
                f,
                "influxdb1 ({}, database: {database})",
                url.as_deref().unwrap_or(v1::DEFAULT_URL)
            ),
            Backend::InfluxDb2 {
                url,
                org,
                bucket,
                batch_size,
                ..
            } => write!(
                f,
                "influxdb2 ({}, org: {org}, bucket: {bucket}, batch size: {batch_size})",
                url.as_deref().unwrap_or(v2::DEFAULT_URL)
            ),
        }
    }
}

/// Runtime configuration.
///
/// Used in: [`Config::runtime`]
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Runtime {
    /// Number of threads of the async runtime that drives the workers.
    ///
    /// # Default
    ///
    /// The number of CPU cores on the host machine.
    ///
    /// # Environment Variable
    ///
    /// `WB__RUNTIME__WORKER_THREADS`
    pub worker_threads: Option<usize>,
}

/// Log output format.
///
/// Controls how log messages are formatted. The format can be explicitly specified or
/// auto-detected based on whether output is to a TTY.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect the best format.
    ///
    /// This chooses [`LogFormat::Pretty`] for TTY, otherwise [`LogFormat::Simplified`].
    Auto,

    /// Pretty printing with colors.
    Pretty,

    /// Simplified plain text output.
    Simplified,

    /// Dump out JSON lines.
    Json,
}

mod display_fromstr {
    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
        T: std::fmt::Display,
    {
        serializer.collect_str(&value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        D: serde::Deserializer<'de>,
        T: std::str::FromStr,
        <T as std::str::FromStr>::Err: std::fmt::Display,
    {
        use serde::Deserialize;
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Logging configuration.
///
/// Logs are always written to stderr, so they never mix with the report on stdout.
///
/// Used in: [`Config::logging`]
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Logging {
    /// Minimum log level to output.
    ///
    /// The `RUST_LOG` environment variable overrides this and provides more granular control per
    /// module if needed.
    ///
    /// # Default
    ///
    /// `WARN`
    ///
    /// # Environment Variable
    ///
    /// `WB__LOGGING__LEVEL`
    #[serde(with = "display_fromstr")]
    pub level: LevelFilter,

    /// Log output format, see [`LogFormat`].
    ///
    /// # Default
    ///
    /// `Auto` (pretty for TTY, simplified otherwise)
    pub format: LogFormat,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::WARN,
            format: LogFormat::Auto,
        }
    }
}

/// Main configuration struct for the writebench binary.
///
/// See the [module documentation](self) for how configuration sources are layered.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Sizing and behavior of the run.
    pub run: Run,

    /// The backend records are written to.
    pub backend: Backend,

    /// Async runtime settings.
    pub runtime: Runtime,

    /// Logging settings.
    pub logging: Logging,
}

impl Config {
    /// Returns the layered configuration sources without command line overrides.
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Loads configuration from defaults, the optional YAML file, the environment and finally
    /// `overrides`.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML file cannot be read or parsed, or if any source contains
    /// invalid values.
    pub fn load(path: Option<&Path>, overrides: impl figment::Provider) -> Result<Self> {
        let config = Self::figment(path).merge(overrides).extract()?;
        Ok(config)
    }

    /// Builds the harness configuration, generating a unique measurement name if none is set.
    pub fn run_config(&self) -> RunConfig {
        let label = self
            .run
            .measurement_name
            .clone()
            .unwrap_or_else(default_measurement_name);

        RunConfig {
            workers: self.run.threads_count,
            seconds: self.run.seconds_count,
            ticks_per_second: self.run.line_protocols_count,
            label,
            skip_count: self.run.skip_count,
            pace: self.run.pace,
        }
    }
}

fn default_measurement_name() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("sensor_{nanos}")
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn defaults() {
        figment::Jail::expect_with(|_jail| {
            let config = Config::load(None, Figment::new()).unwrap();

            assert_eq!(config.run.threads_count, 2000);
            assert_eq!(config.run.seconds_count, 30);
            assert_eq!(config.run.line_protocols_count, 100);
            assert_eq!(config.run.pace, Duration::from_secs(1));
            assert!(!config.run.skip_count);

            let Backend::InfluxDb2 {
                url,
                org,
                bucket,
                token,
                batch_size,
            } = &config.backend
            else {
                panic!("expected influxdb2 backend");
            };
            assert_eq!(*url, None);
            assert_eq!(org, "my-org");
            assert_eq!(bucket, "my-bucket");
            assert_eq!(token.expose_secret().as_str(), "my-token");
            assert_eq!(*batch_size, 1000);

            assert_eq!(config.logging.level, LevelFilter::WARN);
            assert_eq!(config.logging.format, LogFormat::Auto);

            Ok(())
        });
    }

    #[test]
    fn configurable_via_env() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("WB__RUN__THREADS_COUNT", "10");
            jail.set_env("WB__RUN__PACE", "250ms");
            jail.set_env("WB__RUN__MEASUREMENT_NAME", "env_sensor");
            jail.set_env("WB__BACKEND__TYPE", "influxdb1");
            jail.set_env("WB__BACKEND__URL", "http://influx:8086");
            jail.set_env("WB__LOGGING__LEVEL", "debug");
            jail.set_env("WB__LOGGING__FORMAT", "json");

            let config = Config::load(None, Figment::new()).unwrap();

            assert_eq!(config.run.threads_count, 10);
            assert_eq!(config.run.pace, Duration::from_millis(250));
            assert_eq!(config.run.measurement_name.as_deref(), Some("env_sensor"));

            let Backend::InfluxDb1 { url, database } = &dbg!(&config).backend else {
                panic!("expected influxdb1 backend");
            };
            assert_eq!(url.as_deref(), Some("http://influx:8086"));
            assert_eq!(database, "iot_writes");

            assert_eq!(config.logging.level, LevelFilter::DEBUG);
            assert_eq!(config.logging.format, LogFormat::Json);

            Ok(())
        });
    }

    #[test]
    fn configurable_via_yaml() {
        let mut tempfile = tempfile::NamedTempFile::new().unwrap();
        tempfile
            .write_all(
                br#"
            run:
                seconds_count: 5
                skip_count: true
            backend:
                type: influxdb2
                url: http://localhost:8087
                token: secret-token
                batch_size: 50
            "#,
            )
            .unwrap();

        figment::Jail::expect_with(|_jail| {
            let config = Config::load(Some(tempfile.path()), Figment::new()).unwrap();

            assert_eq!(config.run.seconds_count, 5);
            assert!(config.run.skip_count);

            let Backend::InfluxDb2 {
                url,
                token,
                batch_size,
                org,
                ..
            } = &config.backend
            else {
                panic!("expected influxdb2 backend");
            };
            assert_eq!(url.as_deref(), Some("http://localhost:8087"));
            assert_eq!(token.expose_secret().as_str(), "secret-token");
            assert_eq!(*batch_size, 50);
            assert_eq!(org, "my-org");

            Ok(())
        });
    }

    #[test]
    fn overrides_win_over_env_and_yaml() {
        let mut tempfile = tempfile::NamedTempFile::new().unwrap();
        tempfile
            .write_all(
                br#"
            run:
                threads_count: 3
            backend:
                type: memory
            "#,
            )
            .unwrap();

        figment::Jail::expect_with(|jail| {
            jail.set_env("WB__RUN__THREADS_COUNT", "4");
            jail.set_env("WB__RUN__SECONDS_COUNT", "6");

            let overrides = Serialized::default("run.seconds_count", 7);
            let config = Config::load(Some(tempfile.path()), overrides).unwrap();

            // env overwrites yaml, overrides overwrite env
            assert_eq!(config.run.threads_count, 4);
            assert_eq!(config.run.seconds_count, 7);
            assert!(matches!(config.backend, Backend::Memory));

            Ok(())
        });
    }

    #[test]
    fn invalid_backend_type_fails() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("WB__BACKEND__TYPE", "cassandra");
            assert!(Config::load(None, Figment::new()).is_err());
            Ok(())
        });
    }

    #[test]
    fn token_is_redacted() {
        let backend = Backend::default();
        assert!(!format!("{backend:?}").contains("my-token"));
        assert!(!backend.to_string().contains("my-token"));
        assert_eq!(
            backend.to_string(),
            "influxdb2 (http://localhost:9999, org: my-org, bucket: my-bucket, batch size: 1000)"
        );
    }

    #[test]
    fn generates_measurement_name() {
        let config = Config::default();
        let run = config.run_config();

        assert!(run.label.starts_with("sensor_"));
        assert_eq!(run.workers, 2000);
        assert_eq!(run.validate().unwrap(), 6_000_000);

        let config = Config {
            run: Run {
                measurement_name: Some("fixed".into()),
                ..Run::default()
            },
            ..Config::default()
        };
        assert_eq!(config.run_config().label, "fixed");
    }
}
