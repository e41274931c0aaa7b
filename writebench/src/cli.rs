use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use argh::FromArgs;
use figment::Figment;
use figment::providers::Serialized;
use writebench_harness::Harness;

use crate::config::Config;
use crate::progress::BarProgress;
use crate::{backend, observability, report};

/// Time-bounded concurrent write benchmark for time series databases.
///
/// Every flag overrides the configuration file and `WB__` environment variables.
#[derive(Debug, FromArgs)]
pub struct Args {
    /// path to the YAML configuration file
    #[argh(option, short = 'c')]
    pub config: Option<PathBuf>,

    /// number of concurrent workers
    #[argh(option)]
    pub threads_count: Option<usize>,

    /// run duration in seconds
    #[argh(option)]
    pub seconds_count: Option<u64>,

    /// number of records each worker writes per second
    #[argh(option)]
    pub line_protocols_count: Option<u64>,

    /// pause between two batches of a worker, like `1s` or `250ms`
    #[argh(option)]
    pub pace: Option<String>,

    /// measurement name, defaults to a unique `sensor_<nanos>`
    #[argh(option)]
    pub measurement_name: Option<String>,

    /// skip counting the written records after the run
    #[argh(switch)]
    pub skip_count: bool,

    /// backend to write to: memory, influxdb1 or influxdb2
    #[argh(option, long = "type")]
    pub backend_type: Option<String>,

    /// backend URL
    #[argh(option)]
    pub url: Option<String>,

    /// the InfluxDB 2.x API token
    #[argh(option)]
    pub token: Option<String>,

    /// number of records per InfluxDB 2.x write request
    #[argh(option)]
    pub batch_size: Option<usize>,
}

impl Args {
    /// Returns the configuration values set on the command line.
    pub fn overrides(&self) -> Figment {
        let mut figment = Figment::new();

        if let Some(threads_count) = self.threads_count {
            figment = figment.merge(Serialized::default("run.threads_count", threads_count));
        }
        if let Some(seconds_count) = self.seconds_count {
            figment = figment.merge(Serialized::default("run.seconds_count", seconds_count));
        }
        if let Some(count) = self.line_protocols_count {
            figment = figment.merge(Serialized::default("run.line_protocols_count", count));
        }
        if let Some(ref pace) = self.pace {
            figment = figment.merge(Serialized::default("run.pace", pace));
        }
        if let Some(ref name) = self.measurement_name {
            figment = figment.merge(Serialized::default("run.measurement_name", name));
        }
        if self.skip_count {
            figment = figment.merge(Serialized::default("run.skip_count", true));
        }
        if let Some(ref backend_type) = self.backend_type {
            figment = figment.merge(Serialized::default("backend.type", backend_type));
        }
        if let Some(ref url) = self.url {
            figment = figment.merge(Serialized::default("backend.url", url));
        }
        if let Some(ref token) = self.token {
            figment = figment.merge(Serialized::default("backend.token", token));
        }
        if let Some(batch_size) = self.batch_size {
            figment = figment.merge(Serialized::default("backend.batch_size", batch_size));
        }

        figment
    }
}

/// Parses the command line, runs the benchmark and prints the results.
pub fn execute() -> Result<()> {
    let args: Args = argh::from_env();

    let config = Config::load(args.config.as_deref(), args.overrides())
        .context("failed to load configuration")?;

    observability::init_tracing(&config.logging);
    tracing::debug!(?config);

    let run = config.run_config();
    let expected = run.validate().context("invalid run configuration")?;

    if !io::stdout().is_terminal() {
        yansi::disable();
    }
    report::print_summary(&mut io::stdout().lock(), &run, &config.backend, expected)?;

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.thread_name("writebench-rt").enable_all();
    if let Some(worker_threads) = config.runtime.worker_threads {
        builder.worker_threads(worker_threads);
    }
    let runtime = builder.build()?;

    let result = runtime.block_on(async {
        let backend = backend::create(&config.backend)?;
        let progress = BarProgress::new(run.seconds)?;

        Harness::new(run, backend)
            .with_progress(Arc::new(progress))
            .run()
            .await
            .map_err(|error| {
                let phase = error.phase();
                anyhow::Error::new(error).context(format!("benchmark failed while {phase}"))
            })
    })?;

    report::print_result(&mut io::stdout().lock(), &result)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::config::Backend;

    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::from_args(&["writebench"], args).unwrap()
    }

    #[test]
    fn flags_override_config() {
        let args = parse(&[
            "--threads-count",
            "8",
            "--seconds-count",
            "2",
            "--line-protocols-count",
            "5",
            "--pace",
            "0s",
            "--measurement-name",
            "cli_sensor",
            "--skip-count",
            "--type",
            "influxdb1",
            "--url",
            "http://influx:8086",
        ]);

        figment::Jail::expect_with(|jail| {
            jail.set_env("WB__RUN__THREADS_COUNT", "100");

            let config = Config::load(None, args.overrides()).unwrap();
            let run = config.run_config();

            assert_eq!(run.workers, 8);
            assert_eq!(run.seconds, 2);
            assert_eq!(run.ticks_per_second, 5);
            assert_eq!(run.pace, std::time::Duration::ZERO);
            assert_eq!(run.label, "cli_sensor");
            assert!(run.skip_count);

            let Backend::InfluxDb1 { url, .. } = &config.backend else {
                panic!("expected influxdb1 backend");
            };
            assert_eq!(url.as_deref(), Some("http://influx:8086"));

            Ok(())
        });
    }

    #[test]
    fn token_and_batch_size() {
        use secrecy::ExposeSecret;

        let args = parse(&["--token", "cli-token", "--batch-size", "10"]);

        figment::Jail::expect_with(|_jail| {
            let config = Config::load(None, args.overrides()).unwrap();

            let Backend::InfluxDb2 {
                token, batch_size, ..
            } = &config.backend
            else {
                panic!("expected influxdb2 backend");
            };
            assert_eq!(token.expose_secret().as_str(), "cli-token");
            assert_eq!(*batch_size, 10);

            Ok(())
        });
    }

    #[test]
    fn no_flags_keep_defaults() {
        let args = parse(&[]);
        figment::Jail::expect_with(|_jail| {
            let config = Config::load(None, args.overrides()).unwrap();
            assert_eq!(config.run.threads_count, 2000);
            assert!(!config.run.skip_count);
            Ok(())
        });
    }
}
