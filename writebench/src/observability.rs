use std::env;
use std::io::{self, IsTerminal};

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, Layer, Registry, prelude::*};

use crate::config::{LogFormat, Logging};

/// Installs the global tracing subscriber writing to stderr.
///
/// Does nothing if a subscriber is already installed.
pub fn init_tracing(logging: &Logging) {
    let (level, env_filter) = parse_rust_log(logging.level);

    let format = match logging.format {
        LogFormat::Auto if io::stderr().is_terminal() => LogFormat::Pretty,
        LogFormat::Auto => LogFormat::Simplified,
        format => format,
    };

    let layer: Box<dyn Layer<Registry> + Send + Sync> = match format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .with_writer(io::stderr)
            .json()
            .flatten_event(true)
            .boxed(),
        LogFormat::Simplified => tracing_subscriber::fmt::layer()
            .with_writer(io::stderr)
            .with_ansi(false)
            .with_target(true)
            .boxed(),
        LogFormat::Pretty | LogFormat::Auto => tracing_subscriber::fmt::layer()
            .with_writer(io::stderr)
            .compact()
            .with_target(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(level))
        .with(env_filter)
        .try_init()
        .ok();
}

/// Returns the maximum level to log and the per-crate filter, honoring `RUST_LOG`.
///
/// If `RUST_LOG` holds a plain level, it replaces the configured level. Any other value is used
/// literally as filter directives.
pub fn parse_rust_log(configured: LevelFilter) -> (LevelFilter, EnvFilter) {
    let level = match env::var(EnvFilter::DEFAULT_ENV) {
        Ok(value) => match value.parse::<LevelFilter>() {
            Ok(level) => level,
            Err(_) => return (LevelFilter::TRACE, EnvFilter::new(value)),
        },
        Err(_) => configured,
    };

    // This is the maximum verbosity that will be logged, we filter this down to `level`.
    let env_filter = EnvFilter::new(
        "INFO,\
        writebench=TRACE,\
        writebench_harness=TRACE,\
        writebench_influx=TRACE,\
        ",
    );

    (level, env_filter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rust_log_level_overrides_config() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("RUST_LOG", "debug");
            let (level, _) = parse_rust_log(LevelFilter::WARN);
            assert_eq!(level, LevelFilter::DEBUG);
            Ok(())
        });
    }

    #[test]
    fn rust_log_directives_are_used_literally() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("RUST_LOG", "writebench_influx=debug,reqwest=trace");
            let (level, filter) = parse_rust_log(LevelFilter::WARN);
            assert_eq!(level, LevelFilter::TRACE);
            assert!(filter.to_string().contains("writebench_influx=debug"));
            Ok(())
        });
    }
}
