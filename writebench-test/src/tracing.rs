//! Log capture for tests.

use tracing_subscriber::EnvFilter;

/// Crates whose logs are captured at full verbosity.
const WRITEBENCH_CRATES: &[&str] = &[
    "writebench",
    "writebench_harness",
    "writebench_influx",
    "writebench_test",
];

/// Installs a global subscriber writing to the output captured by the test runner.
///
/// `RUST_LOG` takes precedence when it is set. Otherwise, only writebench crates log, at `TRACE`.
/// Calling this more than once is fine; only the first call installs a subscriber.
///
/// ```
/// writebench_test::tracing::init();
/// ```
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        WRITEBENCH_CRATES
            .iter()
            .fold(EnvFilter::new("ERROR"), |filter, name| {
                filter.add_directive(format!("{name}=trace").parse().unwrap())
            })
    });

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_test_writer()
        .without_time()
        .compact()
        .try_init()
        .ok();
}
