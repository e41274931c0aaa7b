//! Parameters of a single benchmark run.

use std::time::Duration;

use crate::error::ConfigError;

/// Default number of concurrent workers.
pub const DEFAULT_WORKERS: usize = 2000;
/// Default run duration in seconds.
pub const DEFAULT_SECONDS: u64 = 30;
/// Default number of records each worker emits per second.
pub const DEFAULT_TICKS_PER_SECOND: u64 = 100;
/// Default pause between two batches of one worker.
pub const DEFAULT_PACE: Duration = Duration::from_secs(1);

/// Immutable configuration of one run.
///
/// The harness validates the configuration before starting any worker, see
/// [`RunConfig::validate`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RunConfig {
    /// Number of concurrent workers.
    pub workers: usize,
    /// Run duration in whole seconds. This is also the number of batches per worker.
    pub seconds: u64,
    /// Number of records each worker submits per second.
    pub ticks_per_second: u64,
    /// The label used both to tag submitted records and to count them afterwards.
    pub label: String,
    /// Skips the post-run count query.
    pub skip_count: bool,
    /// Pause between two batches of the same worker.
    pub pace: Duration,
}

impl RunConfig {
    /// Creates a configuration with default sizing for the given label.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            seconds: DEFAULT_SECONDS,
            ticks_per_second: DEFAULT_TICKS_PER_SECOND,
            label: label.into(),
            skip_count: false,
            pace: DEFAULT_PACE,
        }
    }

    /// The wall-clock duration after which workers are told to stop.
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.seconds)
    }

    /// Checks the configuration and returns the number of records the run is expected to produce.
    ///
    /// The expected count is `workers * seconds * ticks_per_second`. It depends on the
    /// configuration alone, never on what happens during the run.
    pub fn validate(&self) -> Result<u64, ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.seconds == 0 {
            return Err(ConfigError::NoDuration);
        }
        if self.ticks_per_second == 0 {
            return Err(ConfigError::NoTicks);
        }
        if self.label.is_empty() {
            return Err(ConfigError::EmptyLabel);
        }

        u64::try_from(self.workers)
            .ok()
            .and_then(|workers| workers.checked_mul(self.seconds))
            .and_then(|ticks| ticks.checked_mul(self.ticks_per_second))
            .ok_or(ConfigError::Overflow)
    }
}
