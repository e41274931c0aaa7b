use thiserror::Error;

use crate::backend::BackendError;
use crate::harness::Phase;

/// An invalid [`RunConfig`](crate::RunConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The worker count is zero.
    #[error("worker count must be positive")]
    NoWorkers,

    /// The run duration is zero.
    #[error("run duration must be at least one second")]
    NoDuration,

    /// The number of ticks per second and worker is zero.
    #[error("ticks per second must be positive")]
    NoTicks,

    /// The label is empty.
    #[error("label must not be empty")]
    EmptyLabel,

    /// The expected number of records does not fit into 64 bits.
    #[error("expected record count overflows")]
    Overflow,
}

/// Fatal errors that abort a run.
///
/// Failures of individual submissions are not part of this type. They are counted in the
/// [`RunResult`](crate::RunResult) instead.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// The run configuration is invalid. No worker was started.
    #[error("invalid run configuration: {0}")]
    Config(#[from] ConfigError),

    /// Counting accepted records failed after all workers had exited.
    #[error("count query failed: {0}")]
    Query(#[source] BackendError),

    /// Releasing backend resources failed.
    #[error("closing the backend failed: {0}")]
    Close(#[source] BackendError),
}

impl HarnessError {
    /// The phase of the run in which this error occurred.
    pub fn phase(&self) -> Phase {
        match self {
            HarnessError::Config(_) => Phase::Validating,
            HarnessError::Query(_) => Phase::Counting,
            HarnessError::Close(_) => Phase::Closing,
        }
    }
}
