//! Runs a benchmark: fans out workers, stops them at the deadline and accounts for the results.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use sketches_ddsketch::DDSketch;
use tokio::time::Instant;

use crate::backend::SharedBackend;
use crate::config::RunConfig;
use crate::error::HarnessError;
use crate::progress::Progress;
use crate::signal::StopSignal;
use crate::worker::{Worker, WorkerStats};

/// The worker that reports progress, if an observer is installed.
const PROGRESS_WORKER: usize = 1;

/// The phases a run moves through.
///
/// A successful run goes `Idle → Validating → Running → Draining → Counting → Closing → Done`,
/// where `Counting` is skipped if configured. `Failed` is reached from `Validating`, `Counting` or
/// `Closing`.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Phase {
    /// Nothing has happened yet.
    Idle,
    /// The configuration is being checked.
    Validating,
    /// Workers are submitting records.
    Running,
    /// Workers are winding down, either because the deadline elapsed or because they spent their
    /// budget early.
    Draining,
    /// All workers have exited and the backend is queried for the accepted count.
    Counting,
    /// Backend resources are being released.
    Closing,
    /// The run completed.
    Done,
    /// The run aborted with a fatal error.
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Validating => "validating",
            Phase::Running => "running",
            Phase::Draining => "draining",
            Phase::Counting => "counting",
            Phase::Closing => "closing",
            Phase::Done => "done",
            Phase::Failed => "failed",
        };
        f.write_str(name)
    }
}

fn enter(progress: Option<&Arc<dyn Progress>>, phase: Phase) {
    tracing::debug!(%phase, "entering phase");
    if let Some(progress) = progress {
        progress.phase_changed(phase);
    }
}

/// The outcome of a completed run.
pub struct RunResult {
    /// Number of records the run was configured to produce.
    pub expected: u64,
    /// Number of records the backend reported as accepted, or `None` if counting was skipped.
    pub observed: Option<u64>,
    /// Wall-clock time from starting the workers until the last one exited.
    pub elapsed: Duration,
    /// The configured run duration.
    pub duration: Duration,
    /// Number of submissions the backend acknowledged.
    ///
    /// Backends that buffer records acknowledge a submission before it reaches the server, so a
    /// batch write failing later is not reflected here. Only `observed` is authoritative.
    pub submitted: u64,
    /// Number of submissions that failed.
    pub failed: u64,
    /// Latency of acknowledged submissions, in seconds.
    pub latency: DDSketch,
}

impl RunResult {
    /// Observed records as a percentage of expected records.
    pub fn accuracy(&self) -> Option<f64> {
        self.observed
            .map(|observed| observed as f64 / self.expected as f64 * 100.0)
    }

    /// Observed records per second of configured run duration.
    pub fn rate(&self) -> Option<f64> {
        let seconds = self.duration.as_secs_f64();
        self.observed.map(|observed| observed as f64 / seconds)
    }
}

impl fmt::Debug for RunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunResult")
            .field("expected", &self.expected)
            .field("observed", &self.observed)
            .field("elapsed", &self.elapsed)
            .field("duration", &self.duration)
            .field("submitted", &self.submitted)
            .field("failed", &self.failed)
            .field("latency_samples", &self.latency.count())
            .finish()
    }
}

/// Drives one benchmark run against a backend.
#[derive(Debug)]
pub struct Harness {
    config: RunConfig,
    backend: SharedBackend,
    progress: Option<Arc<dyn Progress>>,
}

impl Harness {
    /// Creates a harness for the given configuration and backend.
    pub fn new(config: RunConfig, backend: SharedBackend) -> Self {
        Self {
            config,
            backend,
            progress: None,
        }
    }

    /// Installs a progress observer on the first worker.
    pub fn with_progress(mut self, progress: Arc<dyn Progress>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Returns the run configuration.
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Performs the run.
    ///
    /// This validates the configuration, runs all workers until the deadline elapses or they have
    /// spent their budget, waits for every worker to exit, optionally counts the accepted records,
    /// and finally closes the backend. The backend is closed exactly once whenever workers were
    /// started, even if counting fails.
    pub async fn run(self) -> Result<RunResult, HarnessError> {
        let Self {
            config,
            backend,
            progress,
        } = self;

        let progress = progress.as_ref();

        enter(progress, Phase::Idle);
        enter(progress, Phase::Validating);
        let expected = config
            .validate()
            .inspect_err(|_| enter(progress, Phase::Failed))?;

        enter(progress, Phase::Running);
        tracing::info!(
            backend = backend.name(),
            workers = config.workers,
            seconds = config.seconds,
            ticks_per_second = config.ticks_per_second,
            expected,
            "starting workers"
        );

        let label: Arc<str> = config.label.as_str().into();
        let stop = StopSignal::new();
        let start = Instant::now();

        let workers: Vec<_> = (1..=config.workers)
            .map(|id| {
                let worker = Worker {
                    id,
                    label: Arc::clone(&label),
                    seconds: config.seconds,
                    ticks_per_second: config.ticks_per_second,
                    pace: config.pace,
                    stop: stop.listener(),
                    backend: Arc::clone(&backend),
                    progress: progress.filter(|_| id == PROGRESS_WORKER).cloned(),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        // completion barrier: every worker handle resolves before we continue
        let all_exited = futures::future::join_all(workers);
        tokio::pin!(all_exited);
        let duration = config.duration();
        let early = tokio::select! {
            finished = &mut all_exited => Some(finished),
            () = tokio::time::sleep(duration) => None,
        };

        let finished = match early {
            Some(finished) => {
                tracing::debug!("workers spent their budget before the deadline");
                enter(progress, Phase::Draining);
                finished
            }
            None => {
                tracing::info!(?duration, "deadline elapsed, stopping workers");
                stop.signal();
                enter(progress, Phase::Draining);
                all_exited.await
            }
        };
        let elapsed = start.elapsed();

        let mut stats = WorkerStats::default();
        let mut exited = 0;
        for result in finished {
            exited += 1;
            match result {
                Ok(worker) => stats.merge(worker),
                Err(error) => {
                    tracing::error!(
                        error = &error as &dyn std::error::Error,
                        "worker task failed"
                    );
                }
            }
        }
        tracing::info!(
            exited,
            submitted = stats.submitted,
            failed = stats.failed,
            ?elapsed,
            "all workers exited"
        );

        if let Some(progress) = progress {
            progress.finish();
        }

        let observed = if config.skip_count {
            Ok(None)
        } else {
            enter(progress, Phase::Counting);
            backend.count(&config.label).await.map(Some)
        };

        enter(progress, Phase::Closing);
        let closed = backend.close().await;

        let observed = match (observed, closed) {
            (Ok(observed), Ok(())) => observed,
            (Err(error), closed) => {
                if let Err(ref close_error) = closed {
                    tracing::error!(
                        error = close_error as &dyn std::error::Error,
                        "closing the backend failed"
                    );
                }
                enter(progress, Phase::Failed);
                return Err(HarnessError::Query(error));
            }
            (Ok(_), Err(error)) => {
                enter(progress, Phase::Failed);
                return Err(HarnessError::Close(error));
            }
        };

        enter(progress, Phase::Done);
        Ok(RunResult {
            expected,
            observed,
            elapsed,
            duration: config.duration(),
            submitted: stats.submitted,
            failed: stats.failed,
            latency: stats.latency,
        })
    }
}
