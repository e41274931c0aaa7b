use std::sync::Arc;
use std::time::Duration;

use sketches_ddsketch::DDSketch;
use tokio::time::Instant;

use crate::backend::SharedBackend;
use crate::progress::Progress;
use crate::record::{self, Tick};
use crate::signal::StopListener;

/// What a single worker observed during its run.
#[derive(Default)]
pub(crate) struct WorkerStats {
    pub submitted: u64,
    pub failed: u64,
    /// Latency of successful submissions, in seconds.
    pub latency: DDSketch,
}

impl WorkerStats {
    pub fn merge(&mut self, other: WorkerStats) {
        self.submitted += other.submitted;
        self.failed += other.failed;
        if let Err(error) = self.latency.merge(&other.latency) {
            tracing::warn!(?error, "failed to merge latency sketch");
        }
    }
}

/// One unit of concurrent load generation.
pub(crate) struct Worker {
    pub id: usize,
    pub label: Arc<str>,
    pub seconds: u64,
    pub ticks_per_second: u64,
    pub pace: Duration,
    pub stop: StopListener,
    pub backend: SharedBackend,
    pub progress: Option<Arc<dyn Progress>>,
}

impl Worker {
    /// Submits one batch per second until the budget is spent or the stop signal fires.
    ///
    /// The stop signal is checked before every single submission, so a worker overshoots the
    /// deadline by at most the one submission that is in flight when the signal fires.
    pub(crate) async fn run(self) -> WorkerStats {
        let mut stats = WorkerStats::default();

        'seconds: for second in 1..=self.seconds {
            if self.stop.is_signaled() {
                break;
            }

            for sequence in Tick::sequences(second, self.ticks_per_second) {
                if self.stop.is_signaled() {
                    break 'seconds;
                }

                let tick = Tick {
                    worker_id: self.id,
                    sequence,
                };
                let record = record::emit(&self.label, tick);

                let start = Instant::now();
                match self.backend.submit(record).await {
                    Ok(()) => {
                        stats.submitted += 1;
                        stats.latency.add(start.elapsed().as_secs_f64());
                    }
                    Err(error) => {
                        stats.failed += 1;
                        tracing::debug!(
                            worker = self.id,
                            sequence,
                            error = &error as &dyn std::error::Error,
                            "submission failed"
                        );
                    }
                }
            }

            if let Some(ref progress) = self.progress {
                progress.second_completed(second, self.seconds);
            }

            tokio::select! {
                _ = self.stop.signaled() => break,
                _ = tokio::time::sleep(self.pace) => {}
            }
        }

        tracing::trace!(
            worker = self.id,
            submitted = stats.submitted,
            failed = stats.failed,
            "worker exited"
        );
        stats
    }
}
