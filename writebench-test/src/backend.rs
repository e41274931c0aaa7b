//! A scripted [`Backend`] that records how the harness drives it.
//!
//! [`ScriptedBackend`] can be told to fail submissions, count queries or closing, and to take a
//! fixed amount of time per submission. It is [`Clone`] so tests can keep a handle for inspection
//! after handing a copy to the harness.
//!
//! ```
//! use std::sync::Arc;
//! use writebench_test::backend::{CountBehavior, ScriptedBackend};
//!
//! let backend = ScriptedBackend::builder()
//!     .fail_submissions(true)
//!     .count(CountBehavior::Fixed(0))
//!     .build();
//! let shared: writebench_harness::SharedBackend = Arc::new(backend.clone());
//! ```

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use writebench_harness::{Backend, BackendError, BackendResult, Record};

/// How [`ScriptedBackend`] answers count queries.
#[derive(Clone, Copy, Debug, Default)]
pub enum CountBehavior {
    /// Returns the number of accepted submissions.
    #[default]
    Accepted,
    /// Returns a fixed number.
    Fixed(u64),
    /// Fails with a [`BackendError::Rejected`].
    Fail,
}

/// Builder for a [`ScriptedBackend`].
#[derive(Debug, Default)]
#[must_use]
pub struct ScriptedBackendBuilder {
    submit_latency: Duration,
    fail_submissions: bool,
    count: CountBehavior,
    fail_close: bool,
}

impl ScriptedBackendBuilder {
    /// Makes every submission take the given time before it completes.
    pub fn submit_latency(mut self, latency: Duration) -> Self {
        self.submit_latency = latency;
        self
    }

    /// Makes every submission fail.
    pub fn fail_submissions(mut self, fail: bool) -> Self {
        self.fail_submissions = fail;
        self
    }

    /// Configures the answer to count queries.
    pub fn count(mut self, count: CountBehavior) -> Self {
        self.count = count;
        self
    }

    /// Makes closing the backend fail.
    pub fn fail_close(mut self, fail: bool) -> Self {
        self.fail_close = fail;
        self
    }

    /// Creates the backend.
    pub fn build(self) -> ScriptedBackend {
        ScriptedBackend {
            script: Arc::new(self),
            state: Arc::default(),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    attempts: AtomicU64,
    accepted: AtomicU64,
    in_flight: AtomicUsize,
    count_calls: AtomicUsize,
    close_calls: AtomicUsize,
    in_flight_at_count: Mutex<Option<usize>>,
    submissions: Mutex<Vec<(usize, u64, Instant)>>,
}

/// A [`Backend`] whose behavior is fixed up front and whose usage can be inspected.
#[derive(Clone, Debug)]
pub struct ScriptedBackend {
    script: Arc<ScriptedBackendBuilder>,
    state: Arc<State>,
}

impl ScriptedBackend {
    /// Returns a builder for a scripted backend.
    pub fn builder() -> ScriptedBackendBuilder {
        ScriptedBackendBuilder::default()
    }

    /// Number of submissions that were started.
    pub fn attempts(&self) -> u64 {
        self.state.attempts.load(Ordering::SeqCst)
    }

    /// Number of submissions that were accepted.
    pub fn accepted(&self) -> u64 {
        self.state.accepted.load(Ordering::SeqCst)
    }

    /// Number of times [`Backend::count`] was called.
    pub fn count_calls(&self) -> usize {
        self.state.count_calls.load(Ordering::SeqCst)
    }

    /// Number of times [`Backend::close`] was called.
    pub fn close_calls(&self) -> usize {
        self.state.close_calls.load(Ordering::SeqCst)
    }

    /// Number of submissions that were still running when the first count query arrived.
    pub fn in_flight_at_count(&self) -> Option<usize> {
        *self.state.in_flight_at_count.lock().unwrap()
    }

    /// Worker id, sequence number and start time of every submission, in start order.
    pub fn submissions(&self) -> Vec<(usize, u64, Instant)> {
        self.state.submissions.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Backend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn submit(&self, record: Record) -> BackendResult<()> {
        self.state.attempts.fetch_add(1, Ordering::SeqCst);
        self.state.in_flight.fetch_add(1, Ordering::SeqCst);
        self.state.submissions.lock().unwrap().push((
            record.worker_id,
            record.timestamp,
            Instant::now(),
        ));

        if !self.script.submit_latency.is_zero() {
            tokio::time::sleep(self.script.submit_latency).await;
        }
        self.state.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.script.fail_submissions {
            return Err(BackendError::Rejected {
                status: 503,
                message: "scripted submission failure".into(),
            });
        }

        self.state.accepted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn count(&self, _label: &str) -> BackendResult<u64> {
        self.state.count_calls.fetch_add(1, Ordering::SeqCst);
        self.state
            .in_flight_at_count
            .lock()
            .unwrap()
            .get_or_insert(self.state.in_flight.load(Ordering::SeqCst));

        match self.script.count {
            CountBehavior::Accepted => Ok(self.accepted()),
            CountBehavior::Fixed(count) => Ok(count),
            CountBehavior::Fail => Err(BackendError::Rejected {
                status: 500,
                message: "scripted query failure".into(),
            }),
        }
    }

    async fn close(&self) -> BackendResult<()> {
        self.state.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.script.fail_close {
            return Err(BackendError::UnexpectedResponse(
                "scripted close failure".into(),
            ));
        }
        Ok(())
    }
}
