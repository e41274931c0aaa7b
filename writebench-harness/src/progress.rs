//! Progress reporting for human observers.

use std::fmt::Debug;

use crate::harness::Phase;

/// Observes the progress of a run.
///
/// The harness hands the observer to exactly one worker, which calls it after every completed
/// batch. The harness itself reports every phase it enters. Implementations must return quickly
/// and must not block; the observer never influences how the run proceeds.
pub trait Progress: Debug + Send + Sync {
    /// Called after the observed worker finished the batch for the given 1-based `second`.
    fn second_completed(&self, second: u64, total: u64);

    /// Called once after all workers have exited.
    fn finish(&self) {}

    /// Called whenever the run enters a new phase.
    fn phase_changed(&self, _phase: Phase) {}
}
