//! Console progress for the worker that reports it.

use std::fmt;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use writebench_harness::Progress;

/// A progress bar on stderr counting the completed seconds of the reporting worker.
///
/// The bar hides itself when stderr is not a terminal.
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    /// Creates a bar for a run of `seconds` batches.
    pub fn new(seconds: u64) -> anyhow::Result<Self> {
        let bar = ProgressBar::new(seconds)
            .with_message("writing iterations")
            .with_style(ProgressStyle::with_template(
                "{msg}: {pos}/{len} {wide_bar} {elapsed}",
            )?);
        bar.enable_steady_tick(Duration::from_millis(100));
        Ok(Self { bar })
    }
}

impl fmt::Debug for BarProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BarProgress")
            .field("position", &self.bar.position())
            .field("length", &self.bar.length())
            .finish()
    }
}

impl Progress for BarProgress {
    fn second_completed(&self, second: u64, _total: u64) {
        self.bar.set_position(second);
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_completed_seconds() {
        let progress = BarProgress::new(3).unwrap();
        progress.second_completed(2, 3);
        assert_eq!(progress.bar.position(), 2);
        assert_eq!(progress.bar.length(), Some(3));

        progress.finish();
        assert!(progress.bar.is_finished());
    }
}
