//! Human-readable run summary and results.

use std::io::{self, Write};
use std::time::Duration;

use sketches_ddsketch::DDSketch;
use writebench_harness::{RunConfig, RunResult};
use yansi::Paint;

use crate::config::Backend;

/// Prints the configuration of the upcoming run.
pub fn print_summary(
    out: &mut impl Write,
    run: &RunConfig,
    backend: &Backend,
    expected: u64,
) -> io::Result<()> {
    writeln!(out, "{} {}", "## Backend".bold(), backend.blue())?;
    writeln!(out, "  measurement:       {}", run.label.bold())?;
    writeln!(out, "  threads:           {}", run.workers.bold())?;
    writeln!(out, "  seconds:           {}", run.seconds.bold())?;
    writeln!(out, "  line protocols/s:  {}", run.ticks_per_second.bold())?;
    writeln!(out, "  expected records:  {}", expected.bold())?;
    writeln!(out)
}

/// Prints the outcome of a completed run.
pub fn print_result(out: &mut impl Write, result: &RunResult) -> io::Result<()> {
    writeln!(out, "{}", "## Results".bold())?;
    writeln!(out, "  expected:  {}", result.expected.bold())?;

    match (result.observed, result.accuracy(), result.rate()) {
        (Some(observed), Some(accuracy), Some(rate)) => {
            let accuracy = format!("{accuracy:.2} %");
            let accuracy = if result.observed == Some(result.expected) {
                accuracy.green()
            } else {
                accuracy.yellow()
            };
            writeln!(out, "  observed:  {}", observed.bold())?;
            writeln!(out, "  accuracy:  {accuracy}")?;
            writeln!(out, "  rate:      {} records/s", format!("{rate:.2}").green())?;
        }
        _ => writeln!(out, "  observed:  {}", "skipped".dim())?,
    }

    writeln!(out, "  elapsed:   {:.2?}", result.elapsed)?;

    let failed = if result.failed > 0 {
        result.failed.red()
    } else {
        result.failed.primary()
    };
    writeln!(
        out,
        "  submissions: {} ok, {failed} failed",
        result.submitted.bold()
    )?;

    if result.latency.count() > 0 {
        write_percentiles(out, &result.latency)?;
    }

    Ok(())
}

fn write_percentiles(out: &mut impl Write, sketch: &DDSketch) -> io::Result<()> {
    let seconds = |value: Option<f64>| {
        value
            .and_then(|value| Duration::try_from_secs_f64(value).ok())
            .unwrap_or_default()
    };
    let quantile = |q| seconds(sketch.quantile(q).ok().flatten());

    let avg = seconds(sketch.sum().map(|sum| sum / sketch.count() as f64));
    let p50 = quantile(0.5);
    let p90 = quantile(0.9);
    let p99 = quantile(0.99);

    writeln!(
        out,
        "  latency avg: {:.2?}; p50: {p50:.2?}; p90: {p90:.2?}; p99: {p99:.2?}",
        avg.bold()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(result: &RunResult) -> String {
        yansi::disable();
        let mut out = Vec::new();
        print_result(&mut out, result).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn result(observed: Option<u64>) -> RunResult {
        let mut latency = DDSketch::default();
        for millis in 1..=100 {
            latency.add(millis as f64 / 1000.0);
        }

        RunResult {
            expected: 40,
            observed,
            elapsed: Duration::from_millis(1500),
            duration: Duration::from_secs(1),
            submitted: 38,
            failed: 2,
            latency,
        }
    }

    #[test]
    fn prints_counted_results() {
        let output = render(&result(Some(30)));

        assert!(output.contains("expected:  40"));
        assert!(output.contains("observed:  30"));
        assert!(output.contains("accuracy:  75.00 %"));
        assert!(output.contains("rate:      30.00 records/s"));
        assert!(output.contains("elapsed:   1.50s"));
        assert!(output.contains("submissions: 38 ok, 2 failed"));
        assert!(output.contains("latency avg:"));
    }

    #[test]
    fn prints_skipped_count() {
        let output = render(&result(None));

        assert!(output.contains("observed:  skipped"));
        assert!(!output.contains("accuracy"));
    }

    #[test]
    fn prints_summary() {
        yansi::disable();
        let run = RunConfig {
            workers: 4,
            seconds: 2,
            ticks_per_second: 5,
            ..RunConfig::new("sensor_test")
        };
        let mut out = Vec::new();
        print_summary(&mut out, &run, &Backend::Memory, 40).unwrap();
        let output = String::from_utf8(out).unwrap();

        assert!(output.contains("## Backend memory"));
        assert!(output.contains("measurement:       sensor_test"));
        assert!(output.contains("expected records:  40"));
    }
}
