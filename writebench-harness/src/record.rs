//! Synthetic records, emitted once per [`Tick`].

use std::fmt;
use std::ops::Range;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Name of the tag that identifies the emitting worker.
pub const WORKER_TAG: &str = "id";

/// Name of the field carrying the synthetic value.
pub const VALUE_FIELD: &str = "temperature";

/// One logical unit of work: a worker and a sequence number within that worker.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Tick {
    /// The 1-based id of the worker producing this tick.
    pub worker_id: usize,
    /// Sequence number, strictly increasing within one worker.
    pub sequence: u64,
}

impl Tick {
    /// Returns the sequence numbers a worker emits during the given 1-based logical second.
    ///
    /// Every second starts at `second * ticks_per_second`, so consecutive seconds never overlap.
    pub fn sequences(second: u64, ticks_per_second: u64) -> Range<u64> {
        let start = second.saturating_mul(ticks_per_second);
        start..start.saturating_add(ticks_per_second)
    }
}

/// The payload submitted to a backend for one [`Tick`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Record {
    /// The label (measurement) tagging all records of one run.
    pub label: Arc<str>,
    /// The worker that emitted this record.
    pub worker_id: usize,
    /// Timestamp in nanoseconds since the unix epoch, derived from the tick's sequence number.
    pub timestamp: u64,
    /// Synthetic value: the wall-clock time of emission in unix nanoseconds.
    pub value: u128,
}

impl Record {
    /// Returns a [`Display`](fmt::Display) adapter rendering this record as InfluxDB line protocol.
    ///
    /// ```
    /// use writebench_harness::record::{emit, Tick};
    ///
    /// let record = emit(&"cpu load".into(), Tick { worker_id: 3, sequence: 7 });
    /// let line = record.line_protocol().to_string();
    /// assert!(line.starts_with(r#"cpu\ load,id=3 temperature=""#));
    /// assert!(line.ends_with(" 7"));
    /// ```
    pub fn line_protocol(&self) -> LineProtocol<'_> {
        LineProtocol(self)
    }
}

/// Line protocol rendering of a [`Record`], see [`Record::line_protocol`].
#[derive(Debug)]
pub struct LineProtocol<'a>(&'a Record);

impl fmt::Display for LineProtocol<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let record = self.0;
        for c in record.label.chars() {
            if matches!(c, ',' | ' ' | '\\') {
                f.write_str("\\")?;
            }
            write!(f, "{c}")?;
        }
        write!(
            f,
            ",{WORKER_TAG}={} {VALUE_FIELD}=\"{}\" {}",
            record.worker_id, record.value, record.timestamp
        )
    }
}

/// Builds the record for a tick.
///
/// This reads the wall clock for the synthetic value and nothing else; it never blocks or fails.
pub fn emit(label: &Arc<str>, tick: Tick) -> Record {
    let value = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or_default();

    Record {
        label: Arc::clone(label),
        worker_id: tick.worker_id,
        timestamp: tick.sequence,
        value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds_do_not_overlap() {
        assert_eq!(Tick::sequences(1, 3), 3..6);
        assert_eq!(Tick::sequences(2, 3), 6..9);
        assert_eq!(Tick::sequences(30, 100), 3000..3100);
    }

    #[test]
    fn emit_derives_timestamp_from_sequence() {
        let label: Arc<str> = "sensor".into();
        let record = emit(&label, Tick { worker_id: 12, sequence: 4711 });

        assert_eq!(&*record.label, "sensor");
        assert_eq!(record.worker_id, 12);
        assert_eq!(record.timestamp, 4711);
        assert!(record.value > 0);
    }

    #[test]
    fn line_protocol_escapes_measurement() {
        let record = Record {
            label: r"a,b c\d".into(),
            worker_id: 1,
            timestamp: 100,
            value: 42,
        };

        assert_eq!(
            record.line_protocol().to_string(),
            r#"a\,b\ c\\d,id=1 temperature="42" 100"#
        );
    }
}
