//! Time-bounded concurrent write benchmark for time series databases.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

fn main() -> anyhow::Result<()> {
    writebench::cli::execute()
}
