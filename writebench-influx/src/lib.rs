//! InfluxDB backends for writebench.
//!
//! Two adapters implement the [`Backend`](writebench_harness::Backend) trait over HTTP:
//!
//! - [`InfluxV1`] writes every record with its own request to the 1.x `/write` endpoint and counts
//!   with InfluxQL.
//! - [`InfluxV2`] buffers records and writes them in batches to the 2.x `/api/v2/write` endpoint,
//!   authenticating with a token, and counts with Flux.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

mod common;
pub mod v1;
pub mod v2;

pub use common::USER_AGENT;
pub use v1::InfluxV1;
pub use v2::{InfluxV2, InfluxV2Options};
