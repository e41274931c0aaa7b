//! The load generation core of writebench.
//!
//! A [`Harness`] fans out a fixed number of workers which emit synthetic [`Record`]s against a
//! [`Backend`] for a fixed wall-clock duration. Once a deadline elapses, a shared [`StopSignal`]
//! tells every worker to wind down. After all workers have exited, the harness asks the backend
//! how many records it actually accepted and reports that against the number of records the run
//! was configured to produce.
//!
//! Backends are interchangeable implementations of the narrow [`Backend`] trait. This crate ships
//! an [`InMemoryBackend`](backend::InMemoryBackend) for dry runs and tests; adapters for real
//! storage engines live in their own crates.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod backend;
pub mod config;
pub mod error;
pub mod harness;
pub mod progress;
pub mod record;
pub mod signal;
mod worker;

pub use crate::backend::{Backend, BackendError, BackendResult, SharedBackend};
pub use crate::config::RunConfig;
pub use crate::error::{ConfigError, HarnessError};
pub use crate::harness::{Harness, Phase, RunResult};
pub use crate::progress::Progress;
pub use crate::record::{Record, Tick};
pub use crate::signal::{StopListener, StopSignal};
