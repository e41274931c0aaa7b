//! Command line front end of the write benchmark.
//!
//! This loads the layered [`config`], selects a [`backend`], runs the
//! [`Harness`](writebench_harness::Harness) with a console [`progress`] bar and prints the
//! [`report`].
#![warn(missing_debug_implementations)]

pub mod backend;
pub mod cli;
pub mod config;
pub mod observability;
pub mod progress;
pub mod report;
