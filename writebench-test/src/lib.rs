//! Test utilities for writebench and its backend adapters.
//!
//! This crate provides utilities to facilitate testing of the harness and the adapters. See the
//! modules for all available utilities.

pub mod backend;
pub mod server;
pub mod tracing;
