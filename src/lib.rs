//! Latency harness for a CPU-bound image-scaling workload running inside
//! AWS Lambda.
//!
//! The reference image is fetched and decoded once at cold start
//! ([`loader`]); every invocation then times a copy-scale-copy workload
//! against that cache ([`workload`]) and reports the elapsed nanoseconds
//! through one of two response shapes ([`handler`]).

pub mod config;
pub mod driver;
pub mod error;
pub mod handler;
pub mod loader;
pub mod logging;
pub mod state;
pub mod workload;
