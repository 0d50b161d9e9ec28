//! Tracing and logging setup shared by every binary and test harness.

pub mod tracing;

pub use tracing::{LogConfig, LogFormat, init, init_for_tests, init_with};
