//! Test support shared by agit crates.

pub mod log;

pub use log::{TestGuard, TestLogEntry, TestLogger, TestPhase, init_global_test_logging};
