#![allow(dead_code, unused_imports)]

pub mod assertions;
pub mod fixtures;
pub mod logging;

pub use assertions::{assert_contains, assert_mode, assert_no_mutating_commands};
pub use fixtures::{FakeProcessTable, SELF_PID, Sandbox};
pub use logging::init_test_logging;
