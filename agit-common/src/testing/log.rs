//! JSONL logging for test runs.
//!
//! Each guarded test writes `target/test-logs/<test>.jsonl` so a failed CI
//! run can be replayed phase by phase. All tracing output can additionally
//! be captured into one aggregate file:
//!
//! ```ignore
//! #[ctor::ctor]
//! fn setup() {
//!     agit_common::testing::init_global_test_logging();
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, Once};
use std::time::Instant;
use tracing_subscriber::prelude::*;

/// Phase of a test a log entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestPhase {
    Setup,
    Execute,
    Verify,
    Teardown,
}

impl std::fmt::Display for TestPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Setup => "setup",
            Self::Execute => "execute",
            Self::Verify => "verify",
            Self::Teardown => "teardown",
        };
        f.write_str(name)
    }
}

static GLOBAL_LOGGING_INIT: Once = Once::new();

/// Install a process-wide subscriber writing JSON to the aggregate log and
/// compact text to the test writer. Safe to call repeatedly.
///
/// `AGIT_TEST_LOG_FILE` overrides the aggregate path and
/// `AGIT_TEST_LOG_LEVEL` the filter (default `debug`).
pub fn init_global_test_logging() {
    GLOBAL_LOGGING_INIT.call_once(|| {
        let file_layer = open_aggregate_log().map(|file| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(Mutex::new(file))
                .with_current_span(true)
                .with_file(true)
                .with_line_number(true)
        });

        let stderr_layer = tracing_subscriber::fmt::layer()
            .with_test_writer()
            .with_target(true)
            .compact();

        let level = std::env::var("AGIT_TEST_LOG_LEVEL").unwrap_or_else(|_| "debug".to_string());
        let filter =
            tracing_subscriber::EnvFilter::try_new(format!("agit={level},agit_common={level}"))
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(stderr_layer);

        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

fn open_aggregate_log() -> Option<std::fs::File> {
    let path = match std::env::var("AGIT_TEST_LOG_FILE") {
        Ok(custom) => PathBuf::from(custom),
        Err(_) => test_log_dir().join("all_tests.jsonl"),
    };
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    std::fs::File::create(path).ok()
}

/// `<target>/test-logs`, honoring `CARGO_TARGET_DIR` and searching upward
/// from the current directory for an existing `target/`.
fn test_log_dir() -> PathBuf {
    if let Ok(target_dir) = std::env::var("CARGO_TARGET_DIR") {
        return PathBuf::from(target_dir).join("test-logs");
    }
    let mut cwd = std::env::current_dir().unwrap_or_default();
    loop {
        let target = cwd.join("target");
        if target.is_dir() {
            return target.join("test-logs");
        }
        if !cwd.pop() {
            return PathBuf::from("target/test-logs");
        }
    }
}

/// One line of a per-test JSONL log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestLogEntry {
    pub timestamp: String,
    pub test_name: String,
    pub phase: TestPhase,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
}

impl TestLogEntry {
    pub fn new(test_name: &str, phase: TestPhase, message: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            test_name: test_name.to_string(),
            phase,
            message: message.into(),
            data: None,
            elapsed_ms: None,
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    #[must_use]
    pub fn with_elapsed(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = Some(elapsed_ms);
        self
    }
}

/// Writes entries for a single test to memory and its JSONL file.
pub struct TestLogger {
    test_name: String,
    started: Instant,
    entries: Mutex<Vec<TestLogEntry>>,
    file: Option<Mutex<std::fs::File>>,
}

impl TestLogger {
    pub fn for_test(test_name: &str) -> Self {
        let logger = Self {
            test_name: test_name.to_string(),
            started: Instant::now(),
            entries: Mutex::new(Vec::new()),
            file: Self::open_file(&test_log_dir(), test_name).ok().map(Mutex::new),
        };
        logger.log(TestPhase::Setup, "TEST START");
        logger
    }

    fn open_file(dir: &Path, test_name: &str) -> std::io::Result<std::fs::File> {
        std::fs::create_dir_all(dir)?;
        let safe_name = test_name.replace("::", "_").replace(['/', '\\'], "_");
        std::fs::File::create(dir.join(format!("{safe_name}.jsonl")))
    }

    pub fn log(&self, phase: TestPhase, message: impl Into<String>) {
        let entry = TestLogEntry::new(&self.test_name, phase, message)
            .with_elapsed(self.elapsed_ms());
        self.write(entry);
    }

    pub fn log_with_data(
        &self,
        phase: TestPhase,
        message: impl Into<String>,
        data: serde_json::Value,
    ) {
        let entry = TestLogEntry::new(&self.test_name, phase, message)
            .with_elapsed(self.elapsed_ms())
            .with_data(data);
        self.write(entry);
    }

    fn write(&self, entry: TestLogEntry) {
        if let Some(file) = &self.file
            && let Ok(mut f) = file.lock()
            && let Ok(json) = serde_json::to_string(&entry)
        {
            let _ = writeln!(f, "{json}");
        }

        tracing::info!(
            test = %self.test_name,
            phase = %entry.phase,
            elapsed_ms = entry.elapsed_ms,
            "{}",
            entry.message
        );

        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry);
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Entries recorded so far.
    pub fn entries(&self) -> Vec<TestLogEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn pass(self) {
        self.log(TestPhase::Verify, "TEST PASS");
    }

    pub fn fail(self, reason: impl Into<String>) {
        self.log_with_data(
            TestPhase::Verify,
            "TEST FAIL",
            serde_json::json!({ "reason": reason.into() }),
        );
    }
}

/// Logs TEST START on creation and TEST PASS or TEST FAIL on drop.
///
/// Enabled by `AGIT_TEST_LOGGING=1`, or by default when `CI` is set.
/// When disabled the guard does nothing.
pub struct TestGuard {
    inner: Option<TestLogger>,
}

impl TestGuard {
    pub fn new(test_name: &str) -> Self {
        let inner = if Self::is_enabled() {
            init_global_test_logging();
            Some(TestLogger::for_test(test_name))
        } else {
            None
        };
        Self { inner }
    }

    fn is_enabled() -> bool {
        match std::env::var("AGIT_TEST_LOGGING").as_deref() {
            Ok("1" | "true") => true,
            Ok("0" | "false") => false,
            _ => std::env::var("CI").is_ok(),
        }
    }

    pub fn log(&self, phase: TestPhase, message: impl Into<String>) {
        if let Some(logger) = &self.inner {
            logger.log(phase, message);
        }
    }

    pub fn log_with_data(
        &self,
        phase: TestPhase,
        message: impl Into<String>,
        data: serde_json::Value,
    ) {
        if let Some(logger) = &self.inner {
            logger.log_with_data(phase, message, data);
        }
    }
}

impl Drop for TestGuard {
    fn drop(&mut self) {
        if let Some(logger) = self.inner.take() {
            if std::thread::panicking() {
                logger.fail("test panicked");
            } else {
                logger.pass();
            }
        }
    }
}

/// Create a [`TestGuard`] named after the enclosing test function.
///
/// ```ignore
/// #[test]
/// fn test_something() {
///     let _guard = agit_common::test_guard!();
/// }
/// ```
#[macro_export]
macro_rules! test_guard {
    () => {{
        fn _f() {}
        fn _type_name_of<T>(_: T) -> &'static str {
            std::any::type_name::<T>()
        }
        let name = _type_name_of(_f);
        let name = name.strip_suffix("::_f").unwrap_or(name);
        let name = name.rsplit("::").next().unwrap_or(name);
        $crate::testing::TestGuard::new(name)
    }};
}
