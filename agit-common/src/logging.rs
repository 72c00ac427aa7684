//! Logging setup shared by agit binaries.
//!
//! Reads `AGIT_LOG_LEVEL`, `AGIT_LOG_FORMAT` (`pretty` or `json`) and
//! `AGIT_LOG_FILE`. `RUST_LOG`, when set, replaces the level filter.

use crate::config::EnvParser;
use crate::errors::ErrorCode;
use std::path::PathBuf;
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("failed to open log file {}: {source}", path.display())]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("global subscriber already installed")]
    AlreadyInitialized,
}

impl LoggingError {
    pub fn error_code(&self) -> ErrorCode {
        ErrorCode::InternalLoggingError
    }
}

/// Where and how to emit logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
    pub stderr: bool,
    pub file: Option<PathBuf>,
}

impl LogConfig {
    /// Build from `AGIT_LOG_*` variables, falling back to `default_level`.
    pub fn from_env(default_level: &str) -> Self {
        let mut parser = EnvParser::new();
        let level = parser.get_log_level("LOG_LEVEL", default_level).into_value();
        let format = LogFormat::parse(&parser.get_string("LOG_FORMAT", "pretty").value)
            .unwrap_or_default();
        let file = parser.get_path("LOG_FILE").map(|s| s.into_value());
        Self {
            level,
            format,
            stderr: false,
            file,
        }
    }

    #[must_use]
    pub fn with_stderr(mut self) -> Self {
        self.stderr = true;
        self
    }

    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    fn filter(&self) -> Result<EnvFilter, LoggingError> {
        if let Ok(rust_log) = std::env::var("RUST_LOG")
            && !rust_log.trim().is_empty()
        {
            return EnvFilter::try_new(&rust_log).map_err(|e| LoggingError::InvalidFilter {
                filter: rust_log,
                reason: e.to_string(),
            });
        }
        let directive = format!("agit={0},agit_common={0},warn", self.level);
        EnvFilter::try_new(&directive).map_err(|e| LoggingError::InvalidFilter {
            filter: directive,
            reason: e.to_string(),
        })
    }
}

/// Keeps non-blocking writers flushing until dropped.
#[must_use = "dropping the guards stops log output"]
pub struct LoggingGuards {
    _guards: Vec<WorkerGuard>,
}

/// Install the global subscriber described by `config`.
pub fn init_logging(config: &LogConfig) -> Result<LoggingGuards, LoggingError> {
    let filter = config.filter()?;
    let mut guards = Vec::new();

    let stderr_layer = if config.stderr {
        let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());
        guards.push(guard);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_target(false);
        Some(match config.format {
            LogFormat::Pretty => layer.compact().boxed(),
            LogFormat::Json => layer.json().boxed(),
        })
    } else {
        None
    };

    let file_layer = match &config.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| LoggingError::LogFile {
                    path: path.clone(),
                    source,
                })?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            guards.push(guard);
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_ansi(false)
                    .boxed(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|_| LoggingError::AlreadyInitialized)?;

    Ok(LoggingGuards { _guards: guards })
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;
    use crate::config::env_test_lock;
    use serial_test::serial;

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("JSON"), Some(LogFormat::Json));
        assert_eq!(LogFormat::parse("text"), Some(LogFormat::Pretty));
        assert_eq!(LogFormat::parse("xml"), None);
    }

    #[test]
    fn test_builder_overrides() {
        let config = LogConfig {
            level: "info".into(),
            format: LogFormat::Pretty,
            stderr: false,
            file: None,
        }
        .with_stderr()
        .with_level("debug")
        .with_format(LogFormat::Json)
        .with_file("/tmp/agit.log");
        assert!(config.stderr);
        assert_eq!(config.level, "debug");
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.file, Some(PathBuf::from("/tmp/agit.log")));
    }

    #[test]
    #[serial]
    fn test_from_env_reads_level_and_format() {
        let _lock = env_test_lock();
        // SAFETY: tests hold env_test_lock and are serialized.
        unsafe {
            std::env::set_var("AGIT_LOG_LEVEL", "WARN");
            std::env::set_var("AGIT_LOG_FORMAT", "json");
        }
        let config = LogConfig::from_env("info");
        // SAFETY: as above.
        unsafe {
            std::env::remove_var("AGIT_LOG_LEVEL");
            std::env::remove_var("AGIT_LOG_FORMAT");
        }
        assert_eq!(config.level, "warn");
        assert_eq!(config.format, LogFormat::Json);
        assert!(!config.stderr);
    }

    #[test]
    #[serial]
    fn test_filter_uses_level() {
        let _lock = env_test_lock();
        // SAFETY: tests hold env_test_lock and are serialized.
        unsafe { std::env::remove_var("RUST_LOG") };
        let config = LogConfig::from_env("info").with_level("trace");
        assert!(config.filter().is_ok());
    }

    #[test]
    #[serial]
    fn test_invalid_level_is_logging_error() {
        let _lock = env_test_lock();
        // SAFETY: tests hold env_test_lock and are serialized.
        unsafe { std::env::remove_var("RUST_LOG") };
        let err = LogConfig::from_env("info")
            .with_level("loud")
            .filter()
            .unwrap_err();
        assert!(matches!(err, LoggingError::InvalidFilter { .. }));
        assert_eq!(err.error_code(), ErrorCode::InternalLoggingError);
        assert_eq!(err.error_code().code_string(), "AGIT-E501");
    }
}
