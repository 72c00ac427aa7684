//! Environment variable parsing with type safety.
//!
//! Provides a type-safe parser for `AGIT_` environment variables with
//! validation, error collection, and source tracking.

use super::source::{ConfigSource, Sourced};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during environment variable parsing.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Invalid value for a variable.
    #[error("Invalid value for {var}: expected {expected}, got '{value}'")]
    InvalidValue {
        var: String,
        expected: String,
        value: String,
    },

    /// Invalid duration format.
    #[error("Invalid duration for {var}: {value}")]
    InvalidDuration { var: String, value: String },

    /// Value out of valid range.
    #[error("Value out of range for {var}: {value} (valid: {min}..={max})")]
    OutOfRange {
        var: String,
        value: String,
        min: String,
        max: String,
    },

    /// Invalid log level.
    #[error("Invalid log level for {var}: {value}")]
    InvalidLogLevel { var: String, value: String },
}

/// Type-safe environment variable parser.
///
/// Collects errors during parsing so all issues can be reported at once.
pub struct EnvParser {
    prefix: &'static str,
    errors: Vec<EnvError>,
}

impl Default for EnvParser {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvParser {
    /// Create a new parser with the AGIT_ prefix.
    pub fn new() -> Self {
        Self {
            prefix: "AGIT_",
            errors: Vec::new(),
        }
    }

    /// Get all accumulated errors.
    pub fn errors(&self) -> &[EnvError] {
        &self.errors
    }

    /// Check if any errors occurred.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Take ownership of errors.
    pub fn take_errors(&mut self) -> Vec<EnvError> {
        std::mem::take(&mut self.errors)
    }

    fn var_name(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    /// Get a string value with default.
    pub fn get_string(&mut self, name: &str, default: &str) -> Sourced<String> {
        let var_name = self.var_name(name);
        match env::var(&var_name) {
            Ok(value) => Sourced::from_env(value, var_name),
            Err(_) => Sourced::default_value(default.to_string()),
        }
    }

    /// Get an optional path. Empty values count as unset.
    pub fn get_path(&mut self, name: &str) -> Option<Sourced<PathBuf>> {
        let var_name = self.var_name(name);
        match env::var(&var_name) {
            Ok(value) if !value.trim().is_empty() => {
                Some(Sourced::from_env(PathBuf::from(value), var_name))
            }
            _ => None,
        }
    }

    /// Get a boolean value with default.
    ///
    /// Accepts: 1, true, yes, on (for true)
    ///          0, false, no, off, "" (for false)
    pub fn get_bool(&mut self, name: &str, default: bool) -> Sourced<bool> {
        let var_name = self.var_name(name);
        match env::var(&var_name) {
            Ok(value) => {
                let parsed = match value.to_lowercase().as_str() {
                    "1" | "true" | "yes" | "on" => true,
                    "0" | "false" | "no" | "off" | "" => false,
                    _ => {
                        self.errors.push(EnvError::InvalidValue {
                            var: var_name.clone(),
                            expected: "boolean (true/false/1/0/yes/no)".to_string(),
                            value: value.clone(),
                        });
                        default
                    }
                };
                Sourced::from_env(parsed, var_name)
            }
            Err(_) => Sourced::default_value(default),
        }
    }

    /// Get a u64 value with default and range validation.
    pub fn get_u64_range(&mut self, name: &str, default: u64, min: u64, max: u64) -> Sourced<u64> {
        let var_name = self.var_name(name);
        match env::var(&var_name) {
            Ok(value) => match value.parse::<u64>() {
                Ok(n) if n >= min && n <= max => Sourced::from_env(n, var_name),
                Ok(n) => {
                    self.errors.push(EnvError::OutOfRange {
                        var: var_name.clone(),
                        value: n.to_string(),
                        min: min.to_string(),
                        max: max.to_string(),
                    });
                    Sourced::from_env(default, var_name)
                }
                Err(_) => {
                    self.errors.push(EnvError::InvalidValue {
                        var: var_name.clone(),
                        expected: "unsigned 64-bit integer".to_string(),
                        value,
                    });
                    Sourced::default_value(default)
                }
            },
            Err(_) => Sourced::default_value(default),
        }
    }

    /// Get a duration value with default.
    ///
    /// Accepts humantime strings ("90s", "10m", "1h 30m") or bare seconds.
    pub fn get_duration(&mut self, name: &str, default: Duration) -> Sourced<Duration> {
        let var_name = self.var_name(name);
        match env::var(&var_name) {
            Ok(value) => {
                let trimmed = value.trim();
                let parsed = trimmed
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .or_else(|_| humantime::parse_duration(trimmed));
                match parsed {
                    Ok(duration) if !duration.is_zero() => Sourced::from_env(duration, var_name),
                    _ => {
                        self.errors.push(EnvError::InvalidDuration {
                            var: var_name.clone(),
                            value: value.clone(),
                        });
                        Sourced::default_value(default)
                    }
                }
            }
            Err(_) => Sourced::default_value(default),
        }
    }

    /// Get a log level (trace/debug/info/warn/error) with default.
    pub fn get_log_level(&mut self, name: &str, default: &str) -> Sourced<String> {
        let var_name = self.var_name(name);
        match env::var(&var_name) {
            Ok(value) => {
                let lowered = value.to_lowercase();
                if matches!(
                    lowered.as_str(),
                    "trace" | "debug" | "info" | "warn" | "error" | "off"
                ) {
                    Sourced::new(lowered, ConfigSource::Environment(var_name))
                } else {
                    self.errors
                        .push(EnvError::InvalidLogLevel { var: var_name, value });
                    Sourced::default_value(default.to_string())
                }
            }
            Err(_) => Sourced::default_value(default.to_string()),
        }
    }
}
