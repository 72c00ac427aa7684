//! Source tracking for configuration values.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Where a configuration value came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum ConfigSource {
    /// Built-in default.
    Default,
    /// Environment variable (name recorded).
    Environment(String),
    /// Manifest file (path recorded).
    Manifest(PathBuf),
    /// Command-line flag.
    CommandLine,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Environment(var) => write!(f, "env:{}", var),
            Self::Manifest(path) => write!(f, "manifest:{}", path.display()),
            Self::CommandLine => write!(f, "cli"),
        }
    }
}

/// A configuration value paired with its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sourced<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> Sourced<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }

    pub fn default_value(value: T) -> Self {
        Self::new(value, ConfigSource::Default)
    }

    pub fn from_env(value: T, var: impl Into<String>) -> Self {
        Self::new(value, ConfigSource::Environment(var.into()))
    }

    /// True when the value was not taken from a built-in default.
    pub fn is_overridden(&self) -> bool {
        self.source != ConfigSource::Default
    }

    pub fn into_value(self) -> T {
        self.value
    }
}
