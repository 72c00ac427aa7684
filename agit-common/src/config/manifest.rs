//! Manifest loading.
//!
//! A manifest declares the repositories one `agit converge` run manages:
//!
//! ```toml
//! [settings]
//! agent_socket_glob = "/tmp/ssh*/agent*"
//!
//! [[repository]]
//! destination = "/srv/app"
//! repository = "git@github.com:org/app.git"
//! branch = "main"
//! user = "deploy"
//! group = "deploy"
//! ```

use super::env::{EnvError, EnvParser};
use super::source::{ConfigSource, Sourced};
use crate::errors::ErrorCode;
use crate::types::{
    DEFAULT_AGENT_SOCKET_GLOB, DEFAULT_PROC_ROOT, DEFAULT_TIMEOUT_SECS, DesiredState,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Run-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Glob matching candidate SSH agent sockets.
    pub agent_socket_glob: String,
    /// Process table root used for the ancestry walk.
    pub proc_root: PathBuf,
    /// Directory for credential wrappers (system temp dir when unset).
    pub wrapper_dir: Option<PathBuf>,
    /// Report actions without mutating working copies.
    pub dry_run: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            agent_socket_glob: DEFAULT_AGENT_SOCKET_GLOB.to_string(),
            proc_root: PathBuf::from(DEFAULT_PROC_ROOT),
            wrapper_dir: None,
            dry_run: false,
        }
    }
}

/// Parsed manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default, rename = "repository")]
    pub repositories: Vec<DesiredState>,
}

/// Errors raised while loading a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to read manifest {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse manifest {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid manifest {}: {reason}", path.display())]
    Invalid { path: PathBuf, reason: String },

    #[error("invalid environment override: {0}")]
    Env(#[from] EnvError),
}

impl ManifestError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotFound { .. } => ErrorCode::ConfigNotFound,
            Self::Read { .. } => ErrorCode::ConfigReadError,
            Self::Parse { .. } => ErrorCode::ConfigParseError,
            Self::Invalid { .. } => ErrorCode::ConfigValidationError,
            Self::Env(_) => ErrorCode::ConfigEnvError,
        }
    }
}

impl Manifest {
    /// Parse manifest text. `path` is only used for error messages.
    pub fn from_toml_str(text: &str, path: &Path) -> Result<Self, ManifestError> {
        let manifest: Manifest = toml::from_str(text).map_err(|source| ManifestError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        manifest.validate(path)?;
        Ok(manifest)
    }

    /// Structural checks. Branch rules are enforced per repository at converge time.
    pub fn validate(&self, path: &Path) -> Result<(), ManifestError> {
        let invalid = |reason: String| ManifestError::Invalid {
            path: path.to_path_buf(),
            reason,
        };

        if self.settings.agent_socket_glob.trim().is_empty() {
            return Err(invalid("settings.agent_socket_glob must not be empty".into()));
        }

        let mut seen = HashSet::new();
        for (index, repo) in self.repositories.iter().enumerate() {
            if !repo.destination.is_absolute() {
                return Err(invalid(format!(
                    "repository #{} destination must be absolute: {}",
                    index + 1,
                    repo.destination.display()
                )));
            }
            if repo.repository.trim().is_empty() {
                return Err(invalid(format!(
                    "repository #{} has an empty repository URL",
                    index + 1
                )));
            }
            if repo.branch.trim().is_empty() {
                return Err(invalid(format!("{} has an empty branch", repo.resource_id())));
            }
            if repo.user.trim().is_empty() || repo.group.trim().is_empty() {
                return Err(invalid(format!(
                    "{} must name both user and group",
                    repo.resource_id()
                )));
            }
            if repo.timeout_secs == 0 {
                return Err(invalid(format!(
                    "{} timeout_secs must be positive",
                    repo.resource_id()
                )));
            }
            if repo.mode > 0o7777 {
                return Err(invalid(format!(
                    "{} mode {:o} is not a permission mode",
                    repo.resource_id(),
                    repo.mode
                )));
            }
            if !seen.insert(repo.destination.clone()) {
                return Err(invalid(format!(
                    "{} is declared more than once",
                    repo.resource_id()
                )));
            }
        }
        Ok(())
    }

    /// Apply `AGIT_*` overrides on top of manifest values.
    ///
    /// Returns the source of each setting that was overridden so callers
    /// can log where effective values came from.
    pub fn apply_env(&mut self, parser: &mut EnvParser) -> Vec<(&'static str, ConfigSource)> {
        let mut overridden = Vec::new();

        let dry_run = parser.get_bool("DRY_RUN", self.settings.dry_run);
        if dry_run.is_overridden() {
            self.settings.dry_run = dry_run.value;
            overridden.push(("dry_run", dry_run.source));
        }

        let glob = parser.get_string("AGENT_SOCKET_GLOB", &self.settings.agent_socket_glob);
        if glob.is_overridden() && !glob.value.trim().is_empty() {
            self.settings.agent_socket_glob = glob.value;
            overridden.push(("agent_socket_glob", glob.source));
        }

        if let Some(Sourced { value, source }) = parser.get_path("WRAPPER_DIR") {
            self.settings.wrapper_dir = Some(value);
            overridden.push(("wrapper_dir", source));
        }

        let errors_before = parser.errors().len();
        let timeout = parser.get_u64_range("TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS, 1, 86_400);
        if timeout.is_overridden() && parser.errors().len() == errors_before {
            for repo in &mut self.repositories {
                repo.timeout_secs = timeout.value;
            }
            overridden.push(("timeout_secs", timeout.source));
        }

        for (key, source) in &overridden {
            debug!(setting = *key, source = %source, "Manifest setting overridden");
        }
        overridden
    }
}

/// Read, parse and validate a manifest, then apply environment overrides.
pub fn load_manifest(path: &Path) -> Result<Manifest, ManifestError> {
    if !path.exists() {
        return Err(ManifestError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let text = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut manifest = Manifest::from_toml_str(&text, path)?;

    let mut parser = EnvParser::new();
    manifest.apply_env(&mut parser);
    if let Some(first) = parser.take_errors().into_iter().next() {
        return Err(ManifestError::Env(first));
    }

    debug!(
        path = %path.display(),
        repositories = manifest.repositories.len(),
        dry_run = manifest.settings.dry_run,
        "Loaded manifest"
    );
    Ok(manifest)
}
