//! Common types used across agit components.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Branch that `git clone` checks out when no `-b` is given.
pub const DEFAULT_BRANCH: &str = "master";
/// Per-command timeout applied when a declaration does not set one.
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;
/// Mode applied to a destination directory the orchestrator creates.
pub const DEFAULT_DIRECTORY_MODE: u32 = 0o755;
/// Prefix marking a remote-tracking reference.
pub const REMOTE_TRACKING_PREFIX: &str = "origin/";
/// Glob matching forwarded SSH agent sockets.
pub const DEFAULT_AGENT_SOCKET_GLOB: &str = "/tmp/ssh*/agent*";
/// Mount point of the process table.
pub const DEFAULT_PROC_ROOT: &str = "/proc";

/// Operator-facing identity of one declared repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceId(pub String);

impl ResourceId {
    pub fn for_destination(destination: &Path) -> Self {
        Self(format!("repository[{}]", destination.display()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Declared target of one convergence attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredState {
    /// Working-copy location.
    pub destination: PathBuf,
    /// Remote URL used for `origin`.
    pub repository: String,
    /// Local branch to keep checked out.
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Run-as user for git commands.
    pub user: String,
    /// Run-as group for git commands.
    pub group: String,
    /// Mode for a destination directory created on first converge.
    #[serde(default = "default_mode")]
    pub mode: u32,
    /// Per-command timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl DesiredState {
    pub fn new(
        destination: impl Into<PathBuf>,
        repository: impl Into<String>,
        branch: impl Into<String>,
        user: impl Into<String>,
        group: impl Into<String>,
    ) -> Self {
        Self {
            destination: destination.into(),
            repository: repository.into(),
            branch: branch.into(),
            user: user.into(),
            group: group.into(),
            mode: DEFAULT_DIRECTORY_MODE,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs().max(1);
        self
    }

    #[must_use]
    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    pub fn resource_id(&self) -> ResourceId {
        ResourceId::for_destination(&self.destination)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// True when the branch names a remote-tracking ref such as `origin/main`.
    pub fn references_remote_branch(&self) -> bool {
        self.branch.starts_with(REMOTE_TRACKING_PREFIX)
    }

    /// Branch to pass to `git clone -b`, or `None` for the default branch.
    pub fn clone_branch(&self) -> Option<&str> {
        if self.branch == DEFAULT_BRANCH {
            None
        } else {
            Some(self.branch.as_str())
        }
    }
}

/// State read back from an existing working copy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedState {
    pub repository: Option<String>,
    pub branch: Option<String>,
}

impl ObservedState {
    /// No working copy at the destination.
    pub fn absent() -> Self {
        Self::default()
    }

    pub fn is_absent(&self) -> bool {
        self.repository.is_none() && self.branch.is_none()
    }
}

/// Commit counts between the local branch and its upstream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Divergence {
    pub ahead: u32,
    pub behind: u32,
}

/// Snapshot of working-copy status used for the pull decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryStatus {
    pub dirty: bool,
    pub ahead: u32,
    pub behind: u32,
}

impl RepositoryStatus {
    pub fn new(dirty: bool, divergence: Divergence) -> Self {
        Self {
            dirty,
            ahead: divergence.ahead,
            behind: divergence.behind,
        }
    }
}

fn default_branch() -> String {
    DEFAULT_BRANCH.to_string()
}

fn default_mode() -> u32 {
    DEFAULT_DIRECTORY_MODE
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}
