//! Error Catalog for agit
//!
//! Every fatal condition surfaced to an operator maps to one code here:
//! - A unique code (AGIT-E001 through AGIT-E599)
//! - A human-readable message
//! - Remediation steps
//!
//! # Example
//!
//! ```rust
//! use agit_common::errors::catalog::ErrorCode;
//!
//! let entry = ErrorCode::RepoDirty.entry();
//! println!("Error {}: {}", entry.code, entry.message);
//! for step in entry.remediation {
//!     println!("  - {}", step);
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error code enumeration covering all agit error scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum ErrorCode {
    // =========================================================================
    // Config Errors (E001-E099)
    // =========================================================================
    /// Manifest file not found
    ConfigNotFound,
    /// Manifest file could not be read
    ConfigReadError,
    /// Manifest contains invalid TOML syntax
    ConfigParseError,
    /// Manifest contains invalid values
    ConfigValidationError,
    /// Environment variable has invalid value
    ConfigEnvError,
    /// Declared branch references a remote-tracking branch
    ConfigRemoteBranchReference,

    // =========================================================================
    // Repository Errors (E100-E199)
    // =========================================================================
    /// Parent directory of the destination does not exist
    RepoMissingParentDirectory,
    /// Existing working copy points at a different origin
    RepoOriginMismatch,
    /// Desired branch does not exist on the remote
    RepoMissingRemoteBranch,
    /// Working copy has uncommitted changes
    RepoDirty,
    /// Local branch has commits not pushed upstream
    RepoUnpushedCommits,
    /// Destination directory could not be prepared
    RepoDestinationSetup,

    // =========================================================================
    // Credential Errors (E200-E299)
    // =========================================================================
    /// Home directory of the run-as user could not be resolved
    CredHomeResolution,
    /// SSH agent socket directory ownership could not be changed
    CredAgentOwnership,
    /// SSH wrapper script could not be created
    CredWrapperCreate,

    // =========================================================================
    // Execution Errors (E300-E399)
    // =========================================================================
    /// Command could not be spawned
    ExecSpawnFailed,
    /// Command exited with a disallowed status
    ExecNonZeroExit,
    /// Command exceeded its timeout
    ExecTimeout,
    /// Run-as user or group is unknown
    ExecUnknownAccount,

    // =========================================================================
    // Internal Errors (E500-E599)
    // =========================================================================
    /// Internal state is inconsistent
    InternalStateError,
    /// Logging could not be initialized
    InternalLoggingError,
}

impl ErrorCode {
    /// Returns the numeric error code (without prefix).
    #[must_use]
    pub const fn code_number(&self) -> u16 {
        match self {
            Self::ConfigNotFound => 1,
            Self::ConfigReadError => 2,
            Self::ConfigParseError => 3,
            Self::ConfigValidationError => 4,
            Self::ConfigEnvError => 5,
            Self::ConfigRemoteBranchReference => 6,

            Self::RepoMissingParentDirectory => 100,
            Self::RepoOriginMismatch => 101,
            Self::RepoMissingRemoteBranch => 102,
            Self::RepoDirty => 103,
            Self::RepoUnpushedCommits => 104,
            Self::RepoDestinationSetup => 105,

            Self::CredHomeResolution => 200,
            Self::CredAgentOwnership => 201,
            Self::CredWrapperCreate => 202,

            Self::ExecSpawnFailed => 300,
            Self::ExecNonZeroExit => 301,
            Self::ExecTimeout => 302,
            Self::ExecUnknownAccount => 303,

            Self::InternalStateError => 500,
            Self::InternalLoggingError => 501,
        }
    }

    /// Returns the formatted error code string (e.g., "AGIT-E001").
    #[must_use]
    pub fn code_string(&self) -> String {
        format!("AGIT-E{:03}", self.code_number())
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self.code_number() {
            1..=99 => ErrorCategory::Config,
            100..=199 => ErrorCategory::Repository,
            200..=299 => ErrorCategory::Credentials,
            300..=399 => ErrorCategory::Execution,
            _ => ErrorCategory::Internal,
        }
    }

    /// Returns the full error entry with all metadata.
    #[must_use]
    pub fn entry(&self) -> ErrorEntry {
        ErrorEntry {
            code: self.code_string(),
            category: self.category(),
            message: self.message().to_string(),
            remediation: self
                .remediation()
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }

    /// Returns the error message.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::ConfigNotFound => "Manifest file not found",
            Self::ConfigReadError => "Failed to read manifest file",
            Self::ConfigParseError => "Manifest file contains invalid TOML syntax",
            Self::ConfigValidationError => "Manifest contains invalid values",
            Self::ConfigEnvError => "Environment variable has invalid value",
            Self::ConfigRemoteBranchReference => {
                "Declared branch references a remote-tracking branch"
            }

            Self::RepoMissingParentDirectory => "Destination parent directory does not exist",
            Self::RepoOriginMismatch => "Another git repository is already located at destination",
            Self::RepoMissingRemoteBranch => "Remote reference does not exist",
            Self::RepoDirty => "Working copy has uncommitted changes",
            Self::RepoUnpushedCommits => "Local branch is ahead of its upstream",
            Self::RepoDestinationSetup => "Destination directory could not be prepared",

            Self::CredHomeResolution => "Could not determine HOME for run-as user",
            Self::CredAgentOwnership => "Failed to change SSH agent socket ownership",
            Self::CredWrapperCreate => "Failed to create SSH wrapper script",

            Self::ExecSpawnFailed => "Command could not be started",
            Self::ExecNonZeroExit => "Command exited with a disallowed status",
            Self::ExecTimeout => "Command timed out",
            Self::ExecUnknownAccount => "Run-as user or group does not exist",

            Self::InternalStateError => "Internal state is inconsistent",
            Self::InternalLoggingError => "Failed to initialize logging",
        }
    }

    /// Returns remediation steps for the error.
    #[must_use]
    pub const fn remediation(&self) -> &'static [&'static str] {
        match self {
            Self::ConfigNotFound => &[
                "Check the path passed to --manifest",
                "Create a manifest with at least one [[repository]] table",
            ],
            Self::ConfigReadError => &["Check file permissions on the manifest"],
            Self::ConfigParseError => &[
                "Validate the manifest with a TOML linter",
                "Check for unquoted strings and missing brackets",
            ],
            Self::ConfigValidationError => &[
                "Every repository needs destination, repository, user and group",
                "timeout_secs must be greater than zero",
            ],
            Self::ConfigEnvError => &["Unset or correct the AGIT_* variable named in the error"],
            Self::ConfigRemoteBranchReference => &[
                "Declare the branch as a local branch name (e.g. 'main' rather than 'origin/main')",
            ],

            Self::RepoMissingParentDirectory => &[
                "Create the enclosing directory before converging",
                "Check for typos in the destination path",
            ],
            Self::RepoOriginMismatch => &[
                "Move or remove the existing working copy",
                "Or point the declaration at the repository already checked out there",
            ],
            Self::RepoMissingRemoteBranch => &[
                "Push the branch to the remote",
                "Check the declared branch name for typos",
            ],
            Self::RepoDirty => &[
                "Commit, stash or discard local changes in the working copy",
            ],
            Self::RepoUnpushedCommits => &[
                "Push local commits before switching branches",
            ],
            Self::RepoDestinationSetup => &[
                "Check that the run-as user and group exist",
                "Check permissions on the parent directory",
            ],

            Self::CredHomeResolution => &[
                "Ensure the run-as user exists in the account database",
                "Ensure the user entry has a home directory field",
            ],
            Self::CredAgentOwnership => &[
                "Run agit as root when forwarding an agent to another user",
                "Check that the forwarded agent socket still exists",
            ],
            Self::CredWrapperCreate => &[
                "Check that the wrapper directory is writable",
                "Set AGIT_WRAPPER_DIR to a writable location",
            ],

            Self::ExecSpawnFailed => &["Ensure git is installed and on PATH"],
            Self::ExecNonZeroExit => &[
                "Inspect the captured stderr in the error message",
                "Re-run the git command manually in the destination",
            ],
            Self::ExecTimeout => &[
                "Raise timeout_secs for the repository",
                "Check network reachability of the remote",
            ],
            Self::ExecUnknownAccount => &["Create the user/group or fix the declaration"],

            Self::InternalStateError => &["Report this as a bug with the full log output"],
            Self::InternalLoggingError => &[
                "Check that the log file directory is writable",
                "Check AGIT_LOG_LEVEL for a valid filter",
            ],
        }
    }

    /// Returns all defined error codes.
    #[must_use]
    pub const fn all() -> &'static [ErrorCode] {
        &[
            Self::ConfigNotFound,
            Self::ConfigReadError,
            Self::ConfigParseError,
            Self::ConfigValidationError,
            Self::ConfigEnvError,
            Self::ConfigRemoteBranchReference,
            Self::RepoMissingParentDirectory,
            Self::RepoOriginMismatch,
            Self::RepoMissingRemoteBranch,
            Self::RepoDirty,
            Self::RepoUnpushedCommits,
            Self::RepoDestinationSetup,
            Self::CredHomeResolution,
            Self::CredAgentOwnership,
            Self::CredWrapperCreate,
            Self::ExecSpawnFailed,
            Self::ExecNonZeroExit,
            Self::ExecTimeout,
            Self::ExecUnknownAccount,
            Self::InternalStateError,
            Self::InternalLoggingError,
        ]
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code_string(), self.message())
    }
}

/// Error category for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    /// Manifest and environment errors (E001-E099)
    Config,
    /// Working-copy convergence aborts (E100-E199)
    Repository,
    /// SSH agent and wrapper errors (E200-E299)
    Credentials,
    /// Command execution errors (E300-E399)
    Execution,
    /// Internal/unexpected errors (E500-E599)
    Internal,
}

impl ErrorCategory {
    /// Returns a human-readable name for the category.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Config => "Configuration",
            Self::Repository => "Repository",
            Self::Credentials => "Credentials",
            Self::Execution => "Execution",
            Self::Internal => "Internal",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Complete error entry with all metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    /// Error code string (e.g., "AGIT-E001")
    pub code: String,
    /// Error category
    pub category: ErrorCategory,
    /// Human-readable error message
    pub message: String,
    /// Steps to remediate the error
    pub remediation: Vec<String>,
}

impl ErrorEntry {
    /// Formats the error for display with full remediation steps.
    #[must_use]
    pub fn format_full(&self) -> String {
        let mut output = format!("[{}] {}\n\n", self.code, self.message);

        if !self.remediation.is_empty() {
            output.push_str("Remediation steps:\n");
            for (i, step) in self.remediation.iter().enumerate() {
                output.push_str(&format!("  {}. {}\n", i + 1, step));
            }
        }

        output
    }

    /// Formats the error as a single line.
    #[must_use]
    pub fn format_brief(&self) -> String {
        format!("[{}] {}", self.code, self.message)
    }
}

impl fmt::Display for ErrorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_brief())
    }
}
