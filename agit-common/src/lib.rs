//! Shared types, configuration, errors and logging for agit.

pub mod config;
pub mod errors;
pub mod logging;
pub mod testing;
pub mod types;
pub mod util;

pub use config::{
    ConfigSource, EnvError, EnvParser, Manifest, ManifestError, Settings, Sourced, load_manifest,
};
pub use errors::{ErrorCategory, ErrorCode, ErrorEntry};
pub use logging::{LogConfig, LogFormat, LoggingError, LoggingGuards, init_logging};
pub use types::{
    DEFAULT_AGENT_SOCKET_GLOB, DEFAULT_BRANCH, DEFAULT_DIRECTORY_MODE, DEFAULT_PROC_ROOT,
    DEFAULT_TIMEOUT_SECS, DesiredState, Divergence, ObservedState, REMOTE_TRACKING_PREFIX,
    RepositoryStatus, ResourceId,
};
pub use util::{display_command, mask_url_credentials};
