//! Configuration for agit.
//!
//! Values resolve in this order (later wins):
//! 1. Built-in defaults
//! 2. The manifest file (`[settings]` and `[[repository]]` tables)
//! 3. `AGIT_*` environment variables
//! 4. Command-line flags

pub mod env;
pub mod manifest;
pub mod source;

pub use env::{EnvError, EnvParser};
pub use manifest::{Manifest, ManifestError, Settings, load_manifest};
pub use source::{ConfigSource, Sourced};

#[cfg(test)]
use std::sync::{Mutex, MutexGuard, OnceLock};

#[cfg(test)]
pub(crate) fn env_test_lock() -> MutexGuard<'static, ()> {
    static ENV_MUTEX: OnceLock<Mutex<()>> = OnceLock::new();
    ENV_MUTEX
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
