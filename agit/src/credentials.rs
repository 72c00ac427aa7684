//! Run-scoped SSH credential lifecycle.
//!
//! For SSH remotes the forwarded agent socket directory is handed to the
//! run-as user and a small wrapper pins `SSH_AUTH_SOCK` for git. Both are
//! recorded in a [`RunRegistry`] and reverted once when the run completes.

use crate::ssh_agent::{AgentLocator, ProcessTable};
use agit_common::ErrorCode;
use nix::unistd::{Gid, Uid, chown};
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info, warn};

pub const WRAPPER_PREFIX: &str = "ssh_wrapper";
pub const WRAPPER_MODE: u32 = 0o700;

/// A wrapper script created for one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshWrapper {
    pub path: PathBuf,
    pub uid: u32,
    pub gid: u32,
}

/// Ownership of a directory before it was first changed in this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipRecord {
    pub path: PathBuf,
    pub uid: u32,
    pub gid: u32,
}

/// Everything this run must undo. At most one ownership record per path.
#[derive(Debug, Default)]
pub struct RunRegistry {
    wrappers: Vec<SshWrapper>,
    ownership: BTreeMap<PathBuf, OwnershipRecord>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wrappers(&self) -> &[SshWrapper] {
        &self.wrappers
    }

    pub fn ownership_record(&self, path: &Path) -> Option<&OwnershipRecord> {
        self.ownership.get(path)
    }

    pub fn ownership_records(&self) -> impl Iterator<Item = &OwnershipRecord> {
        self.ownership.values()
    }

    pub fn is_empty(&self) -> bool {
        self.wrappers.is_empty() && self.ownership.is_empty()
    }

    /// Capture current ownership of `path` unless already captured.
    /// Returns whether a new record was stored.
    pub fn record_ownership(&mut self, path: &Path) -> io::Result<bool> {
        if self.ownership.contains_key(path) {
            return Ok(false);
        }
        let metadata = std::fs::metadata(path)?;
        self.ownership.insert(
            path.to_path_buf(),
            OwnershipRecord {
                path: path.to_path_buf(),
                uid: metadata.uid(),
                gid: metadata.gid(),
            },
        );
        Ok(true)
    }

    pub fn add_wrapper(&mut self, wrapper: SshWrapper) {
        self.wrappers.push(wrapper);
    }

    fn drain(&mut self) -> (Vec<SshWrapper>, Vec<OwnershipRecord>) {
        let wrappers = std::mem::take(&mut self.wrappers);
        let records = std::mem::take(&mut self.ownership).into_values().collect();
        (wrappers, records)
    }
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("failed to hand agent socket directory {} to {uid}:{gid}: {source}", path.display())]
    SocketDirectory {
        path: PathBuf,
        uid: u32,
        gid: u32,
        #[source]
        source: io::Error,
    },

    #[error("failed to create SSH wrapper in {}: {source}", dir.display())]
    WrapperCreate {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl CredentialError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::SocketDirectory { .. } => ErrorCode::CredAgentOwnership,
            Self::WrapperCreate { .. } => ErrorCode::CredWrapperCreate,
        }
    }
}

/// What run-completion cleanup did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub wrappers_removed: Vec<PathBuf>,
    pub ownership_restored: Vec<PathBuf>,
    pub failures: Vec<String>,
}

impl CleanupReport {
    /// Removals, restorations and failed attempts combined.
    pub fn operations(&self) -> usize {
        self.wrappers_removed.len() + self.ownership_restored.len() + self.failures.len()
    }

    pub fn is_noop(&self) -> bool {
        self.operations() == 0
    }
}

/// Shell script that runs `ssh` against a fixed agent socket.
pub fn wrapper_script(socket: &Path) -> String {
    let quoted = shell_escape::unix::escape(socket.to_string_lossy());
    format!("#!/bin/sh\nSSH_AUTH_SOCK={quoted}\nexport SSH_AUTH_SOCK\nexec ssh \"$@\"\n")
}

/// `chown -R` without following symlinks.
pub fn chown_recursive(path: &Path, uid: u32, gid: u32) -> io::Result<()> {
    for entry in walkdir::WalkDir::new(path).follow_links(false) {
        let entry = entry.map_err(io::Error::from)?;
        std::os::unix::fs::lchown(entry.path(), Some(uid), Some(gid))?;
    }
    Ok(())
}

/// Creates wrappers and socket ownership changes, and reverts them.
#[derive(Debug, Clone)]
pub struct CredentialWrapperManager<T> {
    locator: AgentLocator<T>,
    wrapper_dir: PathBuf,
}

impl<T: ProcessTable> CredentialWrapperManager<T> {
    pub fn new(locator: AgentLocator<T>, wrapper_dir: Option<PathBuf>) -> Self {
        Self {
            locator,
            wrapper_dir: wrapper_dir.unwrap_or_else(std::env::temp_dir),
        }
    }

    pub fn locator(&self) -> &AgentLocator<T> {
        &self.locator
    }

    pub fn wrapper_dir(&self) -> &Path {
        &self.wrapper_dir
    }

    /// Locate the forwarded agent and give its directory to `uid:gid`.
    ///
    /// The directory's original owner is recorded before the first change.
    /// Returns `None`, after a warning, when no agent is reachable.
    pub fn ensure_agent_ownership(
        &self,
        registry: &mut RunRegistry,
        uid: u32,
        gid: u32,
    ) -> Result<Option<PathBuf>, CredentialError> {
        let Some(socket) = self.locator.locate() else {
            warn!(pattern = %self.locator.pattern(), "SSH_AUTH_SOCK is not available");
            return Ok(None);
        };
        let Some(dir) = socket.parent().map(Path::to_path_buf) else {
            warn!(socket = %socket.display(), "Agent socket has no parent directory");
            return Ok(None);
        };

        let fail = |source| CredentialError::SocketDirectory {
            path: dir.clone(),
            uid,
            gid,
            source,
        };
        if registry.record_ownership(&dir).map_err(fail)? {
            debug!(dir = %dir.display(), "Recorded agent directory ownership");
        }
        chown_recursive(&dir, uid, gid).map_err(fail)?;
        info!(dir = %dir.display(), uid, gid, "Agent socket directory handed to run-as user");
        Ok(Some(socket))
    }

    /// Write an executable wrapper owned by `uid:gid` and register it.
    pub fn create_wrapper(
        &self,
        registry: &mut RunRegistry,
        socket: &Path,
        uid: u32,
        gid: u32,
    ) -> Result<SshWrapper, CredentialError> {
        let fail = |source| CredentialError::WrapperCreate {
            dir: self.wrapper_dir.clone(),
            source,
        };

        let mut file = tempfile::Builder::new()
            .prefix(WRAPPER_PREFIX)
            .tempfile_in(&self.wrapper_dir)
            .map_err(fail)?;
        file.write_all(wrapper_script(socket).as_bytes())
            .map_err(fail)?;
        file.as_file()
            .set_permissions(std::fs::Permissions::from_mode(WRAPPER_MODE))
            .map_err(fail)?;
        chown(file.path(), Some(Uid::from_raw(uid)), Some(Gid::from_raw(gid)))
            .map_err(|errno| fail(io::Error::from(errno)))?;
        let (_, path) = file.keep().map_err(|e| fail(e.error))?;

        let wrapper = SshWrapper { path, uid, gid };
        debug!(wrapper = %wrapper.path.display(), socket = %socket.display(), "Created SSH wrapper");
        registry.add_wrapper(wrapper.clone());
        Ok(wrapper)
    }

    /// Delete every wrapper and restore every recorded owner, then clear
    /// the registry. Failures are logged and reported, never raised.
    pub fn cleanup(&self, registry: &mut RunRegistry) -> CleanupReport {
        let (wrappers, records) = registry.drain();
        let mut report = CleanupReport::default();

        for wrapper in wrappers {
            match std::fs::remove_file(&wrapper.path) {
                Ok(()) => {
                    info!(path = %wrapper.path.display(), "Deleted SSH wrapper");
                    report.wrappers_removed.push(wrapper.path);
                }
                Err(err) => {
                    error!(path = %wrapper.path.display(), error = %err, "Failed to delete SSH wrapper");
                    report
                        .failures
                        .push(format!("delete {}: {err}", wrapper.path.display()));
                }
            }
        }

        for record in records {
            match chown_recursive(&record.path, record.uid, record.gid) {
                Ok(()) => {
                    info!(path = %record.path.display(), uid = record.uid, gid = record.gid, "Reverted owner/group");
                    report.ownership_restored.push(record.path);
                }
                Err(err) => {
                    error!(path = %record.path.display(), error = %err, "Failed to revert owner/group");
                    report
                        .failures
                        .push(format!("restore {}: {err}", record.path.display()));
                }
            }
        }

        report
    }
}
