//! Locates a forwarded SSH agent socket belonging to this process's session.
//!
//! sshd names forwarded sockets `/tmp/ssh-XXXX/agent.<pid>` where `<pid>` is
//! the sshd process serving the session. A socket is ours when that pid is
//! one of our ancestors.

use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Upper bound on parent links followed from the current process.
pub const MAX_ANCESTRY_DEPTH: usize = 256;

/// Parent-pid lookups.
pub trait ProcessTable {
    fn parent_pid(&self, pid: u32) -> io::Result<u32>;
}

/// Reads `PPid:` from `<root>/<pid>/status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcFs {
    root: PathBuf,
}

impl Default for ProcFs {
    fn default() -> Self {
        Self::new(agit_common::DEFAULT_PROC_ROOT)
    }
}

impl ProcFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ProcessTable for ProcFs {
    fn parent_pid(&self, pid: u32) -> io::Result<u32> {
        let status = std::fs::read_to_string(self.root.join(pid.to_string()).join("status"))?;
        parse_ppid(&status).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("no PPid field in status of pid {pid}"),
            )
        })
    }
}

/// Extract the `PPid:` value from a `/proc/<pid>/status` document.
pub fn parse_ppid(status: &str) -> Option<u32> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("PPid:"))
        .and_then(|value| value.trim().parse().ok())
}

/// The pid encoded in a socket name of the form `agent.<digits>`.
pub fn agent_pid(socket: &Path) -> Option<u32> {
    let name = socket.file_name()?.to_str()?;
    let digits = name.strip_prefix("agent.")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Ancestors of `start`, nearest first, ending at pid 1.
///
/// The walk stops early on pid 0, on a read failure, on a cycle or after
/// [`MAX_ANCESTRY_DEPTH`] links.
pub fn ancestry<T: ProcessTable>(table: &T, start: u32) -> Vec<u32> {
    let mut chain = Vec::new();
    let mut pid = start;
    while pid != 1 && chain.len() < MAX_ANCESTRY_DEPTH {
        let parent = match table.parent_pid(pid) {
            Ok(parent) => parent,
            Err(err) => {
                debug!(pid, error = %err, "Stopped ancestry walk at unreadable process");
                break;
            }
        };
        if parent == 0 || parent == start || chain.contains(&parent) {
            break;
        }
        chain.push(parent);
        pid = parent;
    }
    chain
}

/// Finds the agent socket whose owning pid is an ancestor of this process.
#[derive(Debug, Clone)]
pub struct AgentLocator<T> {
    pattern: String,
    table: T,
    start_pid: u32,
}

impl AgentLocator<ProcFs> {
    /// Locator over the live process table starting at this process.
    pub fn system(pattern: impl Into<String>, proc_root: impl Into<PathBuf>) -> Self {
        Self::new(pattern, ProcFs::new(proc_root), std::process::id())
    }
}

impl<T: ProcessTable> AgentLocator<T> {
    pub fn new(pattern: impl Into<String>, table: T, start_pid: u32) -> Self {
        Self {
            pattern: pattern.into(),
            table,
            start_pid,
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Candidate socket paths in glob order.
    pub fn candidates(&self) -> Vec<PathBuf> {
        match glob::glob(&self.pattern) {
            Ok(paths) => paths.filter_map(Result::ok).collect(),
            Err(err) => {
                warn!(pattern = %self.pattern, error = %err, "Invalid agent socket pattern");
                Vec::new()
            }
        }
    }

    /// The first candidate owned by an ancestor, or `None`.
    pub fn locate(&self) -> Option<PathBuf> {
        let candidates = self.candidates();
        if candidates.is_empty() {
            debug!(pattern = %self.pattern, "No agent socket candidates");
            return None;
        }

        let chain = ancestry(&self.table, self.start_pid);
        debug!(start_pid = self.start_pid, ancestors = ?chain, "Process ancestry");

        for candidate in candidates {
            let Some(pid) = agent_pid(&candidate) else {
                debug!(candidate = %candidate.display(), "Skipping socket without agent pid");
                continue;
            };
            if chain.contains(&pid) {
                debug!(socket = %candidate.display(), pid, "Found forwarded agent socket");
                return Some(candidate);
            }
        }
        None
    }
}
