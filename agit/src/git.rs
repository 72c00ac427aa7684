//! The git command subset used for convergence, and parsers for its output.

use crate::exec::CommandSpec;
use agit_common::ResourceId;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const GIT: &str = "git";

/// Execution context shared by every git command for one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitContext {
    pub resource: ResourceId,
    pub user: Option<String>,
    pub group: Option<String>,
    pub home: Option<PathBuf>,
    pub git_ssh: Option<PathBuf>,
    pub timeout: Option<Duration>,
}

impl GitContext {
    /// Run as the invoking user with no environment overrides.
    pub fn current_user(resource: ResourceId) -> Self {
        Self {
            resource,
            user: None,
            group: None,
            home: None,
            git_ssh: None,
            timeout: None,
        }
    }

    pub fn run_as(
        resource: ResourceId,
        user: impl Into<String>,
        group: impl Into<String>,
        home: impl Into<PathBuf>,
    ) -> Self {
        Self {
            resource,
            user: Some(user.into()),
            group: Some(group.into()),
            home: Some(home.into()),
            git_ssh: None,
            timeout: None,
        }
    }

    #[must_use]
    pub fn with_git_ssh(mut self, wrapper: Option<PathBuf>) -> Self {
        self.git_ssh = wrapper;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// `git <args>` carrying the run-as identity, `HOME`, `GIT_SSH` and timeout.
    pub fn git<I, S>(&self, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut spec = CommandSpec::new(GIT)
            .args(args)
            .run_as(self.user.clone(), self.group.clone())
            .label(self.resource.to_string());
        if let Some(home) = &self.home {
            spec = spec.env("HOME", home.to_string_lossy());
        }
        if let Some(wrapper) = &self.git_ssh {
            spec = spec.env("GIT_SSH", wrapper.to_string_lossy());
        }
        if let Some(timeout) = self.timeout {
            spec = spec.timeout(timeout);
        }
        spec
    }

    pub fn config_origin_url(&self, cwd: &Path) -> CommandSpec {
        self.git(["config", "--get", "remote.origin.url"])
            .cwd(cwd)
            .allow_exit_codes(&[0, 1])
    }

    pub fn current_branch(&self, cwd: &Path) -> CommandSpec {
        self.git(["rev-parse", "--abbrev-ref", "HEAD"]).cwd(cwd)
    }

    /// Same query with exit 128 (no commits yet) tolerated.
    pub fn current_branch_tolerant(&self, cwd: &Path) -> CommandSpec {
        self.current_branch(cwd).allow_exit_codes(&[0, 128])
    }

    pub fn clone_repository(
        &self,
        repository: &str,
        branch: Option<&str>,
        destination: &Path,
    ) -> CommandSpec {
        let mut args = vec!["clone".to_string()];
        if let Some(branch) = branch {
            args.push("-b".to_string());
            args.push(branch.to_string());
        }
        args.push(repository.to_string());
        args.push(destination.to_string_lossy().into_owned());
        self.git(args)
    }

    pub fn fetch_all(&self, cwd: &Path) -> CommandSpec {
        self.git(["fetch", "--all"]).cwd(cwd)
    }

    pub fn checkout(&self, cwd: &Path, branch: &str) -> CommandSpec {
        self.git(["checkout", branch]).cwd(cwd)
    }

    pub fn pull_rebase(&self, cwd: &Path) -> CommandSpec {
        self.git(["pull", "--rebase"]).cwd(cwd)
    }

    pub fn ls_remote(&self, repository: &str, branch: &str) -> CommandSpec {
        self.git(["ls-remote".to_string(), repository.to_string(), format!("{branch}*")])
    }

    pub fn upstream(&self, cwd: &Path) -> CommandSpec {
        self.git(["rev-parse", "--abbrev-ref", "--symbolic-full-name", "@{u}"])
            .cwd(cwd)
    }

    pub fn status_porcelain(&self, cwd: &Path) -> CommandSpec {
        self.git(["status", "--porcelain"]).cwd(cwd)
    }

    pub fn left_right_count(&self, cwd: &Path, local: &str, upstream: &str) -> CommandSpec {
        self.git([
            "rev-list".to_string(),
            "--left-right".to_string(),
            "--count".to_string(),
            format!("{local}...{upstream}"),
        ])
        .cwd(cwd)
    }
}

/// Refs listed by `git ls-remote`; each line is `<sha>\t<ref>`.
pub fn parse_ls_remote(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter_map(|line| {
            let (_, reference) = line.split_once('\t')?;
            let reference = reference.trim();
            (!reference.is_empty()).then(|| reference.to_string())
        })
        .collect()
}

/// `(ahead, behind)` from `git rev-list --left-right --count`.
pub fn parse_left_right_count(stdout: &str) -> Option<(u32, u32)> {
    let mut parts = stdout.split_whitespace();
    let ahead = parts.next()?.parse().ok()?;
    let behind = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((ahead, behind))
}
