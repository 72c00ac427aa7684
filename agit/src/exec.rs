//! Command execution.
//!
//! Every external command goes through [`CommandRunner`]. The system runner
//! spawns on tokio with an optional run-as uid/gid and a hard timeout; the
//! mock runner replays scripted results and records every call.

use crate::accounts::{AccountError, Accounts};
use agit_common::{ErrorCode, display_command};
use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

// ── Command description ─────────────────────────────────────────────────

/// A single command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub user: Option<String>,
    pub group: Option<String>,
    pub env: BTreeMap<String, String>,
    pub timeout: Option<Duration>,
    pub allowed_exit_codes: Vec<i32>,
    /// Prefix for log lines, usually the resource id.
    pub label: Option<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            user: None,
            group: None,
            env: BTreeMap::new(),
            timeout: None,
            allowed_exit_codes: vec![0],
            label: None,
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    #[must_use]
    pub fn run_as(mut self, user: Option<String>, group: Option<String>) -> Self {
        self.user = user;
        self.group = group;
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn allow_exit_codes(mut self, codes: &[i32]) -> Self {
        self.allowed_exit_codes = codes.to_vec();
        self
    }

    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Command line for logs, with URL credentials masked.
    pub fn display(&self) -> String {
        display_command(&self.program, &self.args)
    }

    /// `program arg1 arg2 ...` without quoting or masking, for matching.
    pub fn argv_string(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: 0,
        }
    }

    pub fn exit(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    /// Stdout with surrounding whitespace removed, or `None` when empty.
    pub fn trimmed_stdout(&self) -> Option<&str> {
        let trimmed = self.stdout.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` timed out after {}", humantime::format_duration(*timeout))]
    Timeout { command: String, timeout: Duration },

    #[error("`{command}` exited with status {exit_code}: {stderr}")]
    NonZeroExit {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("`{command}` was terminated by a signal")]
    Signaled { command: String },

    #[error("`{command}` produced unexpected output: {output:?}")]
    UnexpectedOutput { command: String, output: String },

    #[error("cannot run `{command}`: {source}")]
    UnknownAccount {
        command: String,
        #[source]
        source: AccountError,
    },
}

impl CommandError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Spawn { .. } => ErrorCode::ExecSpawnFailed,
            Self::Timeout { .. } => ErrorCode::ExecTimeout,
            Self::NonZeroExit { .. } | Self::Signaled { .. } | Self::UnexpectedOutput { .. } => {
                ErrorCode::ExecNonZeroExit
            }
            Self::UnknownAccount { .. } => ErrorCode::ExecUnknownAccount,
        }
    }

    pub fn command(&self) -> &str {
        match self {
            Self::Spawn { command, .. }
            | Self::Timeout { command, .. }
            | Self::NonZeroExit { command, .. }
            | Self::Signaled { command }
            | Self::UnexpectedOutput { command, .. }
            | Self::UnknownAccount { command, .. } => command,
        }
    }
}

/// Reject exit codes outside the command's tolerated set.
fn check_exit(spec: &CommandSpec, output: CommandOutput) -> Result<CommandOutput, CommandError> {
    if spec.allowed_exit_codes.contains(&output.exit_code) {
        Ok(output)
    } else {
        Err(CommandError::NonZeroExit {
            command: spec.display(),
            exit_code: output.exit_code,
            stderr: output.stderr.trim().to_string(),
        })
    }
}

// ── Runner seam ─────────────────────────────────────────────────────────

/// Runs commands described by [`CommandSpec`].
pub trait CommandRunner: Send + Sync {
    fn run(
        &self,
        spec: &CommandSpec,
    ) -> impl Future<Output = Result<CommandOutput, CommandError>> + Send;
}

/// Spawns real processes.
#[derive(Debug, Clone, Default)]
pub struct SystemCommandRunner {
    accounts: Accounts,
}

impl SystemCommandRunner {
    pub fn new(accounts: Accounts) -> Self {
        Self { accounts }
    }

    fn resolve_ids(&self, spec: &CommandSpec) -> Result<(Option<u32>, Option<u32>), CommandError> {
        let unknown = |source| CommandError::UnknownAccount {
            command: spec.display(),
            source,
        };
        let uid = match &spec.user {
            Some(user) => Some(self.accounts.lookup_user(user).map_err(unknown)?.uid),
            None => None,
        };
        let gid = match &spec.group {
            Some(group) => Some(self.accounts.lookup_group(group).map_err(unknown)?.gid),
            None => None,
        };
        Ok((uid, gid))
    }
}

impl CommandRunner for SystemCommandRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        let (uid, gid) = self.resolve_ids(spec)?;
        let rendered = spec.display();
        let label = spec.label.as_deref().unwrap_or("agit");
        debug!(label, command = %rendered, cwd = ?spec.cwd, user = ?spec.user, "Running command");

        let mut cmd = tokio::process::Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }
        // Group first: dropping the uid removes the right to change gid.
        if let Some(gid) = gid {
            cmd.gid(gid);
        }
        if let Some(uid) = uid {
            cmd.uid(uid);
        }

        let started = Instant::now();
        let child = cmd.spawn().map_err(|source| CommandError::Spawn {
            command: rendered.clone(),
            source,
        })?;

        let waited = match spec.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(label, command = %rendered, "Command timed out, child killed");
                    return Err(CommandError::Timeout {
                        command: rendered,
                        timeout: limit,
                    });
                }
            },
            None => child.wait_with_output().await,
        };
        let output = waited.map_err(|source| CommandError::Spawn {
            command: rendered.clone(),
            source,
        })?;

        let Some(exit_code) = output.status.code() else {
            return Err(CommandError::Signaled { command: rendered });
        };
        debug!(
            label,
            command = %rendered,
            exit_code,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Command finished"
        );

        check_exit(
            spec,
            CommandOutput {
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                exit_code,
            },
        )
    }
}

// ── Mock runner ─────────────────────────────────────────────────────────

/// Scripted result for [`MockCommandRunner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockResponse {
    /// Finish with this output; the exit code is checked like a real run.
    Output(CommandOutput),
    Timeout,
    SpawnFailure(String),
}

impl MockResponse {
    pub fn stdout(stdout: impl Into<String>) -> Self {
        Self::Output(CommandOutput::success(stdout))
    }

    pub fn exit(code: i32, stderr: impl Into<String>) -> Self {
        Self::Output(CommandOutput::exit(code, "", stderr))
    }
}

#[derive(Debug, Clone)]
struct MockRule {
    prefix: String,
    response: MockResponse,
    remaining: Option<usize>,
}

/// Deterministic in-memory runner for tests.
///
/// Rules match on the leading words of `program args...`. The first rule
/// with uses left wins; commands with no matching rule succeed with empty
/// output.
#[derive(Debug, Clone, Default)]
pub struct MockCommandRunner {
    rules: Arc<Mutex<Vec<MockRule>>>,
    recorded_calls: Arc<Mutex<Vec<CommandSpec>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Respond to every command starting with `prefix`.
    pub fn on(&self, prefix: &str, response: MockResponse) -> &Self {
        self.push_rule(prefix, response, None)
    }

    /// Respond once to the next command starting with `prefix`.
    pub fn on_once(&self, prefix: &str, response: MockResponse) -> &Self {
        self.push_rule(prefix, response, Some(1))
    }

    fn push_rule(&self, prefix: &str, response: MockResponse, remaining: Option<usize>) -> &Self {
        lock(&self.rules).push(MockRule {
            prefix: prefix.to_string(),
            response,
            remaining,
        });
        self
    }

    /// Snapshot of every call received.
    #[must_use]
    pub fn calls(&self) -> Vec<CommandSpec> {
        lock(&self.recorded_calls).clone()
    }

    /// Received calls rendered as `program args...`.
    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        self.calls().iter().map(CommandSpec::argv_string).collect()
    }

    /// Number of received calls starting with `prefix`.
    #[must_use]
    pub fn count(&self, prefix: &str) -> usize {
        self.commands()
            .iter()
            .filter(|c| matches_prefix(c, prefix))
            .count()
    }

    fn respond(&self, spec: &CommandSpec) -> MockResponse {
        let argv = spec.argv_string();
        let mut rules = lock(&self.rules);
        for rule in rules.iter_mut() {
            if rule.remaining == Some(0) || !matches_prefix(&argv, &rule.prefix) {
                continue;
            }
            if let Some(left) = rule.remaining.as_mut() {
                *left -= 1;
            }
            return rule.response.clone();
        }
        MockResponse::stdout("")
    }
}

fn matches_prefix(argv: &str, prefix: &str) -> bool {
    argv == prefix || argv.starts_with(&format!("{prefix} "))
}

impl CommandRunner for MockCommandRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        lock(&self.recorded_calls).push(spec.clone());
        match self.respond(spec) {
            MockResponse::Output(output) => check_exit(spec, output),
            MockResponse::Timeout => Err(CommandError::Timeout {
                command: spec.display(),
                timeout: spec.timeout.unwrap_or_default(),
            }),
            MockResponse::SpawnFailure(message) => Err(CommandError::Spawn {
                command: spec.display(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, message),
            }),
        }
    }
}

/// True when `path` exists and has no entries.
pub fn is_empty_dir(path: &Path) -> bool {
    std::fs::read_dir(path)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false)
}
