//! agit: safe convergence of git working copies.
//!
//! Clones, switches branches and fast-forwards working copies without ever
//! discarding local work, using a forwarded SSH agent for SSH remotes.

pub mod accounts;
pub mod credentials;
pub mod exec;
pub mod git;
pub mod inspect;
pub mod reconcile;
pub mod remote_url;
pub mod run;
pub mod ssh_agent;

pub use accounts::{AccountError, Accounts, GroupAccount, UserAccount};
pub use credentials::{
    CleanupReport, CredentialError, CredentialWrapperManager, OwnershipRecord, RunRegistry,
    SshWrapper,
};
pub use exec::{
    CommandError, CommandOutput, CommandRunner, CommandSpec, MockCommandRunner, MockResponse,
    SystemCommandRunner,
};
pub use git::GitContext;
pub use inspect::inspect;
pub use reconcile::{
    Action, ConvergeError, ConvergeMode, ConvergeOutcome, GitStatusProvider, Reconciler,
    StatusProvider,
};
pub use remote_url::{RemoteUrl, Transport, requires_ssh};
pub use run::Run;
pub use ssh_agent::{AgentLocator, ProcFs, ProcessTable};
