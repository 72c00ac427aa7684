use agit::{
    Accounts, AgentLocator, ConvergeMode, CredentialWrapperManager, GroupAccount,
    MockCommandRunner, ProcessTable, Run, UserAccount,
};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Pid of the simulated current process.
pub const SELF_PID: u32 = 5000;

/// Parent links; pids without a link are unreadable.
#[derive(Debug, Clone, Default)]
pub struct FakeProcessTable(HashMap<u32, u32>);

impl FakeProcessTable {
    /// `SELF_PID -> 4000 -> sshd -> 1`.
    pub fn session(sshd: u32) -> Self {
        Self([(SELF_PID, 4000), (4000, sshd), (sshd, 1), (1, 0)].into_iter().collect())
    }
}

impl ProcessTable for FakeProcessTable {
    fn parent_pid(&self, pid: u32) -> io::Result<u32> {
        self.0
            .get(&pid)
            .copied()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such process"))
    }
}

/// Temporary root holding a home directory, agent sockets, wrappers and
/// working copies. `deploy` maps to the invoking uid/gid.
pub struct Sandbox {
    pub dir: TempDir,
    pub uid: u32,
    pub gid: u32,
}

impl Sandbox {
    pub fn new() -> Self {
        crate::test_log!("FIXTURE: Creating agit sandbox");

        let dir = TempDir::new().expect("Failed to create temp dir");
        let meta = fs::metadata(dir.path()).expect("Failed to stat temp dir");
        let (uid, gid) = (meta.uid(), meta.gid());
        let home = dir.path().join("home/deploy");
        fs::create_dir_all(&home).expect("Failed to create home");
        fs::create_dir_all(dir.path().join("wrappers")).expect("Failed to create wrapper dir");
        fs::create_dir_all(dir.path().join("srv")).expect("Failed to create srv");

        Self { dir, uid, gid }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn home(&self) -> PathBuf {
        self.path().join("home/deploy")
    }

    pub fn destination(&self, name: &str) -> PathBuf {
        self.path().join("srv").join(name)
    }

    pub fn wrapper_dir(&self) -> PathBuf {
        self.path().join("wrappers")
    }

    pub fn accounts(&self) -> Accounts {
        Accounts::fixed()
            .with_user(UserAccount::new("deploy", self.uid, self.gid, self.home()))
            .with_group(GroupAccount::new("deploy", self.gid))
    }

    /// Create `<root>/ssh-<tag>/agent.<pid>` and return its path.
    pub fn agent_socket(&self, tag: &str, pid: u32) -> PathBuf {
        let dir = self.path().join(format!("ssh-{tag}"));
        fs::create_dir_all(&dir).expect("Failed to create socket dir");
        let socket = dir.join(format!("agent.{pid}"));
        fs::write(&socket, "").expect("Failed to create socket");
        socket
    }

    /// Simulate a completed clone.
    pub fn make_checkout(&self, name: &str) -> PathBuf {
        let destination = self.destination(name);
        fs::create_dir_all(destination.join(".git")).expect("Failed to create .git");
        destination
    }

    pub fn run(&self, table: FakeProcessTable, mode: ConvergeMode) -> Run<MockCommandRunner, FakeProcessTable> {
        let pattern = format!("{}/ssh*/agent*", self.path().display());
        let credentials = CredentialWrapperManager::new(
            AgentLocator::new(pattern, table, SELF_PID),
            Some(self.wrapper_dir()),
        );
        Run::new(MockCommandRunner::new(), self.accounts(), credentials, mode)
    }
}
