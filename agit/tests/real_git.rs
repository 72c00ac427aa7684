//! Convergence against a real `git` and a local bare repository.
//!
//! Commands run through `SystemCommandRunner` as the sandbox `deploy` user,
//! which maps to the invoking uid/gid. Skipped when `git` is not installed.

mod common;

use agit::{
    Action, AgentLocator, ConvergeMode, CredentialWrapperManager, Run, SystemCommandRunner,
};
use agit_common::{DesiredState, ErrorCode};
use common::{FakeProcessTable, SELF_PID, Sandbox, init_test_logging};
use std::path::{Path, PathBuf};
use std::process::Command;

#[ctor::ctor]
fn setup() {
    agit_common::testing::init_global_test_logging();
}

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .is_ok_and(|output| output.status.success())
}

/// Run git as the test process, with a fixed identity for commits.
fn git(home: &Path, cwd: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(["-c", "user.name=agit", "-c", "user.email=agit@example.invalid"])
        .args(args)
        .current_dir(cwd)
        .env("HOME", home)
        .output()
        .expect("Failed to run git");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// A bare `origin.git` seeded with one commit on `main`, and the work
/// clone used to push further commits.
struct Upstream {
    bare: PathBuf,
    seed: PathBuf,
    home: PathBuf,
}

impl Upstream {
    fn new(sandbox: &Sandbox) -> Self {
        let home = sandbox.home();
        let bare = sandbox.path().join("origin.git");
        let seed = sandbox.path().join("seed");
        git(&home, sandbox.path(), &["init", "--bare", "-q", "origin.git"]);
        git(&home, &bare, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        git(&home, sandbox.path(), &["clone", "-q", "origin.git", "seed"]);
        git(&home, &seed, &["checkout", "-q", "-b", "main"]);
        let upstream = Self { bare, seed, home };
        upstream.commit("README", "first\n");
        git(&upstream.home, &upstream.seed, &["push", "-q", "-u", "origin", "main"]);
        upstream
    }

    fn url(&self) -> String {
        self.bare.to_string_lossy().into_owned()
    }

    fn commit(&self, file: &str, contents: &str) {
        std::fs::write(self.seed.join(file), contents).expect("Failed to write seed file");
        git(&self.home, &self.seed, &["add", file]);
        git(&self.home, &self.seed, &["commit", "-q", "-m", file]);
    }

    fn push(&self, branch: &str) {
        git(&self.home, &self.seed, &["push", "-q", "origin", branch]);
    }
}

fn system_run(sandbox: &Sandbox) -> Run<SystemCommandRunner, FakeProcessTable> {
    let pattern = format!("{}/ssh*/agent*", sandbox.path().display());
    let credentials = CredentialWrapperManager::new(
        AgentLocator::new(pattern, FakeProcessTable::default(), SELF_PID),
        Some(sandbox.wrapper_dir()),
    );
    Run::new(
        SystemCommandRunner::new(sandbox.accounts()),
        sandbox.accounts(),
        credentials,
        ConvergeMode::Apply,
    )
}

#[tokio::test]
async fn test_real_git_lifecycle() {
    init_test_logging();
    crate::test_log!("TEST START: test_real_git_lifecycle");
    if !git_available() {
        crate::test_log!("TEST SKIP: git not installed");
        return;
    }

    let sandbox = Sandbox::new();
    let upstream = Upstream::new(&sandbox);
    let destination = sandbox.destination("app");
    let on_branch = |branch: &str| {
        DesiredState::new(&destination, upstream.url(), branch, "deploy", "deploy")
    };
    let mut run = system_run(&sandbox);

    crate::test_log!("STEP: clone into a missing destination");
    let outcome = run.converge(&on_branch("main")).await.unwrap();
    assert!(matches!(outcome.action, Action::Clone { .. }));
    assert!(outcome.changed());
    assert_eq!(git(&sandbox.home(), &destination, &["rev-parse", "--abbrev-ref", "HEAD"]), "main");

    crate::test_log!("STEP: second run is a no-op");
    let outcome = run.converge(&on_branch("main")).await.unwrap();
    assert_eq!(outcome.action, Action::Nothing);

    crate::test_log!("STEP: upstream moves ahead, working copy pulls");
    upstream.commit("CHANGELOG", "second\n");
    upstream.push("main");
    let outcome = run.converge(&on_branch("main")).await.unwrap();
    assert_eq!(outcome.action, Action::Pull { rebase: true });
    assert!(outcome.changed());
    assert_eq!(
        std::fs::read_to_string(destination.join("CHANGELOG")).unwrap(),
        "second\n"
    );

    crate::test_log!("STEP: switching to a new remote branch checks it out");
    git(&upstream.home, &upstream.seed, &["checkout", "-q", "-b", "feature"]);
    upstream.commit("FEATURE", "feature\n");
    upstream.push("feature");
    let outcome = run.converge(&on_branch("feature")).await.unwrap();
    assert_eq!(
        outcome.action,
        Action::Checkout {
            branch: "feature".to_string()
        }
    );
    assert_eq!(
        git(&sandbox.home(), &destination, &["rev-parse", "--abbrev-ref", "HEAD"]),
        "feature"
    );
    let outcome = run.converge(&on_branch("feature")).await.unwrap();
    assert_eq!(outcome.action, Action::Nothing);

    crate::test_log!("STEP: a dirty tree refuses to switch back");
    std::fs::write(destination.join("README"), "local edit\n").unwrap();
    let err = run.converge(&on_branch("main")).await.unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::RepoDirty);
    assert_eq!(
        git(&sandbox.home(), &destination, &["rev-parse", "--abbrev-ref", "HEAD"]),
        "feature"
    );
    assert_eq!(
        std::fs::read_to_string(destination.join("README")).unwrap(),
        "local edit\n"
    );

    let report = run.run_completed();
    assert!(report.is_noop());
    crate::test_log!("TEST PASS: test_real_git_lifecycle");
}

#[tokio::test]
async fn test_real_git_origin_mismatch_leaves_checkout() {
    init_test_logging();
    if !git_available() {
        return;
    }

    let sandbox = Sandbox::new();
    let upstream = Upstream::new(&sandbox);
    let destination = sandbox.destination("app");
    let mut run = system_run(&sandbox);
    run.converge(&DesiredState::new(&destination, upstream.url(), "main", "deploy", "deploy"))
        .await
        .unwrap();

    let elsewhere = sandbox.path().join("elsewhere.git").to_string_lossy().into_owned();
    let err = run
        .converge(&DesiredState::new(&destination, elsewhere, "main", "deploy", "deploy"))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::RepoOriginMismatch);
    assert!(destination.join("README").is_file());
}
