use agit::MockCommandRunner;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

const MUTATING: [&str; 4] = ["git clone", "git fetch", "git checkout", "git pull"];

pub fn assert_contains(haystack: &str, needle: &str) {
    assert!(
        haystack.contains(needle),
        "Expected to find '{needle}' in output, got: {haystack}"
    );
}

pub fn assert_mode(path: &Path, mode: u32) {
    let actual = std::fs::metadata(path)
        .expect("Failed to stat path")
        .permissions()
        .mode()
        & 0o7777;
    assert_eq!(actual, mode, "Unexpected mode {actual:o} on {}", path.display());
}

pub fn assert_no_mutating_commands(runner: &MockCommandRunner) {
    let mutating: Vec<String> = runner
        .commands()
        .into_iter()
        .filter(|c| MUTATING.iter().any(|m| c.starts_with(m)))
        .collect();
    assert!(mutating.is_empty(), "Unexpected mutating commands: {mutating:?}");
}
