//! Reads remote and branch metadata from an existing working copy.

use crate::exec::{CommandRunner, CommandSpec};
use crate::git::GitContext;
use agit_common::ObservedState;
use std::path::Path;
use tracing::{debug, warn};

/// True when `destination` holds git metadata.
pub fn has_git_metadata(destination: &Path) -> bool {
    destination.join(".git").exists()
}

/// Observed state of the working copy at `destination`.
///
/// Without `.git` metadata the state is absent. Otherwise each field is read
/// independently; a failing command or empty output leaves that field unset.
pub async fn inspect<R: CommandRunner>(
    runner: &R,
    ctx: &GitContext,
    destination: &Path,
) -> ObservedState {
    debug!(resource = %ctx.resource, "Finding current git repository metadata");
    if !has_git_metadata(destination) {
        return ObservedState::absent();
    }

    let observed = ObservedState {
        repository: read_field(runner, &ctx.config_origin_url(destination)).await,
        branch: read_field(runner, &ctx.current_branch_tolerant(destination)).await,
    };
    debug!(
        resource = %ctx.resource,
        repository = ?observed.repository,
        branch = ?observed.branch,
        "Observed working copy"
    );
    observed
}

async fn read_field<R: CommandRunner>(runner: &R, spec: &CommandSpec) -> Option<String> {
    match runner.run(spec).await {
        Ok(output) if output.exit_code == 0 => output.trimmed_stdout().map(str::to_string),
        Ok(_) => None,
        Err(err) => {
            warn!(command = %spec.display(), error = %err, "Inspection command failed");
            None
        }
    }
}
