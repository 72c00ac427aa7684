//! One convergence run over a sequence of declared repositories.
//!
//! A [`Run`] owns the [`RunRegistry`] for its lifetime. Resources converge
//! strictly one after another; [`Run::run_completed`] reverts every
//! credential change exactly once.

use crate::accounts::{Accounts, GroupAccount, UserAccount};
use crate::credentials::{CleanupReport, CredentialWrapperManager, RunRegistry};
use crate::exec::{CommandError, CommandRunner};
use crate::git::{GIT, GitContext};
use crate::inspect::inspect;
use crate::reconcile::{
    ConvergeError, ConvergeMode, ConvergeOutcome, GitStatusProvider, Reconciler, validate_branch,
};
use crate::remote_url::RemoteUrl;
use crate::ssh_agent::ProcessTable;
use agit_common::{DesiredState, ResourceId};
use nix::unistd::{Gid, Uid, chown};
use std::fs::{Metadata, Permissions};
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

pub struct Run<R, T> {
    runner: R,
    accounts: Accounts,
    credentials: CredentialWrapperManager<T>,
    registry: RunRegistry,
    mode: ConvergeMode,
    completed: bool,
}

impl<R: CommandRunner, T: ProcessTable> Run<R, T> {
    pub fn new(
        runner: R,
        accounts: Accounts,
        credentials: CredentialWrapperManager<T>,
        mode: ConvergeMode,
    ) -> Self {
        Self {
            runner,
            accounts,
            credentials,
            registry: RunRegistry::new(),
            mode,
            completed: false,
        }
    }

    pub fn mode(&self) -> ConvergeMode {
        self.mode
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn registry(&self) -> &RunRegistry {
        &self.registry
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Converge one declared repository.
    ///
    /// Fails once [`Run::run_completed`] has run, since anything registered
    /// afterwards would never be reverted.
    #[instrument(skip_all, fields(resource = %desired.resource_id()))]
    pub async fn converge(
        &mut self,
        desired: &DesiredState,
    ) -> Result<ConvergeOutcome, ConvergeError> {
        let resource = desired.resource_id();
        if self.completed {
            return Err(ConvergeError::RunCompleted { resource });
        }
        validate_branch(desired)?;

        let (user, group) = self.resolve_accounts(desired, &resource)?;
        let git_ssh = self.prepare_credentials(desired, &resource, &user, &group)?;
        self.prepare_destination(desired, &resource, &user, &group)?;

        let ctx = GitContext::run_as(resource, &user.name, &group.name, &user.home)
            .with_git_ssh(git_ssh)
            .with_timeout(desired.timeout());

        let observed = inspect(&self.runner, &ctx, &desired.destination).await;
        let status = GitStatusProvider::new(&self.runner, &ctx, &desired.destination);
        Reconciler::new(&self.runner, self.mode)
            .converge(desired, &observed, &ctx, &status)
            .await
    }

    /// Delete wrappers and restore ownership. Only the first call does work.
    pub fn run_completed(&mut self) -> CleanupReport {
        if self.completed {
            debug!("Run already completed, nothing to clean up");
            return CleanupReport::default();
        }
        self.completed = true;
        let report = self.credentials.cleanup(&mut self.registry);
        info!(
            wrappers_removed = report.wrappers_removed.len(),
            ownership_restored = report.ownership_restored.len(),
            failures = report.failures.len(),
            "Run completed"
        );
        report
    }

    fn resolve_accounts(
        &self,
        desired: &DesiredState,
        resource: &ResourceId,
    ) -> Result<(UserAccount, GroupAccount), ConvergeError> {
        let user = self.accounts.lookup_user(&desired.user).map_err(|source| {
            ConvergeError::HomeResolutionFailure {
                resource: resource.clone(),
                user: desired.user.clone(),
                source,
            }
        })?;
        let group = self.accounts.lookup_group(&desired.group).map_err(|source| {
            ConvergeError::CommandExecutionError {
                resource: resource.clone(),
                source: CommandError::UnknownAccount {
                    command: GIT.to_string(),
                    source,
                },
            }
        })?;
        Ok((user, group))
    }

    /// Wrapper path for `GIT_SSH`, when the remote is SSH-addressed and an
    /// agent is reachable.
    fn prepare_credentials(
        &mut self,
        desired: &DesiredState,
        resource: &ResourceId,
        user: &UserAccount,
        group: &GroupAccount,
    ) -> Result<Option<PathBuf>, ConvergeError> {
        let remote = RemoteUrl::parse(&desired.repository);
        if !remote.requires_ssh() {
            debug!(resource = %resource, transport = %remote.transport, "No SSH wrapper needed");
            return Ok(None);
        }
        if self.mode.is_dry_run() {
            info!(
                resource = %resource,
                "Would hand the agent socket to {} and create an SSH wrapper", user.name
            );
            return Ok(None);
        }

        let credential_error = |source| ConvergeError::CredentialSetup {
            resource: resource.clone(),
            source,
        };
        let Some(socket) = self
            .credentials
            .ensure_agent_ownership(&mut self.registry, user.uid, group.gid)
            .map_err(credential_error)?
        else {
            return Ok(None);
        };
        let wrapper = self
            .credentials
            .create_wrapper(&mut self.registry, &socket, user.uid, group.gid)
            .map_err(credential_error)?;
        Ok(Some(wrapper.path))
    }

    /// Make the destination leaf a directory owned by the run-as identity
    /// with the declared mode.
    ///
    /// Parents are never created; a missing parent is left for the
    /// reconciler to report. An existing directory keeps its contents and
    /// only has its own owner, group and mode corrected.
    fn prepare_destination(
        &self,
        desired: &DesiredState,
        resource: &ResourceId,
        user: &UserAccount,
        group: &GroupAccount,
    ) -> Result<(), ConvergeError> {
        let destination = desired.destination.as_path();
        match std::fs::metadata(destination) {
            Ok(meta) if meta.is_dir() => {
                self.correct_destination(desired, resource, user, group, &meta)
            }
            // A file in the way is reported by the clone.
            Ok(_) => Ok(()),
            Err(_) if destination.parent().is_some_and(Path::is_dir) => {
                self.create_destination(desired, resource, user, group)
            }
            Err(_) => Ok(()),
        }
    }

    fn create_destination(
        &self,
        desired: &DesiredState,
        resource: &ResourceId,
        user: &UserAccount,
        group: &GroupAccount,
    ) -> Result<(), ConvergeError> {
        let destination = desired.destination.as_path();
        if self.mode.is_dry_run() {
            info!(resource = %resource, destination = %destination.display(), "Would create destination directory");
            return Ok(());
        }

        let setup_error = |source| ConvergeError::DestinationSetup {
            resource: resource.clone(),
            destination: desired.destination.clone(),
            source,
        };
        std::fs::create_dir(destination).map_err(setup_error)?;
        let handed_over = hand_over(destination, user, group).and_then(|()| {
            std::fs::set_permissions(destination, Permissions::from_mode(desired.mode))
        });
        if let Err(err) = handed_over {
            if let Err(remove_err) = std::fs::remove_dir(destination) {
                debug!(destination = %destination.display(), error = %remove_err, "Could not remove destination");
            }
            return Err(setup_error(err));
        }
        info!(
            resource = %resource,
            destination = %destination.display(),
            mode = %format_args!("{:o}", desired.mode),
            "Created destination directory"
        );
        Ok(())
    }

    fn correct_destination(
        &self,
        desired: &DesiredState,
        resource: &ResourceId,
        user: &UserAccount,
        group: &GroupAccount,
        meta: &Metadata,
    ) -> Result<(), ConvergeError> {
        let destination = desired.destination.as_path();
        let owner_differs = meta.uid() != user.uid || meta.gid() != group.gid;
        let mode_differs = meta.mode() & 0o7777 != desired.mode;
        if !owner_differs && !mode_differs {
            return Ok(());
        }
        if self.mode.is_dry_run() {
            info!(
                resource = %resource,
                destination = %destination.display(),
                "Would set owner {}:{} and mode {:o} on destination", user.name, group.name, desired.mode
            );
            return Ok(());
        }

        let setup_error = |source| ConvergeError::DestinationSetup {
            resource: resource.clone(),
            destination: desired.destination.clone(),
            source,
        };
        // Ownership first: chown clears set-id bits.
        if owner_differs {
            hand_over(destination, user, group).map_err(setup_error)?;
        }
        std::fs::set_permissions(destination, Permissions::from_mode(desired.mode))
            .map_err(setup_error)?;
        info!(
            resource = %resource,
            destination = %destination.display(),
            uid = user.uid,
            gid = group.gid,
            mode = %format_args!("{:o}", desired.mode),
            "Updated destination owner and mode"
        );
        Ok(())
    }
}

fn hand_over(path: &Path, user: &UserAccount, group: &GroupAccount) -> std::io::Result<()> {
    chown(path, Some(Uid::from_raw(user.uid)), Some(Gid::from_raw(group.gid)))
        .map_err(std::io::Error::from)
}
