//! User and group lookup.
//!
//! The system source asks the C library (`getpwnam_r`/`getgrnam_r`), so every
//! NSS backend configured on the host is consulted. A name that is not found
//! but parses as a number is looked up by id. The fixed source is an
//! in-memory table used by tests and sandboxes.

use agit_common::ErrorCode;
use nix::errno::Errno;
use nix::unistd::{Group, Uid, User};
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAccount {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
    pub home: PathBuf,
}

impl UserAccount {
    pub fn new(name: impl Into<String>, uid: u32, gid: u32, home: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            uid,
            gid,
            home: home.into(),
        }
    }
}

impl From<User> for UserAccount {
    fn from(user: User) -> Self {
        Self {
            name: user.name,
            uid: user.uid.as_raw(),
            gid: user.gid.as_raw(),
            home: user.dir,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupAccount {
    pub name: String,
    pub gid: u32,
}

impl GroupAccount {
    pub fn new(name: impl Into<String>, gid: u32) -> Self {
        Self {
            name: name.into(),
            gid,
        }
    }
}

impl From<Group> for GroupAccount {
    fn from(group: Group) -> Self {
        Self {
            name: group.name,
            gid: group.gid.as_raw(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("unknown user '{0}'")]
    UnknownUser(String),

    #[error("unknown group '{0}'")]
    UnknownGroup(String),

    #[error("account lookup for '{name}' failed: {source}")]
    Lookup {
        name: String,
        #[source]
        source: Errno,
    },
}

impl AccountError {
    pub fn error_code(&self) -> ErrorCode {
        ErrorCode::ExecUnknownAccount
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Source {
    System,
    Fixed {
        users: Vec<UserAccount>,
        groups: Vec<GroupAccount>,
    },
}

/// Where user and group names are resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accounts {
    source: Source,
}

impl Default for Accounts {
    fn default() -> Self {
        Self::system()
    }
}

impl Accounts {
    pub fn system() -> Self {
        Self {
            source: Source::System,
        }
    }

    /// An empty in-memory table. Populate with [`Accounts::with_user`] and
    /// [`Accounts::with_group`].
    pub fn fixed() -> Self {
        Self {
            source: Source::Fixed {
                users: Vec::new(),
                groups: Vec::new(),
            },
        }
    }

    /// Adds a user to a fixed table. No effect on the system source.
    pub fn with_user(mut self, user: UserAccount) -> Self {
        if let Source::Fixed { users, .. } = &mut self.source {
            users.push(user);
        }
        self
    }

    /// Adds a group to a fixed table. No effect on the system source.
    pub fn with_group(mut self, group: GroupAccount) -> Self {
        if let Source::Fixed { groups, .. } = &mut self.source {
            groups.push(group);
        }
        self
    }

    pub fn lookup_user(&self, name: &str) -> Result<UserAccount, AccountError> {
        let uid = name.parse::<u32>().ok();
        let found = match &self.source {
            Source::System => {
                let lookup_err = |source| AccountError::Lookup {
                    name: name.to_string(),
                    source,
                };
                match User::from_name(name).map_err(lookup_err)? {
                    Some(user) => Some(user.into()),
                    None => match uid {
                        Some(uid) => User::from_uid(Uid::from_raw(uid))
                            .map_err(lookup_err)?
                            .map(UserAccount::from),
                        None => None,
                    },
                }
            }
            Source::Fixed { users, .. } => users
                .iter()
                .find(|u| u.name == name)
                .or_else(|| users.iter().find(|u| Some(u.uid) == uid))
                .cloned(),
        };

        match found {
            Some(user) => {
                debug!(user = %user.name, uid = user.uid, home = %user.home.display(), "Resolved user");
                Ok(user)
            }
            None => Err(AccountError::UnknownUser(name.to_string())),
        }
    }

    pub fn lookup_group(&self, name: &str) -> Result<GroupAccount, AccountError> {
        let found = match &self.source {
            Source::System => Group::from_name(name)
                .map_err(|source| AccountError::Lookup {
                    name: name.to_string(),
                    source,
                })?
                .map(GroupAccount::from),
            Source::Fixed { groups, .. } => groups.iter().find(|g| g.name == name).cloned(),
        };
        if let Some(group) = found {
            return Ok(group);
        }

        // Numeric groups need not have an entry.
        match name.parse::<u32>() {
            Ok(gid) => Ok(GroupAccount {
                name: name.to_string(),
                gid,
            }),
            Err(_) => Err(AccountError::UnknownGroup(name.to_string())),
        }
    }
}
