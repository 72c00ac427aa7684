//! Classifies repository URLs by transport.
//!
//! Only SSH-addressed remotes need a forwarded agent and a wrapper script.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// `ssh://`, `git+ssh://`, `ssh+git://` or scp-like `[user@]host:path`.
    Ssh,
    Http,
    Git,
    File,
    /// Plain filesystem path.
    Local,
}

impl Transport {
    pub fn requires_ssh(self) -> bool {
        self == Self::Ssh
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ssh => "ssh",
            Self::Http => "http",
            Self::Git => "git",
            Self::File => "file",
            Self::Local => "local",
        };
        f.write_str(name)
    }
}

/// A repository URL with its transport and, when present, host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteUrl {
    pub transport: Transport,
    pub host: Option<String>,
}

impl RemoteUrl {
    pub fn parse(url: &str) -> Self {
        let url = url.trim();

        if let Some((scheme, rest)) = url.split_once("://") {
            let transport = match scheme.to_ascii_lowercase().as_str() {
                "ssh" | "git+ssh" | "ssh+git" => Transport::Ssh,
                "http" | "https" => Transport::Http,
                "git" => Transport::Git,
                "file" => Transport::File,
                _ => Transport::Local,
            };
            let host = (transport != Transport::File)
                .then(|| authority_host(rest))
                .flatten();
            return Self { transport, host };
        }

        if let Some(host) = scp_like_host(url) {
            return Self {
                transport: Transport::Ssh,
                host: Some(host),
            };
        }

        Self {
            transport: Transport::Local,
            host: None,
        }
    }

    pub fn requires_ssh(&self) -> bool {
        self.transport.requires_ssh()
    }
}

/// True when cloning `url` needs SSH credentials.
pub fn requires_ssh(url: &str) -> bool {
    RemoteUrl::parse(url).requires_ssh()
}

fn authority_host(after_scheme: &str) -> Option<String> {
    let authority = after_scheme.split('/').next()?;
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, rhs)| rhs);
    let host = match host_port.strip_prefix('[') {
        Some(bracketed) => bracketed.split(']').next().unwrap_or(bracketed),
        None => host_port.split(':').next().unwrap_or(host_port),
    };
    (!host.is_empty()).then(|| host.to_string())
}

/// Host of `[user@]host:path`, the form git treats as SSH when the colon
/// comes before any slash.
fn scp_like_host(url: &str) -> Option<String> {
    let colon = url.find(':')?;
    if url.find('/').is_some_and(|slash| slash < colon) {
        return None;
    }
    let login = &url[..colon];
    let host = login.rsplit_once('@').map_or(login, |(_, rhs)| rhs);
    // A one-letter "host" is a Windows drive such as `C:`.
    if host.len() < 2 || url[colon + 1..].is_empty() {
        return None;
    }
    Some(host.to_string())
}
