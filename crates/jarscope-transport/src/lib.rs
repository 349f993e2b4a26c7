//! Artifact listing and retrieval.
//!
//! A [`Transport`] produces `(name, size, mtime)` tuples for a remote
//! directory and fetches individual binaries. Services with credentials go
//! over SSH; services without are local mirrors. Callers do not distinguish
//! the two.

mod listing;
mod local;
mod ssh;

pub use listing::{decode_listing, parse_listing, parse_recursive_listing, Listing};

use std::path::Path;

use chrono::{DateTime, Utc};

use local::LocalTransport;
use ssh::SshTransport;

/// One artifact visible in a directory listing. Contents are not read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub file_size: i64,
    pub modified: DateTime<Utc>,
}

/// Access to one service's artifact directories.
pub enum Transport {
    Local(LocalTransport),
    Ssh(SshTransport),
}

impl Transport {
    /// Transport for a local mirror (no credentials).
    pub fn local() -> Self {
        Transport::Local(LocalTransport)
    }

    /// Transport for a remote host reached over SSH.
    pub fn ssh(host: &str, port: u16, username: &str, password: &str) -> Self {
        Transport::Ssh(SshTransport::new(host, port, username, password))
    }

    /// List regular files in `dir`. Malformed listing lines are skipped and
    /// counted; an unreachable host or unreadable directory is an error.
    pub async fn list(&self, dir: &str) -> miette::Result<Listing> {
        match self {
            Transport::Local(t) => t.list(dir).await,
            Transport::Ssh(t) => t.list(dir).await,
        }
    }

    /// List regular files under `dir` recursively; entry names are paths
    /// relative to `dir`. Used for `classes/` trees.
    pub async fn list_recursive(&self, dir: &str) -> miette::Result<Listing> {
        match self {
            Transport::Local(t) => t.list_recursive(dir).await,
            Transport::Ssh(t) => t.list_recursive(dir).await,
        }
    }

    /// Copy one remote file to a local destination, creating parent
    /// directories as needed.
    pub async fn fetch(&self, src: &str, dst: &Path) -> miette::Result<()> {
        match self {
            Transport::Local(t) => t.fetch(src, dst).await,
            Transport::Ssh(t) => t.fetch(src, dst).await,
        }
    }
}
