//! Version-control engine adapter
//!
//! The lifecycle manager talks to git only through the [`Engine`] trait.
//! [`GitEngine`] is the real implementation (libgit2 plus the `git` binary
//! for network transports); [`MemoryEngine`] is an in-memory fake with
//! scriptable failures.

mod memory;
mod network;
mod repo;
mod remote_url;

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::naming::{RelativePath, RemoteName};
use crate::{Error, Result};

pub use memory::{Capability, MemoryEngine, MemoryHandle};
pub use repo::{GitEngine, GitHandle};
pub use remote_url::RemoteUrl;

/// Capabilities the core needs from a version-control engine
///
/// Every call may fail and a failed call may leave the engine in any state;
/// only `open` and `describe` are expected to be free of side effects.
/// All methods block.
pub trait Engine: Send + Sync + 'static {
    /// Open reference to one repository, scoped to a single request
    type Handle: Send;

    /// Get the name of this engine
    fn name(&self) -> &'static str;

    /// Initialize a new repository in an existing, empty directory
    fn init(&self, path: &Path) -> Result<Self::Handle>;

    /// Open an existing repository; fails with `NotARepository` otherwise
    fn open(&self, path: &Path) -> Result<Self::Handle>;

    /// Stage the given paths; a path missing from the working tree stages its deletion
    fn stage(&self, handle: &mut Self::Handle, paths: &[RelativePath]) -> Result<()>;

    /// Commit the staged state on the current branch
    fn commit(
        &self,
        handle: &mut Self::Handle,
        message: &str,
        author: &Signature,
    ) -> Result<CommitId>;

    /// Fetch and merge the current branch from a remote
    fn pull(&self, handle: &mut Self::Handle, remote: &RemoteName, timeout: Duration)
        -> Result<()>;

    /// Push the current branch to a remote
    fn push(&self, handle: &mut Self::Handle, remote: &RemoteName, timeout: Duration)
        -> Result<()>;

    /// Unified diff between two revisions, or between `from` and the working tree
    fn diff(&self, handle: &Self::Handle, from: &str, to: Option<&str>) -> Result<String>;

    /// Register a new remote
    fn add_remote(
        &self,
        handle: &mut Self::Handle,
        name: &RemoteName,
        url: &RemoteUrl,
    ) -> Result<()>;

    /// Snapshot branch, last commit and remotes
    fn describe(&self, handle: &Self::Handle) -> Result<RepositoryState>;
}

/// Commit author/committer identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    pub email: String,
}

impl Signature {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// Parse the conventional `Name <email>` form
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = || {
            Error::InvalidRequest(format!(
                "Invalid author '{}'. Expected format: Name <email>",
                input
            ))
        };

        let (name, rest) = input.trim().split_once('<').ok_or_else(invalid)?;
        let email = rest.strip_suffix('>').ok_or_else(invalid)?.trim();
        let name = name.trim();

        if name.is_empty() || email.is_empty() || email.contains(&['<', '>'][..]) {
            return Err(invalid());
        }

        Ok(Self::new(name, email))
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}

/// Identifier of a commit (full hex object id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitId(String);

impl CommitId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Information about a git remote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteInfo {
    /// Name of the remote (e.g., "origin")
    pub name: String,
    /// URL of the remote
    pub url: String,
}

/// The commit HEAD points at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSummary {
    pub hash: String,
    pub message: String,
    /// `Name <email>`
    pub author: String,
    /// ISO-8601 with the committer's UTC offset
    pub date: String,
}

/// What an engine reports about a repository
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryState {
    /// Branch HEAD points at; `None` when HEAD is detached
    pub active_branch: Option<String>,
    /// `None` until the first commit
    pub last_commit: Option<CommitSummary>,
    pub remotes: Vec<RemoteInfo>,
}
