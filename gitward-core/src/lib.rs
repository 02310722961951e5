//! gitward core library
//!
//! Manages a directory of git repositories on behalf of remote clients:
//! validated names, confined paths, all-or-nothing creation, metadata
//! views, and the usual mutating operations (stage, commit, pull, push,
//! diff), all reported through one error taxonomy.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod git;
pub mod lifecycle;
pub mod naming;
pub mod root;

pub use config::{Config, NetworkConfig, RepositoryConfig, StorageConfig};
pub use dispatch::{parse_repository_ref, resource_uri, Dispatcher, Outcome, Request, RESOURCE_SCHEME};
pub use error::{Error, ErrorKind, ErrorPayload, Result};
pub use git::{
    CommitId, CommitSummary, Engine, GitEngine, MemoryEngine, RemoteInfo, RemoteUrl,
    RepositoryState, Signature,
};
pub use lifecycle::{CreateRequest, CreationStage, RepoManager, RepositoryView, Scan, SkippedEntry};
pub use naming::{RelativePath, RemoteName, RepoName, MAX_NAME_LEN};
pub use root::RepoRoot;
