//! Tool input types
//!
//! Each input maps onto one dispatcher [`Request`]; the JSON schema shown to
//! clients is derived from these structs.

use gitward_core::{CreateRequest, Request};
use schemars::JsonSchema;
use serde::Deserialize;

/// Input for `create_repository`
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CreateRepositoryInput {
    /// Repository name: letters, digits, '-' and '_' only.
    pub name: String,

    /// Create an initial commit containing a README.
    #[serde(default)]
    pub init_commit: bool,

    /// Remote URL to register as `origin`.
    #[serde(default)]
    pub remote_url: Option<String>,
}

impl From<CreateRepositoryInput> for Request {
    fn from(input: CreateRepositoryInput) -> Self {
        Request::Create(CreateRequest {
            name: input.name,
            init_commit: input.init_commit,
            remote_url: input.remote_url,
        })
    }
}

/// Input for `delete_repository`
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DeleteRepositoryInput {
    /// Repository to delete. This cannot be undone.
    pub name: String,
}

impl From<DeleteRepositoryInput> for Request {
    fn from(input: DeleteRepositoryInput) -> Self {
        Request::Delete { name: input.name }
    }
}

/// Input for `add_files`
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct AddFilesInput {
    /// Repository name.
    pub repository: String,

    /// Paths relative to the working tree. Use "." for everything.
    pub paths: Vec<String>,
}

impl From<AddFilesInput> for Request {
    fn from(input: AddFilesInput) -> Self {
        Request::Add {
            name: input.repository,
            paths: input.paths,
        }
    }
}

/// Input for `commit`
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CommitInput {
    /// Repository name.
    pub repository: String,

    /// Commit message.
    pub message: String,

    /// Author as "Name <email>". Defaults to the server's configured author.
    #[serde(default)]
    pub author: Option<String>,
}

impl From<CommitInput> for Request {
    fn from(input: CommitInput) -> Self {
        Request::Commit {
            name: input.repository,
            message: input.message,
            author: input.author,
        }
    }
}

/// Input for `pull` and `push`
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SyncInput {
    /// Repository name.
    pub repository: String,

    /// Remote name (default: "origin").
    #[serde(default)]
    pub remote: Option<String>,

    /// Give up after this many seconds (default: server setting).
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl SyncInput {
    pub fn into_pull(self) -> Request {
        Request::Pull {
            name: self.repository,
            remote: self.remote,
            timeout_secs: self.timeout_secs,
        }
    }

    pub fn into_push(self) -> Request {
        Request::Push {
            name: self.repository,
            remote: self.remote,
            timeout_secs: self.timeout_secs,
        }
    }
}

/// Input for `diff`
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DiffInput {
    /// Repository name.
    pub repository: String,

    /// Base revision (e.g. "HEAD~1", a branch, or a commit hash).
    pub from: String,

    /// Target revision. Omit to diff against the working tree.
    #[serde(default)]
    pub to: Option<String>,
}

impl From<DiffInput> for Request {
    fn from(input: DiffInput) -> Self {
        Request::Diff {
            name: input.repository,
            from: input.from,
            to: input.to,
        }
    }
}
