//! MCP (Model Context Protocol) server for gitward.
//!
//! Exposes repository management as MCP tools and each repository as a
//! `git://<name>` resource, over the stdio transport.
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use gitward_core::{Dispatcher, GitEngine, RepoManager, RepoRoot, RepositoryConfig};
//! use gitward_mcp::GitwardMcp;
//!
//! #[tokio::main]
//! async fn main() -> gitward_mcp::Result<()> {
//!     let root = RepoRoot::open("./repositories")?;
//!     let manager = RepoManager::new(root, GitEngine::new(), RepositoryConfig::default());
//!     let server = GitwardMcp::new(Dispatcher::new(manager, Duration::from_secs(60)));
//!     server.run_stdio().await
//! }
//! ```
//!
//! ## Tools
//!
//! - `create_repository` - Create a repository, optionally with a commit and remote
//! - `delete_repository` - Delete a repository
//! - `add_files` - Stage paths
//! - `commit` - Commit staged changes
//! - `pull` / `push` - Sync with a remote, bounded by a timeout
//! - `diff` - Diff two revisions or a revision against the working tree
//! - `list_repositories` - Metadata for every repository

mod error;
mod server;
mod types;

pub use error::{McpError, Result};
pub use server::{GitwardMcp, REPOSITORY_MIME_TYPE};
pub use types::*;
