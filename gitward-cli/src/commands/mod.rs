//! CLI command implementations

pub mod repo;
pub mod serve;

pub use repo::{CreateArgs, DeleteArgs, ListArgs, ShowArgs};
pub use serve::ServeArgs;

use gitward_core::{Config, Dispatcher, GitEngine, RepoManager, RepoRoot};

/// Wire the configured root, engine and policy into a dispatcher
pub fn open_dispatcher(config: &Config) -> anyhow::Result<Dispatcher<GitEngine>> {
    let root = RepoRoot::open(&config.storage.repositories_dir)?;
    let engine = GitEngine::from_config(config);
    let manager = RepoManager::new(root, engine, config.repository.clone());
    Ok(Dispatcher::new(manager, config.network.timeout))
}
