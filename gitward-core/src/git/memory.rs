//! In-memory engine for deterministic tests
//!
//! Repositories live in a map keyed by path. The directories themselves are
//! still expected to exist on disk, since the lifecycle manager creates and
//! removes them; nothing is ever written inside them.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::{CommitId, CommitSummary, Engine, RemoteInfo, RemoteUrl, RepositoryState, Signature};
use crate::naming::{RelativePath, RemoteName};
use crate::{Error, Result};

/// One capability of the [`Engine`] trait, used to script failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Init,
    Open,
    Stage,
    Commit,
    Pull,
    Push,
    Diff,
    AddRemote,
    Describe,
}

type FailureFn = Arc<dyn Fn() -> Error + Send + Sync>;

#[derive(Debug, Default)]
struct MemoryRepo {
    branch: String,
    staged: BTreeSet<String>,
    commits: Vec<CommitSummary>,
    remotes: Vec<RemoteInfo>,
}

/// Handle to a repository held by a [`MemoryEngine`]
#[derive(Debug, Clone)]
pub struct MemoryHandle {
    path: PathBuf,
}

/// Engine keeping all repository state in memory
pub struct MemoryEngine {
    default_branch: String,
    repos: Mutex<HashMap<PathBuf, MemoryRepo>>,
    failures: Mutex<HashMap<Capability, FailureFn>>,
    network_delay: Mutex<Option<Duration>>,
}

impl std::fmt::Debug for MemoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryEngine")
            .field("default_branch", &self.default_branch)
            .finish_non_exhaustive()
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self {
            default_branch: "main".to_string(),
            repos: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            network_delay: Mutex::new(None),
        }
    }

    /// Make every call to `capability` fail with the error `make_error` builds
    pub fn fail_with<F>(&self, capability: Capability, make_error: F)
    where
        F: Fn() -> Error + Send + Sync + 'static,
    {
        lock(&self.failures).insert(capability, Arc::new(make_error));
    }

    /// Stop injecting failures into `capability`
    pub fn clear_failure(&self, capability: Capability) {
        lock(&self.failures).remove(&capability);
    }

    /// Pretend pull and push take this long on the wire
    pub fn set_network_delay(&self, delay: Option<Duration>) {
        *lock(&self.network_delay) = delay;
    }

    /// Number of commits recorded for the repository at `path`
    pub fn commit_count(&self, path: &Path) -> usize {
        self.live_repos()
            .get(path)
            .map(|repo| repo.commits.len())
            .unwrap_or(0)
    }

    fn check(&self, capability: Capability) -> Result<()> {
        match lock(&self.failures).get(&capability) {
            Some(make_error) => Err(make_error()),
            None => Ok(()),
        }
    }

    /// The repository map, minus entries whose directory has been removed
    fn live_repos(&self) -> MutexGuard<'_, HashMap<PathBuf, MemoryRepo>> {
        let mut repos = lock(&self.repos);
        repos.retain(|path, _| path.is_dir());
        repos
    }

    fn with_repo<T>(&self, path: &Path, f: impl FnOnce(&mut MemoryRepo) -> Result<T>) -> Result<T> {
        let mut repos = self.live_repos();
        let repo = repos
            .get_mut(path)
            .ok_or_else(|| Error::NotARepository(path.to_path_buf()))?;
        f(repo)
    }

    fn network(
        &self,
        operation: &'static str,
        handle: &MemoryHandle,
        remote: &RemoteName,
        timeout: Duration,
    ) -> Result<()> {
        self.with_repo(&handle.path, |repo| {
            if repo.remotes.iter().any(|r| r.name == remote.as_str()) {
                Ok(())
            } else {
                Err(Error::Engine(format!("Remote '{}' not found", remote)))
            }
        })?;

        if let Some(delay) = *lock(&self.network_delay) {
            if delay > timeout {
                std::thread::sleep(timeout);
                return Err(Error::Timeout {
                    operation,
                    after: timeout,
                });
            }
            std::thread::sleep(delay);
        }

        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Engine for MemoryEngine {
    type Handle = MemoryHandle;

    fn name(&self) -> &'static str {
        "memory"
    }

    fn init(&self, path: &Path) -> Result<MemoryHandle> {
        self.check(Capability::Init)?;

        if !path.is_dir() {
            return Err(Error::Engine(format!(
                "Cannot initialize repository, {} is not a directory",
                path.display()
            )));
        }

        let repo = MemoryRepo {
            branch: self.default_branch.clone(),
            ..Default::default()
        };
        self.live_repos().insert(path.to_path_buf(), repo);

        Ok(MemoryHandle {
            path: path.to_path_buf(),
        })
    }

    fn open(&self, path: &Path) -> Result<MemoryHandle> {
        self.check(Capability::Open)?;

        if !self.live_repos().contains_key(path) {
            return Err(Error::NotARepository(path.to_path_buf()));
        }

        Ok(MemoryHandle {
            path: path.to_path_buf(),
        })
    }

    fn stage(&self, handle: &mut MemoryHandle, paths: &[RelativePath]) -> Result<()> {
        self.check(Capability::Stage)?;
        self.with_repo(&handle.path, |repo| {
            repo.staged.extend(paths.iter().map(RelativePath::to_pathspec));
            Ok(())
        })
    }

    fn commit(
        &self,
        handle: &mut MemoryHandle,
        message: &str,
        author: &Signature,
    ) -> Result<CommitId> {
        self.check(Capability::Commit)?;
        self.with_repo(&handle.path, |repo| {
            if repo.staged.is_empty() && !repo.commits.is_empty() {
                return Err(Error::Engine("Nothing to commit".to_string()));
            }
            repo.staged.clear();

            let id = CommitId::new(format!("{:040x}", repo.commits.len() + 1));
            repo.commits.push(CommitSummary {
                hash: id.to_string(),
                message: message.to_string(),
                author: author.to_string(),
                date: "1970-01-01T00:00:00+00:00".to_string(),
            });
            Ok(id)
        })
    }

    fn pull(&self, handle: &mut MemoryHandle, remote: &RemoteName, timeout: Duration) -> Result<()> {
        self.check(Capability::Pull)?;
        self.network("pull", handle, remote, timeout)
    }

    fn push(&self, handle: &mut MemoryHandle, remote: &RemoteName, timeout: Duration) -> Result<()> {
        self.check(Capability::Push)?;
        self.network("push", handle, remote, timeout)
    }

    fn diff(&self, handle: &MemoryHandle, from: &str, to: Option<&str>) -> Result<String> {
        self.check(Capability::Diff)?;
        self.with_repo(&handle.path, |repo| {
            if repo.commits.is_empty() {
                return Err(Error::Engine(format!("Revision '{}' not found", from)));
            }
            Ok(format!("diff {}..{}\n", from, to.unwrap_or("WORKTREE")))
        })
    }

    fn add_remote(
        &self,
        handle: &mut MemoryHandle,
        name: &RemoteName,
        url: &RemoteUrl,
    ) -> Result<()> {
        self.check(Capability::AddRemote)?;
        self.with_repo(&handle.path, |repo| {
            if repo.remotes.iter().any(|r| r.name == name.as_str()) {
                return Err(Error::Engine(format!("remote '{}' already exists", name)));
            }
            repo.remotes.push(RemoteInfo {
                name: name.to_string(),
                url: url.to_string(),
            });
            Ok(())
        })
    }

    fn describe(&self, handle: &MemoryHandle) -> Result<RepositoryState> {
        self.check(Capability::Describe)?;
        self.with_repo(&handle.path, |repo| {
            Ok(RepositoryState {
                active_branch: Some(repo.branch.clone()),
                last_commit: repo.commits.last().cloned(),
                remotes: repo.remotes.clone(),
            })
        })
    }
}
