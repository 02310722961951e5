//! libgit2-backed engine

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{Offset, TimeZone, Utc};
use git2::{DiffFormat, ErrorCode, IndexAddOption, Repository, RepositoryInitOptions};

use super::network::GitCommand;
use super::{CommitId, CommitSummary, Engine, RemoteInfo, RemoteUrl, RepositoryState, Signature};
use crate::config::Config;
use crate::naming::{RelativePath, RemoteName};
use crate::{Error, Result};

/// Engine backed by libgit2, with network transports delegated to `git`
#[derive(Debug, Clone)]
pub struct GitEngine {
    /// Branch HEAD points at after `init`
    default_branch: String,
    /// Path to the git executable used for pull and push
    git_path: String,
}

impl GitEngine {
    /// Create an engine with default settings
    pub fn new() -> Self {
        Self {
            default_branch: "main".to_string(),
            git_path: "git".to_string(),
        }
    }

    /// Create an engine from the repository and network configuration
    pub fn from_config(config: &Config) -> Self {
        Self::new()
            .with_default_branch(&config.repository.default_branch)
            .with_git_path(&config.network.git_path)
    }

    /// Set the branch name new repositories start on
    pub fn with_default_branch(mut self, branch: impl Into<String>) -> Self {
        self.default_branch = branch.into();
        self
    }

    /// Set a custom path to the git executable
    pub fn with_git_path(mut self, path: impl Into<String>) -> Self {
        self.git_path = path.into();
        self
    }

    /// Get the default branch name
    pub fn default_branch(&self) -> &str {
        &self.default_branch
    }

    /// Branch to pull into or push from
    fn checked_out_branch(handle: &GitHandle, operation: &str) -> Result<String> {
        current_branch(&handle.repo)?.ok_or_else(|| {
            Error::Engine(format!(
                "HEAD is detached; check out a branch before {}",
                operation
            ))
        })
    }

    fn ensure_remote(handle: &GitHandle, remote: &RemoteName) -> Result<()> {
        handle.repo.find_remote(remote.as_str()).map_err(|e| {
            if e.code() == ErrorCode::NotFound {
                Error::Engine(format!("Remote '{}' not found", remote))
            } else {
                e.into()
            }
        })?;
        Ok(())
    }
}

impl Default for GitEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// An open repository, dropped at the end of the request that opened it
pub struct GitHandle {
    /// The underlying git2 repository
    repo: Repository,
    /// Path to the working tree
    workdir: PathBuf,
}

impl std::fmt::Debug for GitHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHandle")
            .field("workdir", &self.workdir)
            .finish_non_exhaustive()
    }
}

impl GitHandle {
    fn new(repo: Repository, path: &Path) -> Result<Self> {
        let workdir = repo
            .workdir()
            .ok_or_else(|| Error::NotARepository(path.to_path_buf()))?
            .to_path_buf();
        Ok(Self { repo, workdir })
    }

    /// Get the working tree path
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Get access to the underlying git2 repository
    pub fn inner(&self) -> &Repository {
        &self.repo
    }
}

impl Engine for GitEngine {
    type Handle = GitHandle;

    fn name(&self) -> &'static str {
        "git"
    }

    fn init(&self, path: &Path) -> Result<GitHandle> {
        let mut opts = RepositoryInitOptions::new();
        opts.no_reinit(true)
            .mkdir(false)
            .initial_head(&self.default_branch);

        let repo = Repository::init_opts(path, &opts)?;
        GitHandle::new(repo, path)
    }

    fn open(&self, path: &Path) -> Result<GitHandle> {
        // Repository::open never searches parent directories
        let repo = Repository::open(path).map_err(|e| {
            if e.code() == ErrorCode::NotFound {
                Error::NotARepository(path.to_path_buf())
            } else {
                Error::from(e)
            }
        })?;
        GitHandle::new(repo, path)
    }

    fn stage(&self, handle: &mut GitHandle, paths: &[RelativePath]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let mut index = handle.repo.index()?;

        for path in paths.iter().filter(|p| !p.is_all()) {
            let on_disk = handle.workdir.join(path.as_path()).symlink_metadata().is_ok();
            let in_index = index.iter().any(|entry| {
                Path::new(&*String::from_utf8_lossy(&entry.path)).starts_with(path.as_path())
            });
            if !on_disk && !in_index {
                return Err(Error::InvalidRequest(format!(
                    "Path '{}' did not match any files",
                    path
                )));
            }
        }

        if paths.iter().any(RelativePath::is_all) {
            index.add_all(["*"], IndexAddOption::DEFAULT, None)?;
            // picks up deletions, which add_all leaves alone
            index.update_all(["*"], None)?;
        } else {
            // explicit paths are literal, never globs
            let specs: Vec<String> = paths.iter().map(RelativePath::to_pathspec).collect();
            index.add_all(specs.iter(), IndexAddOption::DISABLE_PATHSPEC_MATCH, None)?;
            stage_deletions(&mut index, &handle.workdir, paths)?;
        }
        index.write()?;

        Ok(())
    }

    fn commit(&self, handle: &mut GitHandle, message: &str, author: &Signature) -> Result<CommitId> {
        let repo = &handle.repo;

        let tree_id = repo.index()?.write_tree()?;
        let tree = repo.find_tree(tree_id)?;
        let sig = git2::Signature::now(&author.name, &author.email)?;

        let parent = match repo.head() {
            Ok(head) => Some(head.peel_to_commit()?),
            Err(e) if is_unborn(&e) => None,
            Err(e) => return Err(e.into()),
        };

        if parent.as_ref().is_some_and(|p| p.tree_id() == tree_id) {
            return Err(Error::Engine(
                "Nothing to commit: staged tree matches HEAD".to_string(),
            ));
        }

        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
        let oid = repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)?;

        Ok(CommitId::new(oid.to_string()))
    }

    fn pull(&self, handle: &mut GitHandle, remote: &RemoteName, timeout: Duration) -> Result<()> {
        Self::ensure_remote(handle, remote)?;
        let branch = Self::checked_out_branch(handle, "pulling")?;

        GitCommand::new(&self.git_path, &handle.workdir, "pull")
            .arg("pull")
            .arg("--quiet")
            .arg("--no-rebase")
            .arg("--no-edit")
            .arg(remote.as_str())
            .arg(branch)
            .run(timeout)
    }

    fn push(&self, handle: &mut GitHandle, remote: &RemoteName, timeout: Duration) -> Result<()> {
        Self::ensure_remote(handle, remote)?;
        let branch = Self::checked_out_branch(handle, "pushing")?;

        GitCommand::new(&self.git_path, &handle.workdir, "push")
            .arg("push")
            .arg("--quiet")
            .arg(remote.as_str())
            .arg(format!("HEAD:refs/heads/{}", branch))
            .run(timeout)
    }

    fn diff(&self, handle: &GitHandle, from: &str, to: Option<&str>) -> Result<String> {
        let repo = &handle.repo;
        let from_tree = repo.revparse_single(from)?.peel_to_tree()?;

        let diff = match to {
            Some(to) => {
                let to_tree = repo.revparse_single(to)?.peel_to_tree()?;
                repo.diff_tree_to_tree(Some(&from_tree), Some(&to_tree), None)?
            }
            None => repo.diff_tree_to_workdir_with_index(Some(&from_tree), None)?,
        };

        let mut patch = String::new();
        diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
            if matches!(line.origin(), '+' | '-' | ' ') {
                patch.push(line.origin());
            }
            patch.push_str(&String::from_utf8_lossy(line.content()));
            true
        })?;

        Ok(patch)
    }

    fn add_remote(&self, handle: &mut GitHandle, name: &RemoteName, url: &RemoteUrl) -> Result<()> {
        handle.repo.remote(name.as_str(), url.as_str())?;
        Ok(())
    }

    fn describe(&self, handle: &GitHandle) -> Result<RepositoryState> {
        let repo = &handle.repo;

        let last_commit = match repo.head() {
            Ok(head) => Some(summarize(&head.peel_to_commit()?)),
            Err(e) if is_unborn(&e) => None,
            Err(e) => return Err(e.into()),
        };

        Ok(RepositoryState {
            active_branch: current_branch(repo)?,
            last_commit,
            remotes: list_remotes(repo)?,
        })
    }
}

/// Drop index entries at or under `paths` that are gone from the working tree
fn stage_deletions(index: &mut git2::Index, workdir: &Path, paths: &[RelativePath]) -> Result<()> {
    let missing: Vec<PathBuf> = index
        .iter()
        .map(|entry| PathBuf::from(String::from_utf8_lossy(&entry.path).into_owned()))
        .filter(|tracked| paths.iter().any(|p| tracked.starts_with(p.as_path())))
        .filter(|tracked| workdir.join(tracked).symlink_metadata().is_err())
        .collect();

    for path in missing {
        index.remove_path(&path)?;
    }
    Ok(())
}

fn is_unborn(err: &git2::Error) -> bool {
    matches!(err.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound)
}

/// Get the branch HEAD points at, including an unborn branch
///
/// Returns `None` for a detached HEAD.
fn current_branch(repo: &Repository) -> Result<Option<String>> {
    let head = repo.find_reference("HEAD")?;

    Ok(head.symbolic_target().map(|target| {
        target
            .strip_prefix("refs/heads/")
            .unwrap_or(target)
            .to_string()
    }))
}

/// List all remotes
fn list_remotes(repo: &Repository) -> Result<Vec<RemoteInfo>> {
    let remotes = repo.remotes()?;

    let mut result = Vec::new();
    for remote_name in remotes.iter().flatten() {
        if let Ok(remote) = repo.find_remote(remote_name) {
            if let Some(url) = remote.url() {
                result.push(RemoteInfo {
                    name: remote_name.to_string(),
                    url: url.to_string(),
                });
            }
        }
    }

    Ok(result)
}

fn summarize(commit: &git2::Commit<'_>) -> CommitSummary {
    let author = commit.author();
    let time = commit.time();

    let offset = chrono::FixedOffset::east_opt(time.offset_minutes() * 60)
        .unwrap_or_else(|| Utc.fix());
    let date = offset
        .timestamp_opt(time.seconds(), 0)
        .single()
        .map(|d| d.to_rfc3339())
        .unwrap_or_default();

    CommitSummary {
        hash: commit.id().to_string(),
        message: commit.message().unwrap_or("").to_string(),
        author: format!(
            "{} <{}>",
            author.name().unwrap_or("Unknown"),
            author.email().unwrap_or("")
        ),
        date,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use std::fs;
    use tempfile::TempDir;

    fn author() -> Signature {
        Signature::new("Test", "test@example.com")
    }

    fn git_available() -> bool {
        std::process::Command::new("git")
            .arg("--version")
            .output()
            .is_ok_and(|o| o.status.success())
    }

    fn init_with_commit(dir: &Path) -> (GitEngine, GitHandle) {
        let engine = GitEngine::new();
        let mut handle = engine.init(dir).unwrap();
        fs::write(dir.join("README.md"), "# test\n").unwrap();
        engine.stage(&mut handle, &[RelativePath::all()]).unwrap();
        engine.commit(&mut handle, "Initial commit", &author()).unwrap();
        (engine, handle)
    }

    #[test]
    fn test_init_reports_unborn_default_branch() {
        let dir = TempDir::new().unwrap();
        let engine = GitEngine::new().with_default_branch("trunk");
        let handle = engine.init(dir.path()).unwrap();

        let state = engine.describe(&handle).unwrap();
        assert_eq!(state.active_branch.as_deref(), Some("trunk"));
        assert!(state.last_commit.is_none());
        assert!(state.remotes.is_empty());
    }

    #[test]
    fn test_open_non_git_dir() {
        let dir = TempDir::new().unwrap();
        let err = GitEngine::new().open(dir.path()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_commit_and_describe() {
        let dir = TempDir::new().unwrap();
        let (engine, handle) = init_with_commit(dir.path());

        let state = engine.describe(&handle).unwrap();
        let commit = state.last_commit.unwrap();
        assert_eq!(state.active_branch.as_deref(), Some("main"));
        assert_eq!(commit.message, "Initial commit");
        assert_eq!(commit.author, "Test <test@example.com>");
        assert_eq!(commit.hash.len(), 40);
        assert!(chrono::DateTime::parse_from_rfc3339(&commit.date).is_ok());
    }

    #[test]
    fn test_commit_without_changes_fails() {
        let dir = TempDir::new().unwrap();
        let (engine, mut handle) = init_with_commit(dir.path());

        let err = engine.commit(&mut handle, "again", &author()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Engine);
    }

    #[test]
    fn test_stage_unknown_path_fails() {
        let dir = TempDir::new().unwrap();
        let (engine, mut handle) = init_with_commit(dir.path());

        let path = RelativePath::parse("missing.txt").unwrap();
        let err = engine.stage(&mut handle, &[path]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }

    #[test]
    fn test_stage_deletion() {
        let dir = TempDir::new().unwrap();
        let (engine, mut handle) = init_with_commit(dir.path());

        fs::remove_file(dir.path().join("README.md")).unwrap();
        let path = RelativePath::parse("README.md").unwrap();
        engine.stage(&mut handle, &[path]).unwrap();
        engine.commit(&mut handle, "Remove readme", &author()).unwrap();

        let diff = engine.diff(&handle, "HEAD~1", Some("HEAD")).unwrap();
        assert!(diff.contains("-# test"));
    }

    #[test]
    fn test_stage_path_is_literal() {
        let dir = TempDir::new().unwrap();
        let (engine, mut handle) = init_with_commit(dir.path());

        fs::write(dir.path().join("a[1].txt"), "bracket\n").unwrap();
        fs::write(dir.path().join("a1.txt"), "plain\n").unwrap();
        engine
            .stage(&mut handle, &[RelativePath::parse("a[1].txt").unwrap()])
            .unwrap();

        let index = handle.inner().index().unwrap();
        let staged: Vec<String> = index
            .iter()
            .map(|e| String::from_utf8_lossy(&e.path).into_owned())
            .collect();
        assert_eq!(staged, vec!["README.md", "a[1].txt"]);
    }

    #[test]
    fn test_stage_directory() {
        let dir = TempDir::new().unwrap();
        let (engine, mut handle) = init_with_commit(dir.path());

        fs::create_dir_all(dir.path().join("docs/guide")).unwrap();
        fs::write(dir.path().join("docs/guide/intro.md"), "intro\n").unwrap();
        fs::write(dir.path().join("docs-extra.md"), "extra\n").unwrap();
        engine
            .stage(&mut handle, &[RelativePath::parse("docs").unwrap()])
            .unwrap();

        let index = handle.inner().index().unwrap();
        assert!(index.get_path(Path::new("docs/guide/intro.md"), 0).is_some());
        assert!(index.get_path(Path::new("docs-extra.md"), 0).is_none());
    }

    #[test]
    fn test_diff_between_commits_and_workdir() {
        let dir = TempDir::new().unwrap();
        let (engine, mut handle) = init_with_commit(dir.path());

        fs::write(dir.path().join("notes.txt"), "hello\n").unwrap();
        let diff = engine.diff(&handle, "HEAD", None).unwrap();
        // untracked files do not show up against the index
        assert!(!diff.contains("+hello"));

        engine
            .stage(&mut handle, &[RelativePath::parse("notes.txt").unwrap()])
            .unwrap();
        let diff = engine.diff(&handle, "HEAD", None).unwrap();
        assert!(diff.contains("+hello"));

        engine.commit(&mut handle, "Add notes", &author()).unwrap();
        let diff = engine.diff(&handle, "HEAD~1", Some("HEAD")).unwrap();
        assert!(diff.contains("diff --git a/notes.txt b/notes.txt"));
        assert!(diff.contains("+hello"));
    }

    #[test]
    fn test_diff_unknown_ref() {
        let dir = TempDir::new().unwrap();
        let (engine, handle) = init_with_commit(dir.path());

        let err = engine.diff(&handle, "no-such-branch", None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Engine);
    }

    #[test]
    fn test_add_remote_is_described() {
        let dir = TempDir::new().unwrap();
        let engine = GitEngine::new();
        let mut handle = engine.init(dir.path()).unwrap();

        let url = RemoteUrl::parse("https://example.com/owner/repo.git").unwrap();
        engine
            .add_remote(&mut handle, &RemoteName::origin(), &url)
            .unwrap();

        let state = engine.describe(&handle).unwrap();
        assert_eq!(
            state.remotes,
            vec![RemoteInfo {
                name: "origin".to_string(),
                url: "https://example.com/owner/repo.git".to_string(),
            }]
        );

        // a second remote with the same name is rejected
        assert!(engine
            .add_remote(&mut handle, &RemoteName::origin(), &url)
            .is_err());
    }

    #[test]
    fn test_push_to_local_bare_repo() {
        if !git_available() {
            return;
        }

        let dir = TempDir::new().unwrap();
        let bare_dir = TempDir::new().unwrap();
        Repository::init_bare(bare_dir.path()).unwrap();

        let (engine, mut handle) = init_with_commit(dir.path());
        let url = RemoteUrl::parse(bare_dir.path().to_str().unwrap()).unwrap();
        engine
            .add_remote(&mut handle, &RemoteName::origin(), &url)
            .unwrap();

        engine
            .push(&mut handle, &RemoteName::origin(), Duration::from_secs(30))
            .unwrap();

        let bare = Repository::open_bare(bare_dir.path()).unwrap();
        assert!(bare.find_reference("refs/heads/main").is_ok());
    }

    #[test]
    fn test_pull_unreachable_remote_leaves_repo_intact() {
        if !git_available() {
            return;
        }

        let dir = TempDir::new().unwrap();
        let (engine, mut handle) = init_with_commit(dir.path());
        let url = RemoteUrl::parse("/nonexistent/gitward/remote.git").unwrap();
        engine
            .add_remote(&mut handle, &RemoteName::origin(), &url)
            .unwrap();

        let err = engine
            .pull(&mut handle, &RemoteName::origin(), Duration::from_secs(30))
            .unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::Engine | ErrorKind::OperationTimeout
        ));

        drop(handle);
        let reopened = engine.open(dir.path()).unwrap();
        assert!(engine.describe(&reopened).unwrap().last_commit.is_some());
    }

    #[test]
    fn test_pull_unknown_remote() {
        let dir = TempDir::new().unwrap();
        let (engine, mut handle) = init_with_commit(dir.path());

        let upstream = RemoteName::parse("upstream").unwrap();
        let err = engine
            .pull(&mut handle, &upstream, Duration::from_secs(5))
            .unwrap_err();
        assert!(err.to_string().contains("Remote 'upstream' not found"));
    }
}
