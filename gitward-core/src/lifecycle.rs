//! Repository lifecycle: create, list, describe, delete
//!
//! Creation walks a fixed sequence of stages
//!
//! ```text
//! Requested -> DirectoryCreated -> EngineInitialized -> [CommitApplied] -> [RemoteAttached] -> Ready
//! ```
//!
//! and any failure after the directory exists goes through a single rollback
//! that removes it again, so a failed `create` never leaves a repository
//! behind for `list` or `describe` to find.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::RepositoryConfig;
use crate::git::{CommitSummary, Engine, RemoteInfo, RemoteUrl, RepositoryState};
use crate::naming::{RelativePath, RemoteName, RepoName};
use crate::root::RepoRoot;
use crate::{Error, Result};

/// Request to create a repository
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRequest {
    /// Repository name
    pub name: String,

    /// Create an initial commit
    #[serde(default)]
    pub init_commit: bool,

    /// URL registered as `origin`
    #[serde(default)]
    pub remote_url: Option<String>,
}

impl CreateRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_initial_commit(mut self) -> Self {
        self.init_commit = true;
        self
    }

    pub fn with_remote(mut self, url: impl Into<String>) -> Self {
        self.remote_url = Some(url.into());
        self
    }
}

/// Stages of repository creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreationStage {
    Requested,
    DirectoryCreated,
    EngineInitialized,
    CommitApplied,
    RemoteAttached,
    Ready,
}

impl fmt::Display for CreationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            CreationStage::Requested => "request validation",
            CreationStage::DirectoryCreated => "directory creation",
            CreationStage::EngineInitialized => "repository initialization",
            CreationStage::CommitApplied => "initial commit",
            CreationStage::RemoteAttached => "remote registration",
            CreationStage::Ready => "final inspection",
        };
        f.write_str(stage)
    }
}

/// Read-only snapshot of one repository, computed on demand
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryView {
    pub name: String,
    pub active_branch: Option<String>,
    pub last_commit: Option<CommitSummary>,
    pub remotes: Vec<RemoteInfo>,
}

impl RepositoryView {
    pub fn new(name: &RepoName, state: RepositoryState) -> Self {
        Self {
            name: name.to_string(),
            active_branch: state.active_branch,
            last_commit: state.last_commit,
            remotes: state.remotes,
        }
    }
}

/// A directory entry `scan` could not turn into a repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedEntry {
    pub entry: String,
    pub reason: String,
}

/// Result of scanning the repositories root
#[derive(Debug, Clone, Default, Serialize)]
pub struct Scan {
    pub repositories: Vec<RepositoryView>,
    pub skipped: Vec<SkippedEntry>,
}

/// Owns the repositories root and applies lifecycle operations to it
#[derive(Debug)]
pub struct RepoManager<E: Engine> {
    root: RepoRoot,
    engine: E,
    policy: RepositoryConfig,
}

impl<E: Engine> RepoManager<E> {
    pub fn new(root: RepoRoot, engine: E, policy: RepositoryConfig) -> Self {
        Self {
            root,
            engine,
            policy,
        }
    }

    /// Get the repositories root
    pub fn root(&self) -> &RepoRoot {
        &self.root
    }

    /// Get the engine
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Get the creation policy
    pub fn policy(&self) -> &RepositoryConfig {
        &self.policy
    }

    /// Create a repository, all-or-nothing
    pub fn create(&self, request: &CreateRequest) -> Result<RepositoryView> {
        let name = RepoName::parse(&request.name)?;
        let path = self.root.resolve(&name)?;

        if path.symlink_metadata().is_ok() {
            return Err(Error::AlreadyExists(name.to_string()));
        }

        // create_dir (not create_dir_all) so a concurrent create of the same
        // name is reported instead of having its directory rolled back
        if let Err(e) = fs::create_dir(&path) {
            if e.kind() == io::ErrorKind::AlreadyExists {
                return Err(Error::AlreadyExists(name.to_string()));
            }
            return Err(Error::CreationFailed {
                name: name.to_string(),
                stage: CreationStage::DirectoryCreated,
                rolled_back: true,
                source: Box::new(Error::Io(e)),
            });
        }

        let mut stage = CreationStage::DirectoryCreated;
        match self.initialize(&name, &path, request, &mut stage) {
            Ok(view) => {
                tracing::info!(
                    repo = %name,
                    path = %path.display(),
                    initial_commit = request.init_commit,
                    remote = request.remote_url.is_some(),
                    "Repository created"
                );
                Ok(view)
            }
            Err(e) => Err(self.roll_back(&name, &path, stage, e)),
        }
    }

    /// Drive the stages after the directory exists
    ///
    /// `stage` is advanced before each step so a failure reports the step
    /// that was being attempted. The engine handle is dropped on return,
    /// before any rollback touches the directory.
    fn initialize(
        &self,
        name: &RepoName,
        path: &Path,
        request: &CreateRequest,
        stage: &mut CreationStage,
    ) -> Result<RepositoryView> {
        *stage = CreationStage::EngineInitialized;
        let mut handle = self.engine.init(path)?;

        if request.init_commit {
            *stage = CreationStage::CommitApplied;
            self.apply_initial_commit(&mut handle, name, path)?;
        }

        if let Some(url) = &request.remote_url {
            *stage = CreationStage::RemoteAttached;
            let url = RemoteUrl::parse(url)?;
            self.engine
                .add_remote(&mut handle, &RemoteName::origin(), &url)?;
        }

        *stage = CreationStage::Ready;
        let state = self.engine.describe(&handle)?;
        Ok(RepositoryView::new(name, state))
    }

    fn apply_initial_commit(&self, handle: &mut E::Handle, name: &RepoName, path: &Path) -> Result<()> {
        if self.policy.write_readme {
            let readme = format!(
                "# {}\n\nCreated on {}\n",
                name,
                chrono::Utc::now().to_rfc3339()
            );
            fs::write(path.join("README.md"), readme)?;
        }

        self.engine.stage(handle, &[RelativePath::all()])?;
        self.engine.commit(
            handle,
            &self.policy.initial_commit_message,
            &self.policy.default_author(),
        )?;
        Ok(())
    }

    /// The one cleanup path for a failed creation
    fn roll_back(&self, name: &RepoName, path: &Path, stage: CreationStage, source: Error) -> Error {
        tracing::warn!(
            repo = %name,
            stage = %stage,
            error = %source,
            "Repository creation failed, rolling back"
        );

        let rolled_back = match fs::remove_dir_all(path) {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => true,
            Err(e) => {
                tracing::error!(
                    repo = %name,
                    path = %path.display(),
                    error = %e,
                    "Rollback failed, partial repository left on disk"
                );
                false
            }
        };

        Error::CreationFailed {
            name: name.to_string(),
            stage,
            rolled_back,
            source: Box::new(source),
        }
    }

    /// Resolve a name to its directory, requiring a real directory (not a symlink)
    fn existing_path(&self, name: &RepoName) -> Result<PathBuf> {
        let path = self.root.resolve(name)?;
        match fs::symlink_metadata(&path) {
            Ok(meta) if meta.is_dir() => Ok(path),
            _ => Err(Error::NotFound(name.to_string())),
        }
    }

    /// Open a fresh engine handle for one request
    pub fn open(&self, name: &RepoName) -> Result<E::Handle> {
        let path = self.existing_path(name)?;
        self.engine.open(&path)
    }

    /// Describe one repository
    pub fn describe(&self, name: &RepoName) -> Result<RepositoryView> {
        let handle = self.open(name)?;
        let state = self.engine.describe(&handle)?;
        Ok(RepositoryView::new(name, state))
    }

    /// List every repository under the root, in directory order
    pub fn list(&self) -> Result<Vec<RepositoryView>> {
        Ok(self.scan()?.repositories)
    }

    /// List repositories and record why other entries were left out
    pub fn scan(&self) -> Result<Scan> {
        let mut scan = Scan::default();

        for entry in fs::read_dir(self.root.path())? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read directory entry");
                    continue;
                }
            };

            let entry_name = entry.file_name().to_string_lossy().to_string();
            if !entry.file_type().is_ok_and(|t| t.is_dir()) {
                continue;
            }

            match RepoName::parse(&entry_name).and_then(|name| self.describe(&name)) {
                Ok(view) => scan.repositories.push(view),
                Err(e) => {
                    tracing::warn!(entry = %entry_name, error = %e, "Skipping repository entry");
                    scan.skipped.push(SkippedEntry {
                        entry: entry_name,
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(scan)
    }

    /// Delete a repository and everything in it. Irreversible.
    pub fn delete(&self, name: &RepoName) -> Result<()> {
        let path = self.existing_path(name)?;
        fs::remove_dir_all(&path)?;
        tracing::info!(repo = %name, path = %path.display(), "Repository deleted");
        Ok(())
    }
}
