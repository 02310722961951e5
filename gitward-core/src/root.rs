//! Repositories root and path resolution

use std::path::{Component, Path, PathBuf};

use crate::naming::RepoName;
use crate::{Error, Result};

/// The configured directory under which every repository lives
///
/// The path is canonical, so resolution can stay purely lexical.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRoot {
    path: PathBuf,
}

impl RepoRoot {
    /// Open the repositories root, creating it if it does not exist yet
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        std::fs::create_dir_all(path).map_err(|e| {
            Error::Config(format!(
                "Failed to create repositories directory {}: {}",
                path.display(),
                e
            ))
        })?;

        let path = path.canonicalize().map_err(|e| {
            Error::Config(format!(
                "Failed to resolve repositories directory {}: {}",
                path.display(),
                e
            ))
        })?;

        if !path.is_dir() {
            return Err(Error::Config(format!(
                "Repositories root is not a directory: {}",
                path.display()
            )));
        }

        Ok(Self { path })
    }

    /// Get the root path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Map a validated repository name to its directory under the root
    ///
    /// Does not touch the filesystem.
    pub fn resolve(&self, name: &RepoName) -> Result<PathBuf> {
        confine(&self.path, Path::new(name.as_str()))
    }
}

/// Join `relative` onto `root` and require the result to be a strict descendant
fn confine(root: &Path, relative: &Path) -> Result<PathBuf> {
    let joined = root.join(relative);

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(Error::PathEscape(joined));
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }

    if normalized == root || !normalized.starts_with(root) {
        return Err(Error::PathEscape(joined));
    }

    Ok(normalized)
}
