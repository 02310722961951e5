//! Validation of untrusted names and paths
//!
//! Everything a client sends that ends up touching the filesystem passes
//! through one of these newtypes first. Construction is the only way to get
//! a value, so holding a `RepoName` means the grammar has been checked.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;

use crate::{Error, Result};

/// Maximum length of a repository or remote name
pub const MAX_NAME_LEN: usize = 100;

/// A validated repository identifier
///
/// Grammar: one to [`MAX_NAME_LEN`] characters from `[A-Za-z0-9_-]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RepoName(String);

impl RepoName {
    /// Validate a candidate repository name
    pub fn parse(candidate: &str) -> Result<Self> {
        check_name(candidate).map_err(|reason| Error::invalid_name(candidate, reason))?;
        Ok(Self(candidate.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RepoName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<Path> for RepoName {
    fn as_ref(&self) -> &Path {
        Path::new(&self.0)
    }
}

/// A validated remote name (e.g. "origin"), same grammar as [`RepoName`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RemoteName(String);

impl RemoteName {
    /// Name of the remote registered at creation time
    pub const DEFAULT: &'static str = "origin";

    pub fn parse(candidate: &str) -> Result<Self> {
        check_name(candidate).map_err(|reason| {
            Error::InvalidRequest(format!("Invalid remote name '{}': {}", candidate, reason))
        })?;
        Ok(Self(candidate.to_string()))
    }

    pub fn origin() -> Self {
        Self(Self::DEFAULT.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RemoteName {
    fn default() -> Self {
        Self::origin()
    }
}

impl fmt::Display for RemoteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn check_name(candidate: &str) -> std::result::Result<(), String> {
    if candidate.is_empty() {
        return Err("name must not be empty".to_string());
    }

    if candidate.len() > MAX_NAME_LEN {
        return Err(format!("name must be at most {} characters", MAX_NAME_LEN));
    }

    // Independent of the character set check below.
    if candidate == "." || candidate.contains("..") || candidate.contains(&['/', '\\'][..]) {
        return Err("name must not contain path traversal sequences".to_string());
    }

    if let Some(c) = candidate
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
    {
        return Err(format!(
            "character '{}' is not allowed (use letters, digits, '-' or '_')",
            c.escape_default()
        ));
    }

    Ok(())
}

/// A validated path relative to a repository working tree
///
/// Never absolute, never climbs out with `..`, never addresses `.git`.
/// The single component `.` denotes the whole working tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RelativePath(PathBuf);

impl RelativePath {
    pub fn parse(candidate: &str) -> Result<Self> {
        let invalid = |reason: &str| {
            Error::InvalidRequest(format!("Invalid path '{}': {}", candidate, reason))
        };

        if candidate.trim().is_empty() {
            return Err(invalid("path must not be empty"));
        }

        if candidate.contains('\0') {
            return Err(invalid("path must not contain NUL bytes"));
        }

        let mut normalized = PathBuf::new();
        for component in Path::new(candidate).components() {
            match component {
                Component::Normal(part) => {
                    if part.eq_ignore_ascii_case(".git") {
                        return Err(invalid("the .git directory cannot be addressed"));
                    }
                    normalized.push(part);
                }
                Component::CurDir => {}
                Component::ParentDir => {
                    return Err(invalid("path must not contain '..'"));
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(invalid("path must be relative to the repository"));
                }
            }
        }

        if normalized.as_os_str().is_empty() {
            normalized.push(".");
        }

        Ok(Self(normalized))
    }

    /// The whole working tree
    pub fn all() -> Self {
        Self(PathBuf::from("."))
    }

    /// Whether this path denotes the whole working tree
    pub fn is_all(&self) -> bool {
        self.0 == Path::new(".")
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Pathspec form with forward slashes, as git expects
    pub fn to_pathspec(&self) -> String {
        if self.is_all() {
            return "*".to_string();
        }
        self.0
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

impl fmt::Display for RelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_accepts_simple_names() {
        for name in ["demo", "my-repo", "my_repo", "Repo42", "a", "-", "_x_"] {
            assert!(RepoName::parse(name).is_ok(), "{} should be valid", name);
        }
    }

    #[test]
    fn test_rejects_traversal() {
        for name in ["../evil", "..", ".", "a/b", "a\\b", "/etc", "x..y"] {
            let err = RepoName::parse(name).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidName, "{} should be rejected", name);
        }
    }

    #[test]
    fn test_rejects_empty_and_long() {
        assert!(RepoName::parse("").is_err());
        assert!(RepoName::parse(&"a".repeat(MAX_NAME_LEN)).is_ok());
        assert!(RepoName::parse(&"a".repeat(MAX_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn test_rejects_foreign_characters() {
        for name in ["with space", "dot.name", "ünïcode", "semi;colon", "tab\t", "nul\0"] {
            assert!(RepoName::parse(name).is_err(), "{:?} should be rejected", name);
        }
    }

    #[test]
    fn test_remote_name_uses_invalid_request_kind() {
        assert_eq!(RemoteName::parse("origin").unwrap().as_str(), "origin");
        let err = RemoteName::parse("up/stream").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert_eq!(RemoteName::default(), RemoteName::origin());
    }

    #[test]
    fn test_relative_path_normalizes() {
        let path = RelativePath::parse("./src/./lib.rs").unwrap();
        assert_eq!(path.as_path(), Path::new("src/lib.rs"));
        assert_eq!(path.to_pathspec(), "src/lib.rs");

        let all = RelativePath::parse(".").unwrap();
        assert!(all.is_all());
        assert_eq!(all.to_pathspec(), "*");
    }

    #[test]
    fn test_relative_path_rejects_escapes() {
        for path in ["", "  ", "../secret", "src/../../x", "/etc/passwd", ".git/config", "a/.GIT/x"] {
            let err = RelativePath::parse(path).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidRequest, "{:?} should be rejected", path);
        }
    }
}
