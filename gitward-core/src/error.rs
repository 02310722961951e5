//! Error types for gitward

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::lifecycle::CreationStage;

/// Result type alias for gitward operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for gitward operations
#[derive(Error, Debug)]
pub enum Error {
    /// Repository name failed the identifier grammar
    #[error("Invalid repository name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// Resolved path would leave the repositories root
    #[error("Path escapes repositories root: {}", .0.display())]
    PathEscape(PathBuf),

    /// A repository with this name already exists
    #[error("Repository already exists: {0}")]
    AlreadyExists(String),

    /// No repository with this name exists
    #[error("Repository not found: {0}")]
    NotFound(String),

    /// Path exists but the engine cannot open it as a repository
    #[error("Not a git repository: {}", .0.display())]
    NotARepository(PathBuf),

    /// A step of repository creation failed; partial state was rolled back
    #[error("Repository creation failed for '{name}' at {stage}: {source}")]
    CreationFailed {
        name: String,
        stage: CreationStage,
        rolled_back: bool,
        #[source]
        source: Box<Error>,
    },

    /// The version-control engine reported a failure
    #[error("Git error: {0}")]
    Engine(String),

    /// Network-bound operation exceeded its time bound
    #[error("{operation} timed out after {}s", .after.as_secs())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// The repository is locked by another writer
    #[error("Repository is locked: {0}")]
    Locked(String),

    /// Malformed request, path, remote or author
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Stable, machine-checkable error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidName,
    PathEscape,
    AlreadyExists,
    NotFound,
    CreationFailed,
    Engine,
    OperationTimeout,
    LockContention,
    InvalidRequest,
    Io,
    Config,
}

impl ErrorKind {
    /// Wire name of this kind
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidName => "invalid_name",
            ErrorKind::PathEscape => "path_escape",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::NotFound => "not_found",
            ErrorKind::CreationFailed => "creation_failed",
            ErrorKind::Engine => "engine",
            ErrorKind::OperationTimeout => "operation_timeout",
            ErrorKind::LockContention => "lock_contention",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::Io => "io",
            ErrorKind::Config => "config",
        }
    }

    /// Whether a caller may reasonably retry the same request
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::OperationTimeout | ErrorKind::LockContention)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Classify this error into the stable taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidName { .. } => ErrorKind::InvalidName,
            Error::PathEscape(_) => ErrorKind::PathEscape,
            Error::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Error::NotFound(_) | Error::NotARepository(_) => ErrorKind::NotFound,
            Error::CreationFailed { .. } => ErrorKind::CreationFailed,
            Error::Engine(_) => ErrorKind::Engine,
            Error::Timeout { .. } => ErrorKind::OperationTimeout,
            Error::Locked(_) => ErrorKind::LockContention,
            Error::InvalidRequest(_) | Error::Json(_) => ErrorKind::InvalidRequest,
            Error::Io(_) => ErrorKind::Io,
            Error::Config(_) => ErrorKind::Config,
        }
    }

    pub(crate) fn invalid_name(name: &str, reason: impl Into<String>) -> Self {
        Error::InvalidName {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<git2::Error> for Error {
    fn from(err: git2::Error) -> Self {
        match err.code() {
            git2::ErrorCode::Locked => Error::Locked(err.message().to_string()),
            _ => Error::Engine(err.message().to_string()),
        }
    }
}

/// Wire shape of an error: a kind callers can branch on plus readable detail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub kind: ErrorKind,
    pub detail: String,
    #[serde(default)]
    pub retryable: bool,
}

impl From<&Error> for ErrorPayload {
    fn from(err: &Error) -> Self {
        let kind = err.kind();
        Self {
            kind,
            detail: err.to_string(),
            retryable: kind.is_retryable(),
        }
    }
}

impl From<Error> for ErrorPayload {
    fn from(err: Error) -> Self {
        Self::from(&err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_wire_names() {
        let json = serde_json::to_string(&ErrorKind::OperationTimeout).unwrap();
        assert_eq!(json, "\"operation_timeout\"");
        assert_eq!(ErrorKind::LockContention.as_str(), "lock_contention");
    }

    #[test]
    fn test_not_a_repository_is_not_found() {
        let err = Error::NotARepository(PathBuf::from("/tmp/x"));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_locked_git_error_maps_to_lock_contention() {
        let err = git2::Error::new(
            git2::ErrorCode::Locked,
            git2::ErrorClass::Index,
            "index.lock exists",
        );
        let err: Error = err.into();
        assert_eq!(err.kind(), ErrorKind::LockContention);
        assert!(err.kind().is_retryable());
    }

    #[test]
    fn test_payload_carries_kind_and_detail() {
        let err = Error::AlreadyExists("dup".to_string());
        let payload = ErrorPayload::from(&err);
        assert_eq!(payload.kind, ErrorKind::AlreadyExists);
        assert_eq!(payload.detail, "Repository already exists: dup");
        assert!(!payload.retryable);
    }

    #[test]
    fn test_creation_failed_detail_includes_cause() {
        let err = Error::CreationFailed {
            name: "demo".to_string(),
            stage: CreationStage::RemoteAttached,
            rolled_back: true,
            source: Box::new(Error::Engine("boom".to_string())),
        };
        assert_eq!(err.kind(), ErrorKind::CreationFailed);
        assert!(err.to_string().contains("boom"));
        assert!(err.to_string().contains("remote"));
    }
}
