//! Operation dispatcher
//!
//! Turns a [`Request`] into lifecycle or engine calls and an [`Outcome`].
//! Every request follows the same path: validate, resolve, open (or create),
//! execute, translate. The work itself blocks, so each request runs on the
//! blocking thread pool and nothing is shared between requests except the
//! manager.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::check_network_timeout;
use crate::git::{CommitId, Engine, Signature};
use crate::lifecycle::{CreateRequest, RepoManager, RepositoryView};
use crate::naming::{RelativePath, RemoteName, RepoName};
use crate::{Error, Result};

/// URI scheme addressing a repository as a resource
pub const RESOURCE_SCHEME: &str = "git";

/// Longest revision expression accepted by `diff`
const MAX_REVISION_LEN: usize = 256;

/// Build the resource URI for a repository
pub fn resource_uri(name: &RepoName) -> String {
    format!("{}://{}", RESOURCE_SCHEME, name)
}

/// Parse either a bare repository name or a `git://name` URI
pub fn parse_repository_ref(input: &str) -> Result<RepoName> {
    match input.split_once("://") {
        Some((scheme, name)) if scheme == RESOURCE_SCHEME => RepoName::parse(name),
        Some((scheme, _)) => Err(Error::InvalidRequest(format!(
            "Unsupported resource scheme '{}', expected '{}://<name>'",
            scheme, RESOURCE_SCHEME
        ))),
        None => RepoName::parse(input),
    }
}

/// A single client request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Create(CreateRequest),
    Describe {
        /// Name or `git://name`
        repository: String,
    },
    List,
    Delete {
        name: String,
    },
    Add {
        name: String,
        paths: Vec<String>,
    },
    Commit {
        name: String,
        message: String,
        #[serde(default)]
        author: Option<String>,
    },
    Pull {
        name: String,
        #[serde(default)]
        remote: Option<String>,
        #[serde(default)]
        timeout_secs: Option<u64>,
    },
    Push {
        name: String,
        #[serde(default)]
        remote: Option<String>,
        #[serde(default)]
        timeout_secs: Option<u64>,
    },
    Diff {
        name: String,
        from: String,
        #[serde(default)]
        to: Option<String>,
    },
}

impl Request {
    /// Parse a request from its JSON form
    pub fn from_json(input: &str) -> Result<Self> {
        Ok(serde_json::from_str(input)?)
    }

    /// Operation name, as used in the `op` tag
    pub fn op(&self) -> &'static str {
        match self {
            Request::Create(_) => "create",
            Request::Describe { .. } => "describe",
            Request::List => "list",
            Request::Delete { .. } => "delete",
            Request::Add { .. } => "add",
            Request::Commit { .. } => "commit",
            Request::Pull { .. } => "pull",
            Request::Push { .. } => "push",
            Request::Diff { .. } => "diff",
        }
    }
}

/// Result of a successful request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outcome {
    Repository(RepositoryView),
    Repositories { repositories: Vec<RepositoryView> },
    Commit { commit_id: CommitId },
    Diff { diff: String },
    Ack { message: String },
}

impl Outcome {
    fn ack(message: impl Into<String>) -> Self {
        Outcome::Ack {
            message: message.into(),
        }
    }
}

/// Runs requests against a [`RepoManager`]
#[derive(Debug)]
pub struct Dispatcher<E: Engine> {
    manager: Arc<RepoManager<E>>,
    network_timeout: Duration,
}

impl<E: Engine> Clone for Dispatcher<E> {
    fn clone(&self) -> Self {
        Self {
            manager: Arc::clone(&self.manager),
            network_timeout: self.network_timeout,
        }
    }
}

impl<E: Engine> Dispatcher<E> {
    pub fn new(manager: RepoManager<E>, network_timeout: Duration) -> Self {
        Self {
            manager: Arc::new(manager),
            network_timeout,
        }
    }

    pub fn manager(&self) -> &RepoManager<E> {
        &self.manager
    }

    /// Default timeout for pull and push
    pub fn network_timeout(&self) -> Duration {
        self.network_timeout
    }

    /// Execute one request on the blocking pool
    pub async fn dispatch(&self, request: Request) -> Result<Outcome> {
        let op = request.op();
        tracing::debug!(op, "Dispatching request");

        let this = self.clone();
        let result = tokio::task::spawn_blocking(move || this.execute(request))
            .await
            .map_err(|e| Error::Engine(format!("{} request aborted: {}", op, e)))?;

        if let Err(e) = &result {
            tracing::debug!(op, kind = %e.kind(), error = %e, "Request failed");
        }
        result
    }

    /// Execute one request on the current thread
    pub fn execute(&self, request: Request) -> Result<Outcome> {
        let manager = &*self.manager;
        let engine = manager.engine();

        match request {
            Request::Create(create) => manager.create(&create).map(Outcome::Repository),

            Request::Describe { repository } => {
                let name = parse_repository_ref(&repository)?;
                manager.describe(&name).map(Outcome::Repository)
            }

            Request::List => Ok(Outcome::Repositories {
                repositories: manager.list()?,
            }),

            Request::Delete { name } => {
                let name = RepoName::parse(&name)?;
                manager.delete(&name)?;
                Ok(Outcome::ack(format!("Deleted repository '{}'", name)))
            }

            Request::Add { name, paths } => {
                let name = RepoName::parse(&name)?;
                if paths.is_empty() {
                    return Err(Error::InvalidRequest(
                        "At least one path is required".to_string(),
                    ));
                }
                let paths = paths
                    .iter()
                    .map(|p| RelativePath::parse(p))
                    .collect::<Result<Vec<_>>>()?;

                let mut handle = manager.open(&name)?;
                engine.stage(&mut handle, &paths)?;
                Ok(Outcome::ack(format!(
                    "Staged {} path(s) in '{}'",
                    paths.len(),
                    name
                )))
            }

            Request::Commit {
                name,
                message,
                author,
            } => {
                let name = RepoName::parse(&name)?;
                if message.trim().is_empty() {
                    return Err(Error::InvalidRequest(
                        "Commit message must not be empty".to_string(),
                    ));
                }
                let author = match author.as_deref() {
                    Some(author) => Signature::parse(author)?,
                    None => manager.policy().default_author(),
                };

                let mut handle = manager.open(&name)?;
                let commit_id = engine.commit(&mut handle, &message, &author)?;
                Ok(Outcome::Commit { commit_id })
            }

            Request::Pull {
                name,
                remote,
                timeout_secs,
            } => {
                let (name, remote, timeout) = self.network_args(&name, remote, timeout_secs)?;
                let mut handle = manager.open(&name)?;
                engine.pull(&mut handle, &remote, timeout)?;
                Ok(Outcome::ack(format!("Pulled '{}' from {}", name, remote)))
            }

            Request::Push {
                name,
                remote,
                timeout_secs,
            } => {
                let (name, remote, timeout) = self.network_args(&name, remote, timeout_secs)?;
                let mut handle = manager.open(&name)?;
                engine.push(&mut handle, &remote, timeout)?;
                Ok(Outcome::ack(format!("Pushed '{}' to {}", name, remote)))
            }

            Request::Diff { name, from, to } => {
                let name = RepoName::parse(&name)?;
                validate_revision(&from)?;
                if let Some(to) = &to {
                    validate_revision(to)?;
                }

                let handle = manager.open(&name)?;
                let diff = engine.diff(&handle, &from, to.as_deref())?;
                Ok(Outcome::Diff { diff })
            }
        }
    }

    fn network_args(
        &self,
        name: &str,
        remote: Option<String>,
        timeout_secs: Option<u64>,
    ) -> Result<(RepoName, RemoteName, Duration)> {
        let name = RepoName::parse(name)?;
        let remote = match remote.as_deref() {
            Some(remote) => RemoteName::parse(remote)?,
            None => RemoteName::origin(),
        };
        let timeout = match timeout_secs {
            Some(secs) => {
                let timeout = Duration::from_secs(secs);
                check_network_timeout(timeout)
                    .map_err(|e| Error::InvalidRequest(format!("Invalid timeout_secs: {}", e)))?;
                timeout
            }
            None => self.network_timeout,
        };
        Ok((name, remote, timeout))
    }
}

/// Reject revision expressions git could mistake for options
fn validate_revision(rev: &str) -> Result<()> {
    let invalid = |reason: &str| Error::InvalidRequest(format!("Invalid revision '{}': {}", rev, reason));

    if rev.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if rev.len() > MAX_REVISION_LEN {
        return Err(invalid("too long"));
    }
    if rev.starts_with('-') {
        return Err(invalid("must not start with '-'"));
    }
    if rev.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(invalid("must not contain whitespace or control characters"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RepositoryConfig;
    use crate::git::{Capability, GitEngine, MemoryEngine};
    use crate::root::RepoRoot;
    use crate::ErrorKind;
    use std::fs;
    use tempfile::TempDir;

    fn git_dispatcher(temp: &TempDir) -> Dispatcher<GitEngine> {
        let root = RepoRoot::open(temp.path()).unwrap();
        let manager = RepoManager::new(root, GitEngine::new(), RepositoryConfig::default());
        Dispatcher::new(manager, Duration::from_secs(30))
    }

    fn memory_dispatcher(temp: &TempDir) -> Dispatcher<MemoryEngine> {
        let root = RepoRoot::open(temp.path()).unwrap();
        let manager = RepoManager::new(root, MemoryEngine::new(), RepositoryConfig::default());
        Dispatcher::new(manager, Duration::from_secs(30))
    }

    fn git_available() -> bool {
        std::process::Command::new("git")
            .arg("--version")
            .output()
            .is_ok_and(|o| o.status.success())
    }

    #[test]
    fn test_request_json_shape() {
        let request = Request::from_json(r#"{"op": "create", "name": "demo", "init_commit": true}"#).unwrap();
        assert_eq!(request, Request::Create(CreateRequest::new("demo").with_initial_commit()));

        let request = Request::from_json(r#"{"op": "pull", "name": "demo"}"#).unwrap();
        assert_eq!(request.op(), "pull");

        let err = Request::from_json(r#"{"op": "rebase", "name": "demo"}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }

    #[test]
    fn test_outcome_json_shape() {
        let outcome = Outcome::Commit {
            commit_id: CommitId::new("abc123"),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["type"], "commit");
        assert_eq!(json["commit_id"], "abc123");
    }

    #[test]
    fn test_parse_repository_ref() {
        assert_eq!(parse_repository_ref("demo").unwrap().as_str(), "demo");
        assert_eq!(parse_repository_ref("git://demo").unwrap().as_str(), "demo");
        assert_eq!(
            parse_repository_ref("http://demo").unwrap_err().kind(),
            ErrorKind::InvalidRequest
        );
        assert_eq!(
            parse_repository_ref("git://../etc").unwrap_err().kind(),
            ErrorKind::InvalidName
        );
        assert_eq!(resource_uri(&RepoName::parse("demo").unwrap()), "git://demo");
    }

    #[test]
    fn test_validate_revision() {
        assert!(validate_revision("HEAD~1").is_ok());
        assert!(validate_revision("main").is_ok());
        for rev in ["", "--output=/tmp/x", "a b", "x\n"] {
            assert!(validate_revision(rev).is_err(), "{:?} should be rejected", rev);
        }
    }

    #[tokio::test]
    async fn test_add_commit_diff_flow() {
        let temp = TempDir::new().unwrap();
        let dispatcher = git_dispatcher(&temp);

        dispatcher
            .dispatch(Request::Create(CreateRequest::new("work").with_initial_commit()))
            .await
            .unwrap();
        fs::write(temp.path().join("work").join("notes.txt"), "hello\n").unwrap();

        let outcome = dispatcher
            .dispatch(Request::Add {
                name: "work".to_string(),
                paths: vec!["notes.txt".to_string()],
            })
            .await
            .unwrap();
        assert!(matches!(outcome, Outcome::Ack { .. }));

        let outcome = dispatcher
            .dispatch(Request::Commit {
                name: "work".to_string(),
                message: "Add notes".to_string(),
                author: Some("Ada <ada@example.com>".to_string()),
            })
            .await
            .unwrap();
        let Outcome::Commit { commit_id } = outcome else {
            panic!("expected a commit outcome");
        };

        let Outcome::Repository(view) = dispatcher
            .dispatch(Request::Describe {
                repository: "git://work".to_string(),
            })
            .await
            .unwrap()
        else {
            panic!("expected a repository outcome");
        };
        let last = view.last_commit.unwrap();
        assert_eq!(last.hash, commit_id.as_str());
        assert_eq!(last.author, "Ada <ada@example.com>");

        let Outcome::Diff { diff } = dispatcher
            .dispatch(Request::Diff {
                name: "work".to_string(),
                from: "HEAD~1".to_string(),
                to: Some("HEAD".to_string()),
            })
            .await
            .unwrap()
        else {
            panic!("expected a diff outcome");
        };
        assert!(diff.contains("notes.txt"));
        assert!(diff.contains("+hello"));
    }

    #[tokio::test]
    async fn test_commit_uses_default_author() {
        let temp = TempDir::new().unwrap();
        let dispatcher = git_dispatcher(&temp);
        dispatcher
            .dispatch(Request::Create(CreateRequest::new("solo")))
            .await
            .unwrap();
        fs::write(temp.path().join("solo").join("a.txt"), "a").unwrap();
        dispatcher
            .dispatch(Request::Add {
                name: "solo".to_string(),
                paths: vec![".".to_string()],
            })
            .await
            .unwrap();
        dispatcher
            .dispatch(Request::Commit {
                name: "solo".to_string(),
                message: "First".to_string(),
                author: None,
            })
            .await
            .unwrap();

        let view = dispatcher
            .manager()
            .describe(&RepoName::parse("solo").unwrap())
            .unwrap();
        assert_eq!(view.last_commit.unwrap().author, "gitward <gitward@localhost>");
    }

    #[tokio::test]
    async fn test_mutations_validate_before_touching_disk() {
        let temp = TempDir::new().unwrap();
        let dispatcher = memory_dispatcher(&temp);
        dispatcher
            .dispatch(Request::Create(CreateRequest::new("repo")))
            .await
            .unwrap();

        let cases = [
            (
                Request::Add {
                    name: "repo".to_string(),
                    paths: vec![],
                },
                ErrorKind::InvalidRequest,
            ),
            (
                Request::Add {
                    name: "repo".to_string(),
                    paths: vec!["../outside".to_string()],
                },
                ErrorKind::InvalidRequest,
            ),
            (
                Request::Commit {
                    name: "repo".to_string(),
                    message: "  ".to_string(),
                    author: None,
                },
                ErrorKind::InvalidRequest,
            ),
            (
                Request::Commit {
                    name: "repo".to_string(),
                    message: "x".to_string(),
                    author: Some("no email".to_string()),
                },
                ErrorKind::InvalidRequest,
            ),
            (
                Request::Pull {
                    name: "repo".to_string(),
                    remote: None,
                    timeout_secs: Some(0),
                },
                ErrorKind::InvalidRequest,
            ),
            (
                Request::Push {
                    name: "repo".to_string(),
                    remote: Some("../up".to_string()),
                    timeout_secs: None,
                },
                ErrorKind::InvalidRequest,
            ),
            (
                Request::Diff {
                    name: "repo".to_string(),
                    from: "--output=x".to_string(),
                    to: None,
                },
                ErrorKind::InvalidRequest,
            ),
            (
                Request::Delete {
                    name: "a/b".to_string(),
                },
                ErrorKind::InvalidName,
            ),
            (
                Request::Diff {
                    name: "ghost".to_string(),
                    from: "HEAD".to_string(),
                    to: None,
                },
                ErrorKind::NotFound,
            ),
        ];

        for (request, expected) in cases {
            let op = request.op();
            let err = dispatcher.dispatch(request).await.unwrap_err();
            assert_eq!(err.kind(), expected, "{}", op);
        }
        assert_eq!(dispatcher.manager().engine().commit_count(&temp.path().canonicalize().unwrap().join("repo")), 0);
    }

    #[tokio::test]
    async fn test_network_timeout_is_reported() {
        let temp = TempDir::new().unwrap();
        let dispatcher = memory_dispatcher(&temp);
        dispatcher
            .dispatch(Request::Create(
                CreateRequest::new("slow").with_remote("https://example.com/slow.git"),
            ))
            .await
            .unwrap();

        dispatcher
            .manager()
            .engine()
            .set_network_delay(Some(Duration::from_secs(30)));
        let err = dispatcher
            .dispatch(Request::Push {
                name: "slow".to_string(),
                remote: None,
                timeout_secs: Some(1),
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OperationTimeout);
        assert!(err.kind().is_retryable());

        // still usable afterwards
        dispatcher
            .dispatch(Request::Describe {
                repository: "slow".to_string(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_out_of_range_timeout_is_invalid_request() {
        let temp = TempDir::new().unwrap();
        let dispatcher = git_dispatcher(&temp);
        dispatcher
            .dispatch(Request::Create(
                CreateRequest::new("bounded")
                    .with_initial_commit()
                    .with_remote("/nonexistent/gitward/remote.git"),
            ))
            .await
            .unwrap();

        for secs in [0, 3601, u64::MAX] {
            let err = dispatcher
                .dispatch(Request::Pull {
                    name: "bounded".to_string(),
                    remote: None,
                    timeout_secs: Some(secs),
                })
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidRequest, "{}", secs);
        }
    }

    #[tokio::test]
    async fn test_lock_contention_passes_through() {
        let temp = TempDir::new().unwrap();
        let dispatcher = memory_dispatcher(&temp);
        dispatcher
            .dispatch(Request::Create(CreateRequest::new("busy")))
            .await
            .unwrap();
        dispatcher
            .manager()
            .engine()
            .fail_with(Capability::Stage, || Error::Locked("index.lock exists".to_string()));

        let err = dispatcher
            .dispatch(Request::Add {
                name: "busy".to_string(),
                paths: vec![".".to_string()],
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LockContention);
        assert!(err.to_string().contains("index.lock exists"));
    }

    #[tokio::test]
    async fn test_pull_unreachable_remote_leaves_repository_openable() {
        if !git_available() {
            eprintln!("git not available, skipping");
            return;
        }

        let temp = TempDir::new().unwrap();
        let dispatcher = git_dispatcher(&temp);
        dispatcher
            .dispatch(Request::Create(
                CreateRequest::new("lonely")
                    .with_initial_commit()
                    .with_remote("/nonexistent/gitward/remote.git"),
            ))
            .await
            .unwrap();

        let err = dispatcher
            .dispatch(Request::Pull {
                name: "lonely".to_string(),
                remote: None,
                timeout_secs: Some(20),
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::Engine | ErrorKind::OperationTimeout
        ));

        dispatcher
            .dispatch(Request::Describe {
                repository: "lonely".to_string(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_parallel_requests_on_distinct_repositories() {
        let temp = TempDir::new().unwrap();
        let dispatcher = git_dispatcher(&temp);

        let mut tasks = Vec::new();
        for i in 0..8 {
            let dispatcher = dispatcher.clone();
            tasks.push(tokio::spawn(async move {
                let name = format!("repo-{}", i);
                dispatcher
                    .dispatch(Request::Create(CreateRequest::new(&name).with_initial_commit()))
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let Outcome::Repositories { repositories } =
            dispatcher.dispatch(Request::List).await.unwrap()
        else {
            panic!("expected a repositories outcome");
        };
        assert_eq!(repositories.len(), 8);
        assert!(repositories.iter().all(|r| r.last_commit.is_some()));
    }

    #[tokio::test]
    async fn test_concurrent_create_same_name() {
        let temp = TempDir::new().unwrap();
        let dispatcher = git_dispatcher(&temp);

        let a = dispatcher.clone();
        let b = dispatcher.clone();
        let (first, second) = tokio::join!(
            a.dispatch(Request::Create(CreateRequest::new("race"))),
            b.dispatch(Request::Create(CreateRequest::new("race"))),
        );

        let results = [first, second];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        let err = results.into_iter().find_map(|r| r.err()).unwrap();
        assert!(matches!(
            err.kind(),
            ErrorKind::AlreadyExists | ErrorKind::CreationFailed
        ));
        dispatcher
            .manager()
            .describe(&RepoName::parse("race").unwrap())
            .unwrap();
    }

    #[tokio::test]
    async fn test_delete_then_describe() {
        let temp = TempDir::new().unwrap();
        let dispatcher = memory_dispatcher(&temp);
        dispatcher
            .dispatch(Request::Create(CreateRequest::new("gone")))
            .await
            .unwrap();

        let outcome = dispatcher
            .dispatch(Request::Delete {
                name: "gone".to_string(),
            })
            .await
            .unwrap();
        assert!(matches!(outcome, Outcome::Ack { .. }));

        let err = dispatcher
            .dispatch(Request::Describe {
                repository: "git://gone".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
