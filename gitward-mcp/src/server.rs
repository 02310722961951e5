//! MCP server implementation using rmcp.
//!
//! Tools map one-to-one onto dispatcher requests; every repository is also
//! exposed as a `git://<name>` resource whose contents are its metadata view.

use std::sync::Arc;

use gitward_core::{
    parse_repository_ref, resource_uri, Dispatcher, Engine, ErrorKind, ErrorPayload, Outcome, RepoName,
    Request, RESOURCE_SCHEME,
};
use rmcp::model::{
    AnnotateAble, CallToolRequestParam, CallToolResult, Content, ErrorData, Implementation,
    ListResourcesResult, ListToolsResult, PaginatedRequestParam, RawResource,
    ReadResourceRequestParam, ReadResourceResult, Resource, ResourceContents, ResourcesCapability,
    ServerCapabilities, ServerInfo, SubscribeRequestParam, Tool, ToolsCapability,
    UnsubscribeRequestParam,
};
use rmcp::service::{RequestContext, RoleServer};
use rmcp::{ServerHandler, ServiceExt};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::io::{stdin, stdout};

use crate::error::{McpError, Result};
use crate::types::*;

/// MIME type advertised for repository resources
pub const REPOSITORY_MIME_TYPE: &str = "application/x-git";

/// gitward MCP server.
pub struct GitwardMcp<E: Engine> {
    dispatcher: Dispatcher<E>,
}

impl<E: Engine> Clone for GitwardMcp<E> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: self.dispatcher.clone(),
        }
    }
}

/// Convert a schemars schema to the Arc<Map<String, Value>> format required by rmcp.
fn schema_to_input_schema<T: schemars::JsonSchema>() -> Arc<Map<String, Value>> {
    let schema = schemars::schema_for!(T);
    let value = serde_json::to_value(&schema).unwrap_or(Value::Object(Map::new()));
    match value {
        Value::Object(map) => Arc::new(map),
        _ => Arc::new(Map::new()),
    }
}

fn empty_schema() -> Arc<Map<String, Value>> {
    let mut map = Map::new();
    map.insert("type".into(), Value::String("object".into()));
    map.insert("properties".into(), Value::Object(Map::new()));
    map.insert("required".into(), Value::Array(vec![]));
    Arc::new(map)
}

fn tool(name: &'static str, description: &'static str, input_schema: Arc<Map<String, Value>>) -> Tool {
    Tool {
        name: name.into(),
        description: Some(description.into()),
        input_schema,
        annotations: None,
        icons: None,
        meta: None,
        output_schema: None,
        title: None,
    }
}

fn error_result(payload: ErrorPayload) -> CallToolResult {
    let text = serde_json::to_string_pretty(&payload).unwrap_or_else(|_| payload.detail.clone());
    CallToolResult::error(vec![Content::text(text)])
}

/// Protocol error for a failed resource read, carrying the same payload a
/// failed tool call does
fn resource_error(e: gitward_core::Error) -> ErrorData {
    let message = e.to_string();
    let data = serde_json::to_value(ErrorPayload::from(&e)).ok();
    match e.kind() {
        ErrorKind::NotFound => ErrorData::resource_not_found(message, data),
        ErrorKind::Engine | ErrorKind::Io => ErrorData::internal_error(message, data),
        _ => ErrorData::invalid_params(message, data),
    }
}

impl<E: Engine> GitwardMcp<E> {
    pub fn new(dispatcher: Dispatcher<E>) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &Dispatcher<E> {
        &self.dispatcher
    }

    /// Run the server over stdio transport.
    pub async fn run_stdio(self) -> Result<()> {
        let transport = (stdin(), stdout());
        let server = self
            .serve(transport)
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?;
        let reason = server
            .waiting()
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?;
        tracing::info!(?reason, "MCP session ended");
        Ok(())
    }

    /// Get the list of available tools.
    pub fn tools() -> Vec<Tool> {
        vec![
            tool(
                "create_repository",
                "Create a new git repository. Optionally makes an initial commit with a README and registers a remote as 'origin'. Creation is all-or-nothing.",
                schema_to_input_schema::<CreateRepositoryInput>(),
            ),
            tool(
                "delete_repository",
                "Permanently delete a repository and its working tree.",
                schema_to_input_schema::<DeleteRepositoryInput>(),
            ),
            tool(
                "add_files",
                "Stage files in a repository. Paths are relative to the working tree; a deleted path stages its removal.",
                schema_to_input_schema::<AddFilesInput>(),
            ),
            tool(
                "commit",
                "Commit the staged changes of a repository and return the new commit id.",
                schema_to_input_schema::<CommitInput>(),
            ),
            tool(
                "pull",
                "Pull the current branch from a remote (default 'origin'), bounded by a timeout.",
                schema_to_input_schema::<SyncInput>(),
            ),
            tool(
                "push",
                "Push the current branch to a remote (default 'origin'), bounded by a timeout.",
                schema_to_input_schema::<SyncInput>(),
            ),
            tool(
                "diff",
                "Show a unified diff between two revisions, or between a revision and the working tree.",
                schema_to_input_schema::<DiffInput>(),
            ),
            tool(
                "list_repositories",
                "List all repositories with their active branch, last commit and remotes.",
                empty_schema(),
            ),
        ]
    }

    /// One resource per repository currently on disk.
    pub async fn resources(&self) -> Result<Vec<Resource>> {
        let Outcome::Repositories { repositories } = self.dispatcher.dispatch(Request::List).await?
        else {
            return Ok(Vec::new());
        };

        let mut resources = Vec::with_capacity(repositories.len());
        for view in repositories {
            let Ok(name) = RepoName::parse(&view.name) else {
                continue;
            };
            let mut r = RawResource::new(resource_uri(&name), view.name.clone());
            r.title = Some(format!("Repository {}", view.name));
            r.description = Some(match &view.active_branch {
                Some(branch) => format!("Git repository '{}' on branch {}", view.name, branch),
                None => format!("Git repository '{}' (detached HEAD)", view.name),
            });
            r.mime_type = Some(REPOSITORY_MIME_TYPE.into());
            resources.push(r.no_annotation());
        }
        Ok(resources)
    }

    /// Handle a resource read request.
    pub async fn handle_resource(&self, uri: &str) -> std::result::Result<Vec<ResourceContents>, ErrorData> {
        if !uri.starts_with(&format!("{}://", RESOURCE_SCHEME)) {
            return Err(resource_error(gitward_core::Error::InvalidRequest(format!(
                "Unknown resource: {}",
                uri
            ))));
        }
        let name = parse_repository_ref(uri).map_err(resource_error)?;

        let outcome = self
            .dispatcher
            .dispatch(Request::Describe {
                repository: name.to_string(),
            })
            .await
            .map_err(resource_error)?;

        let json = match outcome {
            Outcome::Repository(view) => serde_json::to_string_pretty(&view),
            other => serde_json::to_string_pretty(&other),
        }
        .map_err(|e| ErrorData::internal_error(format!("Serialization error: {}", e), None))?;

        Ok(vec![ResourceContents::text(json, uri)])
    }

    /// Handle a tool call.
    pub async fn handle_tool(&self, name: &str, args: Option<Map<String, Value>>) -> CallToolResult {
        let args = args.map(Value::Object).unwrap_or(serde_json::json!({}));

        let request = match name {
            "create_repository" => parse_input::<CreateRepositoryInput>(args).map(Request::from),
            "delete_repository" => parse_input::<DeleteRepositoryInput>(args).map(Request::from),
            "add_files" => parse_input::<AddFilesInput>(args).map(Request::from),
            "commit" => parse_input::<CommitInput>(args).map(Request::from),
            "pull" => parse_input::<SyncInput>(args).map(SyncInput::into_pull),
            "push" => parse_input::<SyncInput>(args).map(SyncInput::into_push),
            "diff" => parse_input::<DiffInput>(args).map(Request::from),
            "list_repositories" => Ok(Request::List),
            _ => {
                return error_result(ErrorPayload::from(gitward_core::Error::InvalidRequest(format!(
                    "Unknown tool: {}",
                    name
                ))));
            }
        };

        let request = match request {
            Ok(request) => request,
            Err(payload) => return error_result(payload),
        };

        match self.dispatcher.dispatch(request).await {
            Ok(outcome) => {
                let text = serde_json::to_string_pretty(&outcome).unwrap_or_default();
                CallToolResult::success(vec![Content::text(text)])
            }
            Err(e) => {
                tracing::warn!(tool = name, kind = %e.kind(), error = %e, "Tool call failed");
                error_result(ErrorPayload::from(e))
            }
        }
    }
}

fn parse_input<T: DeserializeOwned>(args: Value) -> std::result::Result<T, ErrorPayload> {
    serde_json::from_value(args).map_err(|e| ErrorPayload::from(gitward_core::Error::InvalidRequest(format!("Invalid input: {}", e))))
}

impl<E: Engine> ServerHandler for GitwardMcp<E> {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: Default::default(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability { list_changed: None }),
                resources: Some(ResourcesCapability {
                    subscribe: Some(false),
                    list_changed: Some(false),
                }),
                ..Default::default()
            },
            server_info: Implementation {
                name: "gitward".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: Some("gitward Repository Server".into()),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "gitward manages a directory of git repositories. Tools: create_repository, \
                 delete_repository, add_files, commit, pull, push, diff, list_repositories. \
                 Resources: git://<name> returns a repository's branch, last commit and remotes. \
                 Failed tool calls return {kind, detail}."
                    .into(),
            ),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult {
            tools: Self::tools(),
            next_cursor: None,
            meta: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<CallToolResult, ErrorData> {
        Ok(self.handle_tool(&request.name, request.arguments).await)
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<ListResourcesResult, ErrorData> {
        let resources = self
            .resources()
            .await
            .map_err(|e| ErrorData::internal_error(e.to_string(), None))?;
        Ok(ListResourcesResult {
            resources,
            next_cursor: None,
            meta: None,
        })
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<ReadResourceResult, ErrorData> {
        let contents = self.handle_resource(&request.uri).await?;
        Ok(ReadResourceResult { contents })
    }

    // We advertise subscribe: false; accept the calls so clients don't log warnings.
    async fn subscribe(
        &self,
        _request: SubscribeRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<(), ErrorData> {
        Ok(())
    }

    async fn unsubscribe(
        &self,
        _request: UnsubscribeRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<(), ErrorData> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitward_core::{GitEngine, MemoryEngine, RepoManager, RepoRoot, RepositoryConfig};
    use std::time::Duration;
    use tempfile::TempDir;

    fn memory_server(temp: &TempDir) -> GitwardMcp<MemoryEngine> {
        let root = RepoRoot::open(temp.path()).unwrap();
        let manager = RepoManager::new(root, MemoryEngine::new(), RepositoryConfig::default());
        GitwardMcp::new(Dispatcher::new(manager, Duration::from_secs(5)))
    }

    fn git_server(temp: &TempDir) -> GitwardMcp<GitEngine> {
        let root = RepoRoot::open(temp.path()).unwrap();
        let manager = RepoManager::new(root, GitEngine::new(), RepositoryConfig::default());
        GitwardMcp::new(Dispatcher::new(manager, Duration::from_secs(5)))
    }

    fn args(value: Value) -> Option<Map<String, Value>> {
        match value {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    fn text_of(result: &CallToolResult) -> String {
        let json = serde_json::to_value(result).unwrap();
        json["content"][0]["text"].as_str().unwrap_or_default().to_string()
    }

    fn is_error(result: &CallToolResult) -> bool {
        result.is_error == Some(true)
    }

    #[test]
    fn test_tool_names() {
        let names: Vec<String> = GitwardMcp::<MemoryEngine>::tools()
            .into_iter()
            .map(|t| t.name.to_string())
            .collect();
        assert_eq!(
            names,
            [
                "create_repository",
                "delete_repository",
                "add_files",
                "commit",
                "pull",
                "push",
                "diff",
                "list_repositories"
            ]
        );
    }

    #[test]
    fn test_create_schema_requires_name() {
        let schema = schema_to_input_schema::<CreateRepositoryInput>();
        let required = schema["required"].as_array().unwrap();
        assert!(required.iter().any(|v| v == "name"));
        assert!(schema["properties"].get("remote_url").is_some());
    }

    #[tokio::test]
    async fn test_create_tool_returns_view() {
        let temp = TempDir::new().unwrap();
        let server = git_server(&temp);

        let result = server
            .handle_tool(
                "create_repository",
                args(serde_json::json!({"name": "demo", "init_commit": true})),
            )
            .await;
        assert!(!is_error(&result));

        let body: Value = serde_json::from_str(&text_of(&result)).unwrap();
        assert_eq!(body["type"], "repository");
        assert_eq!(body["name"], "demo");
        assert_eq!(body["last_commit"]["message"], "Initial commit");
    }

    #[tokio::test]
    async fn test_tool_errors_carry_kind() {
        let temp = TempDir::new().unwrap();
        let server = memory_server(&temp);

        let result = server
            .handle_tool("create_repository", args(serde_json::json!({"name": "../evil"})))
            .await;
        assert!(is_error(&result));
        let payload: ErrorPayload = serde_json::from_str(&text_of(&result)).unwrap();
        assert_eq!(payload.kind, gitward_core::ErrorKind::InvalidName);

        let result = server
            .handle_tool("commit", args(serde_json::json!({"repository": "x"})))
            .await;
        let payload: ErrorPayload = serde_json::from_str(&text_of(&result)).unwrap();
        assert_eq!(payload.kind, gitward_core::ErrorKind::InvalidRequest);

        let result = server.handle_tool("rebase", None).await;
        assert!(is_error(&result));
        let payload: ErrorPayload = serde_json::from_str(&text_of(&result)).unwrap();
        assert_eq!(payload.kind, gitward_core::ErrorKind::InvalidRequest);
        assert!(payload.detail.contains("rebase"));
        assert!(!payload.retryable);
    }

    #[tokio::test]
    async fn test_resources_follow_repositories() {
        let temp = TempDir::new().unwrap();
        let server = memory_server(&temp);
        assert!(server.resources().await.unwrap().is_empty());

        for name in ["one", "two"] {
            let result = server
                .handle_tool("create_repository", args(serde_json::json!({"name": name})))
                .await;
            assert!(!is_error(&result));
        }

        let mut uris: Vec<String> = server
            .resources()
            .await
            .unwrap()
            .into_iter()
            .map(|r| {
                assert_eq!(r.raw.mime_type.as_deref(), Some(REPOSITORY_MIME_TYPE));
                r.raw.uri
            })
            .collect();
        uris.sort();
        assert_eq!(uris, ["git://one", "git://two"]);

        let contents = server.handle_resource("git://one").await.unwrap();
        let json = serde_json::to_value(&contents[0]).unwrap();
        let view: Value = serde_json::from_str(json["text"].as_str().unwrap()).unwrap();
        assert_eq!(view["name"], "one");
        assert_eq!(view["active_branch"], "main");

        server
            .handle_tool("delete_repository", args(serde_json::json!({"name": "one"})))
            .await;
        let err = server.handle_resource("git://one").await.unwrap_err();
        assert_eq!(err.code, ErrorData::resource_not_found("", None).code);
        assert_eq!(err.data.as_ref().unwrap()["kind"], "not_found");

        let err = server.handle_resource("git://../x").await.unwrap_err();
        assert_eq!(err.data.as_ref().unwrap()["kind"], "invalid_name");

        let err = server.handle_resource("file:///etc/passwd").await.unwrap_err();
        assert_eq!(err.data.as_ref().unwrap()["kind"], "invalid_request");
    }
}
