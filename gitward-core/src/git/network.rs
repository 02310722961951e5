//! Network operations (pull, push) via the git executable
//!
//! libgit2 has no merge-on-pull and only partial credential helper support,
//! so network transports shell out to `git` the same way a user would.

use std::future::Future;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::{Error, Result};

/// A git invocation bounded by a timeout
#[derive(Debug)]
pub(crate) struct GitCommand<'a> {
    git_path: &'a str,
    workdir: &'a Path,
    operation: &'static str,
    args: Vec<String>,
}

impl<'a> GitCommand<'a> {
    pub(crate) fn new(git_path: &'a str, workdir: &'a Path, operation: &'static str) -> Self {
        Self {
            git_path,
            workdir,
            operation,
            args: Vec::new(),
        }
    }

    pub(crate) fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Run to completion from synchronous code, killing the process once `timeout` elapses
    ///
    /// Uses the ambient runtime when called from its blocking pool, otherwise a
    /// private current-thread runtime.
    pub(crate) fn run(self, timeout: Duration) -> Result<()> {
        block_on(self.run_async(timeout))
    }

    /// Run to completion, killing the process once `timeout` elapses
    pub(crate) async fn run_async(self, timeout: Duration) -> Result<()> {
        let child = Command::new(self.git_path)
            .args(&self.args)
            .current_dir(self.workdir)
            // Never block on an interactive credential prompt
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            // every early exit below drops the child
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::Engine(format!(
                        "git executable not found at '{}'. Is git installed?",
                        self.git_path
                    ))
                } else {
                    Error::Engine(format!("Failed to run git {}: {}", self.operation, e))
                }
            })?;

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                tracing::warn!(
                    operation = self.operation,
                    workdir = %self.workdir.display(),
                    "git {} exceeded {:?}, killed",
                    self.operation,
                    timeout
                );
                return Err(Error::Timeout {
                    operation: self.operation,
                    after: timeout,
                });
            }
        };

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(classify_failure(self.operation, stderr.trim()))
    }
}

fn block_on<F: Future<Output = Result<()>>>(future: F) -> Result<()> {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => handle.block_on(future),
        Err(_) => tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?
            .block_on(future),
    }
}

/// Map git's stderr to the error taxonomy
pub(crate) fn classify_failure(operation: &str, stderr: &str) -> Error {
    if stderr.contains(".lock': File exists")
        || (stderr.contains("Unable to create") && stderr.contains(".lock"))
        || stderr.contains("cannot lock ref")
    {
        return Error::Locked(format!("git {} failed: {}", operation, stderr));
    }

    if stderr.contains("Authentication failed")
        || stderr.contains("Permission denied")
        || stderr.contains("could not read Username")
    {
        return Error::Engine(format!(
            "git {} failed: authentication failed. Check credentials or repository access. {}",
            operation, stderr
        ));
    }

    if stderr.contains("Could not resolve host") || stderr.contains("unable to access") {
        return Error::Engine(format!(
            "git {} failed: network error. Check the remote is reachable. {}",
            operation, stderr
        ));
    }

    if stderr.is_empty() {
        return Error::Engine(format!("git {} failed", operation));
    }

    Error::Engine(format!("git {} failed: {}", operation, stderr))
}
