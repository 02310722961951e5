//! Remote URL validation

use std::fmt;
use std::path::Path;

use crate::{Error, Result};

/// URL schemes git can fetch from and push to
const ALLOWED_SCHEMES: &[&str] = &["https", "http", "ssh", "git", "file"];

/// A remote URL git understands
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteUrl(String);

impl RemoteUrl {
    /// Parse a remote URL
    ///
    /// Supports:
    /// - `https://host/owner/repo.git` (also `http`, `ssh`, `git`, `file`)
    /// - `git@github.com:owner/repo.git` (scp-like)
    /// - `/absolute/path/to/repo.git`
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let invalid = |reason: &str| {
            Error::InvalidRequest(format!("Invalid remote URL '{}': {}", input, reason))
        };

        if input.is_empty() {
            return Err(invalid("URL must not be empty"));
        }

        // Anything git would read as a command-line option
        if input.starts_with('-') {
            return Err(invalid("URL must not start with '-'"));
        }

        if input.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(invalid("URL must not contain whitespace or control characters"));
        }

        // git reads `<transport>::<address>` as a call to git-remote-<transport>
        let transport_len = input
            .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~')))
            .unwrap_or(input.len());
        if input[transport_len..].starts_with("::") {
            return Err(invalid("remote helper syntax '<transport>::<address>' is not allowed"));
        }

        // Handle scheme://... URLs
        if input.contains("://") {
            let url = ::url::Url::parse(input).map_err(|e| invalid(&e.to_string()))?;

            if !ALLOWED_SCHEMES.contains(&url.scheme()) {
                return Err(invalid(&format!(
                    "unsupported protocol '{}'. Expected one of: {}",
                    url.scheme(),
                    ALLOWED_SCHEMES.join(", ")
                )));
            }

            let has_location = match url.scheme() {
                "file" => url.path().len() > 1,
                _ => url.host_str().is_some_and(|h| !h.is_empty()),
            };
            if !has_location {
                return Err(invalid("URL has no host or path"));
            }

            return Ok(Self(input.to_string()));
        }

        // Local repository on disk
        if Path::new(input).is_absolute() {
            return Ok(Self(input.to_string()));
        }

        // Handle scp-like URLs (e.g., git@github.com:owner/repo.git)
        if let Some((host, path)) = input.split_once(':') {
            let host = host.rsplit_once('@').map(|(_, h)| h).unwrap_or(host);
            if !host.is_empty() && !host.contains('/') && !path.is_empty() && !path.starts_with(':') {
                return Ok(Self(input.to_string()));
            }
        }

        Err(invalid(
            "expected an https://, ssh://, git:// or file:// URL, user@host:path, or an absolute path",
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
