//! Configuration management for gitward
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (GITWARD_*)
//! 3. Config file (~/.config/gitward/config.toml)
//! 4. Default values

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::git::Signature;
use crate::{Error, Result};

/// Where repositories live
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding one subdirectory per repository
    pub repositories_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            repositories_dir: PathBuf::from("./repositories"),
        }
    }
}

/// Policy applied when a repository is created
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Branch HEAD points at in a freshly initialized repository
    pub default_branch: String,

    /// Message of the optional initial commit
    pub initial_commit_message: String,

    /// Author used for the initial commit and for commits without an author
    pub author_name: String,

    /// Email of the default author
    pub author_email: String,

    /// Write a README.md into the initial commit
    pub write_readme: bool,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            default_branch: "main".to_string(),
            initial_commit_message: "Initial commit".to_string(),
            author_name: "gitward".to_string(),
            author_email: "gitward@localhost".to_string(),
            write_readme: true,
        }
    }
}

impl RepositoryConfig {
    /// Default commit author
    pub fn default_author(&self) -> Signature {
        Signature::new(&self.author_name, &self.author_email)
    }
}

/// Longest timeout accepted for a single pull or push
pub const MAX_NETWORK_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Check a pull/push timeout is at least one second and at most [`MAX_NETWORK_TIMEOUT`]
pub fn check_network_timeout(timeout: Duration) -> std::result::Result<(), String> {
    if timeout < Duration::from_secs(1) {
        return Err("timeout must be at least one second".to_string());
    }
    if timeout > MAX_NETWORK_TIMEOUT {
        return Err(format!(
            "timeout must be at most {} seconds",
            MAX_NETWORK_TIMEOUT.as_secs()
        ));
    }
    Ok(())
}

/// Settings for network-bound operations (pull, push)
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Upper bound for a single pull or push
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Path to the git executable used for network transports
    pub git_path: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            git_path: "git".to_string(),
        }
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration
    pub storage: StorageConfig,

    /// Repository creation policy
    pub repository: RepositoryConfig,

    /// Network operation settings
    pub network: NetworkConfig,
}

impl Config {
    /// Load configuration from the default config file location
    ///
    /// Returns default config if file doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();

        if let Some(path) = config_path {
            if path.exists() {
                return Self::load_from_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(Error::Io)?;
        toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Get the default config file path
    ///
    /// Returns `~/.config/gitward/config.toml` on Unix
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("gitward").join("config.toml"))
    }

    /// Apply environment variable overrides
    ///
    /// Supported variables:
    /// - GITWARD_REPOSITORIES_DIR: Directory holding repositories
    /// - GITWARD_NETWORK_TIMEOUT_SECS: Pull/push timeout in seconds
    /// - GITWARD_GIT_PATH: Path to git executable
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(dir) = lookup("GITWARD_REPOSITORIES_DIR") {
            self.storage.repositories_dir = PathBuf::from(dir);
        }

        if let Some(secs) = lookup("GITWARD_NETWORK_TIMEOUT_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                Error::Config(format!(
                    "GITWARD_NETWORK_TIMEOUT_SECS must be a whole number of seconds, got '{}'",
                    secs
                ))
            })?;
            let timeout = Duration::from_secs(secs);
            check_network_timeout(timeout)
                .map_err(|e| Error::Config(format!("GITWARD_NETWORK_TIMEOUT_SECS: {}", e)))?;
            self.network.timeout = timeout;
        }

        if let Some(git_path) = lookup("GITWARD_GIT_PATH") {
            self.network.git_path = git_path;
        }

        Ok(self)
    }

    /// Apply CLI flag overrides
    pub fn with_cli_overrides(
        mut self,
        repositories_dir: Option<PathBuf>,
        timeout_secs: Option<u64>,
    ) -> Self {
        if let Some(dir) = repositories_dir {
            self.storage.repositories_dir = dir;
        }

        if let Some(secs) = timeout_secs {
            self.network.timeout = Duration::from_secs(secs);
        }

        self
    }

    /// Load configuration with all overrides applied
    ///
    /// Priority: CLI > env > config file > defaults
    pub fn load_with_overrides(
        config_file: Option<&Path>,
        repositories_dir: Option<PathBuf>,
        timeout_secs: Option<u64>,
    ) -> Result<Self> {
        let base = match config_file {
            Some(path) => Self::load_from_file(path)?,
            None => Self::load()?,
        };

        let config = base
            .with_env_overrides()?
            .with_cli_overrides(repositories_dir, timeout_secs);
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no operation could work with
    pub fn validate(&self) -> Result<()> {
        check_network_timeout(self.network.timeout)
            .map_err(|e| Error::Config(format!("Invalid network timeout: {}", e)))
    }
}
