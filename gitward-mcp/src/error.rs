//! Error types for the MCP server

use thiserror::Error;

/// Result type alias for MCP server operations
pub type Result<T> = std::result::Result<T, McpError>;

#[derive(Error, Debug)]
pub enum McpError {
    /// Failure in the repository layer
    #[error(transparent)]
    Core(#[from] gitward_core::Error),

    /// The stdio transport failed to start or stopped abnormally
    #[error("MCP transport error: {0}")]
    Transport(String),
}
