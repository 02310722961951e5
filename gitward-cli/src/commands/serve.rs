//! MCP server command

use clap::Args;
use gitward_core::{Config, Engine};
use gitward_mcp::GitwardMcp;

use super::open_dispatcher;

/// Serve repositories over MCP
#[derive(Args, Debug)]
pub struct ServeArgs {}

impl ServeArgs {
    /// Execute the serve command
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let dispatcher = open_dispatcher(config)?;

        tracing::info!(
            root = %dispatcher.manager().root().path().display(),
            engine = dispatcher.manager().engine().name(),
            "Serving repositories over MCP (stdio)"
        );

        GitwardMcp::new(dispatcher).run_stdio().await?;
        Ok(())
    }
}
