//! gitward CLI - Command line interface for the gitward repository server
//!
//! Serves a directory of git repositories over MCP, and manages it directly.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use gitward_core::Config;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{CreateArgs, DeleteArgs, ListArgs, ServeArgs, ShowArgs};

/// gitward: git repositories as a service
#[derive(Parser, Debug)]
#[command(name = "gitward")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Directory holding the repositories (overrides config and env)
    #[arg(long, global = true, env = "GITWARD_REPOSITORIES_DIR")]
    repositories_dir: Option<PathBuf>,

    /// Config file to load instead of ~/.config/gitward/config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Pull/push timeout in seconds (overrides config and env)
    #[arg(long, global = true)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve repositories over MCP on stdin/stdout
    Serve(ServeArgs),

    /// Create a repository
    Create(CreateArgs),

    /// List repositories
    #[command(visible_alias = "ls")]
    List(ListArgs),

    /// Show one repository
    Show(ShowArgs),

    /// Delete a repository
    #[command(visible_alias = "rm")]
    Delete(DeleteArgs),

    /// Show current configuration
    Config,

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // stdout belongs to the MCP transport
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    let config =
        Config::load_with_overrides(cli.config.as_deref(), cli.repositories_dir.clone(), cli.timeout)?;

    tracing::debug!(
        repositories_dir = %config.storage.repositories_dir.display(),
        timeout = ?config.network.timeout,
        git_path = %config.network.git_path,
        "Configuration loaded"
    );

    match cli.command {
        Some(Commands::Serve(args)) => args.execute(&config).await?,
        Some(Commands::Create(args)) => args.execute(&config).await?,
        Some(Commands::List(args)) => args.execute(&config).await?,
        Some(Commands::Show(args)) => args.execute(&config).await?,
        Some(Commands::Delete(args)) => args.execute(&config).await?,
        Some(Commands::Config) => print_config(&config, cli.config.as_deref()),
        Some(Commands::Version) => {
            println!("gitward {}", env!("CARGO_PKG_VERSION"));
        }
        None => {
            println!("gitward - git repositories as a service");
            println!();
            println!("Use --help for usage information");
        }
    }

    Ok(())
}

fn print_config(config: &Config, explicit: Option<&std::path::Path>) {
    println!("gitward Configuration");
    println!("=====================");
    println!();
    println!("Storage:");
    println!("  repositories_dir: {}", config.storage.repositories_dir.display());
    println!();
    println!("Repository:");
    println!("  default_branch: {}", config.repository.default_branch);
    println!("  initial_commit_message: {}", config.repository.initial_commit_message);
    println!("  author: {}", config.repository.default_author());
    println!("  write_readme: {}", config.repository.write_readme);
    println!();
    println!("Network:");
    println!("  timeout: {:?}", config.network.timeout);
    println!("  git_path: {}", config.network.git_path);
    println!();

    let path = explicit.map(|p| p.to_path_buf()).or_else(Config::default_config_path);
    if let Some(path) = path {
        println!("Config file: {}", path.display());
        if path.exists() {
            println!("  (exists)");
        } else {
            println!("  (not found - using defaults)");
        }
    }
}
