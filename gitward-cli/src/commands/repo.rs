//! Repository management commands

use clap::Args;
use gitward_core::{parse_repository_ref, Config, CreateRequest, Outcome, RepositoryView, Request};

use super::open_dispatcher;

/// Create a repository
#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Repository name
    pub name: String,

    /// Make an initial commit
    #[arg(long)]
    pub init_commit: bool,

    /// Remote URL to register as origin
    #[arg(short, long)]
    pub remote: Option<String>,
}

impl CreateArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let dispatcher = open_dispatcher(config)?;
        let request = Request::Create(CreateRequest {
            name: self.name.clone(),
            init_commit: self.init_commit,
            remote_url: self.remote.clone(),
        });

        if let Outcome::Repository(view) = dispatcher.dispatch(request).await? {
            println!("Created repository '{}'", view.name);
            print_view(&view);
        }
        Ok(())
    }
}

/// List repositories
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

impl ListArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let dispatcher = open_dispatcher(config)?;

        let Outcome::Repositories { repositories } = dispatcher.dispatch(Request::List).await?
        else {
            return Ok(());
        };

        if self.json {
            println!("{}", serde_json::to_string_pretty(&repositories)?);
            return Ok(());
        }

        if repositories.is_empty() {
            println!(
                "No repositories in {}",
                dispatcher.manager().root().path().display()
            );
            return Ok(());
        }

        println!("{:<32} {:<16} LAST COMMIT", "NAME", "BRANCH");
        for view in &repositories {
            let branch = view.active_branch.as_deref().unwrap_or("(detached)");
            let last = view
                .last_commit
                .as_ref()
                .map(|c| format!("{} {}", &c.hash[..c.hash.len().min(8)], first_line(&c.message)))
                .unwrap_or_else(|| "(no commits)".to_string());
            println!("{:<32} {:<16} {}", view.name, branch, last);
        }
        Ok(())
    }
}

/// Show one repository
#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Repository name or git://name
    pub repository: String,

    /// Print JSON
    #[arg(long)]
    pub json: bool,
}

impl ShowArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let dispatcher = open_dispatcher(config)?;
        let request = Request::Describe {
            repository: self.repository.clone(),
        };

        if let Outcome::Repository(view) = dispatcher.dispatch(request).await? {
            if self.json {
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else {
                print_view(&view);
            }
        }
        Ok(())
    }
}

/// Delete a repository
#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Repository name
    pub name: String,

    /// Confirm deletion; nothing is removed without it
    #[arg(long)]
    pub yes: bool,
}

impl DeleteArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        // validate before asking for confirmation
        let name = parse_repository_ref(&self.name)?;

        if !self.yes {
            anyhow::bail!(
                "Refusing to delete '{}' without --yes (this cannot be undone)",
                name
            );
        }

        let dispatcher = open_dispatcher(config)?;
        if let Outcome::Ack { message } = dispatcher
            .dispatch(Request::Delete {
                name: name.to_string(),
            })
            .await?
        {
            println!("{}", message);
        }
        Ok(())
    }
}

fn first_line(message: &str) -> &str {
    message.lines().next().unwrap_or("")
}

fn print_view(view: &RepositoryView) {
    println!("  Name:   {}", view.name);
    println!(
        "  Branch: {}",
        view.active_branch.as_deref().unwrap_or("(detached)")
    );
    match &view.last_commit {
        Some(commit) => {
            println!("  Commit: {}", commit.hash);
            println!("          {}", first_line(&commit.message));
            println!("          {} at {}", commit.author, commit.date);
        }
        None => println!("  Commit: (none)"),
    }
    if view.remotes.is_empty() {
        println!("  Remotes: (none)");
    } else {
        println!("  Remotes:");
        for remote in &view.remotes {
            println!("    {}\t{}", remote.name, remote.url);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_line() {
        assert_eq!(first_line("Initial commit\n\nbody"), "Initial commit");
        assert_eq!(first_line(""), "");
    }
}
