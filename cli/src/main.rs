//! driftway: Postgres schema migrations and synchronization.

mod commands;
mod config;
mod files;
mod util;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "driftway",
    version,
    about = "Postgres schema migrations and synchronization"
)]
struct Cli {
    /// Database connection string
    #[arg(long, global = true, env = "DATABASE_URL")]
    url: Option<String>,

    /// Path to driftway.toml
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply, revert, inspect and scaffold migration files
    #[command(subcommand)]
    Migrate(MigrateCommand),

    /// Reconcile the declared schema against the live database
    Sync,

    /// Preview pending migrations and the reconciliation diff
    Plan {
        /// Write the plan SQL to a file
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Print the schema hash migrations pin themselves to
    Hash {
        /// Hash the declared registry instead of the live database
        #[arg(long)]
        declared: bool,
    },
}

#[derive(Subcommand)]
enum MigrateCommand {
    /// Apply all pending migrations
    Up,
    /// Revert one applied migration
    Down {
        /// Migration name, e.g. 20240301120000_books_add_toc_title
        name: String,
    },
    /// Show applied and pending migrations
    Status,
    /// Scaffold a timestamped migration file pair
    Create {
        /// Human-readable description, slugified into the file name
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = config::Config::load(cli.config.as_deref())?;

    // Commands that never touch the database resolve no URL.
    match &cli.command {
        Command::Migrate(MigrateCommand::Create { name }) => {
            return commands::migrate_create(&config, name);
        }
        Command::Hash { declared: true } => {
            return commands::hash(&config, None, true).await;
        }
        _ => {}
    }

    let url = cli
        .url
        .clone()
        .or_else(|| config.database.url.clone())
        .context(
            "no database URL: pass --url, set DATABASE_URL, or set [database] url in driftway.toml",
        )?;

    match cli.command {
        Command::Migrate(MigrateCommand::Up) => commands::migrate_up(&config, &url).await,
        Command::Migrate(MigrateCommand::Down { name }) => {
            commands::migrate_down(&config, &url, &name).await
        }
        Command::Migrate(MigrateCommand::Status) => commands::migrate_status(&config, &url).await,
        Command::Sync => commands::sync(&config, &url).await,
        Command::Plan { output } => commands::plan(&config, &url, output.as_deref()).await,
        Command::Hash { declared } => commands::hash(&config, Some(&url), declared).await,
        Command::Migrate(MigrateCommand::Create { .. }) => unreachable!("handled above"),
    }
}
