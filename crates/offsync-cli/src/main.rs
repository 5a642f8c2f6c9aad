//! offsync CLI - Operator tool for the offline sync engine
//!
//! Provides commands for:
//! - Viewing engine status and the resolution log
//! - Listing and resolving conflicts
//! - Reading and writing entries
//! - Running a one-shot or long-running sync

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;
mod session;

use commands::{
    config::ConfigCommand,
    conflicts::{ConflictsCommand, ResolveCommand},
    data::{DeleteCommand, GetCommand, PutCommand},
    logs::LogsCommand,
    status::StatusCommand,
    sync::{RunCommand, SyncCommand},
};
use offsync_core::config::Config;
use output::{Output, OutputFormat};

#[derive(Debug, Parser)]
#[command(name = "offsync", version, about = "Offline-first data sync engine")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show engine status
    Status(StatusCommand),
    /// List conflicts awaiting a decision
    Conflicts(ConflictsCommand),
    /// Resolve a pending conflict
    Resolve(ResolveCommand),
    /// Read an entry
    Get(GetCommand),
    /// Store an entry and queue it for sync
    Put(PutCommand),
    /// Delete an entry and queue the delete
    Delete(DeleteCommand),
    /// Drain the sync queue once
    Sync(SyncCommand),
    /// Run the engine until interrupted
    Run(RunCommand),
    /// Show recent conflict resolutions
    Logs(LogsCommand),
    /// View and check configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

/// Loads the configuration from `--config` or the default location
fn load_config(path: Option<&Path>) -> Result<(Config, PathBuf)> {
    match path {
        Some(path) => {
            let config = Config::load(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            Ok((config, path.to_path_buf()))
        }
        None => {
            let path = Config::default_path();
            Ok((Config::load_or_default(&path), path))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, config_path) = load_config(cli.config.as_deref())?;

    // Setup tracing
    let filter = match cli.verbose {
        0 => config.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(config_path = %config_path.display(), "Loaded configuration");

    let out = Output::new(if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    });

    if let Commands::Config(cmd) = &cli.command {
        return cmd.execute(&config, &config_path, out);
    }

    let problems = commands::config::check(&config);
    if !problems.is_empty() {
        for problem in &problems {
            out.error(problem);
        }
        anyhow::bail!("invalid configuration in {}", config_path.display());
    }

    match cli.command {
        Commands::Status(cmd) => cmd.execute(&config, out).await,
        Commands::Conflicts(cmd) => cmd.execute(&config, out).await,
        Commands::Resolve(cmd) => cmd.execute(&config, out).await,
        Commands::Get(cmd) => cmd.execute(&config, out).await,
        Commands::Put(cmd) => cmd.execute(&config, out).await,
        Commands::Delete(cmd) => cmd.execute(&config, out).await,
        Commands::Sync(cmd) => cmd.execute(&config, out).await,
        Commands::Run(cmd) => cmd.execute(&config, out).await,
        Commands::Logs(cmd) => cmd.execute(&config, out).await,
        Commands::Config(_) => Ok(()),
    }
}
