//! shopsync CLI - drive the sync engine from the command line
//!
//! Opens the local store, forwards commands to the engine and prints the
//! result, or runs background sync until interrupted.

mod cli;
mod commands;
mod error;

use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::common::resolve_db_path;
use crate::commands::config::run_config;
use crate::commands::daemon::run_daemon;
use crate::commands::invoke::run_invoke;
use crate::commands::migrate::{run_migrate, run_pull};
use crate::commands::sync::run_sync;
use crate::commands::vault::run_vault;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("shopsync=info,shopsync_core=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);
    tracing::debug!("Using database at {}", db_path.display());

    match cli.command {
        Commands::Invoke { command, args } => {
            run_invoke(&command, args.as_deref(), &db_path).await?;
        }
        Commands::Sync { command } => run_sync(command, cli.json, &db_path).await?,
        Commands::Config { command } => run_config(command, cli.json, &db_path).await?,
        Commands::Vault { command } => run_vault(command, &db_path).await?,
        Commands::Migrate {
            url,
            anon_key,
            service_key,
        } => run_migrate(&url, &anon_key, &service_key, &db_path).await?,
        Commands::Pull => run_pull(&db_path).await?,
        Commands::Daemon => run_daemon(&db_path).await?,
    }

    Ok(())
}
