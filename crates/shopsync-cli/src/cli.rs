use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "shopsync")]
#[command(about = "Replicate the shop database to its hosted backend")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run any engine command with JSON arguments
    Invoke {
        /// Command name, e.g. get_sync_queue_stats
        command: String,
        /// Arguments as a JSON object
        #[arg(long, value_name = "JSON")]
        args: Option<String>,
    },
    /// Push queued changes and inspect the outbox
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },
    /// Manage the remote backend configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Manage the master password
    Vault {
        #[command(subcommand)]
        command: VaultCommands,
    },
    /// Copy everything to a new backend and switch to it
    Migrate {
        /// New backend URL
        #[arg(long, value_name = "URL")]
        url: String,
        /// New anon/public key
        #[arg(long, value_name = "KEY")]
        anon_key: String,
        /// New service key
        #[arg(long, value_name = "KEY")]
        service_key: String,
    },
    /// Fetch and apply remote changes
    Pull,
    /// Run background sync until interrupted
    Daemon,
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// Push pending items now
    Now,
    /// Re-queue every local record and push
    Full,
    /// Empty the remote tables, then re-queue and push everything
    Truncate,
    /// Queue counts by status
    Stats,
    /// Recent sync sessions
    Sessions {
        /// Number of sessions to show
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },
    /// Queue items, newest first
    Queue {
        /// Only show items with this status
        #[arg(long, value_enum)]
        status: Option<QueueStatusArg>,
        /// Number of items to show
        #[arg(short, long, default_value = "50")]
        limit: u32,
    },
    /// Return failed items to pending
    Retry,
    /// Delete synced items
    Clear {
        /// Only items synced more than this many days ago
        #[arg(long, default_value = "7")]
        older_than_days: u32,
        /// Also delete finished sessions and every synced item
        #[arg(long)]
        all: bool,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum QueueStatusArg {
    Pending,
    Syncing,
    Synced,
    Failed,
}

impl QueueStatusArg {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
            Self::Failed => "failed",
        }
    }
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the active configuration
    Show,
    /// Save a new active configuration
    Save {
        /// Backend URL
        #[arg(long, value_name = "URL")]
        url: String,
        /// Anon/public key
        #[arg(long, value_name = "KEY")]
        anon_key: String,
        /// Service key
        #[arg(long, value_name = "KEY")]
        service_key: String,
    },
    /// Set seconds between background cycles
    Interval {
        seconds: u64,
    },
    /// Check connectivity and remote schema
    Test,
    /// Print the SQL that creates the remote schema
    Sql,
}

#[derive(Subcommand)]
pub enum VaultCommands {
    /// Set or change the master password
    Set {
        /// Read the current password first
        #[arg(long)]
        change: bool,
    },
    /// Check the master password
    Verify,
}
