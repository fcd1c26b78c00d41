//! GrantSync CLI - operator surface for the offline queue and collaboration
//!
//! Usage: grant <command> [options]

mod commands;

use clap::{Parser, Subcommand};
use grant_common::{GrantError, EXIT_CONFIG_ERROR, EXIT_ERROR};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "grant",
    version = "0.1.0",
    about = "GrantSync offline queue and collaboration tools"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose/debug logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    json_logs: bool,

    /// Never contact the remote store
    #[arg(long, global = true)]
    offline: bool,

    /// Workspace root (defaults to the current directory)
    #[arg(long, global = true, env = "GRANT_WORKSPACE")]
    workspace: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create .grantsync/config.toml with defaults
    Init,

    /// Inspect and manage queued operations
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },

    /// Check connectivity and replay queued operations
    Sync {
        /// Output the resulting queue status as JSON
        #[arg(long)]
        json: bool,
    },

    /// Read or clear the offline cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Join a collaboration session
    Collab {
        #[command(subcommand)]
        action: CollabAction,
    },
}

#[derive(Subcommand)]
pub enum QueueAction {
    /// Queue an operation (synced by `grant sync`)
    Add {
        /// create, update or delete
        operation: String,

        /// Resource key, e.g. "profile"
        resource: String,

        /// JSON payload (defaults to {})
        data: Option<String>,
    },

    /// Show pending/syncing/failed counts
    Status {
        #[arg(long)]
        json: bool,
    },

    /// List queued operations in order
    List {
        #[arg(long)]
        json: bool,
    },

    /// Give failed operations a fresh set of retries
    RetryFailed,

    /// Drop every queued operation
    Clear,
}

#[derive(Subcommand)]
pub enum CacheAction {
    /// Print the cached value of a resource
    Get { resource: String },

    /// Remove every cached value
    Clear,
}

#[derive(Subcommand)]
pub enum CollabAction {
    /// Print collaboration notifications until Ctrl-C
    Watch {
        /// Organization id
        #[arg(long)]
        org: String,

        /// Local user id
        #[arg(long)]
        user: String,

        /// Display name
        #[arg(long)]
        name: String,

        #[arg(long)]
        email: Option<String>,
    },
}

/// Options shared by every command
pub struct Context {
    pub root: PathBuf,
    pub offline: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    grant_common::telemetry::init_tracing(cli.verbose, cli.json_logs);
    tracing::debug!("GrantSync CLI started");

    let root = match cli.workspace {
        Some(root) => root,
        None => match std::env::current_dir() {
            Ok(dir) => dir,
            Err(e) => {
                eprintln!("Error: cannot determine current directory: {}", e);
                std::process::exit(EXIT_ERROR);
            }
        },
    };
    let ctx = Context {
        root,
        offline: cli.offline,
    };

    let result = match cli.command {
        Commands::Init => commands::cmd_init(&ctx),
        Commands::Queue { action } => commands::cmd_queue(&ctx, action),
        Commands::Sync { json } => commands::cmd_sync(&ctx, json).await,
        Commands::Cache { action } => commands::cmd_cache(&ctx, action).await,
        Commands::Collab { action } => commands::cmd_collab(&ctx, action).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        let code = match e.downcast_ref::<GrantError>() {
            Some(GrantError::ConfigError(_)) => EXIT_CONFIG_ERROR,
            _ => EXIT_ERROR,
        };
        std::process::exit(code);
    }
}
