use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "dayopt")]
#[command(about = "Inspect and sync the Dayopt offline action queue")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Inspect or extend the offline queue
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },
    /// Replay queued actions against the sync endpoint
    Sync,
    /// Show queue and sync status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List or resolve sync conflicts
    Conflicts {
        #[command(subcommand)]
        command: ConflictCommands,
    },
    /// Re-queue a failed action
    Retry {
        /// Action ID or unique ID prefix
        id: String,
    },
    /// Drop a queued action without syncing it
    Discard {
        /// Action ID or unique ID prefix
        id: String,
    },
    /// Records that could not be decoded from storage
    Quarantine {
        #[command(subcommand)]
        command: QuarantineCommands,
    },
    /// Show or change sync settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum QueueCommands {
    /// List queued actions in replay order
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Record a mutation for later sync
    Add {
        /// Entity kind (plans, tags, tag_groups)
        entity: String,
        /// Operation (create, update, delete)
        operation: String,
        /// Entity identifier
        entity_id: String,
        /// JSON object with the entity fields
        #[arg(long, value_name = "JSON")]
        payload: Option<String>,
        /// Server timestamp (RFC 3339) this change is based on
        #[arg(long, value_name = "TIMESTAMP")]
        base: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum ConflictCommands {
    /// List unresolved conflicts
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Decide a conflict
    Resolve {
        /// Conflict ID or unique ID prefix
        conflict_id: String,
        /// Winning version: local, server or merge
        choice: String,
        /// Merged JSON object (required with `merge`)
        #[arg(long, value_name = "JSON")]
        data: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum QuarantineCommands {
    /// List quarantined records
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective settings as JSON
    Show,
    /// Update persisted settings
    Set(ConfigSetArgs),
}

#[derive(clap::Args, Debug, Default)]
pub struct ConfigSetArgs {
    /// Failed attempts before an action is marked failed
    #[arg(long, value_name = "N")]
    pub max_retries: Option<u32>,
    /// First retry delay in milliseconds
    #[arg(long, value_name = "MS")]
    pub retry_base_delay_ms: Option<u64>,
    /// Retry delay ceiling in milliseconds
    #[arg(long, value_name = "MS")]
    pub retry_max_delay_ms: Option<u64>,
    /// Per-attempt timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub attempt_timeout_secs: Option<u64>,
    /// Auto-resolve conflicts to the server version after this many seconds
    #[arg(long, value_name = "SECS", conflicts_with = "no_conflict_timeout")]
    pub conflict_timeout_secs: Option<u64>,
    /// Keep conflicts until they are resolved by hand
    #[arg(long)]
    pub no_conflict_timeout: bool,
    /// manual, prefer_server, prefer_local, last_write_wins or merge_fields
    #[arg(long, value_name = "POLICY")]
    pub policy: Option<String>,
    /// Drain in the background after enqueue
    #[arg(long, value_name = "BOOL")]
    pub auto_sync: Option<bool>,
    /// Re-drain automatically after backoff
    #[arg(long, value_name = "BOOL")]
    pub auto_retry: Option<bool>,
    /// Base URL of the reconciliation API
    #[arg(long, value_name = "URL")]
    pub endpoint_url: Option<String>,
}
