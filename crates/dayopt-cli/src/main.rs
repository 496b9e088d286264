//! Dayopt CLI - inspect and sync the offline action queue
//!
//! Lists queued mutations, replays them against the reconciliation API and
//! lets conflicts and failures be handled from the terminal.

mod cli;
mod commands;
mod error;

use clap::{CommandFactory, Parser};

use crate::cli::{Cli, Commands, QuarantineCommands};
use crate::commands::actions::{run_discard, run_retry};
use crate::commands::common::resolve_db_path;
use crate::commands::config::run_config;
use crate::commands::conflicts::run_conflicts;
use crate::commands::quarantine::run_quarantine_list;
use crate::commands::queue::run_queue;
use crate::commands::status::run_status;
use crate::commands::sync::run_sync;
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

    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "dayopt=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);

    match cli.command {
        Some(Commands::Queue { command }) => run_queue(command, &db_path)?,
        Some(Commands::Sync) => run_sync(&db_path).await?,
        Some(Commands::Status { json }) => run_status(json, &db_path)?,
        Some(Commands::Conflicts { command }) => run_conflicts(command, &db_path)?,
        Some(Commands::Retry { id }) => run_retry(&id, &db_path)?,
        Some(Commands::Discard { id }) => run_discard(&id, &db_path)?,
        Some(Commands::Quarantine {
            command: QuarantineCommands::List { json },
        }) => run_quarantine_list(json, &db_path)?,
        Some(Commands::Config { command }) => run_config(command, &db_path)?,
        None => {
            Cli::command().print_help().map_err(CliError::Io)?;
            println!();
        }
    }

    Ok(())
}
