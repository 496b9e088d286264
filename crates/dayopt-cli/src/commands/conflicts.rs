use std::path::Path;

use chrono::Utc;
use dayopt_core::offline::ResolutionChoice;
use dayopt_core::ConflictResolution;

use crate::cli::ConflictCommands;
use crate::commands::common::{
    conflict_items, format_conflict_lines, open_local_manager, parse_json_option,
    resolve_conflict_id,
};
use crate::error::CliError;

pub fn run_conflicts(command: ConflictCommands, db_path: &Path) -> Result<(), CliError> {
    match command {
        ConflictCommands::List { json } => run_conflicts_list(json, db_path),
        ConflictCommands::Resolve {
            conflict_id,
            choice,
            data,
        } => run_conflicts_resolve(&conflict_id, &choice, data.as_deref(), db_path),
    }
}

pub fn run_conflicts_list(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let manager = open_local_manager(db_path)?;
    let items = conflict_items(&manager.queue().all());

    if as_json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if items.is_empty() {
        println!("No open conflicts.");
        return Ok(());
    }
    for line in format_conflict_lines(&items, Utc::now()) {
        println!("{line}");
    }
    Ok(())
}

pub fn build_resolution(
    choice: &str,
    data: Option<&str>,
) -> Result<ConflictResolution, CliError> {
    let choice: ResolutionChoice = choice.parse()?;
    let merged_data = match parse_json_option(data)? {
        serde_json::Value::Null => None,
        value => Some(value),
    };
    Ok(ConflictResolution {
        choice,
        merged_data,
    })
}

pub fn run_conflicts_resolve(
    conflict_id: &str,
    choice: &str,
    data: Option<&str>,
    db_path: &Path,
) -> Result<(), CliError> {
    let resolution = build_resolution(choice, data)?;
    let manager = open_local_manager(db_path)?;
    let conflict_id = resolve_conflict_id(conflict_id, &manager.queue().all())?;

    let final_data = manager.resolve_conflict(conflict_id, resolution.clone())?;
    println!("{}", serde_json::to_string_pretty(&final_data)?);
    if resolution.choice != ResolutionChoice::Server {
        println!("Queued for sync; run `dayopt sync` to apply it.");
    }
    Ok(())
}
