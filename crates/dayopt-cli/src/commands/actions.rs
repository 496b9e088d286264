use std::path::Path;

use crate::commands::common::{open_local_manager, resolve_action_id};
use crate::error::CliError;

pub fn run_retry(id: &str, db_path: &Path) -> Result<(), CliError> {
    let manager = open_local_manager(db_path)?;
    let action_id = resolve_action_id(id, &manager.queue().all())?;

    let action = manager.retry_action(action_id)?;
    println!("{} re-queued", action.id);
    Ok(())
}

pub fn run_discard(id: &str, db_path: &Path) -> Result<(), CliError> {
    let manager = open_local_manager(db_path)?;
    let action_id = resolve_action_id(id, &manager.queue().all())?;

    let action = manager.discard_action(action_id)?;
    println!("{}", action.id);
    Ok(())
}
