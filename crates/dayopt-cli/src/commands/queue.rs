use std::path::Path;

use chrono::Utc;
use dayopt_core::ActionDraft;

use crate::cli::QueueCommands;
use crate::commands::common::{
    action_to_list_item, format_action_lines, open_local_manager, parse_json_option,
    parse_timestamp, ActionListItem,
};
use crate::error::CliError;

pub fn run_queue(command: QueueCommands, db_path: &Path) -> Result<(), CliError> {
    match command {
        QueueCommands::List { json } => run_queue_list(json, db_path),
        QueueCommands::Add {
            entity,
            operation,
            entity_id,
            payload,
            base,
        } => run_queue_add(
            &entity,
            &operation,
            &entity_id,
            payload.as_deref(),
            base.as_deref(),
            db_path,
        ),
    }
}

pub fn run_queue_list(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let manager = open_local_manager(db_path)?;
    let actions = manager.queue().all();
    let now = Utc::now();

    if as_json {
        let json_items = actions
            .iter()
            .map(|action| action_to_list_item(action, now))
            .collect::<Vec<ActionListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if actions.is_empty() {
        println!("Queue is empty.");
        return Ok(());
    }
    for line in format_action_lines(&actions, now) {
        println!("{line}");
    }
    Ok(())
}

pub fn run_queue_add(
    entity: &str,
    operation: &str,
    entity_id: &str,
    payload: Option<&str>,
    base: Option<&str>,
    db_path: &Path,
) -> Result<(), CliError> {
    let mut draft = ActionDraft::parse(entity, entity_id, operation, parse_json_option(payload)?)?;
    if let Some(base) = base {
        draft = draft.based_on(parse_timestamp(base)?);
    }

    let manager = open_local_manager(db_path)?;
    let action = manager.enqueue(draft)?;
    println!("{}", action.id);
    Ok(())
}
