use std::path::Path;

use dayopt_core::SyncEvent;

use crate::commands::common::{open_sync_manager, short_id};
use crate::error::CliError;

pub async fn run_sync(db_path: &Path) -> Result<(), CliError> {
    let manager = open_sync_manager(db_path)?;
    let mut events = manager.subscribe();

    let report = manager.process_queue().await?;

    while let Ok(event) = events.try_recv() {
        match event {
            SyncEvent::ConflictDetected {
                action,
                conflict_id,
                ..
            } => println!(
                "Conflict {} on {}/{}",
                short_id(&conflict_id.to_string()),
                action.entity,
                action.entity_id
            ),
            SyncEvent::SyncFailed { action, error } => println!(
                "Failed {} {}/{}: {error}",
                short_id(&action.id.to_string()),
                action.entity,
                action.entity_id
            ),
            _ => {}
        }
    }

    if report.attempted() == 0 {
        println!("Nothing to sync");
    } else {
        println!(
            "Sync completed: {} applied, {} conflict(s), {} failed, {} deferred",
            report.processed, report.conflicts, report.failed, report.deferred
        );
    }

    let quarantined = manager.quarantined().len();
    if quarantined > 0 {
        println!("{quarantined} record(s) quarantined; see `dayopt quarantine list`");
    }
    Ok(())
}
