use std::env;
use std::path::Path;

use serde::Serialize;

use crate::commands::common::{open_local_manager, resolve_endpoint_url, SYNC_ENDPOINT_ENV};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct StatusItem {
    pub db_path: String,
    pub endpoint_url: Option<String>,
    pub queue_size: usize,
    pub pending: usize,
    pub conflicts: usize,
    pub failed: usize,
    pub quarantined: usize,
}

pub fn run_status(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let manager = open_local_manager(db_path)?;
    let status = manager.get_status();
    let item = StatusItem {
        db_path: db_path.display().to_string(),
        endpoint_url: resolve_endpoint_url(
            env::var(SYNC_ENDPOINT_ENV).ok(),
            manager.config().endpoint_url.clone(),
        ),
        queue_size: status.queue_size,
        pending: status.pending,
        conflicts: status.conflicts,
        failed: status.failed,
        quarantined: status.quarantined,
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&item)?);
        return Ok(());
    }

    for line in format_status_lines(&item) {
        println!("{line}");
    }
    Ok(())
}

pub fn format_status_lines(item: &StatusItem) -> Vec<String> {
    vec![
        format!("Database:    {}", item.db_path),
        format!(
            "Endpoint:    {}",
            item.endpoint_url.as_deref().unwrap_or("(not configured)")
        ),
        format!(
            "Queue:       {} action(s), {} pending, {} conflict(s), {} failed",
            item.queue_size, item.pending, item.conflicts, item.failed
        ),
        format!("Quarantine:  {} record(s)", item.quarantined),
    ]
}
