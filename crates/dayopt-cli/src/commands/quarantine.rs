use std::path::Path;

use crate::commands::common::{format_quarantine_lines, open_local_manager};
use crate::error::CliError;

pub fn run_quarantine_list(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let manager = open_local_manager(db_path)?;
    let records = manager.quarantined();

    if as_json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No quarantined records.");
        return Ok(());
    }
    for line in format_quarantine_lines(&records) {
        println!("{line}");
    }
    Ok(())
}
