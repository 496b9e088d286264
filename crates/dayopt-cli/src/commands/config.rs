use std::path::Path;

use dayopt_core::offline::ResolutionPolicy;
use dayopt_core::util::normalize_text_option;
use dayopt_core::OfflineConfig;

use crate::cli::{ConfigCommands, ConfigSetArgs};
use crate::commands::common::open_store;
use crate::error::CliError;

pub fn run_config(command: ConfigCommands, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path)?;
    let mut config = OfflineConfig::load(store.as_ref())?;

    match command {
        ConfigCommands::Show => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        ConfigCommands::Set(args) => {
            apply_config_set(&mut config, args)?;
            config.save(store.as_ref())?;
            println!("Settings saved to {}", db_path.display());
        }
    }
    Ok(())
}

/// Overlay the given flags onto `config` and validate the result
#[allow(clippy::needless_pass_by_value)]
pub fn apply_config_set(config: &mut OfflineConfig, args: ConfigSetArgs) -> Result<(), CliError> {
    if let Some(value) = args.max_retries {
        config.max_retries = value;
    }
    if let Some(value) = args.retry_base_delay_ms {
        config.retry_base_delay_ms = value;
    }
    if let Some(value) = args.retry_max_delay_ms {
        config.retry_max_delay_ms = value;
    }
    if let Some(value) = args.attempt_timeout_secs {
        config.attempt_timeout_secs = value;
    }
    if args.no_conflict_timeout {
        config.conflict_timeout_secs = None;
    } else if let Some(value) = args.conflict_timeout_secs {
        config.conflict_timeout_secs = Some(value);
    }
    if let Some(policy) = args.policy.as_deref() {
        config.resolution_policy = policy.parse::<ResolutionPolicy>()?;
    }
    if let Some(value) = args.auto_sync {
        config.auto_sync = value;
    }
    if let Some(value) = args.auto_retry {
        config.auto_retry = value;
    }
    if let Some(url) = args.endpoint_url {
        // An empty value clears the endpoint
        config.endpoint_url = normalize_text_option(Some(url));
    }

    config.validate()?;
    Ok(())
}
