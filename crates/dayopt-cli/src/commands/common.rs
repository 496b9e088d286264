use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dayopt_core::db::{KeyValueStore, SqliteKeyValueStore};
use dayopt_core::offline::{
    ConflictId, Connectivity, EndpointError, HttpReconciliationEndpoint, QuarantinedRecord,
    QueueStore, ReconciliationEndpoint, SyncRequest, SyncResult,
};
use dayopt_core::util::normalize_text_option;
use dayopt_core::{ActionId, OfflineAction, OfflineConfig, OfflineManager};
use serde::Serialize;
use serde_json::Value;

use crate::error::CliError;

pub const DB_PATH_ENV: &str = "DAYOPT_DB_PATH";
pub const SYNC_ENDPOINT_ENV: &str = "DAYOPT_SYNC_ENDPOINT";
pub const ACCESS_TOKEN_ENV: &str = "DAYOPT_ACCESS_TOKEN";

const SHORT_ID_LEN: usize = 13;

#[derive(Debug, Serialize)]
pub struct ActionListItem {
    pub id: String,
    pub entity: String,
    pub entity_id: String,
    pub operation: String,
    pub status: String,
    pub retry_count: u32,
    pub local_timestamp: DateTime<Utc>,
    pub relative_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_attempt_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConflictListItem {
    pub conflict_id: String,
    pub action_id: String,
    pub entity: String,
    pub entity_id: String,
    pub fields: Vec<String>,
    pub local_data: Value,
    pub server_data: Value,
    pub detected_at: DateTime<Utc>,
}

/// Never contacted: local commands run the manager offline
struct DisconnectedEndpoint;

#[async_trait]
impl ReconciliationEndpoint for DisconnectedEndpoint {
    async fn apply(&self, _request: SyncRequest) -> Result<SyncResult, EndpointError> {
        Err(EndpointError::InvalidConfiguration(
            "sync endpoint not configured".to_string(),
        ))
    }
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os(DB_PATH_ENV).map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dayopt")
        .join("dayopt.db")
}

pub fn open_store(db_path: &Path) -> Result<Arc<dyn KeyValueStore>, CliError> {
    Ok(Arc::new(SqliteKeyValueStore::open(db_path)?))
}

/// Manager for commands that only touch local state
pub fn open_local_manager(db_path: &Path) -> Result<OfflineManager, CliError> {
    let store = open_store(db_path)?;
    Ok(OfflineManager::open(
        store,
        Arc::new(DisconnectedEndpoint),
        Connectivity::new(false),
    )?)
}

/// Manager wired to the configured reconciliation endpoint
pub fn open_sync_manager(db_path: &Path) -> Result<OfflineManager, CliError> {
    let store = open_store(db_path)?;
    let config = OfflineConfig::load(store.as_ref())?;
    let endpoint_url = resolve_endpoint_url(
        env::var(SYNC_ENDPOINT_ENV).ok(),
        config.endpoint_url.clone(),
    )
    .ok_or(CliError::SyncNotConfigured)?;

    let mut endpoint = HttpReconciliationEndpoint::new(endpoint_url)
        .map_err(|error| CliError::Config(error.to_string()))?;
    if let Some(token) = normalize_text_option(env::var(ACCESS_TOKEN_ENV).ok()) {
        endpoint = endpoint.with_access_token(token);
    }
    tracing::debug!("Using reconciliation endpoint {}", endpoint.endpoint());

    let queue = QueueStore::open(store)?;
    Ok(OfflineManager::new(
        queue,
        Arc::new(endpoint),
        Connectivity::new(true),
        config,
    )?)
}

/// Environment override first, then the persisted setting
pub fn resolve_endpoint_url(
    env_url: Option<String>,
    configured_url: Option<String>,
) -> Option<String> {
    normalize_text_option(env_url).or_else(|| normalize_text_option(configured_url))
}

pub fn normalize_identifier(id: &str) -> Result<String, CliError> {
    let normalized = id.trim();
    if normalized.is_empty() {
        return Err(CliError::EmptyId);
    }
    Ok(normalized.to_lowercase())
}

/// Parse `--payload`/`--data`; absent means `null`
pub fn parse_json_option(raw: Option<&str>) -> Result<Value, CliError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(Value::Null),
        Some(raw) => {
            serde_json::from_str(raw).map_err(|error| CliError::InvalidPayload(error.to_string()))
        }
    }
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, CliError> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|_| CliError::InvalidTimestamp(raw.to_string()))
}

/// Resolve a full id or unique prefix against `candidates`
fn match_prefix<I>(query: &str, candidates: I) -> Result<Option<String>, CliError>
where
    I: IntoIterator<Item = String>,
{
    let query = normalize_identifier(query)?;
    let mut matches: Vec<String> = candidates
        .into_iter()
        .filter(|candidate| candidate.starts_with(&query))
        .collect();
    if let Some(exact) = matches.iter().find(|candidate| **candidate == query) {
        return Ok(Some(exact.clone()));
    }

    match matches.len() {
        0 => Ok(None),
        1 => Ok(matches.pop()),
        _ => {
            let options = matches
                .iter()
                .take(3)
                .map(|id| short_id(id))
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

pub fn resolve_action_id(query: &str, actions: &[OfflineAction]) -> Result<ActionId, CliError> {
    match_prefix(query, actions.iter().map(|action| action.id.to_string()))?
        .and_then(|id| id.parse().ok())
        .ok_or_else(|| CliError::ActionNotFound(query.to_string()))
}

pub fn resolve_conflict_id(
    query: &str,
    actions: &[OfflineAction],
) -> Result<ConflictId, CliError> {
    let candidates = actions
        .iter()
        .filter_map(|action| action.conflict.as_ref())
        .map(|context| context.conflict_id.to_string());
    match_prefix(query, candidates)?
        .and_then(|id| id.parse().ok())
        .ok_or_else(|| CliError::ConflictNotFound(query.to_string()))
}

pub fn short_id(id: &str) -> String {
    id.chars().take(SHORT_ID_LEN).collect()
}

pub fn action_to_list_item(action: &OfflineAction, now: DateTime<Utc>) -> ActionListItem {
    ActionListItem {
        id: action.id.to_string(),
        entity: action.entity.to_string(),
        entity_id: action.entity_id.clone(),
        operation: action.operation.to_string(),
        status: action.sync_status.to_string(),
        retry_count: action.retry_count,
        local_timestamp: action.local_timestamp,
        relative_time: format_relative_time(
            action.local_timestamp.timestamp_millis(),
            now.timestamp_millis(),
        ),
        next_attempt_at: action.next_attempt_at,
        last_error: action.last_error.clone(),
        conflict_id: action
            .conflict
            .as_ref()
            .map(|context| context.conflict_id.to_string()),
    }
}

pub fn format_action_lines(actions: &[OfflineAction], now: DateTime<Utc>) -> Vec<String> {
    actions
        .iter()
        .map(|action| {
            let item = action_to_list_item(action, now);
            let mut line = format!(
                "{:<13}  {:<9}  {:<6}  {}/{}  {}",
                short_id(&item.id),
                item.status,
                item.operation,
                item.entity,
                item.entity_id,
                item.relative_time
            );
            if item.retry_count > 0 {
                line.push_str(&format!("  retries={}", item.retry_count));
            }
            if let Some(error) = item.last_error {
                line.push_str(&format!("  error: {error}"));
            }
            line
        })
        .collect()
}

pub fn conflict_items(actions: &[OfflineAction]) -> Vec<ConflictListItem> {
    actions
        .iter()
        .filter_map(|action| action.conflict.as_ref())
        .map(|context| ConflictListItem {
            conflict_id: context.conflict_id.to_string(),
            action_id: context.action_id.to_string(),
            entity: context.entity.to_string(),
            entity_id: context.entity_id.clone(),
            fields: context
                .conflicts
                .iter()
                .map(|field| field.field.clone())
                .collect(),
            local_data: context.local_data.clone(),
            server_data: context.server_data.clone(),
            detected_at: context.detected_at,
        })
        .collect()
}

pub fn format_conflict_lines(items: &[ConflictListItem], now: DateTime<Utc>) -> Vec<String> {
    items
        .iter()
        .map(|item| {
            let fields = if item.fields.iter().all(String::is_empty) {
                "(whole value)".to_string()
            } else {
                item.fields.join(", ")
            };
            format!(
                "{:<13}  {}/{}  fields: {}  detected {}",
                short_id(&item.conflict_id),
                item.entity,
                item.entity_id,
                fields,
                format_relative_time(
                    item.detected_at.timestamp_millis(),
                    now.timestamp_millis()
                )
            )
        })
        .collect()
}

pub fn format_quarantine_lines(records: &[QuarantinedRecord]) -> Vec<String> {
    records
        .iter()
        .map(|record| {
            format!(
                "{}  {}",
                record.quarantined_at.format("%Y-%m-%d %H:%M:%S UTC"),
                record.reason
            )
        })
        .collect()
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else {
        format!("{}w ago", diff / week)
    }
}
