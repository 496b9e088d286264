//! Conflict contexts and their resolution.
//!
//! A conflict is recorded when the server's copy of an entity changed after
//! the client last observed it. The resolver validates a user (or policy)
//! decision and computes the data the sync engine finalizes with.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use super::action::{ActionId, OfflineAction};
use crate::error::{Error, Result};
use crate::models::{uuid_id, EntityKind};

uuid_id!(
    /// Identifier of a detected conflict
    ConflictId
);

/// One divergent field between the local and server versions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldConflict {
    pub field: String,
    #[serde(default)]
    pub local_value: Value,
    #[serde(default)]
    pub server_value: Value,
}

/// Everything needed to decide a conflict for one action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictContext {
    pub conflict_id: ConflictId,
    /// Action under dispute (lookup only)
    pub action_id: ActionId,
    pub entity: EntityKind,
    pub entity_id: String,
    pub local_data: Value,
    pub server_data: Value,
    pub local_timestamp: DateTime<Utc>,
    pub server_timestamp: Option<DateTime<Utc>>,
    pub conflicts: Vec<FieldConflict>,
    pub detected_at: DateTime<Utc>,
}

impl ConflictContext {
    /// Build a context for `action` from the server's view of the entity.
    ///
    /// When the server did not name the divergent fields they are derived
    /// from a shallow comparison of the two objects.
    pub fn new(
        action: &OfflineAction,
        server_data: Value,
        server_timestamp: Option<DateTime<Utc>>,
        reported: Option<Vec<FieldConflict>>,
        detected_at: DateTime<Utc>,
    ) -> Self {
        let conflicts = reported
            .filter(|fields| !fields.is_empty())
            .unwrap_or_else(|| diff_fields(&action.payload, &server_data));
        Self {
            conflict_id: ConflictId::new(),
            action_id: action.id,
            entity: action.entity,
            entity_id: action.entity_id.clone(),
            local_data: action.payload.clone(),
            server_data,
            local_timestamp: action.local_timestamp,
            server_timestamp,
            conflicts,
            detected_at,
        }
    }
}

/// Fields of `local` whose value differs from `server`.
///
/// Only keys present in the local object are compared: a partial update
/// conflicts on what it touches. Non-object payloads compare as a whole.
pub fn diff_fields(local: &Value, server: &Value) -> Vec<FieldConflict> {
    match (local, server) {
        (Value::Object(local), Value::Object(server)) => local
            .iter()
            .filter_map(|(field, local_value)| {
                let server_value = server.get(field).cloned().unwrap_or(Value::Null);
                (server_value != *local_value).then(|| FieldConflict {
                    field: field.clone(),
                    local_value: local_value.clone(),
                    server_value,
                })
            })
            .collect(),
        _ if local == server => Vec::new(),
        _ => vec![FieldConflict {
            field: String::new(),
            local_value: local.clone(),
            server_value: server.clone(),
        }],
    }
}

/// Which version wins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionChoice {
    Local,
    Server,
    Merge,
}

impl fmt::Display for ResolutionChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Local => "local",
            Self::Server => "server",
            Self::Merge => "merge",
        };
        f.write_str(label)
    }
}

impl FromStr for ResolutionChoice {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "server" => Ok(Self::Server),
            "merge" => Ok(Self::Merge),
            other => Err(Error::validation(format!(
                "resolution choice must be local, server or merge, got {other:?}"
            ))),
        }
    }
}

/// A decision for one conflict
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictResolution {
    pub choice: ResolutionChoice,
    /// Required iff `choice` is `merge`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_data: Option<Value>,
}

impl ConflictResolution {
    /// Keep the local version
    #[must_use]
    pub const fn local() -> Self {
        Self {
            choice: ResolutionChoice::Local,
            merged_data: None,
        }
    }

    /// Accept the server version
    #[must_use]
    pub const fn server() -> Self {
        Self {
            choice: ResolutionChoice::Server,
            merged_data: None,
        }
    }

    /// Use a hand-merged version
    #[must_use]
    pub const fn merge(merged_data: Value) -> Self {
        Self {
            choice: ResolutionChoice::Merge,
            merged_data: Some(merged_data),
        }
    }
}

/// Automated conflict policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPolicy {
    /// Wait for an explicit decision
    #[default]
    Manual,
    /// Always accept the server version
    PreferServer,
    /// Always keep the local version
    PreferLocal,
    /// Newer timestamp wins; the server wins ties
    LastWriteWins,
    /// Overlay local fields onto the server object
    MergeFields,
}

impl ResolutionPolicy {
    /// Decide `context` automatically, or `None` for manual handling
    pub fn decide(self, context: &ConflictContext) -> Option<ConflictResolution> {
        match self {
            Self::Manual => None,
            Self::PreferServer => Some(ConflictResolution::server()),
            Self::PreferLocal => Some(ConflictResolution::local()),
            Self::LastWriteWins => {
                let server_newer = context
                    .server_timestamp
                    .is_none_or(|server| server >= context.local_timestamp);
                Some(if server_newer {
                    ConflictResolution::server()
                } else {
                    ConflictResolution::local()
                })
            }
            Self::MergeFields => match (&context.server_data, &context.local_data) {
                (Value::Object(server), Value::Object(local)) => {
                    let mut merged: Map<String, Value> = server.clone();
                    for (field, value) in local {
                        merged.insert(field.clone(), value.clone());
                    }
                    Some(ConflictResolution::merge(Value::Object(merged)))
                }
                _ => Some(ConflictResolution::local()),
            },
        }
    }
}

impl fmt::Display for ResolutionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Manual => "manual",
            Self::PreferServer => "prefer_server",
            Self::PreferLocal => "prefer_local",
            Self::LastWriteWins => "last_write_wins",
            Self::MergeFields => "merge_fields",
        };
        f.write_str(label)
    }
}

impl FromStr for ResolutionPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        serde_json::from_value(Value::String(s.trim().replace('-', "_")))
            .map_err(|_| Error::validation(format!("unknown resolution policy: {s}")))
    }
}

/// Turns a conflict context plus a decision into final data
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictResolver;

impl ConflictResolver {
    /// Validate `resolution` against `context` and return the winning data.
    pub fn resolve(context: &ConflictContext, resolution: &ConflictResolution) -> Result<Value> {
        match (resolution.choice, &resolution.merged_data) {
            (ResolutionChoice::Local, None) => Ok(context.local_data.clone()),
            (ResolutionChoice::Server, None) => Ok(context.server_data.clone()),
            (ResolutionChoice::Merge, Some(merged)) => {
                if context.local_data.is_object() && !merged.is_object() {
                    return Err(Error::validation("merged_data must be a JSON object"));
                }
                Ok(merged.clone())
            }
            (ResolutionChoice::Merge, None) => Err(Error::validation(
                "merged_data is required when choice is merge",
            )),
            (choice, Some(_)) => Err(Error::validation(format!(
                "merged_data is only allowed when choice is merge, got {choice}"
            ))),
        }
    }
}
