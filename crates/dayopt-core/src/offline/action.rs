//! Action records: one queued, not-yet-confirmed user mutation

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use super::conflict::ConflictContext;
use crate::error::{Error, Result};
use crate::models::{uuid_id, EntityKind, SyncEntity};

uuid_id!(
    /// Identifier assigned to an action at enqueue time
    ActionId
);

/// Kind of mutation an action replays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    /// Wire name of this operation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(Error::validation(format!("unsupported operation: {other}"))),
        }
    }
}

/// Sync state of a queued action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Waiting to be sent
    Pending,
    /// Attempt in flight
    Syncing,
    /// Applied by the server; removed from the queue right after
    Completed,
    /// Server state diverged; waiting for a resolution
    Conflict,
    /// Retry bound exceeded or rejected; waiting for a manual retry
    Failed,
}

impl SyncStatus {
    /// Whether the action still holds back later actions of its stream
    #[must_use]
    pub const fn is_unresolved(self) -> bool {
        !matches!(self, Self::Completed)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Syncing => "syncing",
            Self::Completed => "completed",
            Self::Conflict => "conflict",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Key of an entity-id stream: all actions targeting one entity instance
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamKey {
    pub entity: EntityKind,
    pub entity_id: String,
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity, self.entity_id)
    }
}

/// A durable description of one pending mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflineAction {
    pub id: ActionId,
    pub entity: EntityKind,
    /// Target entity instance
    pub entity_id: String,
    pub operation: Operation,
    pub payload: Value,
    /// Client clock at enqueue
    pub local_timestamp: DateTime<Utc>,
    /// Last server timestamp the client observed for the target
    #[serde(default)]
    pub base_timestamp: Option<DateTime<Utc>>,
    pub sync_status: SyncStatus,
    #[serde(default)]
    pub retry_count: u32,
    /// Backoff deadline after a transient failure
    #[serde(default)]
    pub next_attempt_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error: Option<String>,
    /// Present while `sync_status` is `conflict`
    #[serde(default)]
    pub conflict: Option<ConflictContext>,
}

impl OfflineAction {
    /// Stream this action belongs to
    #[must_use]
    pub fn stream_key(&self) -> StreamKey {
        StreamKey {
            entity: self.entity,
            entity_id: self.entity_id.clone(),
        }
    }

    /// Decode the payload into a typed model
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }

    /// Whether the action is deferred by backoff at `now`
    #[must_use]
    pub fn is_deferred(&self, now: DateTime<Utc>) -> bool {
        self.next_attempt_at.is_some_and(|at| at > now)
    }
}

/// Caller input for [`QueueStore::enqueue`](super::QueueStore::enqueue)
#[derive(Debug, Clone, PartialEq)]
pub struct ActionDraft {
    pub entity: EntityKind,
    pub entity_id: String,
    pub operation: Operation,
    pub payload: Value,
    pub base_timestamp: Option<DateTime<Utc>>,
}

impl ActionDraft {
    /// Draft from untyped parts
    pub fn new(
        entity: EntityKind,
        entity_id: impl Into<String>,
        operation: Operation,
        payload: Value,
    ) -> Self {
        Self {
            entity,
            entity_id: entity_id.into(),
            operation,
            payload,
            base_timestamp: None,
        }
    }

    /// Draft from wire strings; unknown entity kinds or operations are rejected
    pub fn parse(entity: &str, entity_id: &str, operation: &str, payload: Value) -> Result<Self> {
        Ok(Self::new(
            entity.parse()?,
            entity_id,
            operation.parse()?,
            payload,
        ))
    }

    /// Create `model` on the server
    pub fn create<T: SyncEntity>(model: &T) -> Result<Self> {
        model.validate()?;
        Ok(Self::new(
            T::KIND,
            model.entity_id(),
            Operation::Create,
            serde_json::to_value(model)?,
        ))
    }

    /// Apply a partial update to an existing `T`
    pub fn update<T: SyncEntity>(entity_id: impl Into<String>, patch: Value) -> Self {
        Self::new(T::KIND, entity_id, Operation::Update, patch)
    }

    /// Delete an existing `T`
    pub fn delete<T: SyncEntity>(entity_id: impl Into<String>) -> Self {
        Self::new(T::KIND, entity_id, Operation::Delete, Value::Null)
    }

    /// Record the server timestamp the caller based this mutation on
    #[must_use]
    pub const fn based_on(mut self, server_timestamp: DateTime<Utc>) -> Self {
        self.base_timestamp = Some(server_timestamp);
        self
    }

    /// Reject drafts that could never be replayed
    pub fn validate(&self) -> Result<()> {
        if self.entity_id.trim().is_empty() {
            return Err(Error::validation("entity_id cannot be empty"));
        }
        match self.operation {
            Operation::Create | Operation::Update if !self.payload.is_object() => {
                Err(Error::validation(format!(
                    "{} payload for {} must be a JSON object",
                    self.operation, self.entity
                )))
            }
            _ => Ok(()),
        }
    }

    pub(crate) fn into_action(self, now: DateTime<Utc>) -> OfflineAction {
        OfflineAction {
            id: ActionId::new(),
            entity: self.entity,
            entity_id: self.entity_id.trim().to_string(),
            operation: self.operation,
            payload: self.payload,
            local_timestamp: now,
            base_timestamp: self.base_timestamp,
            sync_status: SyncStatus::Pending,
            retry_count: 0,
            next_attempt_at: None,
            last_error: None,
            conflict: None,
        }
    }
}
