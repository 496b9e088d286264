//! Server reconciliation endpoint contract

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::action::{OfflineAction, Operation};
use super::conflict::FieldConflict;
use crate::models::EntityKind;

/// One mutation sent to the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequest {
    pub entity: EntityKind,
    pub entity_id: String,
    pub operation: Operation,
    pub payload: Value,
    pub local_timestamp: DateTime<Utc>,
    /// Server timestamp the client last observed; `None` for blind writes
    pub base_timestamp: Option<DateTime<Utc>>,
}

impl From<&OfflineAction> for SyncRequest {
    fn from(action: &OfflineAction) -> Self {
        Self {
            entity: action.entity,
            entity_id: action.entity_id.clone(),
            operation: action.operation,
            payload: action.payload.clone(),
            local_timestamp: action.local_timestamp,
            base_timestamp: action.base_timestamp,
        }
    }
}

/// Outcome of one apply attempt
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflicts: Option<Vec<FieldConflict>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_data: Option<Value>,
    /// Version of the entity after (or, on conflict, instead of) the apply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncResult {
    /// Applied successfully
    #[must_use]
    pub const fn applied(server_data: Option<Value>, server_timestamp: DateTime<Utc>) -> Self {
        Self {
            success: true,
            conflicts: None,
            server_data,
            server_timestamp: Some(server_timestamp),
            error: None,
        }
    }

    /// Rejected because the server copy is newer than the request's base
    #[must_use]
    pub fn conflict(
        server_data: Value,
        server_timestamp: DateTime<Utc>,
        conflicts: Vec<FieldConflict>,
    ) -> Self {
        Self {
            success: false,
            conflicts: Some(conflicts),
            server_data: Some(server_data),
            server_timestamp: Some(server_timestamp),
            error: Some("version mismatch".to_string()),
        }
    }

    /// Whether the result reports a version mismatch.
    ///
    /// Either the server listed divergent fields, or it returned a copy whose
    /// timestamp is newer than `base_timestamp`. Blind writes compare against
    /// `local_timestamp` instead.
    #[must_use]
    pub fn is_conflict(
        &self,
        base_timestamp: Option<DateTime<Utc>>,
        local_timestamp: DateTime<Utc>,
    ) -> bool {
        if self.success {
            return false;
        }
        if self.conflicts.as_ref().is_some_and(|fields| !fields.is_empty()) {
            return true;
        }
        let reference = base_timestamp.unwrap_or(local_timestamp);
        match (self.server_data.as_ref(), self.server_timestamp) {
            (Some(_), Some(server)) => server > reference,
            _ => false,
        }
    }
}

/// Errors raised while talking to the reconciliation endpoint
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EndpointError {
    #[error("network error: {0}")]
    Network(String),
    #[error("attempt timed out")]
    Timeout,
    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },
    #[error("request rejected {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("invalid endpoint configuration: {0}")]
    InvalidConfiguration(String),
}

impl EndpointError {
    /// Whether retrying the same request may succeed
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Timeout | Self::Server { .. } | Self::InvalidResponse(_)
        )
    }
}

/// Accepts a mutation and reports the server's view of the entity.
///
/// Any transport satisfying this contract can back the sync engine.
#[async_trait]
pub trait ReconciliationEndpoint: Send + Sync {
    async fn apply(&self, request: SyncRequest) -> Result<SyncResult, EndpointError>;
}
