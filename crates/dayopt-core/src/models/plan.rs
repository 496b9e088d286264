//! Plan model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entity::{EntityKind, SyncEntity};
use super::id::uuid_id;
use super::tag::TagId;
use crate::error::{Error, Result};

uuid_id!(
    /// A unique identifier for a plan
    PlanId
);

/// Progress of a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    /// Not started
    #[default]
    Todo,
    /// Being worked on
    Doing,
    /// Finished
    Done,
}

/// A task or calendar entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    /// Unique identifier
    pub id: PlanId,
    /// Short title
    pub title: String,
    /// Optional longer description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Progress status
    #[serde(default)]
    pub status: PlanStatus,
    /// Scheduled start
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    /// Scheduled end
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Attached tags
    #[serde(default)]
    pub tag_ids: Vec<TagId>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
}

impl Plan {
    /// Create a new unscheduled plan
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        let now = Utc::now().timestamp_millis();
        Self {
            id: PlanId::new(),
            title: title.into().trim().to_string(),
            description: None,
            status: PlanStatus::Todo,
            start_time: None,
            end_time: None,
            tag_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Schedule the plan between `start` and `end`
    #[must_use]
    pub const fn scheduled(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start_time = Some(start);
        self.end_time = Some(end);
        self
    }
}

impl SyncEntity for Plan {
    const KIND: EntityKind = EntityKind::Plans;

    fn entity_id(&self) -> String {
        self.id.as_str()
    }

    fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::validation("Plan title cannot be empty"));
        }
        if let (Some(start), Some(end)) = (self.start_time, self.end_time) {
            if end < start {
                return Err(Error::validation("Plan end_time is before start_time"));
            }
        }
        Ok(())
    }
}
