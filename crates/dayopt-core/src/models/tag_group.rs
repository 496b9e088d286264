//! Tag group model

use serde::{Deserialize, Serialize};

use super::entity::{EntityKind, SyncEntity};
use super::id::uuid_id;
use super::tag::validate_color;
use crate::error::{Error, Result};

uuid_id!(
    /// A unique identifier for a tag group
    TagGroupId
);

/// A named group of tags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagGroup {
    /// Unique identifier
    pub id: TagGroupId,
    /// Display name
    pub name: String,
    /// Optional `#rrggbb` color
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Position in the sidebar
    #[serde(default)]
    pub sort_order: i32,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
}

impl TagGroup {
    /// Create a new tag group with the given name
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: TagGroupId::new(),
            name: name.into().trim().to_string(),
            color: None,
            sort_order: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

impl SyncEntity for TagGroup {
    const KIND: EntityKind = EntityKind::TagGroups;

    fn entity_id(&self) -> String {
        self.id.as_str()
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::validation("Tag group name cannot be empty"));
        }
        validate_color(self.color.as_deref())
    }
}
