//! Tag model

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use super::entity::{EntityKind, SyncEntity};
use super::id::uuid_id;
use super::tag_group::TagGroupId;
use crate::error::{Error, Result};

uuid_id!(
    /// A unique identifier for a tag
    TagId
);

static HEX_COLOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#[0-9a-fA-F]{6}$").expect("Invalid regex"));

/// Validate an optional `#rrggbb` color
pub(crate) fn validate_color(color: Option<&str>) -> Result<()> {
    match color {
        Some(color) if !HEX_COLOR.is_match(color) => Err(Error::validation(format!(
            "color must be #rrggbb, got {color:?}"
        ))),
        _ => Ok(()),
    }
}

/// A tag for organizing plans
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// Unique identifier
    pub id: TagId,
    /// Display name
    pub name: String,
    /// Optional `#rrggbb` color
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Optional free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Group this tag belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<TagGroupId>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
}

impl Tag {
    /// Create a new tag with the given name
    ///
    /// Surrounding whitespace is trimmed.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: TagId::new(),
            name: name.into().trim().to_string(),
            color: None,
            description: None,
            group_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the tag color
    #[must_use]
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    /// Place the tag in a group
    #[must_use]
    pub const fn in_group(mut self, group_id: TagGroupId) -> Self {
        self.group_id = Some(group_id);
        self
    }
}

impl SyncEntity for Tag {
    const KIND: EntityKind = EntityKind::Tags;

    fn entity_id(&self) -> String {
        self.id.as_str()
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::validation("Tag name cannot be empty"));
        }
        validate_color(self.color.as_deref())
    }
}
