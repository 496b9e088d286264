//! Entity kinds that can be mutated through the offline queue

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Closed set of entity kinds the server reconciliation endpoint accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Calendar plans (tasks/events)
    Plans,
    /// Tags
    Tags,
    /// Tag groups
    TagGroups,
}

impl EntityKind {
    /// All supported kinds
    pub const ALL: [Self; 3] = [Self::Plans, Self::Tags, Self::TagGroups];

    /// Wire name of this kind
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plans => "plans",
            Self::Tags => "tags",
            Self::TagGroups => "tag_groups",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| Error::validation(format!("unsupported entity kind: {s}")))
    }
}

/// A model that can be carried as an offline action payload.
///
/// Implemented by every entity kind so drafts can be built from typed values
/// instead of raw JSON.
pub trait SyncEntity: Serialize + DeserializeOwned {
    /// The entity kind this model maps to
    const KIND: EntityKind;

    /// Identifier of this instance, used as the entity-id stream key
    fn entity_id(&self) -> String;

    /// Field-level validation run before the model is enqueued
    fn validate(&self) -> crate::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_kind_parse() {
        assert_eq!("tags".parse::<EntityKind>().unwrap(), EntityKind::Tags);
        assert_eq!(
            "tag-groups".parse::<EntityKind>().unwrap(),
            EntityKind::TagGroups
        );
        assert_eq!(" Plans ".parse::<EntityKind>().unwrap(), EntityKind::Plans);
    }

    #[test]
    fn test_entity_kind_rejects_unknown() {
        let err = "notes".parse::<EntityKind>().unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_entity_kind_serde_names() {
        assert_eq!(
            serde_json::to_string(&EntityKind::TagGroups).unwrap(),
            "\"tag_groups\""
        );
        assert!(serde_json::from_str::<EntityKind>("\"notes\"").is_err());
    }
}
