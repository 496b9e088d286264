//! Shared cross-platform state types.

use std::fmt;

use serde::Serialize;

/// Single sync indicator derived from [`OfflineManagerStatus`].
///
/// [`OfflineManagerStatus`]: crate::offline::OfflineManagerStatus
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Offline,
    Syncing,
    /// Actions are waiting for the next drain
    Pending,
    /// At least one conflict awaits a decision
    Conflict,
    Synced,
    /// At least one action failed permanently
    Error,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Offline => "offline",
            Self::Syncing => "syncing",
            Self::Pending => "pending",
            Self::Conflict => "conflict",
            Self::Synced => "synced",
            Self::Error => "error",
        };
        f.write_str(label)
    }
}
