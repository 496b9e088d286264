//! Lifecycle events published by the sync engine
//!
//! Events go out on a `tokio::sync::broadcast` channel so independent
//! subscribers (toasts, cache invalidation, debug panels) each get a copy.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

use super::action::OfflineAction;
use super::conflict::{ConflictId, ConflictResolution, FieldConflict};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Event emitted by the sync engine
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    /// One drain finished
    SyncCompleted { processed: usize, conflicts: usize },
    /// The server copy diverged from an action's base
    ConflictDetected {
        action: OfflineAction,
        conflicts: Vec<FieldConflict>,
        conflict_id: ConflictId,
    },
    /// A conflict was decided
    ConflictResolved {
        conflict_id: ConflictId,
        resolution: ConflictResolution,
        final_data: Value,
    },
    /// An action needs manual intervention
    SyncFailed { action: OfflineAction, error: String },
    /// A persisted record could not be decoded and was set aside
    ActionQuarantined { reason: String },
}

/// Publish/subscribe hub for [`SyncEvent`]s
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SyncEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    /// New receiver observing events published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    /// Publish `event`; returns how many subscribers received it
    pub fn publish(&self, event: SyncEvent) -> usize {
        match self.sender.send(event) {
            Ok(subscriber_count) => subscriber_count,
            Err(error) => {
                tracing::debug!("No subscribers for sync event: {:?}", error.0);
                0
            }
        }
    }
}
