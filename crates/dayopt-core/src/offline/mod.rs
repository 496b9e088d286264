//! Offline-first mutation queue and sync engine.
//!
//! Mutations made while offline are recorded as [`OfflineAction`]s in a
//! durable [`QueueStore`]. [`OfflineManager`] replays them through a
//! [`ReconciliationEndpoint`] once connectivity returns, preserving order
//! per entity, retrying transient failures with backoff and turning version
//! mismatches into conflicts that are resolved manually or by policy.

mod action;
mod conflict;
mod connectivity;
mod endpoint;
mod events;
mod http;
mod manager;
mod queue;

#[cfg(test)]
mod testing;
#[cfg(test)]
mod tests;

pub use action::{ActionDraft, ActionId, OfflineAction, Operation, StreamKey, SyncStatus};
pub use conflict::{
    diff_fields, ConflictContext, ConflictId, ConflictResolution, ConflictResolver,
    FieldConflict, ResolutionChoice, ResolutionPolicy,
};
pub use connectivity::Connectivity;
pub use endpoint::{EndpointError, ReconciliationEndpoint, SyncRequest, SyncResult};
pub use events::{EventBus, SyncEvent};
pub use http::HttpReconciliationEndpoint;
pub use manager::{DrainReport, OfflineManager, OfflineManagerStatus};
pub use queue::{QuarantinedRecord, QueueStore, QUARANTINE_KEY, QUEUE_KEY};
