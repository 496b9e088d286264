//! Local queue store: ordered, durable storage of action records.
//!
//! Every mutating call rewrites the queue under [`QUEUE_KEY`] before it
//! returns. If the write fails the in-memory state is rolled back, so what
//! callers observe is always what a reload would observe.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::action::{ActionDraft, ActionId, OfflineAction, StreamKey, SyncStatus};
use super::conflict::ConflictId;
use crate::db::KeyValueStore;
use crate::error::Result;

/// Storage key for the queue (JSON array of action records)
pub const QUEUE_KEY: &str = "dayopt.offline.queue";
/// Storage key for records that could not be decoded
pub const QUARANTINE_KEY: &str = "dayopt.offline.quarantine";

/// A persisted record set aside because it could not be decoded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuarantinedRecord {
    /// The record as it was found in storage
    pub raw: Value,
    pub reason: String,
    pub quarantined_at: DateTime<Utc>,
}

#[derive(Default)]
struct QueueState {
    actions: Vec<OfflineAction>,
    quarantine: Vec<QuarantinedRecord>,
    /// Reasons for records quarantined since the last `take_new_quarantine`
    unreported: Vec<String>,
}

/// Ordered, persisted collection of [`OfflineAction`]s
pub struct QueueStore {
    store: Arc<dyn KeyValueStore>,
    state: Mutex<QueueState>,
}

impl QueueStore {
    /// Load the queue persisted in `store`.
    ///
    /// Undecodable records are moved to quarantine instead of failing the
    /// load. Records left `syncing` by an interrupted attempt go back to
    /// `pending`.
    pub fn open(store: Arc<dyn KeyValueStore>) -> Result<Self> {
        let now = Utc::now();
        let mut quarantine: Vec<QuarantinedRecord> = match store.get(QUARANTINE_KEY)? {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|error| {
                tracing::warn!("Discarding unreadable quarantine list: {error}");
                Vec::new()
            }),
            None => Vec::new(),
        };
        let quarantined_before = quarantine.len();

        let mut actions = Vec::new();
        let mut dirty = false;
        if let Some(raw) = store.get(QUEUE_KEY)? {
            match serde_json::from_str::<Value>(&raw) {
                Ok(Value::Array(records)) => {
                    for record in records {
                        match serde_json::from_value::<OfflineAction>(record.clone()) {
                            Ok(action) => {
                                let status = action.sync_status;
                                match recover(action) {
                                    Some(action) => {
                                        dirty |= action.sync_status != status;
                                        actions.push(action);
                                    }
                                    None => dirty = true,
                                }
                            }
                            Err(error) => {
                                tracing::warn!("Quarantining undecodable queue record: {error}");
                                quarantine.push(QuarantinedRecord {
                                    raw: record,
                                    reason: format!("undecodable action record: {error}"),
                                    quarantined_at: now,
                                });
                            }
                        }
                    }
                }
                Ok(other) => {
                    tracing::warn!("Persisted queue is not a JSON array; quarantining it");
                    quarantine.push(QuarantinedRecord {
                        raw: other,
                        reason: "persisted queue is not a JSON array".to_string(),
                        quarantined_at: now,
                    });
                }
                Err(error) => {
                    tracing::warn!("Persisted queue is corrupted; quarantining it: {error}");
                    quarantine.push(QuarantinedRecord {
                        raw: Value::String(raw),
                        reason: format!("corrupted queue: {error}"),
                        quarantined_at: now,
                    });
                }
            }
        }

        let unreported: Vec<String> = quarantine[quarantined_before..]
            .iter()
            .map(|record| record.reason.clone())
            .collect();
        let queue = Self {
            store,
            state: Mutex::new(QueueState {
                actions,
                quarantine,
                unreported,
            }),
        };

        {
            let state = queue.state();
            if !state.unreported.is_empty() {
                queue.persist_quarantine(&state.quarantine)?;
                queue.persist_actions(&state.actions)?;
            } else if dirty {
                queue.persist_actions(&state.actions)?;
            }
            tracing::info!(
                "Loaded offline queue: {} action(s), {} quarantined",
                state.actions.len(),
                state.quarantine.len()
            );
        }

        Ok(queue)
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist_actions(&self, actions: &[OfflineAction]) -> Result<()> {
        self.store.set(QUEUE_KEY, &serde_json::to_string(actions)?)
    }

    fn persist_quarantine(&self, quarantine: &[QuarantinedRecord]) -> Result<()> {
        self.store.set(QUARANTINE_KEY, &serde_json::to_string(quarantine)?)
    }

    /// Apply `change` to the queue and persist it, rolling back on failure
    fn mutate<R>(&self, change: impl FnOnce(&mut Vec<OfflineAction>) -> R) -> Result<R> {
        let mut state = self.state();
        let backup = state.actions.clone();
        let result = change(&mut state.actions);
        if let Err(error) = self.persist_actions(&state.actions) {
            tracing::warn!("Failed to persist offline queue, rolling back: {error}");
            state.actions = backup;
            return Err(error);
        }
        Ok(result)
    }

    /// Validate `draft` and append it as a `pending` action
    pub fn enqueue(&self, draft: ActionDraft) -> Result<OfflineAction> {
        draft.validate()?;
        let action = draft.into_action(Utc::now());
        self.mutate(|actions| actions.push(action.clone()))?;
        tracing::debug!(
            "Enqueued {} {} {} ({})",
            action.operation,
            action.entity,
            action.entity_id,
            action.id
        );
        Ok(action)
    }

    /// Oldest `pending` action whose stream has no earlier unresolved action
    pub fn dequeue_next(&self) -> Option<OfflineAction> {
        self.dequeue_next_eligible(Utc::now(), &HashSet::new())
    }

    /// Like [`dequeue_next`](Self::dequeue_next), also skipping actions in
    /// backoff at `now` and those listed in `skip`. Skipped actions still
    /// hold back the rest of their stream.
    pub fn dequeue_next_eligible(
        &self,
        now: DateTime<Utc>,
        skip: &HashSet<ActionId>,
    ) -> Option<OfflineAction> {
        let state = self.state();
        let mut blocked: HashSet<StreamKey> = HashSet::new();
        for action in &state.actions {
            let key = action.stream_key();
            if blocked.contains(&key) {
                continue;
            }
            let eligible = action.sync_status == SyncStatus::Pending
                && !action.is_deferred(now)
                && !skip.contains(&action.id);
            if eligible {
                return Some(action.clone());
            }
            if action.sync_status.is_unresolved() {
                blocked.insert(key);
            }
        }
        None
    }

    /// Apply `change` to one action. Unknown ids are logged and yield `None`.
    pub fn update(
        &self,
        id: ActionId,
        change: impl FnOnce(&mut OfflineAction),
    ) -> Result<Option<OfflineAction>> {
        let updated = self.mutate(|actions| {
            actions.iter_mut().find(|action| action.id == id).map(|action| {
                change(action);
                action.clone()
            })
        })?;
        if updated.is_none() {
            tracing::warn!("Ignoring update for unknown offline action {id}");
        }
        Ok(updated)
    }

    /// Transition one action. Returns `false` when `id` is unknown.
    pub fn mark_status(&self, id: ActionId, status: SyncStatus) -> Result<bool> {
        let updated = self.update(id, |action| action.sync_status = status)?;
        if updated.is_some() {
            tracing::debug!("Offline action {id} -> {status}");
        }
        Ok(updated.is_some())
    }

    /// Return a `syncing` action to `pending` after its outcome could not be
    /// recorded. The in-memory copy is reset even if persisting fails; a
    /// stored `syncing` record is recovered on the next open.
    pub fn release(&self, id: ActionId) {
        let mut state = self.state();
        let Some(action) = state
            .actions
            .iter_mut()
            .find(|action| action.id == id && action.sync_status == SyncStatus::Syncing)
        else {
            return;
        };
        action.sync_status = SyncStatus::Pending;
        if let Err(error) = self.persist_actions(&state.actions) {
            tracing::warn!("Released action {id} in memory only: {error}");
        }
    }

    /// Delete one action, returning it
    pub fn remove(&self, id: ActionId) -> Result<Option<OfflineAction>> {
        self.mutate(|actions| {
            actions
                .iter()
                .position(|action| action.id == id)
                .map(|index| actions.remove(index))
        })
    }

    /// Advance the base timestamp of every pending action of `key` that
    /// carries one, after an earlier action of the stream was applied.
    pub fn rebase_stream(&self, key: &StreamKey, server_timestamp: DateTime<Utc>) -> Result<usize> {
        self.mutate(|actions| {
            let mut rebased = 0;
            for action in actions.iter_mut() {
                if action.stream_key() == *key
                    && action.sync_status == SyncStatus::Pending
                    && action.base_timestamp.is_some_and(|base| base < server_timestamp)
                {
                    action.base_timestamp = Some(server_timestamp);
                    rebased += 1;
                }
            }
            rebased
        })
    }

    pub fn get(&self, id: ActionId) -> Option<OfflineAction> {
        self.state()
            .actions
            .iter()
            .find(|action| action.id == id)
            .cloned()
    }

    /// Action holding the conflict `conflict_id`
    pub fn find_conflict(&self, conflict_id: ConflictId) -> Option<OfflineAction> {
        self.state()
            .actions
            .iter()
            .find(|action| {
                action
                    .conflict
                    .as_ref()
                    .is_some_and(|context| context.conflict_id == conflict_id)
            })
            .cloned()
    }

    pub fn size(&self) -> usize {
        self.state().actions.len()
    }

    /// Snapshot of the queue in order
    pub fn all(&self) -> Vec<OfflineAction> {
        self.state().actions.clone()
    }

    /// Number of actions with `status`
    pub fn count(&self, status: SyncStatus) -> usize {
        self.state()
            .actions
            .iter()
            .filter(|action| action.sync_status == status)
            .count()
    }

    /// Earliest backoff deadline among pending actions
    pub fn earliest_deferral(&self) -> Option<DateTime<Utc>> {
        self.state()
            .actions
            .iter()
            .filter(|action| action.sync_status == SyncStatus::Pending)
            .filter_map(|action| action.next_attempt_at)
            .min()
    }

    pub fn quarantined(&self) -> Vec<QuarantinedRecord> {
        self.state().quarantine.clone()
    }

    /// Reasons for records quarantined since the last call
    pub fn take_new_quarantine(&self) -> Vec<String> {
        std::mem::take(&mut self.state().unreported)
    }
}

/// Normalize a record loaded after a restart; `None` drops it
fn recover(mut action: OfflineAction) -> Option<OfflineAction> {
    match action.sync_status {
        SyncStatus::Completed => {
            tracing::debug!("Dropping completed action {} left in queue", action.id);
            None
        }
        SyncStatus::Syncing => {
            tracing::info!("Resetting interrupted action {} to pending", action.id);
            action.sync_status = SyncStatus::Pending;
            Some(action)
        }
        SyncStatus::Conflict if action.conflict.is_none() => {
            tracing::warn!(
                "Action {} lost its conflict context; re-queueing",
                action.id
            );
            action.sync_status = SyncStatus::Pending;
            Some(action)
        }
        _ => Some(action),
    }
}
