//! Sync engine: drains the offline queue against the reconciliation endpoint.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;

use super::action::{ActionDraft, ActionId, OfflineAction, SyncStatus};
use super::connectivity::Connectivity;
use super::conflict::{
    ConflictContext, ConflictId, ConflictResolution, ConflictResolver, ResolutionChoice,
};
use super::endpoint::{EndpointError, ReconciliationEndpoint, SyncRequest, SyncResult};
use super::events::{EventBus, SyncEvent};
use super::queue::{QueueStore, QuarantinedRecord};
use crate::config::OfflineConfig;
use crate::db::KeyValueStore;
use crate::error::{Error, Result};
use crate::state::SyncState;

/// Upper bound on back-to-back passes within one drain. Passes repeat when
/// new work arrives mid-drain or a policy resolution re-queues an action.
const MAX_DRAIN_PASSES: usize = 8;

/// Snapshot of the engine and queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OfflineManagerStatus {
    pub is_online: bool,
    pub is_initialized: bool,
    pub sync_in_progress: bool,
    pub queue_size: usize,
    pub pending: usize,
    pub conflicts: usize,
    pub failed: usize,
    pub quarantined: usize,
    pub last_sync_at: Option<DateTime<Utc>>,
}

impl OfflineManagerStatus {
    /// Collapse the snapshot into a single indicator state
    #[must_use]
    pub const fn sync_state(&self) -> SyncState {
        if self.sync_in_progress {
            SyncState::Syncing
        } else if self.failed > 0 {
            SyncState::Error
        } else if self.conflicts > 0 {
            SyncState::Conflict
        } else if !self.is_online {
            SyncState::Offline
        } else if self.pending > 0 {
            SyncState::Pending
        } else {
            SyncState::Synced
        }
    }
}

/// What one call to [`OfflineManager::process_queue`] did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// Applied and removed
    pub processed: usize,
    /// Newly detected conflicts
    pub conflicts: usize,
    /// Moved to `failed`
    pub failed: usize,
    /// Transient failures waiting on backoff
    pub deferred: usize,
    /// Another drain was running; this trigger was folded into it
    pub coalesced: bool,
    /// Offline; nothing was attempted
    pub offline: bool,
}

impl DrainReport {
    /// Number of actions an apply was attempted for
    pub const fn attempted(&self) -> usize {
        self.processed + self.conflicts + self.failed + self.deferred
    }
}

/// Clears `sync_in_progress` however the drain exits
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

struct Inner {
    queue: QueueStore,
    endpoint: Arc<dyn ReconciliationEndpoint>,
    connectivity: Connectivity,
    events: EventBus,
    config: OfflineConfig,
    initialized: AtomicBool,
    sync_in_progress: AtomicBool,
    rerun_requested: AtomicBool,
    watcher: Mutex<Option<JoinHandle<()>>>,
    retry_timer: Mutex<Option<JoinHandle<()>>>,
    last_sync_at: Mutex<Option<DateTime<Utc>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Offline action queue plus the engine that syncs it.
///
/// Cheap to clone; clones share one queue, one event bus and one drain
/// lock. Background work (connectivity watcher, triggered drains, retry
/// timer) requires a tokio runtime.
#[derive(Clone)]
pub struct OfflineManager {
    inner: Arc<Inner>,
}

impl OfflineManager {
    /// Assemble a manager from its collaborators
    pub fn new(
        queue: QueueStore,
        endpoint: Arc<dyn ReconciliationEndpoint>,
        connectivity: Connectivity,
        config: OfflineConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                queue,
                endpoint,
                connectivity,
                events: EventBus::new(),
                config,
                initialized: AtomicBool::new(false),
                sync_in_progress: AtomicBool::new(false),
                rerun_requested: AtomicBool::new(false),
                watcher: Mutex::new(None),
                retry_timer: Mutex::new(None),
                last_sync_at: Mutex::new(None),
            }),
        })
    }

    /// Load settings and queue from `store`
    pub fn open(
        store: Arc<dyn KeyValueStore>,
        endpoint: Arc<dyn ReconciliationEndpoint>,
        connectivity: Connectivity,
    ) -> Result<Self> {
        let config = OfflineConfig::load(store.as_ref())?;
        let queue = QueueStore::open(store)?;
        Self::new(queue, endpoint, connectivity, config)
    }

    /// Start watching connectivity and drain if online. Idempotent.
    pub fn initialize(&self) {
        if self.inner.initialized.swap(true, Ordering::SeqCst) {
            tracing::debug!("Offline manager already initialized");
            return;
        }

        let mut changes = self.inner.connectivity.subscribe();
        let manager = self.clone();
        let watcher = tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let online = *changes.borrow_and_update();
                if online {
                    if let Err(error) = manager.process_queue().await {
                        tracing::warn!("Drain after reconnect failed: {error}");
                    }
                }
            }
        });
        if let Some(previous) = lock(&self.inner.watcher).replace(watcher) {
            previous.abort();
        }

        for reason in self.inner.queue.take_new_quarantine() {
            self.inner
                .events
                .publish(SyncEvent::ActionQuarantined { reason });
        }

        tracing::info!(
            "Offline manager initialized with {} queued action(s)",
            self.inner.queue.size()
        );
        if self.inner.connectivity.is_online() {
            self.trigger_drain();
        }
    }

    /// Stop background work. Queued actions stay persisted.
    pub fn shutdown(&self) {
        self.inner.initialized.store(false, Ordering::SeqCst);
        if let Some(watcher) = lock(&self.inner.watcher).take() {
            watcher.abort();
        }
        if let Some(timer) = lock(&self.inner.retry_timer).take() {
            timer.abort();
        }
        tracing::info!("Offline manager shut down");
    }

    /// Persist a new action; starts a background drain when possible
    pub fn enqueue(&self, draft: ActionDraft) -> Result<OfflineAction> {
        let action = self.inner.queue.enqueue(draft)?;
        if self.inner.config.auto_sync {
            self.trigger_drain();
        }
        Ok(action)
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    pub fn queue(&self) -> &QueueStore {
        &self.inner.queue
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.inner.connectivity
    }

    pub fn config(&self) -> &OfflineConfig {
        &self.inner.config
    }

    pub fn quarantined(&self) -> Vec<QuarantinedRecord> {
        self.inner.queue.quarantined()
    }

    pub fn get_status(&self) -> OfflineManagerStatus {
        let queue = &self.inner.queue;
        OfflineManagerStatus {
            is_online: self.inner.connectivity.is_online(),
            is_initialized: self.inner.initialized.load(Ordering::SeqCst),
            sync_in_progress: self.inner.sync_in_progress.load(Ordering::SeqCst),
            queue_size: queue.size(),
            pending: queue.count(SyncStatus::Pending),
            conflicts: queue.count(SyncStatus::Conflict),
            failed: queue.count(SyncStatus::Failed),
            quarantined: queue.quarantined().len(),
            last_sync_at: *lock(&self.inner.last_sync_at),
        }
    }

    /// Drain the queue once.
    ///
    /// Only one drain runs at a time; a call made while another is active
    /// returns immediately with `coalesced` set and the active drain makes
    /// another pass before it exits.
    pub async fn process_queue(&self) -> Result<DrainReport> {
        if !self.inner.connectivity.is_online() {
            tracing::debug!("Offline; skipping drain");
            return Ok(DrainReport {
                offline: true,
                ..DrainReport::default()
            });
        }
        if self
            .inner
            .sync_in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            self.inner.rerun_requested.store(true, Ordering::SeqCst);
            tracing::debug!("Drain already running; coalescing trigger");
            return Ok(DrainReport {
                coalesced: true,
                ..DrainReport::default()
            });
        }

        let mut report = DrainReport::default();
        {
            let _guard = DrainGuard(&self.inner.sync_in_progress);
            for _ in 0..MAX_DRAIN_PASSES {
                self.inner.rerun_requested.store(false, Ordering::SeqCst);
                self.drain_pass(&mut report).await?;
                if !self.inner.rerun_requested.load(Ordering::SeqCst)
                    || !self.inner.connectivity.is_online()
                {
                    break;
                }
            }
        }

        if report.attempted() > 0 {
            *lock(&self.inner.last_sync_at) = Some(Utc::now());
            tracing::info!(
                "Drain finished: {} processed, {} conflict(s), {} failed, {} deferred",
                report.processed,
                report.conflicts,
                report.failed,
                report.deferred
            );
            self.inner.events.publish(SyncEvent::SyncCompleted {
                processed: report.processed,
                conflicts: report.conflicts,
            });
        }

        if self.inner.rerun_requested.swap(false, Ordering::SeqCst) {
            self.trigger_drain();
        } else {
            self.schedule_retry();
        }
        Ok(report)
    }

    /// Decide conflict `conflict_id`.
    ///
    /// `server` finalizes the action immediately; `local` and `merge`
    /// re-queue it with the chosen data for another apply, which may
    /// conflict again. Returns the final data.
    pub fn resolve_conflict(
        &self,
        conflict_id: ConflictId,
        resolution: ConflictResolution,
    ) -> Result<Value> {
        let action = self
            .inner
            .queue
            .find_conflict(conflict_id)
            .ok_or_else(|| Error::NotFound(format!("conflict {conflict_id}")))?;
        let context = action
            .conflict
            .clone()
            .ok_or_else(|| Error::NotFound(format!("conflict {conflict_id}")))?;

        let choice = resolution.choice;
        let final_data = self.apply_resolution(&action, &context, resolution)?;
        if choice != ResolutionChoice::Server {
            self.trigger_drain();
        }
        Ok(final_data)
    }

    /// Put a failed action back in line with a fresh retry budget
    pub fn retry_action(&self, id: ActionId) -> Result<OfflineAction> {
        let action = self
            .inner
            .queue
            .get(id)
            .ok_or_else(|| Error::NotFound(format!("action {id}")))?;
        if !matches!(action.sync_status, SyncStatus::Failed | SyncStatus::Pending) {
            return Err(Error::validation(format!(
                "action {id} is {} and cannot be retried",
                action.sync_status
            )));
        }

        let updated = self
            .inner
            .queue
            .update(id, |action| {
                action.sync_status = SyncStatus::Pending;
                action.retry_count = 0;
                action.next_attempt_at = None;
                action.last_error = None;
            })?
            .ok_or_else(|| Error::NotFound(format!("action {id}")))?;
        tracing::info!("Action {id} re-queued for retry");
        self.trigger_drain();
        Ok(updated)
    }

    /// Drop an action without syncing it
    pub fn discard_action(&self, id: ActionId) -> Result<OfflineAction> {
        if self
            .inner
            .queue
            .get(id)
            .is_some_and(|action| action.sync_status == SyncStatus::Syncing)
        {
            return Err(Error::validation(format!(
                "action {id} is syncing and cannot be discarded"
            )));
        }
        let removed = self
            .inner
            .queue
            .remove(id)?
            .ok_or_else(|| Error::NotFound(format!("action {id}")))?;
        tracing::info!("Discarded action {id}");
        Ok(removed)
    }

    /// Spawn a background drain if the manager is running and online
    fn trigger_drain(&self) {
        if !self.inner.initialized.load(Ordering::SeqCst) || !self.inner.connectivity.is_online()
        {
            return;
        }
        if self.inner.sync_in_progress.load(Ordering::SeqCst) {
            self.inner.rerun_requested.store(true, Ordering::SeqCst);
            return;
        }
        let manager = self.clone();
        tokio::spawn(async move {
            if let Err(error) = manager.process_queue().await {
                tracing::warn!("Background drain failed: {error}");
            }
        });
    }

    /// Re-drain once the earliest backoff deadline passes
    fn schedule_retry(&self) {
        if !self.inner.config.auto_retry || !self.inner.initialized.load(Ordering::SeqCst) {
            return;
        }
        let Some(deadline) = self.inner.queue.earliest_deferral() else {
            return;
        };
        let delay = (deadline - Utc::now()).to_std().unwrap_or_default();
        tracing::debug!("Scheduling retry drain in {delay:?}");

        let manager = self.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(error) = manager.process_queue().await {
                tracing::warn!("Retry drain failed: {error}");
            }
        });
        if let Some(previous) = lock(&self.inner.retry_timer).replace(timer) {
            previous.abort();
        }
    }

    async fn drain_pass(&self, report: &mut DrainReport) -> Result<()> {
        self.expire_conflicts()?;

        let mut attempted: HashSet<ActionId> = HashSet::new();
        loop {
            if !self.inner.connectivity.is_online() {
                tracing::info!("Connectivity lost; pausing drain");
                break;
            }
            let Some(action) = self
                .inner
                .queue
                .dequeue_next_eligible(Utc::now(), &attempted)
            else {
                break;
            };
            attempted.insert(action.id);
            self.attempt(action, report).await?;
        }
        Ok(())
    }

    async fn attempt(&self, action: OfflineAction, report: &mut DrainReport) -> Result<()> {
        self.inner
            .queue
            .mark_status(action.id, SyncStatus::Syncing)?;
        tracing::debug!(
            "Syncing {} {} {} ({})",
            action.operation,
            action.entity,
            action.entity_id,
            action.id
        );

        let request = SyncRequest::from(&action);
        let outcome = tokio::time::timeout(
            self.inner.config.attempt_timeout(),
            self.inner.endpoint.apply(request),
        )
        .await
        .unwrap_or(Err(EndpointError::Timeout));

        let recorded = match outcome {
            Ok(result) if result.success => self.complete(&action, &result, report),
            Ok(result) if result.is_conflict(action.base_timestamp, action.local_timestamp) => {
                self.record_conflict(&action, result, report)
            }
            Ok(result) => {
                let message = result
                    .error
                    .unwrap_or_else(|| "server reported failure".to_string());
                self.record_failure(&action, message, true, report)
            }
            Err(error) => {
                self.record_failure(&action, error.to_string(), error.is_transient(), report)
            }
        };
        if let Err(error) = &recorded {
            tracing::warn!("Could not record outcome for action {}: {error}", action.id);
            self.inner.queue.release(action.id);
        }
        recorded
    }

    fn complete(
        &self,
        action: &OfflineAction,
        result: &SyncResult,
        report: &mut DrainReport,
    ) -> Result<()> {
        self.inner.queue.remove(action.id)?;
        if let Some(server_timestamp) = result.server_timestamp {
            self.inner
                .queue
                .rebase_stream(&action.stream_key(), server_timestamp)?;
        }
        report.processed += 1;
        tracing::debug!("Action {} completed", action.id);
        Ok(())
    }

    fn record_conflict(
        &self,
        action: &OfflineAction,
        result: SyncResult,
        report: &mut DrainReport,
    ) -> Result<()> {
        let context = ConflictContext::new(
            action,
            result.server_data.unwrap_or(Value::Null),
            result.server_timestamp,
            result.conflicts,
            Utc::now(),
        );
        let Some(updated) = self.inner.queue.update(action.id, |action| {
            action.sync_status = SyncStatus::Conflict;
            action.conflict = Some(context.clone());
            action.next_attempt_at = None;
            action.last_error = None;
        })?
        else {
            return Ok(());
        };

        report.conflicts += 1;
        tracing::warn!(
            "Conflict {} on {}: {} field(s) diverged",
            context.conflict_id,
            action.stream_key(),
            context.conflicts.len()
        );
        self.inner.events.publish(SyncEvent::ConflictDetected {
            action: updated.clone(),
            conflicts: context.conflicts.clone(),
            conflict_id: context.conflict_id,
        });

        if let Some(resolution) = self.inner.config.resolution_policy.decide(&context) {
            tracing::info!(
                "Resolving conflict {} by policy {}",
                context.conflict_id,
                self.inner.config.resolution_policy
            );
            let choice = resolution.choice;
            self.apply_resolution(&updated, &context, resolution)?;
            if choice != ResolutionChoice::Server {
                self.inner.rerun_requested.store(true, Ordering::SeqCst);
            }
        }
        Ok(())
    }

    fn record_failure(
        &self,
        action: &OfflineAction,
        message: String,
        transient: bool,
        report: &mut DrainReport,
    ) -> Result<()> {
        let retry_count = if transient {
            action.retry_count.saturating_add(1)
        } else {
            action.retry_count
        };

        if transient && retry_count < self.inner.config.max_retries {
            let delay = self.inner.config.retry_delay(retry_count);
            let next_attempt_at = TimeDelta::from_std(delay)
                .ok()
                .and_then(|delay| Utc::now().checked_add_signed(delay));
            self.inner.queue.update(action.id, |action| {
                action.sync_status = SyncStatus::Pending;
                action.retry_count = retry_count;
                action.next_attempt_at = next_attempt_at;
                action.last_error = Some(message.clone());
            })?;
            report.deferred += 1;
            tracing::warn!(
                "Attempt {retry_count}/{} for action {} failed, retrying in {delay:?}: {message}",
                self.inner.config.max_retries,
                action.id
            );
            return Ok(());
        }

        let Some(updated) = self.inner.queue.update(action.id, |action| {
            action.sync_status = SyncStatus::Failed;
            action.retry_count = retry_count;
            action.next_attempt_at = None;
            action.last_error = Some(message.clone());
        })?
        else {
            return Ok(());
        };
        report.failed += 1;
        tracing::warn!("Action {} failed: {message}", action.id);
        self.inner.events.publish(SyncEvent::SyncFailed {
            action: updated,
            error: message,
        });
        Ok(())
    }

    /// Finalize `action` according to `resolution`; returns the final data
    fn apply_resolution(
        &self,
        action: &OfflineAction,
        context: &ConflictContext,
        resolution: ConflictResolution,
    ) -> Result<Value> {
        let final_data = ConflictResolver::resolve(context, &resolution)?;
        let queue = &self.inner.queue;

        match resolution.choice {
            ResolutionChoice::Server => {
                queue.remove(action.id)?;
                if let Some(server_timestamp) = context.server_timestamp {
                    queue.rebase_stream(&action.stream_key(), server_timestamp)?;
                }
            }
            ResolutionChoice::Local | ResolutionChoice::Merge => {
                queue.update(action.id, |action| {
                    action.payload = final_data.clone();
                    action.sync_status = SyncStatus::Pending;
                    action.conflict = None;
                    action.retry_count = 0;
                    action.next_attempt_at = None;
                    action.last_error = None;
                    if context.server_timestamp.is_some() {
                        action.base_timestamp = context.server_timestamp;
                    }
                })?;
            }
        }

        tracing::info!(
            "Conflict {} resolved with {}",
            context.conflict_id,
            resolution.choice
        );
        self.inner.events.publish(SyncEvent::ConflictResolved {
            conflict_id: context.conflict_id,
            resolution,
            final_data: final_data.clone(),
        });
        Ok(final_data)
    }

    /// Resolve conflicts left undecided past the configured timeout to the
    /// server version
    fn expire_conflicts(&self) -> Result<()> {
        let Some(timeout) = self.inner.config.conflict_timeout() else {
            return Ok(());
        };
        let Ok(timeout) = TimeDelta::from_std(timeout) else {
            return Ok(());
        };
        let now = Utc::now();

        for action in self.inner.queue.all() {
            let Some(context) = action.conflict.as_ref() else {
                continue;
            };
            let expired = context
                .detected_at
                .checked_add_signed(timeout)
                .is_some_and(|deadline| deadline <= now);
            if action.sync_status == SyncStatus::Conflict && expired {
                tracing::info!(
                    "Conflict {} undecided since {}; accepting server version",
                    context.conflict_id,
                    context.detected_at
                );
                self.apply_resolution(&action, context, ConflictResolution::server())?;
            }
        }
        Ok(())
    }
}
