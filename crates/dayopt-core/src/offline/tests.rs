use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tempfile::tempdir;
use tokio::sync::broadcast;

use super::testing::InMemoryServer;
use super::*;
use crate::config::OfflineConfig;
use crate::db::{KeyValueStore, MemoryKeyValueStore, SqliteKeyValueStore};
use crate::error::Error;
use crate::models::{EntityKind, Tag};
use crate::state::SyncState;

/// Config that leaves every drain to the test
fn manual_config() -> OfflineConfig {
    OfflineConfig {
        auto_sync: false,
        auto_retry: false,
        ..OfflineConfig::default()
    }
}

fn manager_with(
    server: &Arc<InMemoryServer>,
    online: bool,
    config: OfflineConfig,
) -> OfflineManager {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryKeyValueStore::new());
    let queue = QueueStore::open(store).unwrap();
    OfflineManager::new(queue, server.clone(), Connectivity::new(online), config).unwrap()
}

fn rename(entity_id: &str, name: &str) -> ActionDraft {
    ActionDraft::new(
        EntityKind::Tags,
        entity_id,
        Operation::Update,
        json!({ "name": name }),
    )
}

fn drain_events(rx: &mut broadcast::Receiver<SyncEvent>) -> Vec<SyncEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Remote tag `entity_id` edited twice server-side; returns the first version
fn diverged_remote(server: &InMemoryServer, entity_id: &str) -> chrono::DateTime<chrono::Utc> {
    let base = server.set_remote(
        EntityKind::Tags,
        entity_id,
        json!({ "name": "Original", "color": "#112233" }),
    );
    server.set_remote(
        EntityKind::Tags,
        entity_id,
        json!({ "name": "Server", "color": "#112233" }),
    );
    base
}

fn first_conflict_id(events: &[SyncEvent]) -> ConflictId {
    events
        .iter()
        .find_map(|event| match event {
            SyncEvent::ConflictDetected { conflict_id, .. } => Some(*conflict_id),
            _ => None,
        })
        .expect("conflict event")
}

#[tokio::test]
async fn test_offline_create_syncs_after_reconnect() {
    let server = Arc::new(InMemoryServer::new());
    let manager = manager_with(&server, false, manual_config());
    let mut rx = manager.subscribe();

    let tag = Tag::new("Work").with_color("#336699");
    manager.enqueue(ActionDraft::create(&tag).unwrap()).unwrap();

    let skipped = manager.process_queue().await.unwrap();
    assert!(skipped.offline);
    assert!(server.requests().is_empty());
    assert_eq!(manager.get_status().sync_state(), SyncState::Offline);

    manager.connectivity().set_online(true);
    let report = manager.process_queue().await.unwrap();

    assert_eq!(report.processed, 1);
    assert_eq!(manager.queue().size(), 0);
    let remote = server.remote(EntityKind::Tags, &tag.id.as_str()).unwrap();
    assert_eq!(remote["name"], "Work");
    assert_eq!(
        drain_events(&mut rx),
        vec![SyncEvent::SyncCompleted {
            processed: 1,
            conflicts: 0
        }]
    );

    let status = manager.get_status();
    assert!(status.last_sync_at.is_some());
    assert_eq!(status.sync_state(), SyncState::Synced);
}

#[tokio::test]
async fn test_updates_on_one_entity_apply_in_order() {
    let server = Arc::new(InMemoryServer::new());
    let base = server.set_remote(EntityKind::Tags, "t1", json!({ "name": "Start" }));
    let manager = manager_with(&server, true, manual_config());

    manager.enqueue(rename("t1", "A").based_on(base)).unwrap();
    manager.enqueue(rename("t1", "B").based_on(base)).unwrap();

    let report = manager.process_queue().await.unwrap();

    assert_eq!(report.processed, 2);
    assert_eq!(report.conflicts, 0);
    let names: Vec<Value> = server
        .requests()
        .into_iter()
        .map(|request| request.payload["name"].clone())
        .collect();
    assert_eq!(names, vec![json!("A"), json!("B")]);
    assert_eq!(server.remote(EntityKind::Tags, "t1").unwrap()["name"], "B");
}

#[tokio::test]
async fn test_conflict_stalls_only_its_stream() {
    let server = Arc::new(InMemoryServer::new());
    let base = diverged_remote(&server, "t1");
    let manager = manager_with(&server, true, manual_config());

    manager.enqueue(rename("t1", "Local").based_on(base)).unwrap();
    let follow_up = manager.enqueue(rename("t1", "Later")).unwrap();
    manager.enqueue(rename("t2", "Other")).unwrap();

    let report = manager.process_queue().await.unwrap();

    assert_eq!(report.conflicts, 1);
    assert_eq!(report.processed, 1);
    let sent: Vec<String> = server
        .requests()
        .into_iter()
        .map(|request| request.entity_id)
        .collect();
    assert_eq!(sent, vec!["t1".to_string(), "t2".to_string()]);
    assert_eq!(
        manager.queue().get(follow_up.id).unwrap().sync_status,
        SyncStatus::Pending
    );
    assert_eq!(manager.get_status().conflicts, 1);
    assert_eq!(manager.get_status().sync_state(), SyncState::Conflict);
}

#[tokio::test]
async fn test_blind_update_conflicts_with_newer_server_copy() {
    let server = Arc::new(InMemoryServer::new());
    let manager = manager_with(&server, true, manual_config());
    let mut rx = manager.subscribe();

    let action = manager.enqueue(rename("t1", "Local")).unwrap();
    server.reply_next(SyncResult {
        success: false,
        server_data: Some(json!({ "name": "Server" })),
        server_timestamp: Some(action.local_timestamp + chrono::Duration::hours(1)),
        ..SyncResult::default()
    });

    let report = manager.process_queue().await.unwrap();

    assert_eq!(report.conflicts, 1);
    assert_eq!(report.deferred, 0);
    assert_eq!(
        manager.queue().get(action.id).unwrap().sync_status,
        SyncStatus::Conflict
    );
    let events = drain_events(&mut rx);
    let SyncEvent::ConflictDetected { conflicts, .. } = &events[0] else {
        panic!("expected conflict, got {events:?}");
    };
    assert_eq!(
        conflicts,
        &vec![FieldConflict {
            field: "name".to_string(),
            local_value: json!("Local"),
            server_value: json!("Server"),
        }]
    );
}

#[tokio::test]
async fn test_conflict_resolved_local_reapplies() {
    let server = Arc::new(InMemoryServer::new());
    let base = diverged_remote(&server, "t1");
    let manager = manager_with(&server, true, manual_config());
    let mut rx = manager.subscribe();

    let action = manager.enqueue(rename("t1", "Local").based_on(base)).unwrap();
    manager.process_queue().await.unwrap();

    let events = drain_events(&mut rx);
    let SyncEvent::ConflictDetected { conflicts, .. } = &events[0] else {
        panic!("expected conflict, got {events:?}");
    };
    assert_eq!(
        conflicts,
        &vec![FieldConflict {
            field: "name".to_string(),
            local_value: json!("Local"),
            server_value: json!("Server"),
        }]
    );
    let conflict_id = first_conflict_id(&events);

    let final_data = manager
        .resolve_conflict(conflict_id, ConflictResolution::local())
        .unwrap();
    assert_eq!(final_data, json!({ "name": "Local" }));

    let requeued = manager.queue().get(action.id).unwrap();
    assert_eq!(requeued.sync_status, SyncStatus::Pending);
    assert!(requeued.conflict.is_none());
    assert!(requeued.base_timestamp > Some(base));

    let report = manager.process_queue().await.unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(
        server.remote(EntityKind::Tags, "t1").unwrap(),
        json!({ "name": "Local", "color": "#112233" })
    );
    assert!(drain_events(&mut rx).iter().any(|event| matches!(
        event,
        SyncEvent::ConflictResolved { conflict_id: id, .. } if *id == conflict_id
    )));
}

#[tokio::test]
async fn test_conflict_resolved_server_completes_without_reapply() {
    let server = Arc::new(InMemoryServer::new());
    let base = diverged_remote(&server, "t1");
    let manager = manager_with(&server, true, manual_config());
    let mut rx = manager.subscribe();

    manager.enqueue(rename("t1", "Local").based_on(base)).unwrap();
    let later = manager.enqueue(rename("t1", "Later").based_on(base)).unwrap();
    manager.process_queue().await.unwrap();
    let conflict_id = first_conflict_id(&drain_events(&mut rx));

    let final_data = manager
        .resolve_conflict(conflict_id, ConflictResolution::server())
        .unwrap();
    assert_eq!(final_data, json!({ "name": "Server", "color": "#112233" }));
    assert_eq!(manager.queue().size(), 1);
    assert_eq!(server.requests().len(), 1);

    // The follow-up now builds on the accepted server version
    let report = manager.process_queue().await.unwrap();
    assert_eq!(report.processed, 1);
    assert!(manager.queue().get(later.id).is_none());
    assert_eq!(
        server.remote(EntityKind::Tags, "t1").unwrap()["name"],
        "Later"
    );
}

#[tokio::test]
async fn test_conflict_resolved_merge_applies_merged_data() {
    let server = Arc::new(InMemoryServer::new());
    let base = diverged_remote(&server, "t1");
    let manager = manager_with(&server, true, manual_config());
    let mut rx = manager.subscribe();

    manager.enqueue(rename("t1", "Local").based_on(base)).unwrap();
    manager.process_queue().await.unwrap();
    let conflict_id = first_conflict_id(&drain_events(&mut rx));

    let missing_data = manager.resolve_conflict(
        conflict_id,
        ConflictResolution {
            choice: ResolutionChoice::Merge,
            merged_data: None,
        },
    );
    assert!(matches!(missing_data, Err(Error::Validation(_))));
    assert_eq!(manager.get_status().conflicts, 1);

    let merged = json!({ "name": "Local / Server" });
    manager
        .resolve_conflict(conflict_id, ConflictResolution::merge(merged))
        .unwrap();
    manager.process_queue().await.unwrap();

    assert_eq!(
        server.remote(EntityKind::Tags, "t1").unwrap()["name"],
        "Local / Server"
    );
    assert_eq!(manager.queue().size(), 0);
}

#[tokio::test]
async fn test_resolve_unknown_conflict_is_not_found() {
    let server = Arc::new(InMemoryServer::new());
    let manager = manager_with(&server, true, manual_config());

    let result = manager.resolve_conflict(ConflictId::new(), ConflictResolution::server());
    assert!(matches!(result, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn test_policy_prefer_local_resolves_within_drain() {
    let server = Arc::new(InMemoryServer::new());
    let base = diverged_remote(&server, "t1");
    let manager = manager_with(
        &server,
        true,
        OfflineConfig {
            resolution_policy: ResolutionPolicy::PreferLocal,
            ..manual_config()
        },
    );
    let mut rx = manager.subscribe();

    manager.enqueue(rename("t1", "Local").based_on(base)).unwrap();
    let report = manager.process_queue().await.unwrap();

    assert_eq!(report.conflicts, 1);
    assert_eq!(report.processed, 1);
    assert_eq!(manager.queue().size(), 0);
    assert_eq!(server.remote(EntityKind::Tags, "t1").unwrap()["name"], "Local");

    let kinds: Vec<&str> = drain_events(&mut rx)
        .iter()
        .map(|event| match event {
            SyncEvent::ConflictDetected { .. } => "detected",
            SyncEvent::ConflictResolved { .. } => "resolved",
            SyncEvent::SyncCompleted { .. } => "completed",
            _ => "other",
        })
        .collect();
    assert_eq!(kinds, vec!["detected", "resolved", "completed"]);
}

#[tokio::test]
async fn test_policy_merge_fields_overlays_local_changes() {
    let server = Arc::new(InMemoryServer::new());
    let base = server.set_remote(EntityKind::Tags, "t1", json!({ "name": "A" }));
    server.set_remote(
        EntityKind::Tags,
        "t1",
        json!({ "name": "A", "description": "from server" }),
    );
    let manager = manager_with(
        &server,
        true,
        OfflineConfig {
            resolution_policy: ResolutionPolicy::MergeFields,
            ..manual_config()
        },
    );

    manager
        .enqueue(
            ActionDraft::new(
                EntityKind::Tags,
                "t1",
                Operation::Update,
                json!({ "color": "#abcdef" }),
            )
            .based_on(base),
        )
        .unwrap();
    manager.process_queue().await.unwrap();

    assert_eq!(
        server.remote(EntityKind::Tags, "t1").unwrap(),
        json!({ "name": "A", "description": "from server", "color": "#abcdef" })
    );
}

#[tokio::test]
async fn test_stale_conflict_resolves_to_server() {
    let server = Arc::new(InMemoryServer::new());
    let base = diverged_remote(&server, "t1");
    let manager = manager_with(
        &server,
        true,
        OfflineConfig {
            conflict_timeout_secs: Some(0),
            ..manual_config()
        },
    );
    let mut rx = manager.subscribe();

    manager.enqueue(rename("t1", "Local").based_on(base)).unwrap();
    manager.process_queue().await.unwrap();
    assert_eq!(manager.get_status().conflicts, 1);

    manager.process_queue().await.unwrap();

    assert_eq!(manager.queue().size(), 0);
    assert_eq!(server.requests().len(), 1);
    assert!(drain_events(&mut rx).iter().any(|event| matches!(
        event,
        SyncEvent::ConflictResolved { resolution, .. }
            if resolution.choice == ResolutionChoice::Server
    )));
}

#[tokio::test]
async fn test_long_conflict_timeout_keeps_conflict() {
    let server = Arc::new(InMemoryServer::new());
    let base = diverged_remote(&server, "t1");
    let manager = manager_with(
        &server,
        true,
        OfflineConfig {
            conflict_timeout_secs: Some(365 * 24 * 60 * 60),
            ..manual_config()
        },
    );

    manager.enqueue(rename("t1", "Local").based_on(base)).unwrap();
    manager.process_queue().await.unwrap();
    manager.process_queue().await.unwrap();

    assert_eq!(manager.get_status().conflicts, 1);
    assert_eq!(server.requests().len(), 1);
}

/// Store that accepts a limited number of writes once armed
struct FlakyStore {
    inner: MemoryKeyValueStore,
    writes_left: std::sync::Mutex<Option<usize>>,
}

impl FlakyStore {
    fn new() -> Self {
        Self {
            inner: MemoryKeyValueStore::new(),
            writes_left: std::sync::Mutex::new(None),
        }
    }

    fn allow_writes(&self, limit: Option<usize>) {
        *self.writes_left.lock().unwrap() = limit;
    }
}

impl KeyValueStore for FlakyStore {
    fn get(&self, key: &str) -> crate::error::Result<Option<String>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> crate::error::Result<()> {
        if let Some(left) = self.writes_left.lock().unwrap().as_mut() {
            if *left == 0 {
                return Err(Error::Storage("disk full".to_string()));
            }
            *left -= 1;
        }
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> crate::error::Result<()> {
        self.inner.remove(key)
    }
}

#[tokio::test]
async fn test_unrecorded_outcome_returns_action_to_pending() {
    let server = Arc::new(InMemoryServer::new());
    let store = Arc::new(FlakyStore::new());
    let queue = QueueStore::open(store.clone()).unwrap();
    let manager = OfflineManager::new(
        queue,
        server.clone(),
        Connectivity::new(true),
        manual_config(),
    )
    .unwrap();
    let action = manager.enqueue(rename("t1", "Local")).unwrap();

    // marking the action syncing succeeds, removing it afterwards does not
    store.allow_writes(Some(1));
    let error = manager.process_queue().await.unwrap_err();
    assert!(matches!(error, Error::Storage(_)));
    assert_eq!(
        manager.queue().get(action.id).unwrap().sync_status,
        SyncStatus::Pending
    );
    assert!(!manager.get_status().sync_in_progress);

    store.allow_writes(None);
    let report = manager.process_queue().await.unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(manager.queue().size(), 0);
}

#[tokio::test]
async fn test_transient_failures_stop_at_retry_bound() {
    let server = Arc::new(InMemoryServer::new());
    server.fail_next((0..3).map(|_| EndpointError::Network("connection reset".to_string())));
    let manager = manager_with(
        &server,
        true,
        OfflineConfig {
            max_retries: 3,
            retry_base_delay_ms: 1,
            retry_max_delay_ms: 1,
            ..manual_config()
        },
    );
    let mut rx = manager.subscribe();
    let action = manager.enqueue(rename("t1", "A")).unwrap();

    for attempt in 1..=2 {
        let report = manager.process_queue().await.unwrap();
        assert_eq!(report.deferred, 1);
        let queued = manager.queue().get(action.id).unwrap();
        assert_eq!(queued.sync_status, SyncStatus::Pending);
        assert_eq!(queued.retry_count, attempt);
        assert!(queued.next_attempt_at.is_some());
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!drain_events(&mut rx)
        .iter()
        .any(|event| matches!(event, SyncEvent::SyncFailed { .. })));

    let report = manager.process_queue().await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(server.requests().len(), 3);

    let failed = manager.queue().get(action.id).unwrap();
    assert_eq!(failed.sync_status, SyncStatus::Failed);
    assert_eq!(failed.retry_count, 3);
    let events = drain_events(&mut rx);
    assert!(events.iter().any(|event| matches!(
        event,
        SyncEvent::SyncFailed { action: failed, error }
            if failed.id == action.id && error.contains("connection reset")
    )));

    // A failed action is left alone until someone retries it
    assert_eq!(manager.process_queue().await.unwrap().attempted(), 0);

    manager.retry_action(action.id).unwrap();
    let report = manager.process_queue().await.unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(server.remote(EntityKind::Tags, "t1").unwrap()["name"], "A");
}

#[tokio::test]
async fn test_rejected_request_fails_without_retry() {
    let server = Arc::new(InMemoryServer::new());
    server.fail_next([EndpointError::Rejected {
        status: 422,
        message: "name too long".to_string(),
    }]);
    let manager = manager_with(&server, true, manual_config());
    let action = manager.enqueue(rename("t1", "A")).unwrap();

    let report = manager.process_queue().await.unwrap();

    assert_eq!(report.failed, 1);
    let failed = manager.queue().get(action.id).unwrap();
    assert_eq!(failed.sync_status, SyncStatus::Failed);
    assert_eq!(failed.retry_count, 0);
    assert_eq!(manager.get_status().sync_state(), SyncState::Error);
}

#[tokio::test(start_paused = true)]
async fn test_slow_endpoint_times_out_and_defers() {
    let server = Arc::new(InMemoryServer::with_delay(Duration::from_secs(60)));
    let manager = manager_with(
        &server,
        true,
        OfflineConfig {
            attempt_timeout_secs: 1,
            ..manual_config()
        },
    );
    let action = manager.enqueue(rename("t1", "A")).unwrap();

    let report = manager.process_queue().await.unwrap();

    assert_eq!(report.deferred, 1);
    let queued = manager.queue().get(action.id).unwrap();
    assert_eq!(queued.retry_count, 1);
    assert_eq!(queued.last_error.as_deref(), Some("attempt timed out"));
}

#[tokio::test]
async fn test_discard_unblocks_stream() {
    let server = Arc::new(InMemoryServer::new());
    let base = diverged_remote(&server, "t1");
    let manager = manager_with(&server, true, manual_config());

    let stuck = manager.enqueue(rename("t1", "Local").based_on(base)).unwrap();
    manager.enqueue(rename("t1", "Next")).unwrap();
    manager.process_queue().await.unwrap();

    let discarded = manager.discard_action(stuck.id).unwrap();
    assert_eq!(discarded.sync_status, SyncStatus::Conflict);
    assert!(matches!(
        manager.discard_action(stuck.id),
        Err(Error::NotFound(_))
    ));

    manager.process_queue().await.unwrap();
    assert_eq!(server.remote(EntityKind::Tags, "t1").unwrap()["name"], "Next");
}

#[tokio::test]
async fn test_retry_rejects_conflicted_action() {
    let server = Arc::new(InMemoryServer::new());
    let base = diverged_remote(&server, "t1");
    let manager = manager_with(&server, true, manual_config());

    let action = manager.enqueue(rename("t1", "Local").based_on(base)).unwrap();
    manager.process_queue().await.unwrap();

    assert!(matches!(
        manager.retry_action(action.id),
        Err(Error::Validation(_))
    ));
}

#[tokio::test]
async fn test_queue_survives_restart_and_drains() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("offline.db");
    let server = Arc::new(InMemoryServer::new());

    let (first, second) = {
        let store: Arc<dyn KeyValueStore> = Arc::new(SqliteKeyValueStore::open(&path).unwrap());
        let manager =
            OfflineManager::open(store, server.clone(), Connectivity::new(false)).unwrap();
        let first = manager.enqueue(rename("t1", "A")).unwrap();
        let second = manager.enqueue(rename("t2", "B")).unwrap();
        // Crash mid-attempt
        manager
            .queue()
            .mark_status(first.id, SyncStatus::Syncing)
            .unwrap();
        (first, second)
    };

    let store: Arc<dyn KeyValueStore> = Arc::new(SqliteKeyValueStore::open(&path).unwrap());
    let manager = OfflineManager::open(store, server.clone(), Connectivity::new(true)).unwrap();
    let ids: Vec<ActionId> = manager.queue().all().iter().map(|action| action.id).collect();
    assert_eq!(ids, vec![first.id, second.id]);
    assert_eq!(manager.get_status().pending, 2);

    let report = manager.process_queue().await.unwrap();
    assert_eq!(report.processed, 2);
    assert_eq!(server.remote(EntityKind::Tags, "t1").unwrap()["name"], "A");
}

#[tokio::test]
async fn test_open_uses_persisted_config() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryKeyValueStore::new());
    OfflineConfig {
        max_retries: 2,
        ..OfflineConfig::default()
    }
    .save(store.as_ref())
    .unwrap();

    let server = Arc::new(InMemoryServer::new());
    let manager = OfflineManager::open(store, server, Connectivity::default()).unwrap();
    assert_eq!(manager.config().max_retries, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_initialize_is_idempotent_and_drains_on_reconnect() {
    let server = Arc::new(InMemoryServer::with_delay(Duration::from_millis(20)));
    let manager = manager_with(&server, false, OfflineConfig::default());
    let mut rx = manager.subscribe();

    manager.initialize();
    manager.initialize();
    for name in ["A", "B", "C"] {
        manager.enqueue(rename("t1", name)).unwrap();
    }
    assert!(server.requests().is_empty());

    manager.connectivity().set_online(true);
    let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(
        event,
        SyncEvent::SyncCompleted {
            processed: 3,
            conflicts: 0
        }
    );
    assert_eq!(server.requests().len(), 3);
    assert_eq!(server.max_in_flight(), 1);
    assert!(manager.get_status().is_initialized);

    manager.shutdown();
    assert!(!manager.get_status().is_initialized);
}

#[tokio::test]
async fn test_enqueue_after_initialize_syncs_in_background() {
    let server = Arc::new(InMemoryServer::new());
    let manager = manager_with(&server, true, OfflineConfig::default());
    let mut rx = manager.subscribe();
    manager.initialize();

    manager.enqueue(rename("t1", "A")).unwrap();
    let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();

    assert!(matches!(event, SyncEvent::SyncCompleted { processed: 1, .. }));
    assert_eq!(manager.queue().size(), 0);
    manager.shutdown();
}

#[tokio::test]
async fn test_initialize_reports_quarantined_records() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryKeyValueStore::new());
    store.set(QUEUE_KEY, "{not json").unwrap();

    let server = Arc::new(InMemoryServer::new());
    let manager = OfflineManager::open(store, server, Connectivity::new(false)).unwrap();
    let mut rx = manager.subscribe();
    manager.initialize();

    let events = drain_events(&mut rx);
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], SyncEvent::ActionQuarantined { .. }));
    assert_eq!(manager.get_status().quarantined, 1);
    manager.shutdown();
}
