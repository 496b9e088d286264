//! In-memory reconciliation server for engine tests

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde_json::Value;

use super::action::{Operation, StreamKey};
use super::conflict::diff_fields;
use super::endpoint::{EndpointError, ReconciliationEndpoint, SyncRequest, SyncResult};
use crate::models::EntityKind;

#[derive(Default)]
struct ServerState {
    entities: HashMap<StreamKey, (Value, DateTime<Utc>)>,
    clock: Option<DateTime<Utc>>,
    log: Vec<SyncRequest>,
    scripted: VecDeque<Result<SyncResult, EndpointError>>,
}

impl ServerState {
    /// Strictly increasing server clock
    fn tick(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let next = match self.clock {
            Some(previous) if previous >= now => previous + TimeDelta::milliseconds(1),
            _ => now,
        };
        self.clock = Some(next);
        next
    }
}

/// Keeps entities with a version timestamp and rejects stale writes
#[derive(Default)]
pub(crate) struct InMemoryServer {
    state: Mutex<ServerState>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl InMemoryServer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Hold every apply for `delay` before answering
    pub(crate) fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    fn state(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap()
    }

    /// Fail the next apply calls with `errors`, in order
    pub(crate) fn fail_next(&self, errors: impl IntoIterator<Item = EndpointError>) {
        self.state().scripted.extend(errors.into_iter().map(Err));
    }

    /// Answer the next apply call with `result` verbatim
    pub(crate) fn reply_next(&self, result: SyncResult) {
        self.state().scripted.push_back(Ok(result));
    }

    /// Change an entity server-side; returns its new version
    pub(crate) fn set_remote(
        &self,
        entity: EntityKind,
        entity_id: &str,
        data: Value,
    ) -> DateTime<Utc> {
        let mut state = self.state();
        let timestamp = state.tick();
        state.entities.insert(
            StreamKey {
                entity,
                entity_id: entity_id.to_string(),
            },
            (data, timestamp),
        );
        timestamp
    }

    pub(crate) fn remote(&self, entity: EntityKind, entity_id: &str) -> Option<Value> {
        self.state()
            .entities
            .get(&StreamKey {
                entity,
                entity_id: entity_id.to_string(),
            })
            .map(|(data, _)| data.clone())
    }

    /// Every request received, including failed ones
    pub(crate) fn requests(&self) -> Vec<SyncRequest> {
        self.state().log.clone()
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn handle(&self, request: SyncRequest) -> Result<SyncResult, EndpointError> {
        let mut state = self.state();
        state.log.push(request.clone());
        if let Some(reply) = state.scripted.pop_front() {
            return reply;
        }

        let key = StreamKey {
            entity: request.entity,
            entity_id: request.entity_id.clone(),
        };
        if let (Some((current, version)), Some(base)) =
            (state.entities.get(&key), request.base_timestamp)
        {
            if *version > base {
                let conflicts = diff_fields(&request.payload, current);
                return Ok(SyncResult::conflict(current.clone(), *version, conflicts));
            }
        }

        let timestamp = state.tick();
        match request.operation {
            Operation::Delete => {
                state.entities.remove(&key);
                Ok(SyncResult::applied(None, timestamp))
            }
            Operation::Create | Operation::Update => {
                let mut data = state
                    .entities
                    .get(&key)
                    .map(|(current, _)| current.clone())
                    .filter(|_| request.operation == Operation::Update)
                    .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
                match (&mut data, request.payload) {
                    (Value::Object(target), Value::Object(patch)) => target.extend(patch),
                    (target, payload) => *target = payload,
                }
                state.entities.insert(key, (data.clone(), timestamp));
                Ok(SyncResult::applied(Some(data), timestamp))
            }
        }
    }
}

#[async_trait]
impl ReconciliationEndpoint for InMemoryServer {
    async fn apply(&self, request: SyncRequest) -> Result<SyncResult, EndpointError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let result = self.handle(request);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
