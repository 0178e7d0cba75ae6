use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use eventide_core::{EntityId, EventId};
use eventide_events::RecordedEvent;

use super::query::{Filter, SortOrder};
use super::r#trait::{EventStore, EventStoreError, SnapshotDocument, SnapshotRef};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SnapshotKey {
    entity_name: String,
    entity_id: EntityId,
}

#[derive(Debug, Default)]
struct Inner {
    /// The log, in append order (the store's native retrieval order).
    events: Vec<RecordedEvent>,
    event_ids: HashSet<EventId>,
    /// Snapshots in first-upsert order, indexed by key.
    snapshots: Vec<SnapshotDocument>,
    snapshot_index: HashMap<SnapshotKey, usize>,
}

/// In-memory append-only event store with a snapshot document cache.
///
/// Intended for tests/dev. Not optimized for performance: every query is a
/// linear scan.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    inner: RwLock<Inner>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events in the log (all entity names).
    pub async fn len(&self) -> usize {
        self.inner.read().await.events.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Copy of the whole log in append order.
    pub async fn events(&self) -> Vec<RecordedEvent> {
        self.inner.read().await.events.clone()
    }

    /// Current snapshot document for an aggregate, if one was upserted.
    pub async fn snapshot(&self, entity_name: &str, entity_id: EntityId) -> Option<SnapshotDocument> {
        let inner = self.inner.read().await;
        let key = SnapshotKey {
            entity_name: entity_name.to_string(),
            entity_id,
        };
        inner
            .snapshot_index
            .get(&key)
            .map(|&idx| inner.snapshots[idx].clone())
    }
}

fn event_json(event: &RecordedEvent) -> Result<serde_json::Value, EventStoreError> {
    serde_json::to_value(event)
        .map_err(|e| EventStoreError::Serialization(format!("event {}: {e}", event.event_id)))
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append_event(&self, event: &RecordedEvent) -> Result<(), EventStoreError> {
        let mut inner = self.inner.write().await;
        if !inner.event_ids.insert(event.event_id) {
            return Err(EventStoreError::DuplicateEvent(event.event_id));
        }
        inner.events.push(event.clone());
        Ok(())
    }

    async fn find_events(
        &self,
        entity_name: &str,
        filter: &Filter,
        sort: Option<SortOrder>,
        limit: Option<usize>,
    ) -> Result<Vec<RecordedEvent>, EventStoreError> {
        let inner = self.inner.read().await;

        let mut found = Vec::new();
        for event in inner.events.iter().filter(|e| e.entity_name == entity_name) {
            if filter.is_match_all() || filter.matches(&event_json(event)?) {
                found.push(event.clone());
            }
        }

        // Stable sorts keep append order for equal timestamps.
        match sort {
            Some(SortOrder::Ascending) => found.sort_by_key(|e| e.event_created_at),
            Some(SortOrder::Descending) => {
                found.sort_by(|a, b| b.event_created_at.cmp(&a.event_created_at))
            }
            None => {}
        }
        if let Some(limit) = limit {
            found.truncate(limit);
        }
        Ok(found)
    }

    async fn find_events_by_entity_ids(
        &self,
        entity_name: &str,
        ids: &[EntityId],
    ) -> Result<Vec<RecordedEvent>, EventStoreError> {
        let wanted: HashSet<EntityId> = ids.iter().copied().collect();
        let inner = self.inner.read().await;
        Ok(inner
            .events
            .iter()
            .filter(|e| e.entity_name == entity_name && wanted.contains(&e.entity_id))
            .cloned()
            .collect())
    }

    async fn upsert_snapshot(&self, doc: &SnapshotDocument) -> Result<(), EventStoreError> {
        let mut inner = self.inner.write().await;
        let key = SnapshotKey {
            entity_name: doc.entity_name.clone(),
            entity_id: doc.entity_id,
        };
        match inner.snapshot_index.get(&key).copied() {
            Some(idx) => inner.snapshots[idx] = doc.clone(),
            None => {
                let idx = inner.snapshots.len();
                inner.snapshots.push(doc.clone());
                inner.snapshot_index.insert(key, idx);
            }
        }
        Ok(())
    }

    async fn query_snapshot_docs(
        &self,
        entity_name: &str,
        filter: &Filter,
        limit: Option<usize>,
    ) -> Result<Vec<SnapshotRef>, EventStoreError> {
        let inner = self.inner.read().await;
        let mut refs = Vec::new();
        for doc in inner.snapshots.iter().filter(|d| d.entity_name == entity_name) {
            if limit.is_some_and(|l| refs.len() >= l) {
                break;
            }
            if filter.is_match_all() || filter.matches(&doc.to_json()?) {
                refs.push(SnapshotRef {
                    entity_id: doc.entity_id,
                });
            }
        }
        Ok(refs)
    }
}
