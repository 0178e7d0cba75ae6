use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use eventide_core::{Entity, EntityId, EventId};
use eventide_events::RecordedEvent;
use std::sync::Arc;

use super::query::{Filter, SortOrder};

/// Cached projection of one aggregate, keyed by `(entity_name, entity_id)`.
///
/// A snapshot is an index for queries, never authoritative state: the engine
/// resolves every snapshot hit back through a full replay of the event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotDocument {
    pub entity_id: EntityId,
    pub entity_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub state: JsonValue,
}

impl SnapshotDocument {
    pub fn from_entity<S: Serialize>(entity: &Entity<S>) -> Result<Self, EventStoreError> {
        let state = serde_json::to_value(&entity.state)
            .map_err(|e| EventStoreError::Serialization(format!("snapshot state: {e}")))?;
        Ok(Self {
            entity_id: entity.entity_id,
            entity_name: entity.entity_name.clone(),
            created_at: entity.created_at,
            updated_at: entity.updated_at,
            state,
        })
    }

    /// The document filters are evaluated against.
    pub fn to_json(&self) -> Result<JsonValue, EventStoreError> {
        serde_json::to_value(self)
            .map_err(|e| EventStoreError::Serialization(format!("snapshot document: {e}")))
    }
}

/// Result of a snapshot query: just the key to resolve through replay.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotRef {
    pub entity_id: EntityId,
}

/// Event store operation error (the storage error class).
///
/// These are **infrastructure errors**. The engine propagates them verbatim
/// and never retries; retry policy belongs to the caller.
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// An event with this id was already appended.
    #[error("duplicate event id: {0}")]
    DuplicateEvent(EventId),

    /// The backing store rejected or failed the operation.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// A record could not be converted to or from its stored form.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The store is not reachable (closed pool, network failure, ...).
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Append-only event log plus an optional snapshot document cache.
///
/// ## Design Principles
///
/// - **Append-only**: events are inserted once, keyed by `event_id`, and never
///   updated or deleted
/// - **No ordering promise across ids**: grouping and ordering are the engine's
///   job; the store's native retrieval order is only used as a tie-break for
///   events with equal timestamps
/// - **Independent writes**: `append_event` and `upsert_snapshot` are separate
///   operations with no transaction spanning both
///
/// Snapshot methods are only called when snapshotting is enabled on the engine.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Durably insert one event. Fails with `DuplicateEvent` if `event_id` exists.
    async fn append_event(&self, event: &RecordedEvent) -> Result<(), EventStoreError>;

    /// Events of `entity_name` matching `filter`, optionally sorted by
    /// `eventCreatedAt` and truncated to `limit`.
    async fn find_events(
        &self,
        entity_name: &str,
        filter: &Filter,
        sort: Option<SortOrder>,
        limit: Option<usize>,
    ) -> Result<Vec<RecordedEvent>, EventStoreError>;

    /// Every event of every listed aggregate, in one round-trip (unordered across ids).
    async fn find_events_by_entity_ids(
        &self,
        entity_name: &str,
        ids: &[EntityId],
    ) -> Result<Vec<RecordedEvent>, EventStoreError>;

    /// Insert or replace the snapshot keyed by the document's `entity_id`.
    async fn upsert_snapshot(&self, doc: &SnapshotDocument) -> Result<(), EventStoreError>;

    /// Snapshot keys of `entity_name` whose document matches `filter`.
    async fn query_snapshot_docs(
        &self,
        entity_name: &str,
        filter: &Filter,
        limit: Option<usize>,
    ) -> Result<Vec<SnapshotRef>, EventStoreError>;
}

#[async_trait]
impl<S> EventStore for Arc<S>
where
    S: EventStore + ?Sized,
{
    async fn append_event(&self, event: &RecordedEvent) -> Result<(), EventStoreError> {
        (**self).append_event(event).await
    }

    async fn find_events(
        &self,
        entity_name: &str,
        filter: &Filter,
        sort: Option<SortOrder>,
        limit: Option<usize>,
    ) -> Result<Vec<RecordedEvent>, EventStoreError> {
        (**self).find_events(entity_name, filter, sort, limit).await
    }

    async fn find_events_by_entity_ids(
        &self,
        entity_name: &str,
        ids: &[EntityId],
    ) -> Result<Vec<RecordedEvent>, EventStoreError> {
        (**self).find_events_by_entity_ids(entity_name, ids).await
    }

    async fn upsert_snapshot(&self, doc: &SnapshotDocument) -> Result<(), EventStoreError> {
        (**self).upsert_snapshot(doc).await
    }

    async fn query_snapshot_docs(
        &self,
        entity_name: &str,
        filter: &Filter,
        limit: Option<usize>,
    ) -> Result<Vec<SnapshotRef>, EventStoreError> {
        (**self).query_snapshot_docs(entity_name, filter, limit).await
    }
}
