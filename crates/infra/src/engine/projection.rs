//! Read path: rebuild entities by replaying their event streams.

use std::collections::{HashMap, HashSet};

use tracing::{error, instrument};

use eventide_core::{Entity, EntityId, Reducer, fold};
use eventide_events::{Event, RecordedEvent, map_event};

use crate::event_store::{EventStore, Filter, SortOrder};

use super::{Engine, EngineError};

impl<R, S> Engine<R, S>
where
    R: Reducer,
    R::Event: Event,
    S: EventStore,
{
    /// Replay one aggregate. `Ok(None)` when it has no events.
    #[instrument(skip(self), fields(entity_name = %self.config.entity_name), err)]
    pub async fn find_one(&self, entity_id: EntityId) -> Result<Option<Entity<R::State>>, EngineError> {
        let events = self
            .store
            .find_events_by_entity_ids(&self.config.entity_name, &[entity_id])
            .await?;
        self.replay(entity_id, events)
    }

    /// Replay several aggregates with a single storage round-trip.
    ///
    /// Results follow the order of `entity_ids`. Ids without events are
    /// omitted and repeated ids yield one entity.
    #[instrument(
        skip(self, entity_ids),
        fields(entity_name = %self.config.entity_name, requested = entity_ids.len()),
        err
    )]
    pub async fn find_by_ids(&self, entity_ids: &[EntityId]) -> Result<Vec<Entity<R::State>>, EngineError> {
        let mut seen = HashSet::with_capacity(entity_ids.len());
        let wanted: Vec<EntityId> = entity_ids.iter().copied().filter(|id| seen.insert(*id)).collect();
        if wanted.is_empty() {
            return Ok(Vec::new());
        }

        let events = self
            .store
            .find_events_by_entity_ids(&self.config.entity_name, &wanted)
            .await?;
        let mut streams: HashMap<EntityId, Vec<RecordedEvent>> = HashMap::new();
        for event in events {
            streams.entry(event.entity_id).or_default().push(event);
        }

        let mut found = Vec::with_capacity(streams.len());
        for id in wanted {
            let Some(stream) = streams.remove(&id) else {
                continue;
            };
            if let Some(entity) = self.replay(id, stream)? {
                found.push(entity);
            }
        }
        Ok(found)
    }

    /// Every aggregate with at least one event matching `filter`.
    pub async fn all(&self, filter: &Filter) -> Result<Vec<Entity<R::State>>, EngineError> {
        self.query_events(filter, None).await
    }

    /// Aggregates selected by an event scan, each fully replayed.
    ///
    /// `limit` bounds the number of scanned events (falling back to the
    /// configured default). Entities come back in the order their earliest
    /// matching event was found.
    #[instrument(skip(self), fields(entity_name = %self.config.entity_name), err)]
    pub async fn query_events(
        &self,
        filter: &Filter,
        limit: Option<usize>,
    ) -> Result<Vec<Entity<R::State>>, EngineError> {
        let limit = limit.or(self.config.default_query_limit);
        let events = self
            .store
            .find_events(&self.config.entity_name, filter, Some(SortOrder::Ascending), limit)
            .await?;

        // A complete, unfiltered scan already holds every stream in full.
        if filter.is_match_all() && limit.is_none() {
            return group_streams(events)
                .into_iter()
                .map(|(id, stream)| self.replay(id, stream))
                .filter_map(Result::transpose)
                .collect();
        }

        let ids: Vec<EntityId> = group_streams(events).into_iter().map(|(id, _)| id).collect();
        self.find_by_ids(&ids).await
    }

    /// Aggregates whose snapshot document matches `filter`, each fully replayed.
    ///
    /// Snapshots only select; the returned entities come from the log.
    #[instrument(skip(self), fields(entity_name = %self.config.entity_name), err)]
    pub async fn query_snapshots(
        &self,
        filter: &Filter,
        limit: Option<usize>,
    ) -> Result<Vec<Entity<R::State>>, EngineError> {
        if !self.config.snapshots {
            return Err(EngineError::configuration(format!(
                "snapshots are disabled for `{}`",
                self.config.entity_name
            )));
        }
        let limit = limit.or(self.config.default_query_limit);
        let refs = self
            .store
            .query_snapshot_docs(&self.config.entity_name, filter, limit)
            .await?;
        let ids: Vec<EntityId> = refs.into_iter().map(|r| r.entity_id).collect();
        self.find_by_ids(&ids).await
    }

    /// Fold one aggregate's events into an entity.
    ///
    /// Events are stable-sorted by `event_created_at`, so equal timestamps keep
    /// the store's retrieval order.
    pub(super) fn replay(
        &self,
        entity_id: EntityId,
        mut events: Vec<RecordedEvent>,
    ) -> Result<Option<Entity<R::State>>, EngineError> {
        events.sort_by_key(|e| e.event_created_at);
        let (Some(first), Some(last)) = (events.first(), events.last()) else {
            return Ok(None);
        };
        let (created_at, updated_at) = (first.event_created_at, last.event_created_at);

        let decoded = events
            .into_iter()
            .map(|event| self.decode_current(event))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(Entity {
            entity_id,
            entity_name: self.config.entity_name.clone(),
            created_at,
            updated_at,
            state: fold(&self.reducer, &decoded),
        }))
    }

    /// Map a stored event to the current revision and decode it.
    pub(super) fn decode_current(&self, event: RecordedEvent) -> Result<R::Event, EngineError> {
        let mapped = map_event(self.mapper(), event);
        match mapped.decode::<R::Event>() {
            Ok(event) => Ok(event),
            Err(err) => {
                error!(
                    entity_id = %mapped.entity_id,
                    event_id = %mapped.event_id,
                    event_name = %mapped.event_name,
                    revision = ?mapped.revision,
                    "event does not decode as a known variant"
                );
                Err(EngineError::ReducerContractViolation {
                    entity_id: mapped.entity_id,
                    event_id: mapped.event_id,
                    event_name: mapped.event_name,
                    revision: mapped.revision,
                    reason: err.reason,
                })
            }
        }
    }
}

/// Split a scan into per-aggregate streams, in first-seen order.
fn group_streams(events: Vec<RecordedEvent>) -> Vec<(EntityId, Vec<RecordedEvent>)> {
    let mut index: HashMap<EntityId, usize> = HashMap::new();
    let mut streams: Vec<(EntityId, Vec<RecordedEvent>)> = Vec::new();
    for event in events {
        let slot = *index.entry(event.entity_id).or_insert_with(|| {
            streams.push((event.entity_id, Vec::new()));
            streams.len() - 1
        });
        streams[slot].1.push(event);
    }
    streams
}
