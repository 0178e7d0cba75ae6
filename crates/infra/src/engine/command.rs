//! Command path: synthesize one event and stage the entity it produces.
//!
//! Staging has no side effects. Nothing is persisted and no hook runs until
//! the [`Staged`] result is committed.

use tracing::{debug, instrument};

use eventide_core::{Entity, EntityId, Reducer};
use eventide_events::{Event, RecordedEvent};

use crate::event_store::EventStore;

use super::{CommitOutcome, Engine, EngineError};

/// An uncommitted event together with the entity it would produce.
pub struct Staged<'e, R: Reducer, S> {
    engine: &'e Engine<R, S>,
    /// The event to append, as synthesized (before mapping).
    pub event: RecordedEvent,
    /// The candidate entity after folding `event`.
    pub entity: Entity<R::State>,
    /// The entity the command started from (`None` for `create`).
    pub prior: Option<Entity<R::State>>,
}

impl<R: Reducer, S> core::fmt::Debug for Staged<'_, R, S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Staged")
            .field("event", &self.event)
            .field("entity", &self.entity)
            .field("prior", &self.prior)
            .finish_non_exhaustive()
    }
}

impl<R, S> Staged<'_, R, S>
where
    R: Reducer,
    R::Event: Event,
    R::State: serde::Serialize,
    S: EventStore,
{
    /// Run the commit pipeline on this staged event.
    pub async fn commit(self) -> Result<CommitOutcome, EngineError> {
        self.engine.commit(self.event, self.entity, self.prior).await
    }

    /// Drop the engine handle, e.g. to commit later through [`Engine::commit`].
    pub fn into_parts(self) -> (RecordedEvent, Entity<R::State>, Option<Entity<R::State>>) {
        (self.event, self.entity, self.prior)
    }
}

impl<R, S> Engine<R, S>
where
    R: Reducer,
    R::Event: Event,
    S: EventStore,
{
    /// Stage the first event of a new aggregate.
    ///
    /// The event is folded against the zero state even when `entity_id` names
    /// an aggregate that already has events.
    #[instrument(skip(self, event), fields(entity_name = %self.config.entity_name), err)]
    pub fn create(
        &self,
        event: R::Event,
        entity_id: Option<EntityId>,
    ) -> Result<Staged<'_, R, S>, EngineError> {
        let entity_id = entity_id.unwrap_or_else(|| self.ids.next_entity_id());
        let recorded = self.record(entity_id, &event, None)?;
        let current = self.decode_current(recorded.clone())?;
        let state = self.reducer.reduce(R::State::default(), &current);

        let entity = Entity {
            entity_id,
            entity_name: self.config.entity_name.clone(),
            created_at: recorded.event_created_at,
            updated_at: recorded.event_created_at,
            state,
        };
        Ok(Staged {
            engine: self,
            event: recorded,
            entity,
            prior: None,
        })
    }

    /// Stage one more event against an existing entity.
    #[instrument(
        skip(self, prior, event),
        fields(entity_name = %self.config.entity_name, entity_id = %prior.entity_id),
        err
    )]
    pub fn dispatch(
        &self,
        prior: &Entity<R::State>,
        event: R::Event,
    ) -> Result<Staged<'_, R, S>, EngineError> {
        let recorded = self.record(prior.entity_id, &event, Some(prior))?;
        let current = self.decode_current(recorded.clone())?;
        let state = self.reducer.reduce(prior.state.clone(), &current);

        let entity = prior.advance(state, recorded.event_created_at);
        Ok(Staged {
            engine: self,
            event: recorded,
            entity,
            prior: Some(prior.clone()),
        })
    }

    /// Build the stored form of a new event.
    ///
    /// The timestamp never precedes the prior entity's `updated_at`, so a
    /// clock that steps backwards cannot reorder the stream on replay.
    fn record(
        &self,
        entity_id: EntityId,
        event: &R::Event,
        prior: Option<&Entity<R::State>>,
    ) -> Result<RecordedEvent, EngineError> {
        let now = self.clock.now();
        let at = match prior {
            Some(prior) if now < prior.updated_at => {
                debug!(%now, prior = %prior.updated_at, "clock behind stream head; clamping");
                prior.updated_at
            }
            _ => now,
        };
        Ok(RecordedEvent::from_typed(
            self.ids.next_event_id(),
            self.config.entity_name.clone(),
            entity_id,
            at,
            event,
        )?)
    }
}
