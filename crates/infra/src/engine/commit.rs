//! Commit pipeline.
//!
//! ```text
//! before_commit (each plugin, in order; any Abort stops here)
//!   -> append_event
//!   -> upsert_snapshot (when snapshots are enabled)
//!   -> on_committed (each plugin, in order)
//! ```
//!
//! The append and the snapshot write are separate store calls. If the
//! snapshot write fails the event stays appended, the snapshot is stale, and
//! the error is returned without running `on_committed`.

use serde::Serialize;
use tracing::{info, instrument, warn};

use eventide_core::{Entity, Reducer};
use eventide_events::{CommitContext, Event, RecordedEvent, map_event};

use crate::event_store::{EventStore, SnapshotDocument};

use super::{Engine, EngineError};

/// Result of a commit that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The event was appended (and the snapshot upserted, if enabled).
    Committed,
    /// A `before_commit` hook vetoed the commit; nothing was written.
    Aborted { plugin: String },
}

impl CommitOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, CommitOutcome::Committed)
    }
}

impl<R, S> Engine<R, S>
where
    R: Reducer,
    R::Event: Event,
    R::State: Serialize,
    S: EventStore,
{
    /// Persist a staged event and run the commit hooks around it.
    #[instrument(
        skip_all,
        fields(
            entity_name = %self.config.entity_name,
            entity_id = %event.entity_id,
            event_id = %event.event_id,
            event_name = %event.event_name,
        ),
        err
    )]
    pub async fn commit(
        &self,
        event: RecordedEvent,
        entity: Entity<R::State>,
        prior: Option<Entity<R::State>>,
    ) -> Result<CommitOutcome, EngineError> {
        let mapped = map_event(self.mapper(), event.clone());
        let ctx = CommitContext {
            event: &mapped,
            entity: &entity,
            prior: prior.as_ref(),
        };

        for plugin in &self.plugins {
            if plugin.before_commit(ctx).await.is_abort() {
                info!(plugin = plugin.name(), "commit aborted by plugin");
                return Ok(CommitOutcome::Aborted {
                    plugin: plugin.name().to_string(),
                });
            }
        }

        // Serialize before writing anything so a bad state cannot leave a
        // half-finished commit behind.
        let snapshot = if self.config.snapshots {
            Some(SnapshotDocument::from_entity(&entity)?)
        } else {
            None
        };

        self.store.append_event(&event).await?;

        if let Some(doc) = snapshot {
            if let Err(err) = self.store.upsert_snapshot(&doc).await {
                warn!(error = %err, "event appended but snapshot write failed; snapshot is stale");
                return Err(err.into());
            }
        }

        for plugin in &self.plugins {
            plugin.on_committed(ctx).await;
        }
        Ok(CommitOutcome::Committed)
    }
}
