use thiserror::Error;

use eventide_core::{EntityId, EventId};
use eventide_events::EncodeError;

use crate::config::ConfigError;
use crate::event_store::EventStoreError;

/// Failure of an engine operation.
///
/// Absence is not an error: `find_one` returns `Ok(None)` for an aggregate
/// with no events.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The event store failed; propagated verbatim, never retried.
    #[error(transparent)]
    Storage(#[from] EventStoreError),

    /// The operation is not available with this engine's configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A stored event reached the reducer as a variant it does not know, even
    /// after mapping.
    #[error(
        "reducer contract violated by event {event_id} (`{event_name}`, revision {revision:?}) \
         of entity {entity_id}: {reason}"
    )]
    ReducerContractViolation {
        entity_id: EntityId,
        event_id: EventId,
        event_name: String,
        revision: Option<u32>,
        reason: String,
    },

    /// A new event could not be turned into its stored form.
    #[error("event encoding failed: {0}")]
    Encode(#[from] EncodeError),
}

impl From<ConfigError> for EngineError {
    fn from(value: ConfigError) -> Self {
        EngineError::Configuration(value.to_string())
    }
}

impl EngineError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn is_storage(&self) -> bool {
        matches!(self, EngineError::Storage(_))
    }
}
