//! Read-time mapping of historical event revisions to the current shape.
//!
//! Stored events are never migrated. Instead every event read from the log
//! (and every freshly synthesized one) passes through a [`Mapper`] before it
//! reaches the reducer or a commit hook, so the reducer only ever sees
//! current-revision events.

use std::collections::HashMap;
use std::sync::Arc;

use crate::RecordedEvent;

/// Total, pure mapping from any stored revision to the current one.
///
/// Must not perform IO. Events already in the current shape are returned
/// unchanged.
pub trait Mapper: Send + Sync {
    fn map(&self, event: RecordedEvent) -> RecordedEvent;
}

impl<F> Mapper for F
where
    F: Fn(RecordedEvent) -> RecordedEvent + Send + Sync,
{
    fn map(&self, event: RecordedEvent) -> RecordedEvent {
        self(event)
    }
}

/// Apply an optional mapper; absence means identity.
pub fn map_event(mapper: Option<&dyn Mapper>, event: RecordedEvent) -> RecordedEvent {
    match mapper {
        Some(m) => m.map(event),
        None => event,
    }
}

type Upcaster = Arc<dyn Fn(RecordedEvent) -> RecordedEvent + Send + Sync>;

/// Registry of single-step upcasters keyed by `(event_name, revision)`.
///
/// Each upcaster lifts an event one revision forward (and may rename it).
/// Mapping repeats until no upcaster matches, so `v1 -> v2 -> v3` chains are
/// expressed as two registrations.
#[derive(Clone, Default)]
pub struct RevisionMapper {
    upcasters: HashMap<(String, Option<u32>), Upcaster>,
}

impl RevisionMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the upcaster for events named `event_name` at `from_revision`.
    pub fn upcast<F>(mut self, event_name: impl Into<String>, from_revision: Option<u32>, f: F) -> Self
    where
        F: Fn(RecordedEvent) -> RecordedEvent + Send + Sync + 'static,
    {
        self.upcasters
            .insert((event_name.into(), from_revision), Arc::new(f));
        self
    }

    pub fn len(&self) -> usize {
        self.upcasters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.upcasters.is_empty()
    }
}

impl core::fmt::Debug for RevisionMapper {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RevisionMapper")
            .field("upcasters", &self.upcasters.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Mapper for RevisionMapper {
    fn map(&self, mut event: RecordedEvent) -> RecordedEvent {
        // Each registered step may fire at most once per event, which bounds
        // the chain even if upcasters form a cycle.
        for _ in 0..self.upcasters.len() {
            let key = (event.event_name.clone(), event.revision);
            let Some(step) = self.upcasters.get(&key) else {
                break;
            };
            let lifted = step(event);
            if lifted.event_name == key.0 && lifted.revision == key.1 {
                tracing::warn!(
                    event_name = %key.0,
                    revision = ?key.1,
                    "upcaster left event revision unchanged; stopping chain"
                );
                return lifted;
            }
            event = lifted;
        }
        event
    }
}
