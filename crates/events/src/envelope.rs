use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use eventide_core::{EntityId, EventId};

use crate::event::{DecodeError, EncodeError, Event, decode, encode};

/// A domain event as it sits in the append-only log.
///
/// This is the unit you persist/append, and the shape hooks and mappers see.
///
/// Notes:
/// - **Append-only**: once stored, a record is never mutated or deleted. The
///   `with_*` builders return new records for mappers to hand back.
/// - All records sharing `entity_id` form one aggregate's stream, ordered by
///   `event_created_at`.
/// - `revision` is the schema tag of `body` (absent for unversioned events).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedEvent {
    pub event_id: EventId,
    pub event_name: String,
    pub event_created_at: DateTime<Utc>,
    pub entity_name: String,
    pub entity_id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<u32>,
    #[serde(default)]
    pub body: JsonValue,
}

impl RecordedEvent {
    /// Record a typed event, stamping it with `E::REVISION`.
    pub fn from_typed<E: Event>(
        event_id: EventId,
        entity_name: impl Into<String>,
        entity_id: EntityId,
        event_created_at: DateTime<Utc>,
        event: &E,
    ) -> Result<Self, EncodeError> {
        let encoded = encode(event)?;
        Ok(Self {
            event_id,
            event_name: encoded.event_name,
            event_created_at,
            entity_name: entity_name.into(),
            entity_id,
            revision: E::REVISION,
            body: encoded.body,
        })
    }

    /// Read the body as the current-revision event enum.
    pub fn decode<E: Event>(&self) -> Result<E, DecodeError> {
        decode(&self.event_name, &self.body)
    }

    pub fn with_revision(self, revision: Option<u32>) -> Self {
        Self { revision, ..self }
    }

    pub fn with_event_name(self, event_name: impl Into<String>) -> Self {
        Self {
            event_name: event_name.into(),
            ..self
        }
    }

    pub fn with_body(self, body: JsonValue) -> Self {
        Self { body, ..self }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "eventName", content = "body")]
    enum Ping {
        #[serde(rename = "ping")]
        Ping { n: u32 },
    }

    impl Event for Ping {
        const REVISION: Option<u32> = Some(3);
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn from_typed_stamps_revision_and_splits_body() {
        let entity_id = EntityId::new();
        let rec = RecordedEvent::from_typed(EventId::new(), "pinger", entity_id, at(), &Ping::Ping { n: 7 })
            .unwrap();

        assert_eq!(rec.event_name, "ping");
        assert_eq!(rec.revision, Some(3));
        assert_eq!(rec.body, json!({ "n": 7 }));
        assert_eq!(rec.entity_id, entity_id);
        assert_eq!(rec.decode::<Ping>().unwrap(), Ping::Ping { n: 7 });
    }

    #[test]
    fn wire_names_are_camel_case() {
        let rec = RecordedEvent::from_typed(EventId::new(), "pinger", EntityId::new(), at(), &Ping::Ping { n: 1 })
            .unwrap();
        let json = serde_json::to_value(&rec).unwrap();

        for field in ["eventId", "eventName", "eventCreatedAt", "entityName", "entityId", "revision", "body"] {
            assert!(json.get(field).is_some(), "missing {field}");
        }
    }

    #[test]
    fn builders_do_not_touch_identity() {
        let rec = RecordedEvent::from_typed(EventId::new(), "pinger", EntityId::new(), at(), &Ping::Ping { n: 1 })
            .unwrap();
        let mapped = rec
            .clone()
            .with_revision(Some(4))
            .with_event_name("pong")
            .with_body(json!({}));

        assert_eq!(mapped.event_id, rec.event_id);
        assert_eq!(mapped.entity_id, rec.entity_id);
        assert_eq!(mapped.event_created_at, rec.event_created_at);
        assert_eq!(mapped.revision, Some(4));
    }
}
