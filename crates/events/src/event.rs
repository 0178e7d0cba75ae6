//! Typed domain events and their JSON codec.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

/// Field carrying the variant discriminant in the serialized form.
pub const EVENT_NAME_FIELD: &str = "eventName";
/// Field carrying the variant payload in the serialized form.
pub const BODY_FIELD: &str = "body";

/// A current-revision domain event: one enum, one variant per event name.
///
/// Implementors are serialized adjacently tagged, so the variant name becomes
/// the stored `eventName` and its payload becomes the stored `body`:
///
/// ```ignore
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// #[serde(tag = "eventName", content = "body", rename_all = "camelCase")]
/// enum TimestampEvent {
///     Init { datetime: DateTime<Utc> },
///     Update { datetime: DateTime<Utc> },
/// }
///
/// impl Event for TimestampEvent {
///     const REVISION: Option<u32> = Some(2);
/// }
/// ```
///
/// Events are:
/// - **immutable** (treat them as facts)
/// - **versioned** (`REVISION` is stamped on newly created events)
/// - designed to be **append-only**
pub trait Event: Clone + core::fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Schema revision of the shape this enum describes.
    const REVISION: Option<u32> = None;
}

/// An event split into its stored discriminant and payload.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedEvent {
    pub event_name: String,
    pub body: JsonValue,
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("event serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("event must serialize to an object with a string `eventName` field")]
    Untagged,
}

/// Failure to read a stored event as the current-revision enum.
///
/// Either the name matches no variant, or the body does not fit the variant.
#[derive(Debug, Error)]
#[error("cannot decode event `{event_name}`: {reason}")]
pub struct DecodeError {
    pub event_name: String,
    pub reason: String,
}

/// Split a typed event into `eventName` + `body`.
pub fn encode<E: Event>(event: &E) -> Result<EncodedEvent, EncodeError> {
    let JsonValue::Object(mut fields) = serde_json::to_value(event)? else {
        return Err(EncodeError::Untagged);
    };
    let event_name = match fields.remove(EVENT_NAME_FIELD) {
        Some(JsonValue::String(name)) => name,
        _ => return Err(EncodeError::Untagged),
    };
    let body = fields.remove(BODY_FIELD).unwrap_or(JsonValue::Null);
    Ok(EncodedEvent { event_name, body })
}

/// Rebuild a typed event from its stored `eventName` + `body`.
pub fn decode<E: Event>(event_name: &str, body: &JsonValue) -> Result<E, DecodeError> {
    let mut tagged = Map::with_capacity(2);
    tagged.insert(EVENT_NAME_FIELD.to_string(), JsonValue::String(event_name.to_string()));
    // Unit variants are serialized without a body.
    if !body.is_null() {
        tagged.insert(BODY_FIELD.to_string(), body.clone());
    }
    serde_json::from_value(JsonValue::Object(tagged)).map_err(|e| DecodeError {
        event_name: event_name.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "eventName", content = "body", rename_all = "camelCase")]
    enum Door {
        Opened { by: String },
        Closed,
    }

    impl Event for Door {}

    #[test]
    fn encodes_variant_name_and_payload() {
        let encoded = encode(&Door::Opened { by: "ana".into() }).unwrap();
        assert_eq!(encoded.event_name, "opened");
        assert_eq!(encoded.body, json!({ "by": "ana" }));
    }

    #[test]
    fn unit_variants_have_null_body() {
        let encoded = encode(&Door::Closed).unwrap();
        assert_eq!(encoded.event_name, "closed");
        assert_eq!(encoded.body, JsonValue::Null);
        assert_eq!(decode::<Door>("closed", &JsonValue::Null).unwrap(), Door::Closed);
    }

    #[test]
    fn decodes_known_variant() {
        let door: Door = decode("opened", &json!({ "by": "bo" })).unwrap();
        assert_eq!(door, Door::Opened { by: "bo".into() });
    }

    #[test]
    fn unknown_variant_fails_loudly() {
        let err = decode::<Door>("slammed", &json!({})).unwrap_err();
        assert_eq!(err.event_name, "slammed");
        assert!(err.reason.contains("unknown variant"), "{}", err.reason);
    }

    #[test]
    fn mismatched_body_is_rejected() {
        assert!(decode::<Door>("opened", &json!({ "who": "x" })).is_err());
    }
}
