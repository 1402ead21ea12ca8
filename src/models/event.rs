//! Ingested event models and batch normalization.
//!
//! SDKs submit events with some field-name latitude: the event type may
//! arrive as `type` or `name`, and its payload as `payload` or `properties`.
//! The aliases are resolved exactly once at the boundary into a single
//! canonical [`NormalizedEvent`]; everything downstream sees one shape.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use uuid::Uuid;

/// Maximum length of an event type string.
const MAX_TYPE_LEN: usize = 80;

/// Raw event element as submitted by an SDK, before normalization.
///
/// Unknown fields are retained in `rest` and carried through into the
/// stored payload so clients can attach arbitrary extra attributes.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEvent {
    /// Caller-supplied stable identifier, used for deduplication.
    /// Generated server-side when absent.
    pub event_id: Option<Uuid>,

    /// Event type, primary field name
    #[serde(rename = "type")]
    pub event_type: Option<String>,

    /// Event type, accepted alias
    pub name: Option<String>,

    /// Payload, primary field name
    pub payload: Option<Value>,

    /// Payload, accepted alias
    pub properties: Option<Value>,

    /// Any additional fields the client sent (timestamps, context, ...)
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

/// Canonical internal event representation after alias resolution.
#[derive(Debug, Clone)]
pub struct NormalizedEvent {
    /// Dedup identifier; unique per environment
    pub event_id: Uuid,

    pub event_type: String,

    /// Stored payload document: the original element with `type`, `payload`
    /// and `event_id` rewritten to their resolved values.
    pub payload_json: Value,
}

impl RawEvent {
    /// Resolve field aliases into a [`NormalizedEvent`].
    ///
    /// `type` wins over `name`, `payload` over `properties`. Returns an
    /// error message when neither type alias is present or the type is
    /// empty/too long; the caller surfaces it as `invalid_request`.
    pub fn normalize(self) -> Result<NormalizedEvent, String> {
        let event_type = match self.event_type.or(self.name) {
            Some(t) if !t.is_empty() && t.len() <= MAX_TYPE_LEN => t,
            Some(_) => {
                return Err(format!(
                    "event type must be 1..={MAX_TYPE_LEN} characters"
                ));
            }
            None => return Err("either `type` or `name` is required".to_string()),
        };

        let payload = self.payload.or(self.properties).unwrap_or(Value::Null);
        let event_id = self.event_id.unwrap_or_else(Uuid::new_v4);

        // Preserve extra client fields alongside the resolved ones
        let mut payload_json = self.rest;
        payload_json.insert("type".to_string(), Value::String(event_type.clone()));
        payload_json.insert("payload".to_string(), payload);
        payload_json.insert("event_id".to_string(), json!(event_id));

        Ok(NormalizedEvent {
            event_id,
            event_type,
            payload_json: Value::Object(payload_json),
        })
    }
}

/// Response body of `POST /v1/events`.
///
/// `inserted` counts rows actually written; re-submitted duplicates are
/// skipped silently, so it can be lower than `received`.
#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub ok: bool,
    pub request_id: Uuid,
    pub received: usize,
    pub inserted: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(value: Value) -> RawEvent {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn type_field_wins_over_name_alias() {
        let event = raw(json!({ "type": "click", "name": "ignored" }))
            .normalize()
            .unwrap();
        assert_eq!(event.event_type, "click");
    }

    #[test]
    fn name_alias_is_accepted() {
        let event = raw(json!({ "name": "pageview", "properties": { "path": "/" } }))
            .normalize()
            .unwrap();
        assert_eq!(event.event_type, "pageview");
        assert_eq!(event.payload_json["payload"]["path"], "/");
    }

    #[test]
    fn missing_type_is_rejected() {
        let err = raw(json!({ "payload": {} })).normalize().unwrap_err();
        assert!(err.contains("`type` or `name`"));
    }

    #[test]
    fn oversized_type_is_rejected() {
        let long = "x".repeat(81);
        assert!(raw(json!({ "type": long })).normalize().is_err());
    }

    #[test]
    fn caller_event_id_is_kept() {
        let id = Uuid::new_v4();
        let event = raw(json!({ "type": "click", "event_id": id }))
            .normalize()
            .unwrap();
        assert_eq!(event.event_id, id);
    }

    #[test]
    fn event_id_is_generated_when_absent() {
        let a = raw(json!({ "type": "click" })).normalize().unwrap();
        let b = raw(json!({ "type": "click" })).normalize().unwrap();
        assert_ne!(a.event_id, b.event_id);
    }

    #[test]
    fn extra_fields_survive_into_payload() {
        let event = raw(json!({ "type": "click", "ts": 1_700_000_000, "sdk": "js" }))
            .normalize()
            .unwrap();
        assert_eq!(event.payload_json["ts"], 1_700_000_000);
        assert_eq!(event.payload_json["sdk"], "js");
        assert_eq!(event.payload_json["type"], "click");
    }
}
