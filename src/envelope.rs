//! Request envelope
//!
//! Every request body posted by the web client is a single JSON object that
//! carries the routing pair (`sessionId`, `eventType`) next to the event
//! fields. The whole body doubles as the event payload.

use serde_json::Value;

use crate::error::TelemetryError;
use crate::types::EventKind;

pub const MISSING_SESSION_ID: &str = "You must pass a session id with your request";
pub const INVALID_EVENT_TYPE: &str = "Invalid event type";

/// Routing fields extracted from a request body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventEnvelope {
    pub session_id: String,
    pub event_type: String,
}

impl EventEnvelope {
    /// Extract the routing fields from a raw request body.
    ///
    /// Both fields must be JSON strings. Their values are checked later, at
    /// ingestion.
    pub fn from_body(body: &[u8]) -> Result<Self, TelemetryError> {
        let value: Value =
            serde_json::from_slice(body).map_err(|e| TelemetryError::malformed("request", e))?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self, TelemetryError> {
        let object = value
            .as_object()
            .ok_or_else(|| TelemetryError::malformed("request", "expected a JSON object"))?;

        let session_id = object
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| TelemetryError::InvalidRequest(MISSING_SESSION_ID.to_string()))?;

        let event_type = object
            .get("eventType")
            .and_then(Value::as_str)
            .ok_or_else(|| TelemetryError::InvalidRequest(INVALID_EVENT_TYPE.to_string()))?;

        Ok(Self {
            session_id: session_id.to_string(),
            event_type: event_type.to_string(),
        })
    }

    /// Resolve the event type into a known kind
    pub fn kind(&self) -> Result<EventKind, TelemetryError> {
        self.event_type.parse()
    }
}
