//! Core data types for Synheart Formtrace
//!
//! This module defines the event kinds accepted from the web client, the raw
//! payload shapes for each kind, and the validated events that flow from the
//! parser into session records.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TelemetryError;

/// Wire tag for copy/paste events
pub const COPY_AND_PASTE: &str = "copyAndPaste";
/// Wire tag for screen resize events
pub const RESIZE: &str = "resize";
/// Wire tag for form completion time events
pub const TIME_TAKEN: &str = "timeTaken";

/// Telemetry event kinds emitted by the web client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    CopyAndPaste,
    Resize,
    TimeTaken,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [
        EventKind::CopyAndPaste,
        EventKind::Resize,
        EventKind::TimeTaken,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::CopyAndPaste => COPY_AND_PASTE,
            EventKind::Resize => RESIZE,
            EventKind::TimeTaken => TIME_TAKEN,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            COPY_AND_PASTE => Ok(EventKind::CopyAndPaste),
            RESIZE => Ok(EventKind::Resize),
            TIME_TAKEN => Ok(EventKind::TimeTaken),
            other => Err(TelemetryError::UnknownEventKind(other.to_string())),
        }
    }
}

/// Form fields whose paste activity is tracked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensitiveField {
    #[serde(rename = "email")]
    Email,
    #[serde(rename = "cardNumber")]
    CardNumber,
    #[serde(rename = "CVV")]
    Cvv,
}

impl SensitiveField {
    pub const ALL: [SensitiveField; 3] = [
        SensitiveField::Email,
        SensitiveField::CardNumber,
        SensitiveField::Cvv,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SensitiveField::Email => "email",
            SensitiveField::CardNumber => "cardNumber",
            SensitiveField::Cvv => "CVV",
        }
    }
}

impl fmt::Display for SensitiveField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SensitiveField {
    type Err = TelemetryError;

    /// Field names are matched exactly; `cvv` is not `CVV`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SensitiveField::ALL
            .into_iter()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| TelemetryError::InvalidEnumValue {
                field: "fieldName".to_string(),
                value: s.to_string(),
            })
    }
}

/// Viewport dimensions as reported by the client.
///
/// Values are opaque strings (the client may send "1024" or "1024px").
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Dimension {
    #[serde(deserialize_with = "null_as_default")]
    pub width: String,
    #[serde(deserialize_with = "null_as_default")]
    pub height: String,
}

impl Dimension {
    pub fn new(width: impl Into<String>, height: impl Into<String>) -> Self {
        Self {
            width: width.into(),
            height: height.into(),
        }
    }

    /// Both width and height are present
    pub fn is_complete(&self) -> bool {
        !self.width.is_empty() && !self.height.is_empty()
    }
}

/// A recorded viewport resize, from one dimension pair to another
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenResize {
    #[serde(rename = "resizeFrom")]
    pub from: Dimension,
    #[serde(rename = "resizeTo")]
    pub to: Dimension,
}

/// Per-field "was pasted into" flags.
///
/// The struct shape guarantees all three tracked fields are always present
/// once a session has seen any copy/paste event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldPasteState {
    pub email: bool,
    #[serde(rename = "cardNumber")]
    pub card_number: bool,
    #[serde(rename = "CVV")]
    pub cvv: bool,
}

impl FieldPasteState {
    pub fn get(&self, field: SensitiveField) -> bool {
        match field {
            SensitiveField::Email => self.email,
            SensitiveField::CardNumber => self.card_number,
            SensitiveField::Cvv => self.cvv,
        }
    }

    pub fn set(&mut self, field: SensitiveField, pasted: bool) {
        match field {
            SensitiveField::Email => self.email = pasted,
            SensitiveField::CardNumber => self.card_number = pasted,
            SensitiveField::Cvv => self.cvv = pasted,
        }
    }
}

// ============================================================================
// Raw payloads
// ============================================================================
//
// Absent and `null` fields decode to their zero value so that validation, not
// the JSON decoder, decides which fields are required. Unknown keys (such as
// the `eventType` envelope field) are ignored.

/// Decode `null` as the type's zero value
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Raw copy/paste payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CopyPastePayload {
    #[serde(deserialize_with = "null_as_default")]
    pub website_url: String,
    #[serde(deserialize_with = "null_as_default")]
    pub session_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub pasted: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub field_name: String,
}

/// Raw screen resize payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScreenResizePayload {
    #[serde(deserialize_with = "null_as_default")]
    pub website_url: String,
    #[serde(deserialize_with = "null_as_default")]
    pub session_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub resize_from: Dimension,
    #[serde(deserialize_with = "null_as_default")]
    pub resize_to: Dimension,
}

/// Raw form completion time payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimeTakenPayload {
    #[serde(deserialize_with = "null_as_default")]
    pub website_url: String,
    #[serde(deserialize_with = "null_as_default")]
    pub session_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub time_taken: i64,
}

// ============================================================================
// Validated events
// ============================================================================

/// A decoded and validated telemetry event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelemetryEvent {
    CopyPaste {
        website_url: String,
        session_id: String,
        field: SensitiveField,
        pasted: bool,
    },
    Resize {
        website_url: String,
        session_id: String,
        resize: ScreenResize,
    },
    TimeTaken {
        website_url: String,
        session_id: String,
        time_taken: i64,
    },
}

impl TelemetryEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            TelemetryEvent::CopyPaste { .. } => EventKind::CopyAndPaste,
            TelemetryEvent::Resize { .. } => EventKind::Resize,
            TelemetryEvent::TimeTaken { .. } => EventKind::TimeTaken,
        }
    }

    /// Session id carried in the payload (may differ from the ingestion key)
    pub fn session_id(&self) -> &str {
        match self {
            TelemetryEvent::CopyPaste { session_id, .. }
            | TelemetryEvent::Resize { session_id, .. }
            | TelemetryEvent::TimeTaken { session_id, .. } => session_id,
        }
    }

    pub fn website_url(&self) -> &str {
        match self {
            TelemetryEvent::CopyPaste { website_url, .. }
            | TelemetryEvent::Resize { website_url, .. }
            | TelemetryEvent::TimeTaken { website_url, .. } => website_url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_round_trip_through_str() {
        for kind in EventKind::ALL {
            assert_eq!(kind.as_str().parse::<EventKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_event_kind() {
        let err = "scroll".parse::<EventKind>().unwrap_err();
        assert_eq!(err, TelemetryError::UnknownEventKind("scroll".to_string()));

        let err = "".parse::<EventKind>().unwrap_err();
        assert_eq!(err.code(), "UNKNOWN_EVENT_KIND");
    }

    #[test]
    fn test_event_kind_serde_uses_wire_tags() {
        assert_eq!(serde_json::to_string(&EventKind::CopyAndPaste).unwrap(), "\"copyAndPaste\"");
        assert_eq!(serde_json::to_string(&EventKind::TimeTaken).unwrap(), "\"timeTaken\"");
    }

    #[test]
    fn test_sensitive_field_is_case_sensitive() {
        assert_eq!("CVV".parse::<SensitiveField>().unwrap(), SensitiveField::Cvv);
        assert_eq!("cardNumber".parse::<SensitiveField>().unwrap(), SensitiveField::CardNumber);
        assert!("cvv".parse::<SensitiveField>().is_err());
        assert!("ssn".parse::<SensitiveField>().is_err());
    }

    #[test]
    fn test_field_paste_state_serializes_all_keys() {
        let mut state = FieldPasteState::default();
        state.set(SensitiveField::Cvv, true);

        let value = serde_json::to_value(state).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"email": false, "cardNumber": false, "CVV": true})
        );
        assert!(state.get(SensitiveField::Cvv));
        assert!(!state.get(SensitiveField::Email));
    }

    #[test]
    fn test_dimension_completeness() {
        assert!(Dimension::new("20", "25").is_complete());
        assert!(!Dimension::new("20", "").is_complete());
        assert!(!Dimension::default().is_complete());
    }

    #[test]
    fn test_payload_defaults_for_missing_fields() {
        let payload: TimeTakenPayload =
            serde_json::from_str(r#"{"websiteUrl": "example.com"}"#).unwrap();
        assert_eq!(payload.website_url, "example.com");
        assert_eq!(payload.session_id, "");
        assert_eq!(payload.time_taken, 0);
    }

    #[test]
    fn test_payload_nulls_decode_as_zero_values() {
        let payload: CopyPastePayload = serde_json::from_str(
            r#"{"websiteUrl": null, "sessionId": null, "pasted": null, "fieldName": null}"#,
        )
        .unwrap();
        assert_eq!(payload.website_url, "");
        assert!(!payload.pasted);

        let payload: ScreenResizePayload =
            serde_json::from_str(r#"{"resizeFrom": null, "resizeTo": {"width": null}}"#).unwrap();
        assert_eq!(payload.resize_from, Dimension::default());
        assert_eq!(payload.resize_to, Dimension::default());

        let payload: TimeTakenPayload = serde_json::from_str(r#"{"timeTaken": null}"#).unwrap();
        assert_eq!(payload.time_taken, 0);

        // Wrong types are still errors
        assert!(serde_json::from_str::<TimeTakenPayload>(r#"{"timeTaken": "5"}"#).is_err());
    }
}
