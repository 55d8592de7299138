//! Event parser
//!
//! Decodes raw JSON payloads into validated `TelemetryEvent`s and folds them
//! into a session record. Everything here is pure: the caller's record is
//! borrowed and a new record is returned, so a failed decode leaves nothing
//! half-applied.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::TelemetryError;
use crate::record::SessionRecord;
use crate::types::{
    CopyPastePayload, EventKind, ScreenResize, ScreenResizePayload, SensitiveField,
    TelemetryEvent, TimeTakenPayload,
};

/// Parse a payload of the given kind tag and merge it into `record`.
///
/// Unknown kind tags fail with `UnknownEventKind`.
pub fn parse_event(
    kind: &str,
    record: &SessionRecord,
    payload: &[u8],
) -> Result<SessionRecord, TelemetryError> {
    let kind: EventKind = kind.parse()?;
    apply_event(kind, record, payload)
}

/// Merge a payload of a known kind into `record`
pub fn apply_event(
    kind: EventKind,
    record: &SessionRecord,
    payload: &[u8],
) -> Result<SessionRecord, TelemetryError> {
    match kind {
        EventKind::CopyAndPaste => populate_copy_paste(record, payload),
        EventKind::Resize => populate_resize(record, payload),
        EventKind::TimeTaken => populate_time_taken(record, payload),
    }
}

/// Decode and validate a payload without merging it anywhere
pub fn decode(kind: EventKind, payload: &[u8]) -> Result<TelemetryEvent, TelemetryError> {
    match kind {
        EventKind::CopyAndPaste => decode_copy_paste(payload),
        EventKind::Resize => decode_resize(payload),
        EventKind::TimeTaken => decode_time_taken(payload),
    }
}

/// Apply a copy/paste event
pub fn populate_copy_paste(
    record: &SessionRecord,
    payload: &[u8],
) -> Result<SessionRecord, TelemetryError> {
    let event = decode_copy_paste(payload)?;
    Ok(record.clone().merge(event))
}

/// Apply a resize event. A session keeps its first resize; later ones are
/// accepted without being decoded.
pub fn populate_resize(
    record: &SessionRecord,
    payload: &[u8],
) -> Result<SessionRecord, TelemetryError> {
    if record.has_resize() {
        return Ok(record.clone());
    }
    let event = decode_resize(payload)?;
    Ok(record.clone().merge(event))
}

/// Apply a time-taken event. A complete record is returned unchanged without
/// decoding the payload.
pub fn populate_time_taken(
    record: &SessionRecord,
    payload: &[u8],
) -> Result<SessionRecord, TelemetryError> {
    if record.is_complete() {
        return Ok(record.clone());
    }
    let event = decode_time_taken(payload)?;
    Ok(record.clone().merge(event))
}

fn decode_copy_paste(payload: &[u8]) -> Result<TelemetryEvent, TelemetryError> {
    let raw: CopyPastePayload = decode_object(EventKind::CopyAndPaste, payload)?;

    require("websiteUrl", &raw.website_url)?;
    require("fieldName", &raw.field_name)?;
    let field: SensitiveField = raw.field_name.parse()?;

    Ok(TelemetryEvent::CopyPaste {
        website_url: raw.website_url,
        session_id: raw.session_id,
        field,
        pasted: raw.pasted,
    })
}

fn decode_resize(payload: &[u8]) -> Result<TelemetryEvent, TelemetryError> {
    let raw: ScreenResizePayload = decode_object(EventKind::Resize, payload)?;

    require("websiteUrl", &raw.website_url)?;
    require("resizeFrom.width", &raw.resize_from.width)?;
    require("resizeFrom.height", &raw.resize_from.height)?;
    require("resizeTo.width", &raw.resize_to.width)?;
    require("resizeTo.height", &raw.resize_to.height)?;

    Ok(TelemetryEvent::Resize {
        website_url: raw.website_url,
        session_id: raw.session_id,
        resize: ScreenResize {
            from: raw.resize_from,
            to: raw.resize_to,
        },
    })
}

fn decode_time_taken(payload: &[u8]) -> Result<TelemetryEvent, TelemetryError> {
    let raw: TimeTakenPayload = decode_object(EventKind::TimeTaken, payload)?;

    if raw.time_taken == 0 {
        return Err(TelemetryError::InvalidValue(
            "timeTaken must be non-zero".to_string(),
        ));
    }

    Ok(TelemetryEvent::TimeTaken {
        website_url: raw.website_url,
        session_id: raw.session_id,
        time_taken: raw.time_taken,
    })
}

/// Decode a payload that must be a JSON object.
///
/// serde would otherwise accept a JSON array for a struct, matching fields by
/// position.
fn decode_object<T: DeserializeOwned>(
    kind: EventKind,
    payload: &[u8],
) -> Result<T, TelemetryError> {
    let value: Value =
        serde_json::from_slice(payload).map_err(|e| TelemetryError::malformed(kind.as_str(), e))?;

    if !value.is_object() {
        return Err(TelemetryError::malformed(
            kind.as_str(),
            "expected a JSON object",
        ));
    }

    serde_json::from_value(value).map_err(|e| TelemetryError::malformed(kind.as_str(), e))
}

fn require(field: &str, value: &str) -> Result<(), TelemetryError> {
    if value.is_empty() {
        Err(TelemetryError::MissingRequiredField(field.to_string()))
    } else {
        Ok(())
    }
}
