//! Per-session aggregate record
//!
//! A `SessionRecord` accumulates every accepted event for one session. Records
//! only ever grow: resize and completion time are first-write-wins, and a
//! record with a completion time is frozen.

use serde::{Deserialize, Serialize};

use crate::types::{FieldPasteState, ScreenResize, TelemetryEvent};

/// Aggregate state for a single session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub website_url: String,
    pub session_id: String,
    /// Viewport change, serialized as top-level `resizeFrom` / `resizeTo`
    #[serde(flatten)]
    pub resize: Option<ScreenResize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_paste_state: Option<FieldPasteState>,
    /// Form completion time; `0` until the session completes
    #[serde(default)]
    pub form_completion_time: i64,
}

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No event has been accepted for the session
    Empty,
    Partial,
    /// Terminal: the form completion time has been recorded
    Complete,
}

impl SessionState {
    pub fn of(record: Option<&SessionRecord>) -> Self {
        match record {
            None => SessionState::Empty,
            Some(r) if r.is_complete() => SessionState::Complete,
            Some(_) => SessionState::Partial,
        }
    }
}

impl SessionRecord {
    /// A record is complete once a non-zero completion time has been stored
    pub fn is_complete(&self) -> bool {
        self.form_completion_time != 0
    }

    pub fn has_resize(&self) -> bool {
        self.resize.is_some()
    }

    /// Fold a validated event into the record, returning the merged record.
    ///
    /// Merge rules per kind:
    /// - copy/paste: initializes the paste flags, overwrites the URL, sets one flag
    /// - resize: no-op if a resize is already recorded, otherwise overwrites the URL
    ///   and stores both dimension pairs
    /// - time taken: no-op on a complete record, otherwise fills the URL only if
    ///   empty and stores the completion time
    pub fn merge(mut self, event: TelemetryEvent) -> Self {
        match event {
            TelemetryEvent::CopyPaste {
                website_url,
                session_id,
                field,
                pasted,
            } => {
                self.adopt_session_id(session_id);
                self.website_url = website_url;
                self.field_paste_state
                    .get_or_insert_with(FieldPasteState::default)
                    .set(field, pasted);
            }
            TelemetryEvent::Resize {
                website_url,
                session_id,
                resize,
            } => {
                if self.has_resize() {
                    return self;
                }
                self.adopt_session_id(session_id);
                self.website_url = website_url;
                self.resize = Some(resize);
            }
            TelemetryEvent::TimeTaken {
                website_url,
                session_id,
                time_taken,
            } => {
                if self.is_complete() {
                    return self;
                }
                self.adopt_session_id(session_id);
                if self.website_url.is_empty() {
                    self.website_url = website_url;
                }
                self.form_completion_time = time_taken;
            }
        }
        self
    }

    fn adopt_session_id(&mut self, session_id: String) {
        if self.session_id.is_empty() {
            self.session_id = session_id;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Dimension, SensitiveField};
    use pretty_assertions::assert_eq;

    fn copy_paste(field: SensitiveField, pasted: bool) -> TelemetryEvent {
        TelemetryEvent::CopyPaste {
            website_url: "example.com".to_string(),
            session_id: "123".to_string(),
            field,
            pasted,
        }
    }

    fn resize(from: (&str, &str), to: (&str, &str)) -> TelemetryEvent {
        TelemetryEvent::Resize {
            website_url: "example.com".to_string(),
            session_id: "123".to_string(),
            resize: ScreenResize {
                from: Dimension::new(from.0, from.1),
                to: Dimension::new(to.0, to.1),
            },
        }
    }

    fn time_taken(url: &str, time_taken: i64) -> TelemetryEvent {
        TelemetryEvent::TimeTaken {
            website_url: url.to_string(),
            session_id: "123".to_string(),
            time_taken,
        }
    }

    #[test]
    fn test_copy_paste_initializes_all_flags() {
        let record = SessionRecord::default().merge(copy_paste(SensitiveField::Cvv, true));

        assert_eq!(
            record.field_paste_state,
            Some(FieldPasteState {
                email: false,
                card_number: false,
                cvv: true,
            })
        );
        assert_eq!(record.session_id, "123");
        assert!(!record.is_complete());
    }

    #[test]
    fn test_copy_paste_overwrites_flag() {
        let record = SessionRecord::default()
            .merge(copy_paste(SensitiveField::Email, true))
            .merge(copy_paste(SensitiveField::Email, false));

        assert!(!record.field_paste_state.unwrap().email);
    }

    #[test]
    fn test_first_session_id_wins() {
        let mut event = copy_paste(SensitiveField::Email, true);
        if let TelemetryEvent::CopyPaste { session_id, .. } = &mut event {
            *session_id = "other".to_string();
        }

        let record = SessionRecord::default()
            .merge(copy_paste(SensitiveField::Cvv, true))
            .merge(event);
        assert_eq!(record.session_id, "123");
    }

    #[test]
    fn test_resize_first_write_wins() {
        let record = SessionRecord::default()
            .merge(resize(("20", "25"), ("30", "40")))
            .merge(resize(("1", "2"), ("3", "4")));

        let stored = record.resize.unwrap();
        assert_eq!(stored.from, Dimension::new("20", "25"));
        assert_eq!(stored.to, Dimension::new("30", "40"));
    }

    #[test]
    fn test_time_taken_keeps_existing_url() {
        let record = SessionRecord::default()
            .merge(copy_paste(SensitiveField::Email, true))
            .merge(time_taken("other.com", 100));

        assert_eq!(record.website_url, "example.com");
        assert_eq!(record.form_completion_time, 100);
        assert!(record.is_complete());
    }

    #[test]
    fn test_time_taken_fills_empty_url() {
        let record = SessionRecord::default().merge(time_taken("other.com", 42));
        assert_eq!(record.website_url, "other.com");
    }

    #[test]
    fn test_complete_record_ignores_later_time() {
        let record = SessionRecord::default()
            .merge(time_taken("example.com", 100))
            .merge(time_taken("example.com", 200));

        assert_eq!(record.form_completion_time, 100);
    }

    #[test]
    fn test_session_state() {
        assert_eq!(SessionState::of(None), SessionState::Empty);

        let partial = SessionRecord::default().merge(copy_paste(SensitiveField::Email, true));
        assert_eq!(SessionState::of(Some(&partial)), SessionState::Partial);

        let complete = partial.merge(time_taken("example.com", 5));
        assert_eq!(SessionState::of(Some(&complete)), SessionState::Complete);
    }

    #[test]
    fn test_record_json_shape() {
        let record = SessionRecord::default()
            .merge(resize(("20", "25"), ("30", "40")))
            .merge(copy_paste(SensitiveField::CardNumber, true));

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "websiteUrl": "example.com",
                "sessionId": "123",
                "resizeFrom": {"width": "20", "height": "25"},
                "resizeTo": {"width": "30", "height": "40"},
                "fieldPasteState": {"email": false, "cardNumber": true, "CVV": false},
                "formCompletionTime": 0
            })
        );
    }

    #[test]
    fn test_empty_record_omits_optional_state() {
        let value = serde_json::to_value(SessionRecord::default()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "websiteUrl": "",
                "sessionId": "",
                "formCompletionTime": 0
            })
        );
    }
}
