//! Session aggregator
//!
//! Owns the session → record mapping and enforces the ingestion protocol:
//! validate the routing pair, skip completed sessions, parse, store.
//!
//! Locking is two-level. The map of session slots sits behind an `RwLock`
//! that is held only to find or create a slot; each slot has its own `Mutex`
//! held across the whole read-merge-store of one ingest. Updates to one
//! session are therefore linearized while different sessions proceed
//! independently. A thread never waits on the map lock while holding a slot.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::envelope::{EventEnvelope, INVALID_EVENT_TYPE, MISSING_SESSION_ID};
use crate::error::TelemetryError;
use crate::parser;
use crate::record::{SessionRecord, SessionState};
use crate::types::EventKind;

/// `None` until the session's first event is accepted
type Slot = Arc<Mutex<Option<SessionRecord>>>;

/// What an accepted ingest did to the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    /// The record changed and is still partial
    Updated,
    /// The event was valid but first-write-wins left the record as it was
    Unchanged,
    /// This event completed the session
    Completed,
    /// The session was already complete; the event was not decoded
    AlreadyComplete,
}

/// Result of a successful ingest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestOutcome {
    pub status: IngestStatus,
    pub record: SessionRecord,
}

impl IngestOutcome {
    pub fn is_complete(&self) -> bool {
        self.record.is_complete()
    }
}

/// One stored session, keyed by its ingestion id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_key: String,
    pub state: SessionState,
    pub record: SessionRecord,
}

/// Point-in-time counters over all stored sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorStats {
    pub sessions: usize,
    pub complete: usize,
    pub partial: usize,
    pub computed_at: DateTime<Utc>,
}

/// Thread-safe, in-memory aggregator of per-session telemetry records
#[derive(Debug, Default)]
pub struct SessionAggregator {
    sessions: RwLock<HashMap<String, Slot>>,
}

impl SessionAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest one event for `session_id`.
    ///
    /// # Arguments
    /// * `session_id` - Aggregation key; must be non-empty
    /// * `kind` - Event kind tag (`copyAndPaste`, `resize`, `timeTaken`)
    /// * `payload` - Raw JSON payload for the kind
    ///
    /// # Returns
    /// The stored record and what this call did to it. On error the stored
    /// record is exactly what it was before the call.
    pub fn ingest(
        &self,
        session_id: &str,
        kind: &str,
        payload: &[u8],
    ) -> Result<IngestOutcome, TelemetryError> {
        let kind = validate_request(session_id, kind)?;
        let slot = self.slot(session_id);

        let result = {
            let mut guard = slot.lock();
            Self::ingest_locked(&mut guard, kind, payload)
        };

        match &result {
            Ok(outcome) => match outcome.status {
                IngestStatus::Completed => tracing::info!(
                    session_id,
                    form_completion_time = outcome.record.form_completion_time,
                    website_url = %outcome.record.website_url,
                    "session complete"
                ),
                IngestStatus::AlreadyComplete => tracing::debug!(
                    session_id,
                    kind = %kind,
                    "session already complete, event ignored"
                ),
                status => tracing::debug!(session_id, kind = %kind, ?status, "event ingested"),
            },
            Err(e) => {
                tracing::warn!(
                    session_id,
                    kind = %kind,
                    code = e.code(),
                    error = %e,
                    "event rejected"
                );
                self.release_vacant(session_id, slot);
            }
        }

        result
    }

    /// Ingest a raw request body whose `sessionId` and `eventType` fields
    /// route the event.
    pub fn ingest_body(&self, body: &[u8]) -> Result<IngestOutcome, TelemetryError> {
        let envelope = EventEnvelope::from_body(body)?;
        self.ingest(&envelope.session_id, &envelope.event_type, body)
    }

    /// Read-merge-store under the session's lock
    fn ingest_locked(
        stored: &mut Option<SessionRecord>,
        kind: EventKind,
        payload: &[u8],
    ) -> Result<IngestOutcome, TelemetryError> {
        let empty;
        let current = match stored.as_ref() {
            Some(record) => record,
            None => {
                empty = SessionRecord::default();
                &empty
            }
        };

        if current.is_complete() {
            return Ok(IngestOutcome {
                status: IngestStatus::AlreadyComplete,
                record: current.clone(),
            });
        }

        let updated = parser::apply_event(kind, current, payload)?;

        let status = if updated.is_complete() {
            IngestStatus::Completed
        } else if stored.as_ref() == Some(&updated) {
            IngestStatus::Unchanged
        } else {
            IngestStatus::Updated
        };

        *stored = Some(updated.clone());
        Ok(IngestOutcome {
            status,
            record: updated,
        })
    }

    /// Find or create the slot for a session
    fn slot(&self, session_id: &str) -> Slot {
        if let Some(slot) = self.sessions.read().get(session_id) {
            return Arc::clone(slot);
        }

        let mut sessions = self.sessions.write();
        Arc::clone(sessions.entry(session_id.to_string()).or_default())
    }

    /// Drop a slot that a rejected first event created, unless another
    /// caller is holding it.
    fn release_vacant(&self, session_id: &str, slot: Slot) {
        let mut sessions = self.sessions.write();
        let vacant = match sessions.get(session_id) {
            // Two owners: the map and `slot`. No one else can clone it while
            // the write lock is held.
            Some(stored) => {
                Arc::ptr_eq(stored, &slot) && Arc::strong_count(&slot) == 2 && slot.lock().is_none()
            }
            None => false,
        };
        if vacant {
            sessions.remove(session_id);
        }
        // Our reference must go before the map lock does, or the next caller
        // counts it and leaves the slot behind.
        drop(slot);
        drop(sessions);
    }

    /// Current record for a session, if any event has been accepted
    pub fn get(&self, session_id: &str) -> Option<SessionRecord> {
        let slot = self.sessions.read().get(session_id).cloned()?;
        let record = slot.lock().clone();
        record
    }

    pub fn state(&self, session_id: &str) -> SessionState {
        SessionState::of(self.get(session_id).as_ref())
    }

    pub fn is_complete(&self, session_id: &str) -> bool {
        self.state(session_id) == SessionState::Complete
    }

    /// Number of sessions with a stored record
    pub fn session_count(&self) -> usize {
        self.snapshot().len()
    }

    pub fn completed_count(&self) -> usize {
        self.snapshot()
            .iter()
            .filter(|s| s.state == SessionState::Complete)
            .count()
    }

    /// All stored records, sorted by session key
    pub fn snapshot(&self) -> Vec<SessionSnapshot> {
        let slots: Vec<(String, Slot)> = self
            .sessions
            .read()
            .iter()
            .map(|(key, slot)| (key.clone(), Arc::clone(slot)))
            .collect();

        let mut snapshots: Vec<SessionSnapshot> = slots
            .into_iter()
            .filter_map(|(session_key, slot)| {
                let record = slot.lock().clone()?;
                Some(SessionSnapshot {
                    session_key,
                    state: SessionState::of(Some(&record)),
                    record,
                })
            })
            .collect();

        snapshots.sort_by(|a, b| a.session_key.cmp(&b.session_key));
        snapshots
    }

    pub fn stats(&self) -> AggregatorStats {
        let snapshots = self.snapshot();
        let complete = snapshots
            .iter()
            .filter(|s| s.state == SessionState::Complete)
            .count();

        AggregatorStats {
            sessions: snapshots.len(),
            complete,
            partial: snapshots.len() - complete,
            computed_at: Utc::now(),
        }
    }
}

/// Reject a request before any state is touched
fn validate_request(session_id: &str, kind: &str) -> Result<EventKind, TelemetryError> {
    if session_id.is_empty() {
        return Err(TelemetryError::InvalidRequest(MISSING_SESSION_ID.to_string()));
    }
    if kind.is_empty() {
        return Err(TelemetryError::InvalidRequest(INVALID_EVENT_TYPE.to_string()));
    }
    kind.parse::<EventKind>()
        .map_err(|_| TelemetryError::InvalidRequest(format!("{}: {}", INVALID_EVENT_TYPE, kind)))
}
