//! Synheart Formtrace - Session aggregation engine for web form behavioral telemetry
//!
//! Formtrace assembles the behavioral events a web form emits (pastes into
//! sensitive fields, viewport resizes, form completion time) into a single
//! aggregate record per session:
//! request envelope → event parser → per-kind merge → session store.
//!
//! ## Modules
//!
//! - **Parser**: decode and validate raw event payloads
//! - **Record**: the per-session aggregate and its merge rules
//! - **Aggregator**: the thread-safe session store and ingestion protocol
//! - **FFI**: C bindings over the aggregator

pub mod aggregator;
pub mod envelope;
pub mod error;
pub mod parser;
pub mod record;
pub mod types;

// C bindings, compiled unconditionally for cdylib/staticlib builds
pub mod ffi;

pub use aggregator::{
    AggregatorStats, IngestOutcome, IngestStatus, SessionAggregator, SessionSnapshot,
};
pub use envelope::EventEnvelope;
pub use error::TelemetryError;
pub use parser::parse_event;
pub use record::{SessionRecord, SessionState};
pub use types::{
    Dimension, EventKind, FieldPasteState, ScreenResize, SensitiveField, TelemetryEvent,
    COPY_AND_PASTE, RESIZE, TIME_TAKEN,
};

/// Formtrace version
pub const FORMTRACE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported by the CLI and FFI
pub const PRODUCER_NAME: &str = "synheart-formtrace";
