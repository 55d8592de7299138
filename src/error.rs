//! Error types for Synheart Formtrace

use thiserror::Error;

/// Errors that can occur while ingesting a telemetry event.
///
/// Every variant is a caller fault: nothing is retried, and a failed ingest
/// never leaves partial state behind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TelemetryError {
    #[error("Malformed {kind} payload: {reason}")]
    MalformedPayload { kind: String, reason: String },

    #[error("Missing required field: {0}")]
    MissingRequiredField(String),

    #[error("Invalid value {value:?} for {field}")]
    InvalidEnumValue { field: String, value: String },

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Unknown event kind: {0}")]
    UnknownEventKind(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl TelemetryError {
    pub(crate) fn malformed(kind: &str, err: impl std::fmt::Display) -> Self {
        TelemetryError::MalformedPayload {
            kind: kind.to_string(),
            reason: err.to_string(),
        }
    }

    /// Stable machine-readable code for transports and the C ABI
    pub fn code(&self) -> &'static str {
        match self {
            TelemetryError::MalformedPayload { .. } => "MALFORMED_PAYLOAD",
            TelemetryError::MissingRequiredField(_) => "MISSING_REQUIRED_FIELD",
            TelemetryError::InvalidEnumValue { .. } => "INVALID_ENUM_VALUE",
            TelemetryError::InvalidValue(_) => "INVALID_VALUE",
            TelemetryError::UnknownEventKind(_) => "UNKNOWN_EVENT_KIND",
            TelemetryError::InvalidRequest(_) => "INVALID_REQUEST",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_distinct() {
        let errors = [
            TelemetryError::malformed("resize", "eof"),
            TelemetryError::MissingRequiredField("websiteUrl".to_string()),
            TelemetryError::InvalidEnumValue {
                field: "fieldName".to_string(),
                value: "ssn".to_string(),
            },
            TelemetryError::InvalidValue("timeTaken must be non-zero".to_string()),
            TelemetryError::UnknownEventKind("scroll".to_string()),
            TelemetryError::InvalidRequest("missing session id".to_string()),
        ];

        let mut codes: Vec<&str> = errors.iter().map(|e| e.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_error_display() {
        let err = TelemetryError::InvalidEnumValue {
            field: "fieldName".to_string(),
            value: "ssn".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid value \"ssn\" for fieldName");

        let err = TelemetryError::malformed("copyAndPaste", "expected value");
        assert_eq!(
            err.to_string(),
            "Malformed copyAndPaste payload: expected value"
        );
    }
}
