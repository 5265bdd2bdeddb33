//! Ingestion errors
//!
//! Engine APIs never fail; these describe why an inbound event was skipped.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IngestError {
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to decode event: {0}")]
    Decode(String),
}

impl From<serde_json::Error> for IngestError {
    fn from(err: serde_json::Error) -> Self {
        IngestError::Decode(err.to_string())
    }
}

impl IngestError {
    /// Short label used for the skipped-events counter
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::MissingField { .. } => "missing_field",
            IngestError::InvalidValue { .. } => "invalid_value",
            IngestError::Decode(_) => "decode",
        }
    }
}

/// Reject blank correlation ids
pub(crate) fn require_id(value: Option<&str>, field: &'static str) -> Result<String, IngestError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(IngestError::MissingField { field }),
    }
}
