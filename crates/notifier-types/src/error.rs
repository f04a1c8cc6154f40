//! Error types for event decoding and validation.
//!
//! Every variant describes a payload that must be dropped before it touches
//! any pipeline state.

/// Errors produced while turning a raw payload into a validated [`Event`].
///
/// [`Event`]: crate::events::Event
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// The payload's `type` tag names an event kind this pipeline does not handle.
    #[error("unsupported event type: {0}")]
    Unsupported(String),

    /// The payload is not a well-formed envelope or lacks required fields.
    #[error("malformed event: {0}")]
    Malformed(String),

    /// A unix timestamp could not be represented as a UTC instant.
    #[error("invalid timestamp in field {field}: {value}")]
    InvalidTimestamp {
        /// The offending field.
        field: &'static str,
        /// The raw seconds value.
        value: i64,
    },

    /// A numeric field is outside its legal range.
    #[error("field {field} out of range: {value}")]
    OutOfRange {
        /// The offending field.
        field: &'static str,
        /// The raw value, widened for display.
        value: i64,
    },

    /// A coordinate is not finite or outside the valid latitude/longitude span.
    #[error("invalid coordinate {field}: {value}")]
    InvalidCoordinate {
        /// Either `latitude` or `longitude`.
        field: &'static str,
        /// The raw value.
        value: f64,
    },

    /// A required identifier is present but empty.
    #[error("empty identifier in field {0}")]
    EmptyId(&'static str),
}

impl From<serde_json::Error> for EventError {
    fn from(e: serde_json::Error) -> Self {
        Self::Malformed(e.to_string())
    }
}
