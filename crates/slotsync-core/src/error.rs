//! Error types shared by the core modules.

use thiserror::Error;

/// A malformed or out-of-range input, carrying the offending field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {field}: {message}")]
pub struct ValidationError {
    /// The field that failed validation.
    pub field: String,
    /// Human-readable detail.
    pub message: String,
}

impl ValidationError {
    /// Creates a validation error for the given field.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Errors from the timezone service.
#[derive(Debug, Error)]
pub enum TimezoneError {
    /// The zone name is not a known IANA identifier.
    #[error("unknown timezone: {0}")]
    UnknownZone(String),

    /// A local time could not be mapped into the zone (e.g. it falls in a
    /// DST gap wider than the resolution policy covers).
    #[error("unmappable local time {local} in {zone}")]
    UnmappableLocalTime {
        /// The local wall-clock time that failed to resolve.
        local: chrono::NaiveDateTime,
        /// The zone it was resolved against.
        zone: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_display() {
        let err = ValidationError::new("start", "must be before end");
        assert_eq!(err.to_string(), "invalid start: must be before end");
    }

    #[test]
    fn timezone_error_display() {
        let err = TimezoneError::UnknownZone("Mars/Olympus".into());
        assert!(err.to_string().contains("Mars/Olympus"));
    }
}
