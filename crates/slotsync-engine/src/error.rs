//! The engine error taxonomy.
//!
//! Every variant carries a machine-readable `kind()` plus human detail, and
//! serializes into the structured payload the upward operations return.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use slotsync_core::ValidationError;

/// Errors from timeslot, booking and conflict operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Malformed or out-of-range input, surfaced immediately with the
    /// offending field.
    #[error("invalid {field}: {message}")]
    Validation {
        /// The field that failed validation.
        field: String,
        /// Human-readable detail.
        message: String,
    },

    /// A timeslot or booking collision the caller can act on.
    #[error("overlap: {message}")]
    Overlap {
        /// Human-readable detail.
        message: String,
        /// The id of the existing item that collides, when known.
        conflicting_id: Option<String>,
    },

    /// A lost race or stale-version write.
    #[error("concurrency conflict: {message}")]
    Concurrency {
        /// Human-readable detail.
        message: String,
    },

    /// The referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity type name.
        entity: String,
        /// The missing id.
        id: String,
    },

    /// A booking target that cannot be reserved (full, blocked, cancelled,
    /// or lost to a concurrent reservation).
    #[error("unavailable: {message}")]
    Unavailable {
        /// Human-readable detail.
        message: String,
    },

    /// An operation the entity's current state does not permit.
    #[error("invalid transition: {message}")]
    InvalidTransition {
        /// Human-readable detail.
        message: String,
    },
}

impl EngineError {
    /// Creates a validation error.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates an overlap error.
    pub fn overlap(message: impl Into<String>, conflicting_id: Option<String>) -> Self {
        Self::Overlap {
            message: message.into(),
            conflicting_id,
        }
    }

    /// Creates a concurrency error.
    pub fn concurrency(message: impl Into<String>) -> Self {
        Self::Concurrency {
            message: message.into(),
        }
    }

    /// Creates a not-found error.
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Creates an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Creates an invalid-transition error.
    pub fn invalid_transition(message: impl Into<String>) -> Self {
        Self::InvalidTransition {
            message: message.into(),
        }
    }

    /// Machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::Overlap { .. } => "overlap",
            Self::Concurrency { .. } => "concurrency",
            Self::NotFound { .. } => "not_found",
            Self::Unavailable { .. } => "unavailable",
            Self::InvalidTransition { .. } => "invalid_transition",
        }
    }

    /// Converts into the structured payload returned to callers.
    pub fn to_payload(&self) -> ErrorPayload {
        let field = match self {
            Self::Validation { field, .. } => Some(field.clone()),
            _ => None,
        };
        ErrorPayload {
            kind: self.kind().to_string(),
            message: self.to_string(),
            field,
        }
    }
}

impl From<ValidationError> for EngineError {
    fn from(err: ValidationError) -> Self {
        Self::Validation {
            field: err.field,
            message: err.message,
        }
    }
}

/// The wire form of an engine error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Machine-readable kind.
    pub kind: String,
    /// Human-readable message.
    pub message: String,
    /// The offending field for validation errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

/// Result alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(EngineError::validation("start", "bad").kind(), "validation");
        assert_eq!(EngineError::overlap("collides", None).kind(), "overlap");
        assert_eq!(EngineError::concurrency("stale").kind(), "concurrency");
        assert_eq!(EngineError::not_found("timeslot", "abc").kind(), "not_found");
        assert_eq!(EngineError::unavailable("full").kind(), "unavailable");
    }

    #[test]
    fn payload_carries_field_for_validation() {
        let payload = EngineError::validation("start", "must be before end").to_payload();
        assert_eq!(payload.kind, "validation");
        assert_eq!(payload.field.as_deref(), Some("start"));

        let payload = EngineError::unavailable("full").to_payload();
        assert!(payload.field.is_none());
    }

    #[test]
    fn converts_core_validation_errors() {
        let core = ValidationError::new("uid", "must not be empty");
        let engine: EngineError = core.into();
        assert_eq!(engine.kind(), "validation");
        assert!(engine.to_string().contains("uid"));
    }
}
