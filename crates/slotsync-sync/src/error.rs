//! Sync orchestration errors.

use thiserror::Error;

use slotsync_engine::EngineError;
use slotsync_providers::ProviderError;

/// Errors from a sync pass.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A provider call failed terminally.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// An engine operation failed.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// An etag-guarded write lost twice: once on the first attempt and
    /// again after the automatic refetch-and-retry.
    #[error("concurrency conflict on {uid}: {message}")]
    Concurrency {
        /// The contested event uid.
        uid: String,
        /// Human-readable detail.
        message: String,
    },
}

impl SyncError {
    /// Creates a concurrency error for a contested event.
    pub fn concurrency(uid: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Concurrency {
            uid: uid.into(),
            message: message.into(),
        }
    }

    /// Machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Provider(e) => e.code().as_str(),
            Self::Engine(e) => e.kind(),
            Self::Concurrency { .. } => "concurrency",
        }
    }
}

/// Result alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_pass_through() {
        let provider: SyncError = ProviderError::rate_limited("slow down").into();
        assert_eq!(provider.kind(), "rate_limited");

        let engine: SyncError = EngineError::unavailable("full").into();
        assert_eq!(engine.kind(), "unavailable");

        assert_eq!(SyncError::concurrency("evt", "lost twice").kind(), "concurrency");
    }

    #[test]
    fn concurrency_display_names_the_event() {
        let err = SyncError::concurrency("evt-1@x", "etag stale after retry");
        assert!(err.to_string().contains("evt-1@x"));
    }
}
