//! Error types for calendar provider operations.

use std::fmt;
use thiserror::Error;

/// High-level classification of a provider error, used for retry decisions
/// and machine-readable surfacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderErrorCode {
    /// Credentials are invalid or expired.
    AuthenticationFailed,
    /// The authenticated identity lacks permission.
    AuthorizationFailed,
    /// Connection failure, DNS error or timeout.
    NetworkError,
    /// Request timed out at the HTTP layer (408).
    Timeout,
    /// Too many requests (429).
    RateLimited,
    /// Server-side failure (5xx).
    ServerError,
    /// The response could not be parsed.
    InvalidResponse,
    /// The resource does not exist (404).
    NotFound,
    /// The request was malformed (other 4xx).
    BadRequest,
    /// An etag precondition failed (412) - the remote copy changed, or a
    /// create target already exists.
    PreconditionFailed,
    /// The incremental sync token is no longer valid; callers fall back to
    /// a full resync.
    SyncTokenInvalid,
    /// Missing or inconsistent configuration.
    ConfigurationError,
    /// Unexpected internal state.
    InternalError,
}

impl ProviderErrorCode {
    /// True when the operation may be retried with backoff.
    ///
    /// Retryable: timeouts, 5xx, 429 and network failures. Everything else,
    /// including precondition and token failures, is terminal for the
    /// attempt (they have their own recovery paths).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkError | Self::Timeout | Self::RateLimited | Self::ServerError
        )
    }

    /// Machine-readable name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed => "authentication_failed",
            Self::AuthorizationFailed => "authorization_failed",
            Self::NetworkError => "network_error",
            Self::Timeout => "timeout",
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::InvalidResponse => "invalid_response",
            Self::NotFound => "not_found",
            Self::BadRequest => "bad_request",
            Self::PreconditionFailed => "precondition_failed",
            Self::SyncTokenInvalid => "sync_token_invalid",
            Self::ConfigurationError => "configuration_error",
            Self::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for ProviderErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An error from a calendar provider, carrying its classification and the
/// provider name for context.
#[derive(Debug, Error)]
pub struct ProviderError {
    code: ProviderErrorCode,
    message: String,
    provider: Option<String>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ProviderError {
    /// Creates an error with the given code and message.
    pub fn new(code: ProviderErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider: None,
            source: None,
        }
    }

    /// Creates an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::AuthenticationFailed, message)
    }

    /// Creates an authorization error.
    pub fn authorization(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::AuthorizationFailed, message)
    }

    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::NetworkError, message)
    }

    /// Creates a timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::Timeout, message)
    }

    /// Creates a rate-limit error.
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::RateLimited, message)
    }

    /// Creates a server error.
    pub fn server(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::ServerError, message)
    }

    /// Creates an invalid-response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::InvalidResponse, message)
    }

    /// Creates a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::NotFound, message)
    }

    /// Creates a bad-request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::BadRequest, message)
    }

    /// Creates a precondition-failed error.
    pub fn precondition_failed(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::PreconditionFailed, message)
    }

    /// Creates a sync-token-invalid error.
    pub fn sync_token_invalid(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::SyncTokenInvalid, message)
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::ConfigurationError, message)
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::InternalError, message)
    }

    /// Builder: attach the provider name.
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Builder: attach the underlying cause.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Returns the error code.
    pub fn code(&self) -> ProviderErrorCode {
        self.code
    }

    /// Returns the message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the provider name, if attached.
    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    /// True when the operation may be retried.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref provider) = self.provider {
            write!(f, "[{}] ", provider)?;
        }
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Result alias for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Maps an HTTP status to the matching error code.
pub fn code_for_status(status: u16) -> ProviderErrorCode {
    match status {
        401 => ProviderErrorCode::AuthenticationFailed,
        403 => ProviderErrorCode::AuthorizationFailed,
        404 => ProviderErrorCode::NotFound,
        408 => ProviderErrorCode::Timeout,
        412 => ProviderErrorCode::PreconditionFailed,
        429 => ProviderErrorCode::RateLimited,
        s if (500..600).contains(&s) => ProviderErrorCode::ServerError,
        s if (400..500).contains(&s) => ProviderErrorCode::BadRequest,
        _ => ProviderErrorCode::InvalidResponse,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_codes() {
        assert!(ProviderErrorCode::NetworkError.is_retryable());
        assert!(ProviderErrorCode::Timeout.is_retryable());
        assert!(ProviderErrorCode::RateLimited.is_retryable());
        assert!(ProviderErrorCode::ServerError.is_retryable());

        assert!(!ProviderErrorCode::AuthenticationFailed.is_retryable());
        assert!(!ProviderErrorCode::PreconditionFailed.is_retryable());
        assert!(!ProviderErrorCode::SyncTokenInvalid.is_retryable());
        assert!(!ProviderErrorCode::BadRequest.is_retryable());
    }

    #[test]
    fn status_mapping() {
        assert_eq!(code_for_status(401), ProviderErrorCode::AuthenticationFailed);
        assert_eq!(code_for_status(408), ProviderErrorCode::Timeout);
        assert_eq!(code_for_status(412), ProviderErrorCode::PreconditionFailed);
        assert_eq!(code_for_status(429), ProviderErrorCode::RateLimited);
        assert_eq!(code_for_status(503), ProviderErrorCode::ServerError);
        assert_eq!(code_for_status(422), ProviderErrorCode::BadRequest);
    }

    #[test]
    fn display_includes_provider_and_code() {
        let err = ProviderError::precondition_failed("etag mismatch").with_provider("caldav");
        let text = err.to_string();
        assert!(text.contains("[caldav]"));
        assert!(text.contains("precondition_failed"));
        assert!(text.contains("etag mismatch"));
    }

    #[test]
    fn source_is_preserved() {
        use std::error::Error;
        let io = std::io::Error::other("connection reset");
        let err = ProviderError::network("request failed").with_source(io);
        assert!(err.source().is_some());
    }
}
