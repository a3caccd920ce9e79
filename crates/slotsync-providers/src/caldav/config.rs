//! CalDAV provider configuration.

use std::time::Duration;
use url::Url;

/// Configuration for the CalDAV provider.
#[derive(Debug, Clone)]
pub struct CalDavConfig {
    /// Base URL of the CalDAV server (principal or calendar collection).
    pub url: Url,

    /// Username for authentication.
    pub username: Option<String>,

    /// Password for authentication.
    pub password: Option<String>,

    /// Days to look behind when a full query has no explicit window.
    pub lookbehind_days: u32,

    /// Days to look ahead when a full query has no explicit window.
    pub lookahead_days: u32,

    /// Whether to verify TLS certificates.
    pub verify_tls: bool,

    /// Request timeout.
    pub timeout: Duration,

    /// User agent string.
    pub user_agent: String,
}

impl CalDavConfig {
    /// Default lookbehind days for unbounded full queries.
    pub const DEFAULT_LOOKBEHIND_DAYS: u32 = 30;

    /// Default lookahead days for unbounded full queries.
    pub const DEFAULT_LOOKAHEAD_DAYS: u32 = 90;

    /// Default timeout in seconds.
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    /// Creates a new CalDAV configuration with the given URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn new(url: impl AsRef<str>) -> Result<Self, url::ParseError> {
        let parsed = Url::parse(url.as_ref())?;
        Ok(Self {
            url: parsed,
            username: None,
            password: None,
            lookbehind_days: Self::DEFAULT_LOOKBEHIND_DAYS,
            lookahead_days: Self::DEFAULT_LOOKAHEAD_DAYS,
            verify_tls: true,
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            user_agent: format!("slotsync/{}", env!("CARGO_PKG_VERSION")),
        })
    }

    /// Sets the credentials for authentication.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Sets the default full-query window.
    pub fn with_query_window(mut self, lookbehind_days: u32, lookahead_days: u32) -> Self {
        self.lookbehind_days = lookbehind_days;
        self.lookahead_days = lookahead_days;
        self
    }

    /// Disables TLS verification (for testing only).
    pub fn with_insecure_tls(mut self) -> Self {
        self.verify_tls = false;
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the user agent string.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Returns the base URL as a string.
    pub fn url_str(&self) -> &str {
        self.url.as_str()
    }

    /// Returns the server host, if the URL carries one.
    pub fn host(&self) -> Option<&str> {
        self.url.host_str()
    }

    /// Returns true if credentials are configured.
    pub fn has_credentials(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }
}
