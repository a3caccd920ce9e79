//! The `CalendarProvider` trait.
//!
//! This is the single capability interface the sync orchestrator drives.
//! Implementations cover authentication, calendar discovery, full and
//! incremental listing, and etag-guarded writes.

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use slotsync_core::{CanonicalEvent, TimeWindow};

use crate::error::{ProviderError, ProviderResult};

/// A boxed future for object-safe async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a provider (or an individual calendar) can do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCapabilities {
    /// Supports sync-token based incremental listing.
    pub incremental_sync: bool,
    /// Honors etag preconditions on writes.
    pub etag_writes: bool,
    /// Expands recurring events server-side in time-range queries.
    pub server_side_expansion: bool,
}

/// The caller's access level on a calendar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessRole {
    Owner,
    Writer,
    #[default]
    Reader,
}

impl AccessRole {
    /// True when events may be created/updated/deleted.
    pub fn can_write(&self) -> bool {
        matches!(self, Self::Owner | Self::Writer)
    }
}

/// A remote calendar as discovered from the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Calendar {
    /// Provider-scoped calendar identifier (href or id).
    pub id: String,
    /// Human-readable name.
    pub display_name: String,
    /// The caller's role on this calendar.
    pub access_role: AccessRole,
    /// Whether this calendar supports sync-token listing.
    pub supports_sync_token: bool,
}

impl Calendar {
    /// Creates a calendar with reader access and no sync-token support.
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            access_role: AccessRole::Reader,
            supports_sync_token: false,
        }
    }

    /// Builder: set the access role.
    pub fn with_access_role(mut self, role: AccessRole) -> Self {
        self.access_role = role;
        self
    }

    /// Builder: mark sync-token support.
    pub fn with_sync_token_support(mut self, supported: bool) -> Self {
        self.supports_sync_token = supported;
        self
    }
}

/// Parameters for a listing call.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    /// Bounded time range for full queries.
    pub window: Option<TimeWindow>,
    /// Incremental cursor from the previous successful sync.
    pub sync_token: Option<String>,
}

impl ListQuery {
    /// A full listing over the given window.
    pub fn full(window: TimeWindow) -> Self {
        Self {
            window: Some(window),
            sync_token: None,
        }
    }

    /// An incremental listing from the given token.
    pub fn incremental(token: impl Into<String>) -> Self {
        Self {
            window: None,
            sync_token: Some(token.into()),
        }
    }
}

/// Result of a listing call.
#[derive(Debug, Default)]
pub struct FetchResult {
    /// Created or changed events.
    pub events: Vec<CanonicalEvent>,
    /// Uids removed remotely (incremental listings only).
    pub removed: Vec<String>,
    /// Cursor to use for the next incremental listing.
    pub sync_token: Option<String>,
    /// True when `events` is a complete snapshot of the queried window
    /// rather than a delta.
    pub full_snapshot: bool,
}

impl FetchResult {
    /// A full snapshot result.
    pub fn snapshot(events: Vec<CanonicalEvent>) -> Self {
        Self {
            events,
            removed: Vec::new(),
            sync_token: None,
            full_snapshot: true,
        }
    }

    /// A delta result.
    pub fn delta(events: Vec<CanonicalEvent>, removed: Vec<String>) -> Self {
        Self {
            events,
            removed,
            sync_token: None,
            full_snapshot: false,
        }
    }

    /// Builder: set the next sync token.
    pub fn with_sync_token(mut self, token: impl Into<String>) -> Self {
        self.sync_token = Some(token.into());
        self
    }
}

/// Receipt from a successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReceipt {
    /// The entity's location on the provider.
    pub href: String,
    /// The new etag, when the provider returned one. Absent etags force a
    /// refetch before the next guarded write.
    pub etag: Option<String>,
}

/// Status snapshot of a provider.
#[derive(Debug, Clone)]
pub struct ProviderStatus {
    /// Provider name.
    pub provider: String,
    /// Whether the last authentication attempt succeeded.
    pub is_authenticated: bool,
    /// Last successful listing instant.
    pub last_sync: Option<DateTime<Utc>>,
    /// Number of calendars discovered.
    pub calendar_count: usize,
    /// Current error state, if any.
    pub error: Option<String>,
}

impl ProviderStatus {
    /// Creates an empty status for the named provider.
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            is_authenticated: false,
            last_sync: None,
            calendar_count: 0,
            error: None,
        }
    }
}

/// The capability interface all calendar back-ends implement.
///
/// Implementations must be `Send + Sync`; methods return boxed futures so
/// the trait stays object-safe behind `dyn`.
pub trait CalendarProvider: Send + Sync {
    /// The provider name (e.g. "caldav").
    fn name(&self) -> &str;

    /// Static capabilities of this provider.
    fn capabilities(&self) -> ProviderCapabilities;

    /// Validates credentials against the server.
    fn authenticate(&self) -> BoxFuture<'_, ProviderResult<()>>;

    /// Discovers the calendars visible to the authenticated identity.
    fn discover_calendars(&self) -> BoxFuture<'_, ProviderResult<Vec<Calendar>>>;

    /// Lists events from one calendar.
    ///
    /// When `query.sync_token` is set and the calendar supports it, the
    /// result is a delta; otherwise a bounded full snapshot.
    fn list_events(
        &self,
        calendar_id: &str,
        query: ListQuery,
    ) -> BoxFuture<'_, ProviderResult<FetchResult>>;

    /// Fetches a single event with its current etag, for refetch-and-retry
    /// after a lost optimistic-concurrency write.
    fn fetch_event(
        &self,
        calendar_id: &str,
        uid: &str,
    ) -> BoxFuture<'_, ProviderResult<CanonicalEvent>>;

    /// Creates an event. Fails with a precondition error if the target
    /// already exists.
    fn create_event(
        &self,
        calendar_id: &str,
        event: &CanonicalEvent,
    ) -> BoxFuture<'_, ProviderResult<WriteReceipt>>;

    /// Updates an event. The event's etag is required; a mismatch surfaces
    /// as a precondition error, never a silent overwrite.
    fn update_event(
        &self,
        calendar_id: &str,
        event: &CanonicalEvent,
    ) -> BoxFuture<'_, ProviderResult<WriteReceipt>>;

    /// Deletes an event, guarded by its etag.
    fn delete_event(
        &self,
        calendar_id: &str,
        uid: &str,
        etag: &str,
    ) -> BoxFuture<'_, ProviderResult<()>>;

    /// Returns the provider's current status.
    fn status(&self) -> BoxFuture<'_, ProviderStatus>;
}

/// A provider that fails every call with a fixed error.
///
/// Placeholder for back-ends that failed to initialize; also convenient in
/// tests.
#[derive(Debug)]
pub struct ErrorProvider {
    name: String,
    error: ProviderError,
}

impl ErrorProvider {
    /// Creates an error provider.
    pub fn new(name: impl Into<String>, error: ProviderError) -> Self {
        Self {
            name: name.into(),
            error,
        }
    }

    fn error(&self) -> ProviderError {
        ProviderError::new(self.error.code(), self.error.message()).with_provider(&self.name)
    }
}

impl CalendarProvider for ErrorProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::default()
    }

    fn authenticate(&self) -> BoxFuture<'_, ProviderResult<()>> {
        let error = self.error();
        Box::pin(async move { Err(error) })
    }

    fn discover_calendars(&self) -> BoxFuture<'_, ProviderResult<Vec<Calendar>>> {
        let error = self.error();
        Box::pin(async move { Err(error) })
    }

    fn list_events(
        &self,
        _calendar_id: &str,
        _query: ListQuery,
    ) -> BoxFuture<'_, ProviderResult<FetchResult>> {
        let error = self.error();
        Box::pin(async move { Err(error) })
    }

    fn fetch_event(
        &self,
        _calendar_id: &str,
        _uid: &str,
    ) -> BoxFuture<'_, ProviderResult<CanonicalEvent>> {
        let error = self.error();
        Box::pin(async move { Err(error) })
    }

    fn create_event(
        &self,
        _calendar_id: &str,
        _event: &CanonicalEvent,
    ) -> BoxFuture<'_, ProviderResult<WriteReceipt>> {
        let error = self.error();
        Box::pin(async move { Err(error) })
    }

    fn update_event(
        &self,
        _calendar_id: &str,
        _event: &CanonicalEvent,
    ) -> BoxFuture<'_, ProviderResult<WriteReceipt>> {
        let error = self.error();
        Box::pin(async move { Err(error) })
    }

    fn delete_event(
        &self,
        _calendar_id: &str,
        _uid: &str,
        _etag: &str,
    ) -> BoxFuture<'_, ProviderResult<()>> {
        let error = self.error();
        Box::pin(async move { Err(error) })
    }

    fn status(&self) -> BoxFuture<'_, ProviderStatus> {
        let mut status = ProviderStatus::new(&self.name);
        status.error = Some(self.error.message().to_string());
        Box::pin(async move { status })
    }
}
