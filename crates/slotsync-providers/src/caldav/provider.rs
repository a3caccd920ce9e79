//! The CalDAV implementation of [`CalendarProvider`].
//!
//! Server identity is pattern-matched to a [`ServerProfile`] once at
//! construction; unrecognized hosts go through the standard discovery
//! handshake (well-known resource, current-user-principal,
//! calendar-home-set) instead. Listings take the sync-collection path when
//! the caller holds a token, falling back to a bounded calendar-query whose
//! result is a complete snapshot.

use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use slotsync_core::{CanonicalEvent, TimeWindow};

use crate::error::{ProviderError, ProviderResult};
use crate::normalize::{from_canonical, to_canonical_batch};
use crate::provider::{
    AccessRole, BoxFuture, Calendar, CalendarProvider, FetchResult, ListQuery,
    ProviderCapabilities, ProviderStatus, WriteReceipt,
};
use crate::retry::{RetryPolicy, with_retries};

use super::client::{CalDavClient, Precondition};
use super::config::CalDavConfig;
use super::ics::{WireEvent, generate_calendar, parse_calendar};
use super::xml::{
    calendar_query_body, parse_calendar_home_href, parse_calendars_response,
    parse_collection_sync_token, parse_principal_href, parse_report_response,
    propfind_calendar_home_body, propfind_calendars_body, propfind_principal_body,
    propfind_sync_token_body, sync_collection_body,
};

/// Capability flags resolved once from the server identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerProfile {
    /// Short profile name for logs and status.
    pub name: &'static str,
    /// Every calendar on this server supports sync-collection, even when a
    /// listing omits the supported-report-set property.
    pub assume_sync_collection: bool,
    /// The configured URL already names the calendar home, so discovery can
    /// skip the principal handshake.
    pub url_is_calendar_home: bool,
}

const GENERIC_PROFILE: ServerProfile = ServerProfile {
    name: "generic",
    assume_sync_collection: false,
    url_is_calendar_home: false,
};

const PROFILES: &[(&str, ServerProfile)] = &[
    (
        "icloud.com",
        ServerProfile {
            name: "icloud",
            assume_sync_collection: true,
            url_is_calendar_home: false,
        },
    ),
    (
        "fastmail.com",
        ServerProfile {
            name: "fastmail",
            assume_sync_collection: true,
            url_is_calendar_home: false,
        },
    ),
    (
        "nextcloud",
        ServerProfile {
            name: "nextcloud",
            assume_sync_collection: true,
            url_is_calendar_home: false,
        },
    ),
    (
        "radicale",
        ServerProfile {
            name: "radicale",
            assume_sync_collection: true,
            url_is_calendar_home: true,
        },
    ),
];

/// Matches a server host against the profile table, falling back to the
/// generic profile (which relies on the discovery handshake).
pub fn detect_profile(host: &str) -> ServerProfile {
    let host = host.to_lowercase();
    PROFILES
        .iter()
        .find(|(pattern, _)| host.ends_with(pattern) || host.contains(pattern))
        .map(|(_, profile)| *profile)
        .unwrap_or(GENERIC_PROFILE)
}

/// CalDAV calendar provider.
pub struct CalDavProvider {
    /// HTTP client; the internal auth state needs exclusive access.
    client: Mutex<CalDavClient>,
    /// Provider configuration.
    config: CalDavConfig,
    /// Profile resolved from the server identity at construction.
    profile: ServerProfile,
    /// Backoff policy for transient failures.
    retry: RetryPolicy,
    /// Whether authentication has succeeded.
    authenticated: AtomicBool,
    /// Last successful listing instant.
    last_sync: Mutex<Option<DateTime<Utc>>>,
    /// Number of calendars found by the last discovery.
    calendar_count: AtomicUsize,
}

impl CalDavProvider {
    /// Creates a CalDAV provider with the given configuration.
    pub fn new(config: CalDavConfig) -> ProviderResult<Self> {
        let client = CalDavClient::new(config.clone())?;
        let profile = detect_profile(config.host().unwrap_or_default());
        debug!(profile = profile.name, url = config.url_str(), "resolved server profile");

        Ok(Self {
            client: Mutex::new(client),
            config,
            profile,
            retry: RetryPolicy::default(),
            authenticated: AtomicBool::new(false),
            last_sync: Mutex::new(None),
            calendar_count: AtomicUsize::new(0),
        })
    }

    /// Builder: replace the retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Returns the resolved server profile.
    pub fn profile(&self) -> ServerProfile {
        self.profile
    }

    async fn propfind(&self, url: &str, body: &str, depth: u8) -> ProviderResult<String> {
        with_retries(&self.retry, || async {
            let mut client = self.client.lock().await;
            client.propfind(url, body, depth).await
        })
        .await
        .map_err(|e| e.with_provider("caldav"))
    }

    async fn report(&self, url: &str, body: &str) -> ProviderResult<String> {
        with_retries(&self.retry, || async {
            let mut client = self.client.lock().await;
            client.report(url, body).await
        })
        .await
        .map_err(|e| e.with_provider("caldav"))
    }

    /// Finds the calendar home URL.
    ///
    /// Known-profile servers whose configured URL is the home skip the
    /// handshake; everyone else walks well-known resource, principal and
    /// calendar-home-set.
    async fn discover_calendar_home(&self) -> ProviderResult<String> {
        if self.profile.url_is_calendar_home {
            return Ok(self.config.url_str().to_string());
        }

        let principal = self.discover_principal().await?;
        let principal_url = self.resolve(&principal);

        let response = self
            .propfind(&principal_url, &propfind_calendar_home_body(), 0)
            .await?;
        let home = parse_calendar_home_href(&response).ok_or_else(|| {
            ProviderError::invalid_response("principal reported no calendar-home-set")
                .with_provider("caldav")
        })?;

        Ok(self.resolve(&home))
    }

    async fn discover_principal(&self) -> ProviderResult<String> {
        let body = propfind_principal_body();

        // The well-known resource redirects to the real context path on
        // conforming servers; fall back to the configured URL directly.
        let well_known = self.resolve("/.well-known/caldav");
        match self.propfind(&well_known, &body, 0).await {
            Ok(response) => {
                if let Some(href) = parse_principal_href(&response) {
                    return Ok(href);
                }
            }
            Err(e) if !e.is_retryable() => {
                debug!(error = %e, "well-known lookup failed, querying the configured URL");
            }
            Err(e) => return Err(e),
        }

        let response = self
            .propfind(self.config.url_str(), &body, 0)
            .await?;
        parse_principal_href(&response).ok_or_else(|| {
            ProviderError::invalid_response("server reported no current-user-principal")
                .with_provider("caldav")
        })
    }

    async fn list_full(&self, calendar_url: &str, window: TimeWindow) -> ProviderResult<FetchResult> {
        debug!(
            calendar = %calendar_url,
            start = %window.start,
            end = %window.end,
            "full listing via calendar-query"
        );

        let response = self
            .report(calendar_url, &calendar_query_body(window.start, window.end))
            .await?;
        let outcome = parse_report_response(&response);
        let events = self.decode_entries(calendar_url, outcome.entries);

        // A fresh collection token lets the next pass go incremental.
        let token = self.fetch_collection_token(calendar_url).await;

        let mut result = FetchResult::snapshot(events);
        if let Some(token) = token {
            result = result.with_sync_token(token);
        }
        Ok(result)
    }

    async fn list_incremental(&self, calendar_url: &str, token: &str) -> ProviderResult<FetchResult> {
        debug!(calendar = %calendar_url, "incremental listing via sync-collection");

        let response = self.report(calendar_url, &sync_collection_body(token)).await?;
        let outcome = parse_report_response(&response);

        let events = self.decode_entries(calendar_url, outcome.entries);
        let removed = outcome
            .removed
            .iter()
            .map(|href| uid_from_href(href))
            .collect();

        let mut result = FetchResult::delta(events, removed);
        if let Some(token) = outcome.sync_token {
            result = result.with_sync_token(token);
        }
        Ok(result)
    }

    fn decode_entries(
        &self,
        calendar_url: &str,
        entries: Vec<super::xml::EventEntry>,
    ) -> Vec<CanonicalEvent> {
        let wires: Vec<(WireEvent, Option<String>)> = entries
            .into_iter()
            .flat_map(|entry| {
                parse_calendar(&entry.data)
                    .into_iter()
                    .map(move |wire| (wire, entry.etag.clone()))
                    .collect::<Vec<_>>()
            })
            .collect();

        to_canonical_batch(&wires, "caldav", calendar_url)
    }

    async fn fetch_collection_token(&self, calendar_url: &str) -> Option<String> {
        match self
            .propfind(calendar_url, &propfind_sync_token_body(), 0)
            .await
        {
            Ok(response) => parse_collection_sync_token(&response),
            Err(e) => {
                debug!(error = %e, "collection sync-token lookup failed");
                None
            }
        }
    }

    /// Default bounded window for full queries without an explicit range.
    fn default_window(&self) -> TimeWindow {
        let now = Utc::now();
        TimeWindow::new(
            now - Duration::days(self.config.lookbehind_days as i64),
            now + Duration::days(self.config.lookahead_days as i64),
        )
    }

    /// Resolves a server-relative href against the configured base URL.
    fn resolve(&self, href: &str) -> String {
        if href.starts_with("http://") || href.starts_with("https://") {
            href.to_string()
        } else {
            self.config
                .url
                .join(href)
                .map(|u| u.to_string())
                .unwrap_or_else(|_| href.to_string())
        }
    }

    /// The entity URL for an event uid inside a calendar collection.
    fn event_url(&self, calendar_id: &str, uid: &str) -> String {
        let base = self.resolve(calendar_id);
        let separator = if base.ends_with('/') { "" } else { "/" };
        format!("{}{}{}.ics", base, separator, uid)
    }
}

impl CalendarProvider for CalDavProvider {
    fn name(&self) -> &str {
        "caldav"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            incremental_sync: true,
            etag_writes: true,
            server_side_expansion: true,
        }
    }

    fn authenticate(&self) -> BoxFuture<'_, ProviderResult<()>> {
        Box::pin(async move {
            if !self.config.has_credentials() {
                return Err(
                    ProviderError::configuration("no credentials configured")
                        .with_provider("caldav"),
                );
            }

            // A principal lookup is the cheapest authenticated round-trip.
            self.discover_principal().await?;
            self.authenticated.store(true, Ordering::SeqCst);
            info!(profile = self.profile.name, "caldav authentication succeeded");
            Ok(())
        })
    }

    fn discover_calendars(&self) -> BoxFuture<'_, ProviderResult<Vec<Calendar>>> {
        Box::pin(async move {
            let home = self.discover_calendar_home().await?;
            let response = self.propfind(&home, &propfind_calendars_body(), 1).await?;
            let discovered = parse_calendars_response(&response);

            let calendars: Vec<Calendar> = discovered
                .into_iter()
                .map(|c| {
                    let role = if c.can_write {
                        AccessRole::Writer
                    } else {
                        AccessRole::Reader
                    };
                    let display_name = c.display_name.clone().unwrap_or_else(|| c.href.clone());
                    Calendar::new(c.href, display_name)
                        .with_access_role(role)
                        .with_sync_token_support(
                            c.supports_sync_token || self.profile.assume_sync_collection,
                        )
                })
                .collect();

            info!(count = calendars.len(), "discovered calendars");
            self.authenticated.store(true, Ordering::SeqCst);
            self.calendar_count.store(calendars.len(), Ordering::SeqCst);
            Ok(calendars)
        })
    }

    fn list_events(
        &self,
        calendar_id: &str,
        query: ListQuery,
    ) -> BoxFuture<'_, ProviderResult<FetchResult>> {
        let calendar_id = calendar_id.to_string();
        Box::pin(async move {
            let calendar_url = self.resolve(&calendar_id);

            let result = match query.sync_token {
                Some(ref token) => self.list_incremental(&calendar_url, token).await?,
                None => {
                    let window = query.window.unwrap_or_else(|| self.default_window());
                    self.list_full(&calendar_url, window).await?
                }
            };

            self.authenticated.store(true, Ordering::SeqCst);
            *self.last_sync.lock().await = Some(Utc::now());
            Ok(result)
        })
    }

    fn fetch_event(
        &self,
        calendar_id: &str,
        uid: &str,
    ) -> BoxFuture<'_, ProviderResult<CanonicalEvent>> {
        let url = self.event_url(calendar_id, uid);
        let calendar_id = calendar_id.to_string();
        let uid = uid.to_string();
        Box::pin(async move {
            let (body, etag) = with_retries(&self.retry, || async {
                let mut client = self.client.lock().await;
                client.get(&url).await
            })
            .await
            .map_err(|e| e.with_provider("caldav"))?;

            let calendar_url = self.resolve(&calendar_id);
            let wires: Vec<(WireEvent, Option<String>)> = parse_calendar(&body)
                .into_iter()
                .map(|wire| (wire, etag.clone()))
                .collect();

            to_canonical_batch(&wires, "caldav", &calendar_url)
                .into_iter()
                .find(|event| event.uid == uid)
                .ok_or_else(|| {
                    ProviderError::invalid_response(format!("entity {} carried no usable VEVENT", uid))
                        .with_provider("caldav")
                })
        })
    }

    fn create_event(
        &self,
        calendar_id: &str,
        event: &CanonicalEvent,
    ) -> BoxFuture<'_, ProviderResult<WriteReceipt>> {
        let url = self.event_url(calendar_id, &event.uid);
        let ics = generate_calendar(&from_canonical(event));
        Box::pin(async move {
            let etag = with_retries(&self.retry, || async {
                let mut client = self.client.lock().await;
                client.put(&url, &ics, Precondition::TargetAbsent).await
            })
            .await
            .map_err(|e| e.with_provider("caldav"))?;

            Ok(WriteReceipt { href: url, etag })
        })
    }

    fn update_event(
        &self,
        calendar_id: &str,
        event: &CanonicalEvent,
    ) -> BoxFuture<'_, ProviderResult<WriteReceipt>> {
        let url = self.event_url(calendar_id, &event.uid);
        let ics = generate_calendar(&from_canonical(event));
        let guard = event.etag.clone();
        Box::pin(async move {
            let Some(etag) = guard else {
                return Err(ProviderError::bad_request(
                    "update requires the event's etag; refetch it first",
                )
                .with_provider("caldav"));
            };

            let new_etag = with_retries(&self.retry, || async {
                let mut client = self.client.lock().await;
                client
                    .put(&url, &ics, Precondition::EtagMatches(etag.clone()))
                    .await
            })
            .await
            .map_err(|e| e.with_provider("caldav"))?;

            Ok(WriteReceipt {
                href: url,
                etag: new_etag,
            })
        })
    }

    fn delete_event(
        &self,
        calendar_id: &str,
        uid: &str,
        etag: &str,
    ) -> BoxFuture<'_, ProviderResult<()>> {
        let url = self.event_url(calendar_id, uid);
        let etag = etag.to_string();
        Box::pin(async move {
            with_retries(&self.retry, || async {
                let mut client = self.client.lock().await;
                client.delete(&url, &etag).await
            })
            .await
            .map_err(|e| e.with_provider("caldav"))
        })
    }

    fn status(&self) -> BoxFuture<'_, ProviderStatus> {
        Box::pin(async move {
            let mut status = ProviderStatus::new("caldav");
            status.is_authenticated = self.authenticated.load(Ordering::SeqCst);
            status.last_sync = *self.last_sync.lock().await;
            status.calendar_count = self.calendar_count.load(Ordering::SeqCst);
            status
        })
    }
}

/// Derives the event uid from an entity href.
///
/// Entities are stored as `<calendar>/<uid>.ics`, so removals reported by
/// href map back to the uid via the file stem.
fn uid_from_href(href: &str) -> String {
    let segment = href.trim_end_matches('/').rsplit('/').next().unwrap_or(href);
    segment.trim_end_matches(".ics").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotsync_core::EventTime;
    use chrono::TimeZone;

    fn provider() -> CalDavProvider {
        let config = CalDavConfig::new("https://caldav.example.com/calendars/alice/").unwrap();
        CalDavProvider::new(config).unwrap()
    }

    #[test]
    fn profile_detection() {
        assert_eq!(detect_profile("caldav.icloud.com").name, "icloud");
        assert_eq!(detect_profile("caldav.fastmail.com").name, "fastmail");
        assert_eq!(detect_profile("cloud.example.com").name, "generic");
        assert!(detect_profile("nextcloud.example.org").assume_sync_collection);
        assert!(detect_profile("radicale.lan").url_is_calendar_home);
    }

    #[test]
    fn unknown_host_gets_the_generic_profile() {
        let profile = detect_profile("dav.selfhosted.example");
        assert_eq!(profile.name, "generic");
        assert!(!profile.assume_sync_collection);
    }

    #[test]
    fn provider_capabilities() {
        let provider = provider();
        assert_eq!(provider.name(), "caldav");
        let caps = provider.capabilities();
        assert!(caps.incremental_sync);
        assert!(caps.etag_writes);
    }

    #[test]
    fn href_resolution() {
        let provider = provider();

        assert_eq!(
            provider.resolve("work/"),
            "https://caldav.example.com/calendars/alice/work/"
        );
        assert_eq!(
            provider.resolve("/calendars/alice/personal/"),
            "https://caldav.example.com/calendars/alice/personal/"
        );
        assert_eq!(
            provider.resolve("https://other.example.com/cal/"),
            "https://other.example.com/cal/"
        );
    }

    #[test]
    fn event_url_construction() {
        let provider = provider();
        assert_eq!(
            provider.event_url("/calendars/alice/work/", "evt-1@slotsync"),
            "https://caldav.example.com/calendars/alice/work/evt-1@slotsync.ics"
        );
        assert_eq!(
            provider.event_url("/calendars/alice/work", "evt-1"),
            "https://caldav.example.com/calendars/alice/work/evt-1.ics"
        );
    }

    #[test]
    fn uid_from_href_takes_the_file_stem() {
        assert_eq!(
            uid_from_href("/calendars/alice/work/evt-1@slotsync.ics"),
            "evt-1@slotsync"
        );
        assert_eq!(uid_from_href("evt-2.ics"), "evt-2");
    }

    #[tokio::test]
    async fn initial_status_is_unauthenticated() {
        let provider = provider();
        let status = provider.status().await;
        assert!(!status.is_authenticated);
        assert_eq!(status.calendar_count, 0);
        assert!(status.last_sync.is_none());
    }

    #[tokio::test]
    async fn update_without_etag_is_rejected() {
        let provider = provider();
        let event = CanonicalEvent::new(
            "evt@x",
            "No etag",
            EventTime::from_utc(Utc.with_ymd_and_hms(2025, 6, 10, 10, 0, 0).unwrap()),
            EventTime::from_utc(Utc.with_ymd_and_hms(2025, 6, 10, 11, 0, 0).unwrap()),
            "caldav",
            "/calendars/alice/work/",
        );

        let err = provider
            .update_event("/calendars/alice/work/", &event)
            .await
            .unwrap_err();
        assert_eq!(err.code(), crate::error::ProviderErrorCode::BadRequest);
    }
}
