//! Keyed provider session cache.
//!
//! Sessions (credential + expiry) are cached per `(provider, identity)`.
//! Reads are cheap and concurrent; refresh is single-writer per key so a
//! stampede of callers produces exactly one refresh call. The cache is a
//! plain value handed to its users - no global state - so tests control its
//! lifetime.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::error::ProviderResult;

/// Cache key: one session per provider + identity pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    /// Provider name, e.g. "caldav".
    pub provider: String,
    /// The authenticated identity (username or principal).
    pub identity: String,
}

impl SessionKey {
    /// Creates a session key.
    pub fn new(provider: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            identity: identity.into(),
        }
    }
}

/// A cached credential with its expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSession {
    /// The opaque credential material (token, ticket, ...).
    pub credential: String,
    /// When the credential stops being valid.
    pub expires_at: DateTime<Utc>,
}

impl ProviderSession {
    /// Creates a session.
    pub fn new(credential: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            credential: credential.into(),
            expires_at,
        }
    }

    /// True when the session is still usable at `now`, with a safety
    /// leeway so a session is refreshed before it expires mid-request.
    pub fn is_valid_at(&self, now: DateTime<Utc>, leeway: Duration) -> bool {
        now + leeway < self.expires_at
    }
}

/// Per-key slot: the session plus the refresh lock for that key.
#[derive(Default)]
struct CacheSlot {
    session: Option<ProviderSession>,
    refresh_lock: Arc<Mutex<()>>,
}

/// The session cache.
pub struct SessionCache {
    slots: RwLock<HashMap<SessionKey, CacheSlot>>,
    /// Sessions this close to expiry count as expired.
    leeway: Duration,
}

impl Default for SessionCache {
    fn default() -> Self {
        Self::new(Duration::seconds(60))
    }
}

impl SessionCache {
    /// Creates a cache with the given expiry leeway.
    pub fn new(leeway: Duration) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            leeway,
        }
    }

    /// Returns the cached session for `key` if it is still valid at `now`.
    pub async fn get(&self, key: &SessionKey, now: DateTime<Utc>) -> Option<ProviderSession> {
        let slots = self.slots.read().await;
        slots
            .get(key)
            .and_then(|slot| slot.session.as_ref())
            .filter(|s| s.is_valid_at(now, self.leeway))
            .cloned()
    }

    /// Returns a valid session for `key`, refreshing it if necessary.
    ///
    /// Only one caller per key runs `refresh` at a time; the map lock is
    /// never held across the refresh call. Losers of the refresh race see
    /// the winner's session and return without refreshing.
    pub async fn get_or_refresh<F, Fut>(
        &self,
        key: &SessionKey,
        now: DateTime<Utc>,
        refresh: F,
    ) -> ProviderResult<ProviderSession>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ProviderResult<ProviderSession>>,
    {
        if let Some(session) = self.get(key, now).await {
            return Ok(session);
        }

        // Take the per-key refresh lock (creating the slot if needed).
        let refresh_lock = {
            let mut slots = self.slots.write().await;
            slots.entry(key.clone()).or_default().refresh_lock.clone()
        };
        let _guard = refresh_lock.lock().await;

        // Another caller may have refreshed while we waited for the lock.
        if let Some(session) = self.get(key, now).await {
            return Ok(session);
        }

        debug!(provider = %key.provider, identity = %key.identity, "refreshing provider session");
        let session = refresh().await?;

        let mut slots = self.slots.write().await;
        slots.entry(key.clone()).or_default().session = Some(session.clone());
        Ok(session)
    }

    /// Drops the session for `key`.
    pub async fn invalidate(&self, key: &SessionKey) {
        let mut slots = self.slots.write().await;
        if let Some(slot) = slots.get_mut(key) {
            slot.session = None;
        }
    }

    /// Removes every expired entry, returning how many were dropped.
    pub async fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let mut slots = self.slots.write().await;
        let mut evicted = 0;
        for slot in slots.values_mut() {
            if slot
                .session
                .as_ref()
                .is_some_and(|s| !s.is_valid_at(now, self.leeway))
            {
                slot.session = None;
                evicted += 1;
            }
        }
        if evicted > 0 {
            debug!(evicted, "evicted expired provider sessions");
        }
        evicted
    }

    /// Number of keys with a live session.
    pub async fn len(&self) -> usize {
        let slots = self.slots.read().await;
        slots.values().filter(|s| s.session.is_some()).count()
    }

    /// True when no live sessions are cached.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 10, 12, 0, 0).unwrap()
    }

    fn key() -> SessionKey {
        SessionKey::new("caldav", "alice")
    }

    #[test]
    fn validity_respects_leeway() {
        let session = ProviderSession::new("tok", now() + Duration::seconds(90));
        assert!(session.is_valid_at(now(), Duration::seconds(60)));
        assert!(!session.is_valid_at(now(), Duration::seconds(120)));
    }

    #[tokio::test]
    async fn refreshes_on_miss_and_caches() {
        let cache = SessionCache::default();
        let calls = AtomicU32::new(0);

        let session = cache
            .get_or_refresh(&key(), now(), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(ProviderSession::new("tok-1", now() + Duration::hours(1)))
            })
            .await
            .unwrap();
        assert_eq!(session.credential, "tok-1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Second call is served from cache.
        let again = cache
            .get_or_refresh(&key(), now(), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(ProviderSession::new("tok-2", now() + Duration::hours(1)))
            })
            .await
            .unwrap();
        assert_eq!(again.credential, "tok-1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_session_is_refreshed() {
        let cache = SessionCache::default();

        cache
            .get_or_refresh(&key(), now(), || async {
                Ok(ProviderSession::new("old", now() + Duration::seconds(10)))
            })
            .await
            .unwrap();

        // 10s to expiry is within the default 60s leeway: refresh again.
        let session = cache
            .get_or_refresh(&key(), now(), || async {
                Ok(ProviderSession::new("new", now() + Duration::hours(1)))
            })
            .await
            .unwrap();
        assert_eq!(session.credential, "new");
    }

    #[tokio::test]
    async fn concurrent_refreshes_run_once_per_key() {
        let cache = Arc::new(SessionCache::default());
        let calls = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_refresh(&key(), now(), || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        // Give the other tasks time to pile up on the lock.
                        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                        Ok(ProviderSession::new("tok", now() + Duration::hours(1)))
                    })
                    .await
                    .unwrap()
            }));
        }

        for handle in handles {
            let session = handle.await.unwrap();
            assert_eq!(session.credential, "tok");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_keys_do_not_share_sessions() {
        let cache = SessionCache::default();
        let alice = SessionKey::new("caldav", "alice");
        let bob = SessionKey::new("caldav", "bob");

        cache
            .get_or_refresh(&alice, now(), || async {
                Ok(ProviderSession::new("tok-alice", now() + Duration::hours(1)))
            })
            .await
            .unwrap();

        assert!(cache.get(&bob, now()).await.is_none());
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn eviction_drops_only_expired_entries() {
        let cache = SessionCache::default();
        let alice = SessionKey::new("caldav", "alice");
        let bob = SessionKey::new("caldav", "bob");

        cache
            .get_or_refresh(&alice, now(), || async {
                Ok(ProviderSession::new("a", now() + Duration::hours(1)))
            })
            .await
            .unwrap();
        cache
            .get_or_refresh(&bob, now(), || async {
                Ok(ProviderSession::new("b", now() + Duration::hours(2)))
            })
            .await
            .unwrap();

        let later = now() + Duration::minutes(90);
        assert_eq!(cache.evict_expired(later).await, 1);
        assert!(cache.get(&alice, later).await.is_none());
        assert!(cache.get(&bob, later).await.is_some());
    }

    #[tokio::test]
    async fn invalidate_clears_the_session() {
        let cache = SessionCache::default();
        cache
            .get_or_refresh(&key(), now(), || async {
                Ok(ProviderSession::new("tok", now() + Duration::hours(1)))
            })
            .await
            .unwrap();

        cache.invalidate(&key()).await;
        assert!(cache.get(&key(), now()).await.is_none());
        assert!(cache.is_empty().await);
    }
}
