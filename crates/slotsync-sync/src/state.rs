//! Per-(user, provider, calendar) sync state.
//!
//! The state carries the incremental cursor and is replaced atomically,
//! and only after a fully successful pass; a failed or cancelled pass
//! leaves the previous state untouched.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Identifies one synchronized calendar for one user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncKey {
    /// The local user.
    pub user: String,
    /// The provider name.
    pub provider: String,
    /// The remote calendar id.
    pub calendar_id: String,
}

impl SyncKey {
    /// Creates a sync key.
    pub fn new(
        user: impl Into<String>,
        provider: impl Into<String>,
        calendar_id: impl Into<String>,
    ) -> Self {
        Self {
            user: user.into(),
            provider: provider.into(),
            calendar_id: calendar_id.into(),
        }
    }
}

/// The committed state of one synchronized calendar.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    /// The incremental cursor from the last successful pass.
    pub sync_token: Option<String>,
    /// When the last full (snapshot) sync completed.
    pub last_full_sync: Option<DateTime<Utc>>,
    /// When the last successful pass of any kind completed.
    pub last_sync: Option<DateTime<Utc>>,
}

/// Keyed store of sync states.
#[derive(Default)]
pub struct SyncStateStore {
    states: RwLock<HashMap<SyncKey, SyncState>>,
}

impl SyncStateStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the committed state for a key, or the default empty state.
    pub async fn get(&self, key: &SyncKey) -> SyncState {
        let states = self.states.read().await;
        states.get(key).cloned().unwrap_or_default()
    }

    /// Atomically replaces the state for a key.
    ///
    /// Called exactly once per fully successful pass; partial progress is
    /// never committed.
    pub async fn commit(&self, key: SyncKey, state: SyncState) {
        let mut states = self.states.write().await;
        states.insert(key, state);
    }

    /// Drops the state for a key, forcing the next pass to run full.
    pub async fn reset(&self, key: &SyncKey) {
        let mut states = self.states.write().await;
        states.remove(key);
    }

    /// Number of committed keys.
    pub async fn len(&self) -> usize {
        self.states.read().await.len()
    }

    /// True when nothing has been committed.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn key() -> SyncKey {
        SyncKey::new("alice", "caldav", "/calendars/alice/work/")
    }

    #[tokio::test]
    async fn missing_key_yields_the_empty_state() {
        let store = SyncStateStore::new();
        let state = store.get(&key()).await;
        assert!(state.sync_token.is_none());
        assert!(state.last_sync.is_none());
    }

    #[tokio::test]
    async fn commit_replaces_wholesale() {
        let store = SyncStateStore::new();
        let at = Utc.with_ymd_and_hms(2025, 6, 10, 12, 0, 0).unwrap();

        store
            .commit(
                key(),
                SyncState {
                    sync_token: Some("t1".into()),
                    last_full_sync: Some(at),
                    last_sync: Some(at),
                },
            )
            .await;
        store
            .commit(
                key(),
                SyncState {
                    sync_token: Some("t2".into()),
                    last_full_sync: Some(at),
                    last_sync: Some(at),
                },
            )
            .await;

        assert_eq!(store.get(&key()).await.sync_token.as_deref(), Some("t2"));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn reset_forces_a_full_pass() {
        let store = SyncStateStore::new();
        store
            .commit(
                key(),
                SyncState {
                    sync_token: Some("t1".into()),
                    ..Default::default()
                },
            )
            .await;

        store.reset(&key()).await;
        assert!(store.get(&key()).await.sync_token.is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let store = SyncStateStore::new();
        let other = SyncKey::new("bob", "caldav", "/calendars/bob/work/");

        store
            .commit(
                key(),
                SyncState {
                    sync_token: Some("alice-token".into()),
                    ..Default::default()
                },
            )
            .await;

        assert!(store.get(&other).await.sync_token.is_none());
    }
}
