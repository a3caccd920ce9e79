//! The sync orchestrator.
//!
//! A pass pulls remote changes (incremental when a token and the
//! capability exist, full otherwise), pushes local pending changes under
//! etag guards with one automatic refetch-and-retry, detects conflicts
//! over the merged schedule, and only then commits the new sync token.
//! A failed pass leaves [`SyncState`] exactly as it was.
//!
//! Passes are serialized per (user, provider, calendar) key through a
//! keyed lock map; passes for different keys run concurrently, and the
//! shared state store is never locked across a provider call.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use slotsync_core::CanonicalEvent;
use slotsync_engine::conflict::{BaseConflictEngine, Conflict, ConflictEngine, ScheduleItem};
use slotsync_providers::{
    Calendar, CalendarProvider, FetchResult, ListQuery, ProviderErrorCode,
};

use crate::error::{SyncError, SyncResult};
use crate::state::{SyncKey, SyncState, SyncStateStore};

/// A local change awaiting push to the provider.
#[derive(Debug, Clone)]
pub enum PendingChange {
    /// Create a new remote event.
    Create(CanonicalEvent),
    /// Update an existing remote event; the event's etag guards the write.
    Update(CanonicalEvent),
    /// Delete a remote event under its etag.
    Delete {
        /// The event uid.
        uid: String,
        /// The etag guarding the delete.
        etag: String,
    },
}

/// Structured outcome of one sync pass.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    /// Events created or changed remotely.
    pub pulled: usize,
    /// Uids removed remotely.
    pub removed: usize,
    /// Local changes pushed.
    pub pushed: usize,
    /// Conflicts detected over the merged schedule.
    pub conflicts: Vec<Conflict>,
    /// Full resyncs forced by an invalidated token (0 or 1 per pass).
    pub full_resyncs: u32,
    /// True when the pull was a complete snapshot rather than a delta.
    pub full_snapshot: bool,
}

/// Drives bidirectional reconciliation for one provider.
pub struct SyncOrchestrator {
    provider: Arc<dyn CalendarProvider>,
    states: Arc<SyncStateStore>,
    conflicts: Arc<dyn ConflictEngine>,
    pass_locks: Mutex<HashMap<SyncKey, Arc<Mutex<()>>>>,
}

impl SyncOrchestrator {
    /// Creates an orchestrator with the base conflict engine.
    pub fn new(provider: Arc<dyn CalendarProvider>, states: Arc<SyncStateStore>) -> Self {
        Self {
            provider,
            states,
            conflicts: Arc::new(BaseConflictEngine::default()),
            pass_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Builder: replace the conflict engine (e.g. with the enriched one).
    pub fn with_conflict_engine(mut self, engine: Arc<dyn ConflictEngine>) -> Self {
        self.conflicts = engine;
        self
    }

    /// Runs one sync pass for a user and calendar.
    ///
    /// `pending` are the local changes to push; `local` is the user's
    /// current schedule for conflict detection against the pulled events.
    ///
    /// # Errors
    ///
    /// Any pull or push failure aborts the pass with the sync state
    /// unmodified. An invalidated sync token is not a failure: it triggers
    /// exactly one full resync within the same pass.
    pub async fn sync_pass(
        &self,
        user: &str,
        calendar: &Calendar,
        pending: Vec<PendingChange>,
        local: Vec<ScheduleItem>,
    ) -> SyncResult<SyncReport> {
        let key = SyncKey::new(user, self.provider.name(), &calendar.id);
        let pass_lock = self.pass_lock(&key).await;
        let _serialized = pass_lock.lock().await;

        debug!(user, calendar = %calendar.id, "sync pass started");
        let previous = self.states.get(&key).await;

        let (fetch, full_resyncs) = self.pull(calendar, previous.sync_token.clone()).await?;

        let mut pushed = 0;
        for change in &pending {
            self.push_change(&calendar.id, change).await?;
            pushed += 1;
        }

        let conflicts = self.detect_conflicts(user, local, &fetch);

        // All-or-nothing: the token moves only after a fully successful
        // pass reaches this point.
        let now = Utc::now();
        let state = SyncState {
            sync_token: fetch.sync_token.clone().or(previous.sync_token),
            last_full_sync: if fetch.full_snapshot {
                Some(now)
            } else {
                previous.last_full_sync
            },
            last_sync: Some(now),
        };
        self.states.commit(key, state).await;

        let report = SyncReport {
            pulled: fetch.events.len(),
            removed: fetch.removed.len(),
            pushed,
            conflicts,
            full_resyncs,
            full_snapshot: fetch.full_snapshot,
        };
        info!(
            user,
            calendar = %calendar.id,
            pulled = report.pulled,
            pushed = report.pushed,
            removed = report.removed,
            conflicts = report.conflicts.len(),
            full_resyncs = report.full_resyncs,
            "sync pass finished"
        );
        Ok(report)
    }

    /// Returns the per-key pass lock, creating it on first use.
    async fn pass_lock(&self, key: &SyncKey) -> Arc<Mutex<()>> {
        let mut locks = self.pass_locks.lock().await;
        locks.entry(key.clone()).or_default().clone()
    }

    /// Pulls remote changes, falling back to one full resync when the
    /// token has been invalidated.
    async fn pull(
        &self,
        calendar: &Calendar,
        token: Option<String>,
    ) -> SyncResult<(FetchResult, u32)> {
        let query = match token {
            Some(token) if calendar.supports_sync_token => ListQuery::incremental(token),
            _ => ListQuery::default(),
        };
        let incremental = query.sync_token.is_some();

        match self.provider.list_events(&calendar.id, query).await {
            Ok(result) => Ok((result, 0)),
            Err(e) if incremental && e.code() == ProviderErrorCode::SyncTokenInvalid => {
                warn!(calendar = %calendar.id, "sync token invalidated, running one full resync");
                let result = self
                    .provider
                    .list_events(&calendar.id, ListQuery::default())
                    .await?;
                Ok((result, 1))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Pushes one change, retrying a lost etag race once after a refetch.
    async fn push_change(&self, calendar_id: &str, change: &PendingChange) -> SyncResult<()> {
        match change {
            PendingChange::Create(event) => {
                self.provider.create_event(calendar_id, event).await?;
                Ok(())
            }
            PendingChange::Update(event) => {
                match self.provider.update_event(calendar_id, event).await {
                    Ok(_) => Ok(()),
                    Err(e) if e.code() == ProviderErrorCode::PreconditionFailed => {
                        debug!(uid = %event.uid, "etag stale, refetching for one retry");
                        let fresh = self.provider.fetch_event(calendar_id, &event.uid).await?;
                        let Some(fresh_etag) = fresh.etag else {
                            return Err(SyncError::concurrency(
                                &event.uid,
                                "refetched entity carries no etag",
                            ));
                        };

                        let mut retry = event.clone();
                        retry.etag = Some(fresh_etag);
                        self.provider
                            .update_event(calendar_id, &retry)
                            .await
                            .map(|_| ())
                            .map_err(|e| {
                                if e.code() == ProviderErrorCode::PreconditionFailed {
                                    SyncError::concurrency(
                                        &event.uid,
                                        "etag stale again after refetch",
                                    )
                                } else {
                                    e.into()
                                }
                            })
                    }
                    Err(e) => Err(e.into()),
                }
            }
            PendingChange::Delete { uid, etag } => {
                match self.provider.delete_event(calendar_id, uid, etag).await {
                    Ok(()) => Ok(()),
                    Err(e) if e.code() == ProviderErrorCode::PreconditionFailed => {
                        debug!(uid = %uid, "etag stale on delete, refetching for one retry");
                        let fresh = self.provider.fetch_event(calendar_id, uid).await?;
                        let Some(fresh_etag) = fresh.etag else {
                            return Err(SyncError::concurrency(
                                uid,
                                "refetched entity carries no etag",
                            ));
                        };

                        self.provider
                            .delete_event(calendar_id, uid, &fresh_etag)
                            .await
                            .map_err(|e| {
                                if e.code() == ProviderErrorCode::PreconditionFailed {
                                    SyncError::concurrency(uid, "etag stale again after refetch")
                                } else {
                                    e.into()
                                }
                            })
                    }
                    Err(e) => Err(e.into()),
                }
            }
        }
    }

    /// Detects conflicts over the merged local and pulled schedule.
    ///
    /// Pulled items are re-tagged to the pass's user so they pair with the
    /// local items in per-owner detection.
    fn detect_conflicts(
        &self,
        user: &str,
        mut items: Vec<ScheduleItem>,
        fetch: &FetchResult,
    ) -> Vec<Conflict> {
        for event in &fetch.events {
            if event.is_cancelled() {
                continue;
            }
            let mut item = ScheduleItem::from_event(event);
            item.owner = user.to_string();
            items.push(item);
        }
        self.conflicts.detect(&items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone};
    use slotsync_core::{EventTime, TimeWindow};
    use slotsync_engine::conflict::ItemSource;
    use slotsync_providers::{
        BoxFuture, ProviderCapabilities, ProviderError, ProviderResult, ProviderStatus,
        WriteReceipt,
    };
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn utc(h: u32, m: u32) -> DateTime<chrono::Utc> {
        chrono::Utc.with_ymd_and_hms(2025, 6, 10, h, m, 0).unwrap()
    }

    fn event(uid: &str, h1: u32, h2: u32) -> CanonicalEvent {
        CanonicalEvent::new(
            uid,
            "Remote meeting",
            EventTime::from_utc(utc(h1, 0)),
            EventTime::from_utc(utc(h2, 0)),
            "scripted",
            "cal-1",
        )
    }

    fn calendar() -> Calendar {
        Calendar::new("cal-1", "Work").with_sync_token_support(true)
    }

    /// A provider fed from per-operation result queues.
    #[derive(Default)]
    struct ScriptedProvider {
        list_results: StdMutex<VecDeque<ProviderResult<FetchResult>>>,
        update_results: StdMutex<VecDeque<ProviderResult<WriteReceipt>>>,
        fetch_results: StdMutex<VecDeque<ProviderResult<CanonicalEvent>>>,
        /// The sync token of each list call, for asserting the taken path.
        list_tokens: StdMutex<Vec<Option<String>>>,
        update_calls: AtomicU32,
        fetch_calls: AtomicU32,
        active_lists: AtomicU32,
        max_active_lists: AtomicU32,
        list_delay_ms: u64,
    }

    impl ScriptedProvider {
        fn with_lists(results: Vec<ProviderResult<FetchResult>>) -> Self {
            Self {
                list_results: StdMutex::new(results.into()),
                ..Default::default()
            }
        }
    }

    impl CalendarProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        fn capabilities(&self) -> ProviderCapabilities {
            ProviderCapabilities {
                incremental_sync: true,
                etag_writes: true,
                server_side_expansion: false,
            }
        }

        fn authenticate(&self) -> BoxFuture<'_, ProviderResult<()>> {
            Box::pin(async { Ok(()) })
        }

        fn discover_calendars(&self) -> BoxFuture<'_, ProviderResult<Vec<Calendar>>> {
            Box::pin(async { Ok(vec![calendar()]) })
        }

        fn list_events(
            &self,
            _calendar_id: &str,
            query: ListQuery,
        ) -> BoxFuture<'_, ProviderResult<FetchResult>> {
            self.list_tokens.lock().unwrap().push(query.sync_token);
            let delay = self.list_delay_ms;
            Box::pin(async move {
                let active = self.active_lists.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_active_lists.fetch_max(active, Ordering::SeqCst);
                if delay > 0 {
                    tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
                }
                self.active_lists.fetch_sub(1, Ordering::SeqCst);

                self.list_results
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or_else(|| Ok(FetchResult::snapshot(vec![])))
            })
        }

        fn fetch_event(
            &self,
            _calendar_id: &str,
            uid: &str,
        ) -> BoxFuture<'_, ProviderResult<CanonicalEvent>> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            let fallback = event(uid, 10, 11).with_etag("fresh");
            Box::pin(async move {
                self.fetch_results
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or(Ok(fallback))
            })
        }

        fn create_event(
            &self,
            _calendar_id: &str,
            event: &CanonicalEvent,
        ) -> BoxFuture<'_, ProviderResult<WriteReceipt>> {
            let href = format!("/cal-1/{}.ics", event.uid);
            Box::pin(async move {
                Ok(WriteReceipt {
                    href,
                    etag: Some("v1".into()),
                })
            })
        }

        fn update_event(
            &self,
            _calendar_id: &str,
            event: &CanonicalEvent,
        ) -> BoxFuture<'_, ProviderResult<WriteReceipt>> {
            self.update_calls.fetch_add(1, Ordering::SeqCst);
            let href = format!("/cal-1/{}.ics", event.uid);
            Box::pin(async move {
                self.update_results
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or_else(|| {
                        Ok(WriteReceipt {
                            href,
                            etag: Some("v2".into()),
                        })
                    })
            })
        }

        fn delete_event(
            &self,
            _calendar_id: &str,
            _uid: &str,
            _etag: &str,
        ) -> BoxFuture<'_, ProviderResult<()>> {
            Box::pin(async { Ok(()) })
        }

        fn status(&self) -> BoxFuture<'_, ProviderStatus> {
            Box::pin(async { ProviderStatus::new("scripted") })
        }
    }

    fn orchestrator(
        provider: ScriptedProvider,
    ) -> (SyncOrchestrator, Arc<SyncStateStore>, Arc<ScriptedProvider>) {
        let provider = Arc::new(provider);
        let states = Arc::new(SyncStateStore::new());
        (
            SyncOrchestrator::new(provider.clone(), states.clone()),
            states,
            provider,
        )
    }

    fn seeded_key() -> SyncKey {
        SyncKey::new("alice", "scripted", "cal-1")
    }

    async fn seed_token(states: &SyncStateStore, token: &str) {
        states
            .commit(
                seeded_key(),
                SyncState {
                    sync_token: Some(token.into()),
                    ..Default::default()
                },
            )
            .await;
    }

    #[tokio::test]
    async fn incremental_pass_commits_the_new_token() {
        let provider = ScriptedProvider::with_lists(vec![Ok(FetchResult::delta(
            vec![event("remote-1", 14, 15)],
            vec!["gone-1".into()],
        )
        .with_sync_token("t2"))]);
        let (orch, states, _provider) = orchestrator(provider);
        seed_token(&states, "t1").await;

        let report = orch
            .sync_pass("alice", &calendar(), vec![], vec![])
            .await
            .unwrap();

        assert_eq!(report.pulled, 1);
        assert_eq!(report.removed, 1);
        assert_eq!(report.full_resyncs, 0);
        assert!(!report.full_snapshot);
        assert_eq!(
            states.get(&seeded_key()).await.sync_token.as_deref(),
            Some("t2")
        );
    }

    #[tokio::test]
    async fn without_token_support_the_pull_is_full() {
        let provider = ScriptedProvider::with_lists(vec![Ok(FetchResult::snapshot(vec![]))]);
        let (orch, states, _provider) = orchestrator(provider);
        seed_token(&states, "t1").await;

        let no_token_calendar = Calendar::new("cal-1", "Work").with_sync_token_support(false);
        let report = orch
            .sync_pass("alice", &no_token_calendar, vec![], vec![])
            .await
            .unwrap();

        assert!(report.full_snapshot);
    }

    #[tokio::test]
    async fn invalid_token_runs_exactly_one_full_resync() {
        let provider = ScriptedProvider::with_lists(vec![
            Err(ProviderError::sync_token_invalid("token expired")),
            Ok(FetchResult::snapshot(vec![event("remote-1", 14, 15)]).with_sync_token("t3")),
        ]);
        let (orch, states, provider) = orchestrator(provider);
        seed_token(&states, "t1").await;

        let report = orch
            .sync_pass("alice", &calendar(), vec![], vec![])
            .await
            .unwrap();

        assert_eq!(report.full_resyncs, 1);
        assert!(report.full_snapshot);
        assert_eq!(report.pulled, 1);

        // First call went incremental, the resync went full.
        let tokens = provider.list_tokens.lock().unwrap().clone();
        assert_eq!(tokens, vec![Some("t1".to_string()), None]);
        assert_eq!(
            states.get(&seeded_key()).await.sync_token.as_deref(),
            Some("t3")
        );
        assert!(states.get(&seeded_key()).await.last_full_sync.is_some());
    }

    #[tokio::test]
    async fn failed_pull_leaves_the_state_unmodified() {
        let provider =
            ScriptedProvider::with_lists(vec![Err(ProviderError::server("backend down"))]);
        let (orch, states, _provider) = orchestrator(provider);
        seed_token(&states, "t1").await;

        let result = orch.sync_pass("alice", &calendar(), vec![], vec![]).await;

        assert!(result.is_err());
        let state = states.get(&seeded_key()).await;
        assert_eq!(state.sync_token.as_deref(), Some("t1"));
        assert!(state.last_sync.is_none());
    }

    #[tokio::test]
    async fn stale_etag_refetches_and_retries_once() {
        let provider = ScriptedProvider::with_lists(vec![Ok(
            FetchResult::delta(vec![], vec![]).with_sync_token("t2")
        )]);
        provider.update_results.lock().unwrap().extend([
            Err(ProviderError::precondition_failed("etag mismatch")),
            Ok(WriteReceipt {
                href: "/cal-1/local-1.ics".into(),
                etag: Some("v3".into()),
            }),
        ]);
        provider
            .fetch_results
            .lock()
            .unwrap()
            .push_back(Ok(event("local-1", 9, 10).with_etag("v2")));
        let (orch, states, provider) = orchestrator(provider);
        seed_token(&states, "t1").await;

        let pending = vec![PendingChange::Update(
            event("local-1", 9, 10).with_etag("v1"),
        )];
        let report = orch
            .sync_pass("alice", &calendar(), pending, vec![])
            .await
            .unwrap();

        assert_eq!(report.pushed, 1);
        assert_eq!(
            states.get(&seeded_key()).await.sync_token.as_deref(),
            Some("t2")
        );
    }

    #[tokio::test]
    async fn losing_the_etag_race_twice_surfaces_concurrency() {
        let provider = ScriptedProvider::with_lists(vec![Ok(
            FetchResult::delta(vec![], vec![]).with_sync_token("t2")
        )]);
        provider.update_results.lock().unwrap().extend([
            Err(ProviderError::precondition_failed("etag mismatch")),
            Err(ProviderError::precondition_failed("etag mismatch again")),
        ]);
        provider
            .fetch_results
            .lock()
            .unwrap()
            .push_back(Ok(event("local-1", 9, 10).with_etag("v2")));
        let (orch, states, provider) = orchestrator(provider);
        seed_token(&states, "t1").await;

        let pending = vec![PendingChange::Update(
            event("local-1", 9, 10).with_etag("v1"),
        )];
        let err = orch
            .sync_pass("alice", &calendar(), pending, vec![])
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "concurrency");
        // The failed pass committed nothing.
        let state = states.get(&seeded_key()).await;
        assert_eq!(state.sync_token.as_deref(), Some("t1"));
        assert!(state.last_sync.is_none());
    }

    #[tokio::test]
    async fn conflicts_are_detected_over_the_merged_schedule() {
        let provider = ScriptedProvider::with_lists(vec![Ok(FetchResult::delta(
            vec![event("remote-1", 10, 11)],
            vec![],
        )
        .with_sync_token("t2"))]);
        let (orch, states, _provider) = orchestrator(provider);
        seed_token(&states, "t1").await;

        let local = vec![ScheduleItem {
            id: "appt-1".into(),
            owner: "alice".into(),
            window: TimeWindow::new(utc(10, 30), utc(11, 30)),
            buffer: None,
            kind: Default::default(),
            source: ItemSource::Appointment,
            location: None,
            cancelled: false,
            created_at: utc(8, 0),
        }];

        let report = orch
            .sync_pass("alice", &calendar(), vec![], local)
            .await
            .unwrap();

        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].overlap_minutes, 30);
    }

    #[test]
    fn report_serializes_with_camel_case_keys() {
        let report = SyncReport {
            pulled: 2,
            removed: 1,
            pushed: 3,
            conflicts: vec![],
            full_resyncs: 1,
            full_snapshot: true,
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["fullResyncs"], 1);
        assert_eq!(json["fullSnapshot"], true);
        assert!(json.get("full_resyncs").is_none());
    }

    #[tokio::test]
    async fn passes_for_one_key_are_serialized() {
        let mut provider = ScriptedProvider::with_lists(vec![
            Ok(FetchResult::snapshot(vec![])),
            Ok(FetchResult::snapshot(vec![])),
        ]);
        provider.list_delay_ms = 30;
        let (orch, _states, provider) = orchestrator(provider);
        let orch = Arc::new(orch);

        let mut handles = Vec::new();
        for _ in 0..2 {
            let orch = orch.clone();
            handles.push(tokio::spawn(async move {
                orch.sync_pass("alice", &calendar(), vec![], vec![]).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        // The scripted provider never saw overlapping list calls.
        assert_eq!(provider.max_active_lists.load(Ordering::SeqCst), 1);
    }
}
