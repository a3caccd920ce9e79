//! Bidirectional sync orchestration.
//!
//! This crate drives reconciliation between the local schedule and a
//! calendar provider:
//!
//! - [`SyncOrchestrator`] - one pass pulls remote changes (incremental
//!   when a token exists, full otherwise), pushes local pending changes
//!   under etag guards with one automatic refetch-and-retry, detects
//!   conflicts over the merged schedule, and commits the new token
//!   all-or-nothing
//! - [`SyncStateStore`] - per-(user, provider, calendar) token state
//! - [`SyncPacing`] - interval/jitter/backoff cadence for periodic passes

mod error;
mod orchestrator;
mod schedule;
mod state;

pub use error::{SyncError, SyncResult};
pub use orchestrator::{PendingChange, SyncOrchestrator, SyncReport};
pub use schedule::SyncPacing;
pub use state::{SyncKey, SyncState, SyncStateStore};
