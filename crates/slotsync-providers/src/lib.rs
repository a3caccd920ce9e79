//! Calendar provider adapters.
//!
//! This crate is the abstraction layer between the sync orchestrator and
//! heterogeneous calendar back-ends:
//!
//! - [`CalendarProvider`] - the capability interface every back-end
//!   implements (authenticate, discovery, listing, etag-guarded writes)
//! - [`caldav`] - the CalDAV implementation
//! - [`normalize`] - the wire ↔ canonical event pipeline
//! - [`SessionCache`] - keyed, time-bound credential cache
//! - [`retry`] - bounded exponential backoff for transient failures
//! - [`ProviderError`] - the provider error taxonomy

pub mod caldav;
pub mod error;
pub mod normalize;
pub mod provider;
pub mod retry;
pub mod session;

pub use error::{ProviderError, ProviderErrorCode, ProviderResult};
pub use normalize::{from_canonical, to_canonical, to_canonical_batch};
pub use provider::{
    AccessRole, BoxFuture, Calendar, CalendarProvider, ErrorProvider, FetchResult, ListQuery,
    ProviderCapabilities, ProviderStatus, WriteReceipt,
};
pub use retry::{RetryPolicy, with_retries};
pub use session::{ProviderSession, SessionCache, SessionKey};
