//! Source API client
//!
//! # Components
//!
//! - [`auth`]: bearer token exchange and cache
//! - [`retry`]: backoff schedule and `Retry-After` parsing
//! - [`http_client`]: authenticated executor with status-driven retries
//! - [`paginator`]: `$skip`/`$top` page walker
//! - [`poller`]: async query state machine
//! - [`fetcher`]: typed entity fetchers behind the `MemberSource` trait

pub mod auth;
pub mod fetcher;
pub mod http_client;
pub mod paginator;
pub mod poller;
pub mod retry;

// Re-export main types for convenience
pub use auth::{AccessToken, AuthContext};
pub use fetcher::{ApiFetcher, MemberSource};
pub use http_client::{HttpExecutor, QueryParams};
pub use paginator::Paginator;
pub use poller::{AsyncQueryPoller, PollStatus, QueryState};
pub use retry::Backoff;
