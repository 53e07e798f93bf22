//! Sessions API access for release health.
//!
//! Provides:
//! - An HTTP [`Client`] for the sessions and release endpoints
//! - Request orchestrators that fetch a batch of session queries in
//!   parallel and publish derived health data as [`RequestState`] updates

pub mod client;
pub mod query;
pub mod release_details;
pub mod release_stats;
pub mod releases;
pub mod request;

pub use client::{ApiError, Client, Commit, CommitAuthor, Deploy, ReleaseMeta, SessionsApi};
pub use query::{
    SessionsQuery, other_releases_query, release_query, releases_query, resolved_in_release_query,
};
pub use release_details::{
    ReleaseComparison, ReleaseDetailsLoader, ReleaseDetailsParams, ReleaseDetailsRequest,
    ReleaseHealthSummary, compare_release,
};
pub use release_stats::{
    ReleaseStats, ReleaseStatsLoader, ReleaseStatsParams, ReleaseStatsRequest, StatsChart,
    build_release_stats,
};
pub use releases::{ReleasesHealth, ReleasesLoader, ReleasesParams, ReleasesRequest};
pub use request::{ErrorNotifier, Loader, Request, RequestState, TracingNotifier};
