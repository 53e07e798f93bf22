//! Core release health logic.
//!
//! This crate turns raw sessions API responses into release health numbers:
//! - Chart series: per-interval session counts, status breakdowns, crash-free lines
//! - Rates: crash-free and adoption percentages with display rounding
//! - Release bounds: the observation window of a release

pub mod bounds;
pub mod chart;
pub mod period;
pub mod rate;
pub mod sessions;
mod types;

pub use bounds::{BoundsKind, CurrentProjectMeta, Release, ReleaseBounds, release_bounds};
pub use chart::{
    ChartData, ChartSeries, CrashFreeEntity, FillChartData, SeriesPoint, SeriesStyle,
    fill_chart_data_from_sessions_response, fill_crash_free_chart_data_from_sessions_response,
    totals_from_sessions_response,
};
pub use period::{DateSelection, HealthStatsPeriod, StatsPeriod, sessions_interval};
pub use types::{
    DisplayOption, FieldUnit, GroupBy, OrganizationSlug, ReleaseVersion, SessionApiResponse,
    SessionField, SessionGroup, SessionStatus, ValidationError,
};
