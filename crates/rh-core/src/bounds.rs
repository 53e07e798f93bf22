//! Observation window of a release.
//!
//! A release is observed from its creation until the last session or event
//! recorded for it. Data older than the retention period is gone, so
//! windows starting before it are clamped; releases whose whole window lies
//! before retention are "ancient" and fall back to ending now.

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::period::DateSelection;
use crate::types::ReleaseVersion;

/// Days of session data kept by the backend.
pub const RETENTION_DAYS: i64 = 90;

/// Per-project metadata attached to a release record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentProjectMeta {
    #[serde(default)]
    pub sessions_lower_bound: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sessions_upper_bound: Option<DateTime<Utc>>,
    #[serde(default)]
    pub next_release_version: Option<String>,
    #[serde(default)]
    pub prev_release_version: Option<String>,
}

/// Release record as returned by `GET /organizations/{org}/releases/{version}/`.
///
/// Only the fields the health views read are modeled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    pub version: ReleaseVersion,
    pub date_created: DateTime<Utc>,
    #[serde(default)]
    pub date_released: Option<DateTime<Utc>>,
    #[serde(default)]
    pub first_event: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_event: Option<DateTime<Utc>>,
    #[serde(default)]
    pub new_groups: u64,
    #[serde(default)]
    pub commit_count: u64,
    #[serde(default)]
    pub current_project_meta: Option<CurrentProjectMeta>,
}

/// How a release's window relates to the retention period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundsKind {
    /// Entirely within retention.
    Normal,
    /// Started before retention; start moved to the retention bound.
    Clamped,
    /// No data left within retention; window runs from retention to now.
    Ancient,
}

/// Computed start and end of a release's observation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseBounds {
    pub release_start: DateTime<Utc>,
    pub release_end: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: BoundsKind,
}

impl ReleaseBounds {
    /// Absolute selection covering the window.
    pub const fn selection(&self) -> DateSelection {
        DateSelection::Absolute {
            start: self.release_start,
            end: self.release_end,
        }
    }

    /// An explicitly chosen window wins over the release window.
    pub fn selection_or(&self, explicit: Option<DateSelection>) -> DateSelection {
        explicit.unwrap_or_else(|| self.selection())
    }
}

fn start_of_minute(at: DateTime<Utc>) -> DateTime<Utc> {
    at.duration_trunc(TimeDelta::minutes(1)).unwrap_or(at)
}

fn end_of_minute(at: DateTime<Utc>) -> DateTime<Utc> {
    start_of_minute(at) + TimeDelta::minutes(1) - TimeDelta::milliseconds(1)
}

/// Computes the observation window of `release` as of `now`.
pub fn release_bounds(release: &Release, now: DateTime<Utc>) -> ReleaseBounds {
    let retention_bound = now - TimeDelta::days(RETENTION_DAYS);
    let sessions_upper_bound = release
        .current_project_meta
        .as_ref()
        .and_then(|meta| meta.sessions_upper_bound);
    let upper_bound = match (sessions_upper_bound, release.last_event) {
        (Some(sessions), Some(event)) => Some(sessions.max(event)),
        (sessions, event) => sessions.or(event),
    };

    let mut kind = BoundsKind::Normal;
    let mut release_start = start_of_minute(release.date_created);
    let mut release_end = end_of_minute(upper_bound.unwrap_or(now));

    if start_of_minute(release_start) == start_of_minute(release_end) {
        release_end += TimeDelta::minutes(1);
    }

    if release_start < retention_bound {
        release_start = retention_bound;
        kind = BoundsKind::Clamped;
        if release_end < release_start || upper_bound.is_none() {
            release_end = now;
            kind = BoundsKind::Ancient;
        }
    }

    ReleaseBounds {
        release_start,
        release_end,
        kind,
    }
}
