//! Aggregations over the groups of a sessions API response.
//!
//! Missing series entries and null totals count as zero. Rates over an
//! empty population are `None` rather than 0% or 100%.

use crate::chart::SeriesPoint;
use crate::rate::{crash_free_percent, percent, round};
use crate::types::{SessionField, SessionGroup, SessionStatus};

/// Sum of `totals[field]` over all groups.
pub fn count(groups: &[SessionGroup], field: SessionField) -> f64 {
    groups.iter().map(|g| g.total(field).unwrap_or(0.0)).sum()
}

/// Sum of `series[field][index]` over all groups.
pub fn count_at_index(groups: &[SessionGroup], field: SessionField, index: usize) -> f64 {
    groups
        .iter()
        .map(|g| g.value_at(field, index).unwrap_or(0.0))
        .sum()
}

fn status_groups(
    groups: &[SessionGroup],
    status: SessionStatus,
) -> impl Iterator<Item = &SessionGroup> {
    groups.iter().filter(move |g| g.status() == Some(status))
}

/// Share of `field` attributed to sessions ending in `status`, in percent.
pub fn session_status_rate(
    groups: &[SessionGroup],
    field: SessionField,
    status: SessionStatus,
) -> Option<f64> {
    let total = count(groups, field);
    if total == 0.0 {
        return None;
    }
    let status_count: f64 = status_groups(groups, status)
        .map(|g| g.total(field).unwrap_or(0.0))
        .sum();
    Some(percent(status_count, total))
}

/// Crash-free rate over the whole window, rounded for display.
pub fn crash_free_rate(groups: &[SessionGroup], field: SessionField) -> Option<f64> {
    session_status_rate(groups, field, SessionStatus::Crashed)
        .map(|crashed| crash_free_percent(100.0 - crashed))
}

/// Crash-free rate for a single interval.
///
/// The crashed count comes from the first group with status `crashed`.
/// Returns `None` when no sessions were recorded in the interval.
pub fn crash_free_at_index(
    groups: &[SessionGroup],
    field: SessionField,
    index: usize,
) -> Option<f64> {
    let total = count_at_index(groups, field, index);
    if total == 0.0 {
        return None;
    }
    let crashed = status_groups(groups, SessionStatus::Crashed)
        .next()
        .and_then(|g| g.value_at(field, index))
        .unwrap_or(0.0);
    Some(crash_free_percent(100.0 - percent(crashed, total)))
}

/// Crash-free rate per interval, skipping intervals without sessions.
pub fn crash_free_rate_series(
    groups: &[SessionGroup],
    intervals: &[String],
    field: SessionField,
) -> Vec<SeriesPoint> {
    intervals
        .iter()
        .enumerate()
        .filter_map(|(index, interval)| {
            crash_free_at_index(groups, field, index).map(|value| SeriesPoint {
                name: interval.clone(),
                value: Some(value),
            })
        })
        .collect()
}

/// Rate of `status` per interval rounded to 3 decimals, skipping intervals
/// without sessions.
pub fn session_status_rate_series(
    groups: &[SessionGroup],
    intervals: &[String],
    field: SessionField,
    status: SessionStatus,
) -> Vec<SeriesPoint> {
    intervals
        .iter()
        .enumerate()
        .filter_map(|(index, interval)| {
            let total = count_at_index(groups, field, index);
            if total == 0.0 {
                return None;
            }
            let status_count: f64 = status_groups(groups, status)
                .map(|g| g.value_at(field, index).unwrap_or(0.0))
                .sum();
            Some(SeriesPoint {
                name: interval.clone(),
                value: Some(round(percent(status_count, total), 3)),
            })
        })
        .collect()
}

/// Adoption of a release over time: the release's share of all sessions
/// (or users) per interval, as a whole percentage.
///
/// Every interval yields a point; absent data counts as zero so the line
/// stays continuous.
pub fn adoption_series(
    release_groups: &[SessionGroup],
    all_groups: &[SessionGroup],
    intervals: &[String],
    field: SessionField,
) -> Vec<SeriesPoint> {
    intervals
        .iter()
        .enumerate()
        .map(|(index, interval)| {
            let release = count_at_index(release_groups, field, index);
            let all = count_at_index(all_groups, field, index);
            SeriesPoint {
                name: interval.clone(),
                value: Some(round(percent(release, all), 0)),
            }
        })
        .collect()
}

/// Raw per-interval values of a single group, zero when absent.
pub fn count_series(
    field: SessionField,
    group: Option<&SessionGroup>,
    intervals: &[String],
) -> Vec<SeriesPoint> {
    intervals
        .iter()
        .enumerate()
        .map(|(index, interval)| SeriesPoint {
            name: interval.clone(),
            value: Some(group.and_then(|g| g.value_at(field, index)).unwrap_or(0.0)),
        })
        .collect()
}

#[cfg(test)]
#[expect(
    clippy::float_cmp,
    reason = "sums of small integers are exact"
)]
pub(crate) mod tests {
    use super::*;
    use crate::types::SessionApiResponse;

    pub(crate) fn intervals(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("t{i}")).collect()
    }

    pub(crate) fn status_response() -> SessionApiResponse {
        serde_json::from_str(
            r#"{
                "intervals": ["t0", "t1", "t2"],
                "groups": [
                    {"by": {"session.status": "healthy"},
                     "series": {"sum(session)": [6, 4, 0], "count_unique(user)": [3, 2, 0]},
                     "totals": {"sum(session)": 10, "count_unique(user)": 4}},
                    {"by": {"session.status": "errored"},
                     "series": {"sum(session)": [2, 1, 0], "count_unique(user)": [1, 1, 0]},
                     "totals": {"sum(session)": 3, "count_unique(user)": 2}},
                    {"by": {"session.status": "crashed"},
                     "series": {"sum(session)": [2, 0, 0], "count_unique(user)": [1, 0, 0]},
                     "totals": {"sum(session)": 2, "count_unique(user)": 1}}
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn count_sums_totals() {
        let response = status_response();
        assert_eq!(count(&response.groups, SessionField::Sessions), 15.0);
        assert_eq!(count(&response.groups, SessionField::DurationP50), 0.0);
        assert_eq!(count(&[], SessionField::Sessions), 0.0);
    }

    #[test]
    fn count_at_index_sums_series() {
        let response = status_response();
        assert_eq!(count_at_index(&response.groups, SessionField::Sessions, 0), 10.0);
        assert_eq!(count_at_index(&response.groups, SessionField::Sessions, 1), 5.0);
        assert_eq!(count_at_index(&response.groups, SessionField::Sessions, 9), 0.0);
    }

    #[test]
    fn session_status_rate_is_none_without_sessions() {
        assert_eq!(
            session_status_rate(&[], SessionField::Sessions, SessionStatus::Crashed),
            None
        );
        let response = status_response();
        let rate =
            session_status_rate(&response.groups, SessionField::Sessions, SessionStatus::Errored)
                .unwrap();
        assert_eq!(rate, 20.0);
    }

    #[test]
    fn crash_free_rate_over_window() {
        let response = status_response();
        // 2 of 15 crashed: 86.67% rounds to a whole percent below the threshold.
        assert_eq!(
            crash_free_rate(&response.groups, SessionField::Sessions),
            Some(87.0)
        );
        assert_eq!(
            crash_free_rate(&response.groups, SessionField::Users),
            Some(86.0)
        );
        assert_eq!(crash_free_rate(&[], SessionField::Users), None);
    }

    #[test]
    fn crash_free_rate_series_skips_empty_intervals() {
        let response = status_response();
        let series =
            crash_free_rate_series(&response.groups, &response.intervals, SessionField::Sessions);
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].name, "t0");
        assert_eq!(series[0].value, Some(80.0));
        assert_eq!(series[1].value, Some(100.0));
    }

    #[test]
    fn session_status_rate_series_rounds_to_three_places() {
        let response = status_response();
        let series = session_status_rate_series(
            &response.groups,
            &response.intervals,
            SessionField::Sessions,
            SessionStatus::Errored,
        );
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].value, Some(20.0));
        assert_eq!(series[1].value, Some(20.0));
    }

    #[test]
    fn adoption_series_is_continuous() {
        let all = status_response();
        let release: SessionApiResponse = serde_json::from_str(
            r#"{"intervals": ["t0", "t1", "t2"],
                "groups": [{"by": {}, "series": {"sum(session)": [5, null]},
                            "totals": {"sum(session)": 5}}]}"#,
        )
        .unwrap();
        let series = adoption_series(
            &release.groups,
            &all.groups,
            &all.intervals,
            SessionField::Sessions,
        );
        let values: Vec<_> = series.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![Some(50.0), Some(0.0), Some(0.0)]);
    }

    #[test]
    fn count_series_defaults_to_zero() {
        let response = status_response();
        let series = count_series(SessionField::Sessions, None, &intervals(2));
        assert!(series.iter().all(|p| p.value == Some(0.0)));

        let series = count_series(
            SessionField::Sessions,
            response.groups.first(),
            &response.intervals,
        );
        let values: Vec<_> = series.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![Some(6.0), Some(4.0), Some(0.0)]);
    }
}
