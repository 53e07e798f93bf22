//! Chart series built from sessions API responses.
//!
//! A [`ChartData`] is an ordered set of named series keyed by bucket: a
//! session status, a crash-free entity, or [`DEFAULT_BUCKET`] for ungrouped
//! data. The `init_*` factories return the fixed skeletons the release
//! charts use; the `fill_*` functions append one point per interval.

use serde::Serialize;

use crate::sessions::crash_free_at_index;
use crate::types::{GroupBy, SessionApiResponse, SessionField, SessionStatus};

/// Bucket key used when the response is not grouped.
pub const DEFAULT_BUCKET: &str = "0";

/// Bucket key for groups lacking the requested group-by dimension.
pub const MISSING_BUCKET: &str = "unknown";

/// Suffix appended to series describing every release but the current one.
pub const OTHER_RELEASES_SUFFIX: &str = "(other releases)";

const OTHER_OPACITY: f64 = 0.3;

const GREEN: &str = "#2BA185";
const RED: &str = "#F55459";
const YELLOW: &str = "#F2B712";
const ORANGE: &str = "#F58C46";
const PURPLE: &str = "#444674";
const PINK: &str = "#D6567F";
const GRAY: &str = "#80708F";

/// A single chart point: interval timestamp and value.
///
/// `None` means no data for the interval, which is different from zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub name: String,
    pub value: Option<f64>,
}

/// How a series is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SeriesStyle {
    /// Filled area, stacked with its siblings.
    Area { opacity: f64 },
    /// Plain line.
    Line { opacity: f64 },
}

/// A named, styled series.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSeries {
    /// Bucket key this series collects.
    #[serde(skip)]
    pub key: String,
    pub series_name: String,
    pub data: Vec<SeriesPoint>,
    pub color: String,
    pub style: SeriesStyle,
}

impl ChartSeries {
    fn new(key: &str, series_name: impl Into<String>, color: &str, style: SeriesStyle) -> Self {
        Self {
            key: key.to_string(),
            series_name: series_name.into(),
            data: Vec::new(),
            color: color.to_string(),
            style,
        }
    }

    /// Returns `true` if this series describes other releases.
    pub fn is_other(&self) -> bool {
        is_other_series(&self.series_name)
    }

    /// The series values in interval order.
    pub fn values(&self) -> Vec<Option<f64>> {
        self.data.iter().map(|p| p.value).collect()
    }
}

/// Returns `true` if `series_name` carries the other-releases suffix.
pub fn is_other_series(series_name: &str) -> bool {
    series_name.ends_with(OTHER_RELEASES_SUFFIX)
}

/// Ordered collection of series keyed by bucket.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ChartData {
    series: Vec<ChartSeries>,
}

impl ChartData {
    fn from_series(series: Vec<ChartSeries>) -> Self {
        Self { series }
    }

    pub fn get(&self, key: &str) -> Option<&ChartSeries> {
        self.series.iter().find(|s| s.key == key)
    }

    /// Returns the series for `key`, creating it if the skeleton lacks it.
    ///
    /// An unknown key means the response contained a bucket the chart was
    /// not initialized for; the series is added at the end with a neutral
    /// style so no data is lost.
    pub fn series_mut(&mut self, key: &str) -> &mut ChartSeries {
        let index = if let Some(index) = self.series.iter().position(|s| s.key == key) {
            index
        } else {
            tracing::warn!(bucket = key, "response contains uninitialized chart bucket");
            self.series.push(ChartSeries::new(
                key,
                key,
                GRAY,
                SeriesStyle::Line { opacity: 1.0 },
            ));
            self.series.len() - 1
        };
        &mut self.series[index]
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.series.iter().map(|s| s.key.as_str())
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChartSeries> {
        self.series.iter()
    }

    pub fn into_series(self) -> Vec<ChartSeries> {
        self.series
    }
}

impl<'a> IntoIterator for &'a ChartData {
    type Item = &'a ChartSeries;
    type IntoIter = std::slice::Iter<'a, ChartSeries>;

    fn into_iter(self) -> Self::IntoIter {
        self.series.iter()
    }
}

/// Concatenates this-release series before other-release series.
pub fn merge_series(this_release: ChartData, other_releases: ChartData) -> Vec<ChartSeries> {
    let mut series = this_release.into_series();
    series.extend(other_releases.into_series());
    series
}

/// Human label of a session status.
pub const fn status_label(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Healthy => "Healthy",
        SessionStatus::Errored => "Errored",
        SessionStatus::Abnormal => "Abnormal",
        SessionStatus::Crashed => "Crashed",
    }
}

const fn status_color(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Healthy => GREEN,
        SessionStatus::Errored => YELLOW,
        SessionStatus::Abnormal => ORANGE,
        SessionStatus::Crashed => RED,
    }
}

fn breakdown(suffix: Option<&str>, opacity: f64) -> ChartData {
    ChartData::from_series(
        SessionStatus::ALL
            .iter()
            .map(|&status| {
                let label = status_label(status);
                let name = suffix.map_or_else(|| label.to_string(), |s| format!("{label} {s}"));
                ChartSeries::new(
                    status.as_str(),
                    name,
                    status_color(status),
                    SeriesStyle::Area { opacity },
                )
            })
            .collect(),
    )
}

/// Status breakdown (`healthy`, `errored`, `abnormal`, `crashed`) for the
/// current release.
pub fn init_sessions_breakdown_chart_data() -> ChartData {
    breakdown(None, 1.0)
}

/// Status breakdown for all other releases, drawn translucent.
pub fn init_other_sessions_breakdown_chart_data() -> ChartData {
    breakdown(Some(OTHER_RELEASES_SUFFIX), OTHER_OPACITY)
}

/// Which population a crash-free series measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashFreeEntity {
    Users,
    Sessions,
}

impl CrashFreeEntity {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Sessions => "sessions",
        }
    }

    /// The count field the rate is computed from.
    pub const fn field(self) -> SessionField {
        match self {
            Self::Users => SessionField::Users,
            Self::Sessions => SessionField::Sessions,
        }
    }

    const fn label(self) -> &'static str {
        match self {
            Self::Users => "Crash Free Users",
            Self::Sessions => "Crash Free Sessions",
        }
    }

    const fn color(self) -> &'static str {
        match self {
            Self::Users => PURPLE,
            Self::Sessions => PINK,
        }
    }
}

fn crash_free(suffix: Option<&str>, opacity: f64) -> ChartData {
    ChartData::from_series(
        [CrashFreeEntity::Users, CrashFreeEntity::Sessions]
            .into_iter()
            .map(|entity| {
                let label = entity.label();
                let name = suffix.map_or_else(|| label.to_string(), |s| format!("{label} {s}"));
                ChartSeries::new(
                    entity.as_str(),
                    name,
                    entity.color(),
                    SeriesStyle::Line { opacity },
                )
            })
            .collect(),
    )
}

/// Crash-free `users` and `sessions` lines for the current release.
pub fn init_crash_free_chart_data() -> ChartData {
    crash_free(None, 1.0)
}

pub fn init_other_crash_free_chart_data() -> ChartData {
    crash_free(Some(OTHER_RELEASES_SUFFIX), OTHER_OPACITY)
}

/// Single ungrouped session duration series.
pub fn init_session_duration_chart_data() -> ChartData {
    ChartData::from_series(vec![ChartSeries::new(
        DEFAULT_BUCKET,
        "Session Duration",
        PURPLE,
        SeriesStyle::Area { opacity: 1.0 },
    )])
}

pub fn init_other_session_duration_chart_data() -> ChartData {
    ChartData::from_series(vec![ChartSeries::new(
        DEFAULT_BUCKET,
        format!("Session Duration {OTHER_RELEASES_SUFFIX}"),
        PURPLE,
        SeriesStyle::Area {
            opacity: OTHER_OPACITY,
        },
    )])
}

/// Bucket key of [`init_release_vs_project_chart_data`]'s release series.
pub const RELEASE_BUCKET: &str = "release";

/// Bucket key of [`init_release_vs_project_chart_data`]'s project series.
pub const PROJECT_BUCKET: &str = "project";

/// A release's counts next to its project's, for the releases list.
pub fn init_release_vs_project_chart_data() -> ChartData {
    ChartData::from_series(vec![
        ChartSeries::new(
            RELEASE_BUCKET,
            "This Release",
            PURPLE,
            SeriesStyle::Area { opacity: 1.0 },
        ),
        ChartSeries::new(
            PROJECT_BUCKET,
            "Total Project",
            GRAY,
            SeriesStyle::Area {
                opacity: OTHER_OPACITY,
            },
        ),
    ])
}

/// Arguments of [`fill_chart_data_from_sessions_response`].
pub struct FillChartData<'a> {
    pub response: &'a SessionApiResponse,
    pub field: SessionField,
    /// Dimension selecting the bucket; `None` puts everything in
    /// [`DEFAULT_BUCKET`].
    pub group_by: Option<GroupBy>,
    pub chart_data: ChartData,
    /// Applied to every present value after bucket aggregation.
    pub value_formatter: Option<&'a dyn Fn(f64) -> f64>,
}

/// Appends one point per interval and bucket to `chart_data`.
///
/// Intervals are visited in order, groups in response order within each
/// interval. Groups mapping to the same bucket are summed into one point, so
/// each populated bucket receives exactly one point per interval.
pub fn fill_chart_data_from_sessions_response(fill: FillChartData<'_>) -> ChartData {
    let FillChartData {
        response,
        field,
        group_by,
        mut chart_data,
        value_formatter,
    } = fill;

    for (index, interval) in response.intervals.iter().enumerate() {
        let mut buckets: Vec<(String, Option<f64>)> = Vec::new();
        for group in &response.groups {
            let key = group_by.map_or_else(
                || DEFAULT_BUCKET.to_string(),
                |dimension| {
                    group
                        .by_value(dimension)
                        .unwrap_or_else(|| MISSING_BUCKET.to_string())
                },
            );
            let value = group.value_at(field, index);
            if let Some((_, existing)) = buckets.iter_mut().find(|(k, _)| *k == key) {
                *existing = match (*existing, value) {
                    (Some(a), Some(b)) => Some(a + b),
                    (a, b) => a.or(b),
                };
            } else {
                buckets.push((key, value));
            }
        }

        for (key, value) in buckets {
            let value = value.map(|v| value_formatter.map_or(v, |format| format(v)));
            chart_data.series_mut(&key).data.push(SeriesPoint {
                name: interval.clone(),
                value,
            });
        }
    }

    chart_data
}

/// Sum of `totals[field]` over every group; headline counts.
pub fn totals_from_sessions_response(response: &SessionApiResponse, field: SessionField) -> f64 {
    crate::sessions::count(&response.groups, field)
}

/// Appends one crash-free point per interval to the `entity` series.
///
/// Intervals without sessions get a `None` value rather than 0% or 100%.
pub fn fill_crash_free_chart_data_from_sessions_response(
    response: &SessionApiResponse,
    field: SessionField,
    entity: CrashFreeEntity,
    mut chart_data: ChartData,
) -> ChartData {
    let series = chart_data.series_mut(entity.as_str());
    for (index, interval) in response.intervals.iter().enumerate() {
        series.data.push(SeriesPoint {
            name: interval.clone(),
            value: crash_free_at_index(&response.groups, field, index),
        });
    }
    chart_data
}

#[cfg(test)]
#[expect(
    clippy::float_cmp,
    reason = "sums of small integers are exact"
)]
mod tests {
    use super::*;
    use crate::rate::{crash_free_percent, round_duration};
    use crate::sessions::tests::status_response;

    fn response(json: &str) -> SessionApiResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn init_factories_have_fixed_keys() {
        let keys: Vec<_> = init_sessions_breakdown_chart_data().keys().map(String::from).collect();
        assert_eq!(keys, ["healthy", "errored", "abnormal", "crashed"]);

        let keys: Vec<_> = init_crash_free_chart_data().keys().map(String::from).collect();
        assert_eq!(keys, ["users", "sessions"]);

        let keys: Vec<_> = init_session_duration_chart_data().keys().map(String::from).collect();
        assert_eq!(keys, [DEFAULT_BUCKET]);

        let keys: Vec<_> = init_release_vs_project_chart_data().keys().map(String::from).collect();
        assert_eq!(keys, [RELEASE_BUCKET, PROJECT_BUCKET]);

        assert!(init_other_sessions_breakdown_chart_data().iter().all(ChartSeries::is_other));
        assert!(init_other_crash_free_chart_data().iter().all(ChartSeries::is_other));
        assert!(!init_crash_free_chart_data().iter().any(ChartSeries::is_other));
    }

    #[test]
    fn init_factories_return_independent_data() {
        let mut first = init_sessions_breakdown_chart_data();
        first.series_mut("healthy").data.push(SeriesPoint {
            name: "t0".to_string(),
            value: Some(1.0),
        });
        let second = init_sessions_breakdown_chart_data();
        assert!(second.get("healthy").unwrap().data.is_empty());
    }

    #[test]
    fn fill_by_status_produces_one_point_per_interval() {
        let response = status_response();
        let chart = fill_chart_data_from_sessions_response(FillChartData {
            response: &response,
            field: SessionField::Sessions,
            group_by: Some(GroupBy::SessionStatus),
            chart_data: init_sessions_breakdown_chart_data(),
            value_formatter: None,
        });

        let healthy = chart.get("healthy").unwrap();
        assert_eq!(healthy.values(), vec![Some(6.0), Some(4.0), Some(0.0)]);
        for (point, interval) in healthy.data.iter().zip(&response.intervals) {
            assert_eq!(&point.name, interval);
        }
        // Abnormal had no group in the response and stays empty.
        assert!(chart.get("abnormal").unwrap().data.is_empty());
        assert_eq!(chart.get("crashed").unwrap().data.len(), 3);
    }

    #[test]
    fn fill_without_group_by_uses_default_bucket_and_formatter() {
        let response = response(
            r#"{"intervals": ["t0", "t1", "t2"],
                "groups": [{"by": {}, "series": {"p50(session.duration)": [45123.45, null, 125456]},
                            "totals": {"p50(session.duration)": 9000}}]}"#,
        );
        let to_seconds = |ms: f64| round_duration(ms / 1000.0);
        let chart = fill_chart_data_from_sessions_response(FillChartData {
            response: &response,
            field: SessionField::DurationP50,
            group_by: None,
            chart_data: init_session_duration_chart_data(),
            value_formatter: Some(&to_seconds),
        });
        let series = chart.get(DEFAULT_BUCKET).unwrap();
        assert_eq!(series.values(), vec![Some(45.123), None, Some(125.0)]);
    }

    #[test]
    fn fill_creates_unknown_buckets() {
        let response = response(
            r#"{"intervals": ["t0"],
                "groups": [{"by": {"session.status": "unhandled"},
                            "series": {"sum(session)": [3]}, "totals": {"sum(session)": 3}}]}"#,
        );
        let chart = fill_chart_data_from_sessions_response(FillChartData {
            response: &response,
            field: SessionField::Sessions,
            group_by: Some(GroupBy::SessionStatus),
            chart_data: init_sessions_breakdown_chart_data(),
            value_formatter: None,
        });
        assert_eq!(chart.len(), 5);
        assert_eq!(chart.get("unhandled").unwrap().values(), vec![Some(3.0)]);
    }

    #[test]
    fn fill_sums_groups_sharing_a_bucket() {
        let response = response(
            r#"{"intervals": ["t0", "t1"],
                "groups": [
                    {"by": {"project": 1, "session.status": "healthy"},
                     "series": {"sum(session)": [1, 2]}, "totals": {"sum(session)": 3}},
                    {"by": {"project": 2, "session.status": "healthy"},
                     "series": {"sum(session)": [10, null]}, "totals": {"sum(session)": 10}}
                ]}"#,
        );
        let chart = fill_chart_data_from_sessions_response(FillChartData {
            response: &response,
            field: SessionField::Sessions,
            group_by: Some(GroupBy::SessionStatus),
            chart_data: init_sessions_breakdown_chart_data(),
            value_formatter: None,
        });
        assert_eq!(
            chart.get("healthy").unwrap().values(),
            vec![Some(11.0), Some(2.0)]
        );
    }

    #[test]
    fn totals_are_order_independent() {
        let mut response = status_response();
        let forward = totals_from_sessions_response(&response, SessionField::Sessions);
        response.groups.reverse();
        let backward = totals_from_sessions_response(&response, SessionField::Sessions);
        assert_eq!(forward, 15.0);
        assert_eq!(forward, backward);
        assert_eq!(
            totals_from_sessions_response(&SessionApiResponse::default(), SessionField::Sessions),
            0.0
        );
    }

    #[test]
    fn crash_free_fill_distinguishes_no_data() {
        let response = response(
            r#"{"intervals": ["t0", "t1", "t2"],
                "groups": [
                    {"by": {"session.status": "crashed"},
                     "series": {"sum(session)": [2, 0, 0]}, "totals": {"sum(session)": 2}},
                    {"by": {"session.status": "healthy"},
                     "series": {"sum(session)": [8, 5, 0]}, "totals": {"sum(session)": 13}}
                ]}"#,
        );
        let chart = fill_crash_free_chart_data_from_sessions_response(
            &response,
            SessionField::Sessions,
            CrashFreeEntity::Sessions,
            init_crash_free_chart_data(),
        );
        let sessions = chart.get("sessions").unwrap();
        assert_eq!(
            sessions.values(),
            vec![
                Some(crash_free_percent(80.0)),
                Some(crash_free_percent(100.0)),
                None
            ]
        );
        assert!(chart.get("users").unwrap().data.is_empty());
    }

    #[test]
    fn merge_series_keeps_this_release_first() {
        let merged = merge_series(
            init_crash_free_chart_data(),
            init_other_crash_free_chart_data(),
        );
        let names: Vec<_> = merged.iter().map(|s| s.series_name.as_str()).collect();
        assert_eq!(
            names,
            [
                "Crash Free Users",
                "Crash Free Sessions",
                "Crash Free Users (other releases)",
                "Crash Free Sessions (other releases)",
            ]
        );
    }

    #[test]
    fn chart_series_serializes_camel_case() {
        let chart = init_session_duration_chart_data();
        let json = serde_json::to_value(&chart).unwrap();
        assert_eq!(json[0]["seriesName"], "Session Duration");
        assert_eq!(json[0]["style"]["type"], "area");
        assert!(json[0].get("key").is_none());
    }
}
