//! Chart data for a single release compared with all other releases.

use chrono::Utc;
use rh_core::chart::{
    init_crash_free_chart_data, init_other_crash_free_chart_data,
    init_other_session_duration_chart_data, init_other_sessions_breakdown_chart_data,
    init_session_duration_chart_data, init_sessions_breakdown_chart_data, merge_series,
};
use rh_core::rate::{
    NO_DATA, display_crash_free_percent, format_count, format_duration_secs, round_duration,
};
use rh_core::sessions::crash_free_rate;
use rh_core::{
    ChartData, ChartSeries, CrashFreeEntity, DateSelection, FillChartData, GroupBy,
    ReleaseVersion, SessionApiResponse, SessionField, fill_chart_data_from_sessions_response,
    fill_crash_free_chart_data_from_sessions_response, sessions_interval,
    totals_from_sessions_response,
};
use serde::Serialize;

use crate::client::{ApiError, SessionsApi};
use crate::query::{SessionsQuery, other_releases_query, release_query};
use crate::request::{Loader, Request};

/// Which chart to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StatsChart {
    /// Session count broken down by status.
    #[default]
    Sessions,
    /// User count broken down by status.
    Users,
    /// Crash-free users and sessions.
    CrashFree,
    /// Median session duration.
    SessionDuration,
}

impl StatsChart {
    fn fields(self) -> Vec<SessionField> {
        match self {
            Self::Sessions => vec![SessionField::Sessions],
            Self::Users => vec![SessionField::Users],
            Self::CrashFree => vec![SessionField::Sessions, SessionField::Users],
            Self::SessionDuration => vec![SessionField::DurationP50],
        }
    }

    fn group_by(self) -> Vec<GroupBy> {
        match self {
            Self::SessionDuration => Vec::new(),
            Self::Sessions | Self::Users | Self::CrashFree => vec![GroupBy::SessionStatus],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseStatsParams {
    pub version: ReleaseVersion,
    pub project: u64,
    pub environments: Vec<String>,
    pub chart: StatsChart,
    pub selection: DateSelection,
}

/// Chart-ready series plus a headline number for the chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseStats {
    pub chart_data: Vec<ChartSeries>,
    pub chart_summary: String,
}

/// Orchestrator for [`ReleaseStats`].
pub type ReleaseStatsRequest<A> = Request<A, ReleaseStatsLoader>;

#[derive(Debug)]
pub struct ReleaseStatsLoader;

impl Loader for ReleaseStatsLoader {
    type Params = ReleaseStatsParams;
    type Output = ReleaseStats;

    const NAME: &'static str = "release_stats";
    const ERROR_MESSAGE: &'static str = "Error loading chart data";

    async fn load<A: SessionsApi>(
        api: &A,
        params: &ReleaseStatsParams,
    ) -> Result<ReleaseStats, ApiError> {
        let interval = sessions_interval(&params.selection, Utc::now());
        let base = SessionsQuery::new(params.chart.fields(), params.selection)
            .group_by(params.chart.group_by())
            .projects([params.project])
            .environments(params.environments.clone())
            .interval(interval);
        let this_query = base.clone().query(release_query(&params.version));
        let other_query = base.query(other_releases_query(&params.version));

        let (this_release, other_releases) = tokio::try_join!(
            api.fetch_sessions(&this_query),
            api.fetch_sessions(&other_query)
        )?;

        Ok(build_release_stats(
            params.chart,
            &this_release,
            &other_releases,
        ))
    }
}

fn breakdown(
    response: &SessionApiResponse,
    field: SessionField,
    chart_data: ChartData,
) -> ChartData {
    fill_chart_data_from_sessions_response(FillChartData {
        response,
        field,
        group_by: Some(GroupBy::SessionStatus),
        chart_data,
        value_formatter: None,
    })
}

fn crash_free(response: &SessionApiResponse, chart_data: ChartData) -> ChartData {
    [CrashFreeEntity::Users, CrashFreeEntity::Sessions]
        .into_iter()
        .fold(chart_data, |chart_data, entity| {
            fill_crash_free_chart_data_from_sessions_response(
                response,
                entity.field(),
                entity,
                chart_data,
            )
        })
}

fn ms_to_seconds(ms: f64) -> f64 {
    round_duration(ms / 1000.0)
}

fn duration(response: &SessionApiResponse, chart_data: ChartData) -> ChartData {
    fill_chart_data_from_sessions_response(FillChartData {
        response,
        field: SessionField::DurationP50,
        group_by: None,
        chart_data,
        value_formatter: Some(&ms_to_seconds),
    })
}

/// Builds the chart for `chart` from this release's and the other releases'
/// responses.
pub fn build_release_stats(
    chart: StatsChart,
    this_release: &SessionApiResponse,
    other_releases: &SessionApiResponse,
) -> ReleaseStats {
    match chart {
        StatsChart::Sessions | StatsChart::Users => {
            let field = chart.fields()[0];
            ReleaseStats {
                chart_data: merge_series(
                    breakdown(this_release, field, init_sessions_breakdown_chart_data()),
                    breakdown(other_releases, field, init_other_sessions_breakdown_chart_data()),
                ),
                chart_summary: format_count(totals_from_sessions_response(this_release, field)),
            }
        }
        StatsChart::CrashFree => ReleaseStats {
            chart_data: merge_series(
                crash_free(this_release, init_crash_free_chart_data()),
                crash_free(other_releases, init_other_crash_free_chart_data()),
            ),
            chart_summary: crash_free_rate(&this_release.groups, SessionField::Sessions)
                .map_or_else(|| NO_DATA.to_string(), display_crash_free_percent),
        },
        StatsChart::SessionDuration => ReleaseStats {
            chart_data: merge_series(
                duration(this_release, init_session_duration_chart_data()),
                duration(other_releases, init_other_session_duration_chart_data()),
            ),
            chart_summary: this_release
                .groups
                .first()
                .and_then(|group| group.total(SessionField::DurationP50))
                .map_or_else(|| NO_DATA.to_string(), |ms| format_duration_secs(ms / 1000.0)),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::request::testing::{FakeApi, RecordingNotifier, json};

    fn this_release() -> SessionApiResponse {
        json(
            r#"{"intervals": ["t0", "t1"],
                "groups": [
                    {"by": {"session.status": "healthy"},
                     "series": {"sum(session)": [1200, 300], "count_unique(user)": [40, 10]},
                     "totals": {"sum(session)": 1500, "count_unique(user)": 45}},
                    {"by": {"session.status": "crashed"},
                     "series": {"sum(session)": [3, 0], "count_unique(user)": [2, 0]},
                     "totals": {"sum(session)": 3, "count_unique(user)": 2}}
                ]}"#,
        )
    }

    fn other_releases() -> SessionApiResponse {
        json(
            r#"{"intervals": ["t0", "t1"],
                "groups": [
                    {"by": {"session.status": "healthy"},
                     "series": {"sum(session)": [90, 0], "count_unique(user)": [9, 0]},
                     "totals": {"sum(session)": 90, "count_unique(user)": 9}},
                    {"by": {"session.status": "errored"},
                     "series": {"sum(session)": [10, 0], "count_unique(user)": [1, 0]},
                     "totals": {"sum(session)": 10, "count_unique(user)": 1}}
                ]}"#,
        )
    }

    fn params(chart: StatsChart) -> ReleaseStatsParams {
        ReleaseStatsParams {
            version: ReleaseVersion::new("app@2.0").unwrap(),
            project: 11,
            environments: vec!["production".to_string()],
            chart,
            selection: DateSelection::Period("14d".parse().unwrap()),
        }
    }

    #[test]
    fn sessions_chart_breaks_down_by_status() {
        let stats = build_release_stats(StatsChart::Sessions, &this_release(), &other_releases());
        assert_eq!(stats.chart_data.len(), 8);
        assert_eq!(stats.chart_data[0].series_name, "Healthy");
        assert_eq!(stats.chart_data[0].values(), vec![Some(1200.0), Some(300.0)]);
        assert_eq!(stats.chart_data[5].series_name, "Errored (other releases)");
        assert_eq!(stats.chart_data[5].values(), vec![Some(10.0), Some(0.0)]);
        assert_eq!(stats.chart_summary, "1,503");
    }

    #[test]
    fn crash_free_chart_fills_users_and_sessions() {
        let stats = build_release_stats(StatsChart::CrashFree, &this_release(), &other_releases());
        let names: Vec<_> = stats.chart_data.iter().map(|s| s.series_name.as_str()).collect();
        assert_eq!(
            names,
            [
                "Crash Free Users",
                "Crash Free Sessions",
                "Crash Free Users (other releases)",
                "Crash Free Sessions (other releases)",
            ]
        );
        // 3 of 1203 sessions crashed at t0; nothing at all was recorded for
        // other releases at t1.
        assert_eq!(stats.chart_data[1].values(), vec![Some(99.751), Some(100.0)]);
        assert_eq!(stats.chart_data[3].values(), vec![Some(100.0), None]);
        assert_eq!(stats.chart_summary, "99.8%");
    }

    #[test]
    fn duration_chart_converts_milliseconds() {
        let this = json(
            r#"{"intervals": ["t0", "t1"],
                "groups": [{"by": {}, "series": {"p50(session.duration)": [125456, null]},
                            "totals": {"p50(session.duration)": 45500}}]}"#,
        );
        let stats = build_release_stats(
            StatsChart::SessionDuration,
            &this,
            &SessionApiResponse::default(),
        );
        assert_eq!(stats.chart_data.len(), 2);
        assert_eq!(stats.chart_data[0].values(), vec![Some(125.0), None]);
        assert!(stats.chart_data[1].data.is_empty());
        assert_eq!(stats.chart_summary, "45.5s");
    }

    #[test]
    fn summaries_without_sessions_show_placeholder() {
        let empty = SessionApiResponse::default();
        let crash_free = build_release_stats(StatsChart::CrashFree, &empty, &empty);
        assert_eq!(crash_free.chart_summary, NO_DATA);
        let duration = build_release_stats(StatsChart::SessionDuration, &empty, &empty);
        assert_eq!(duration.chart_summary, NO_DATA);
        let sessions = build_release_stats(StatsChart::Users, &empty, &empty);
        assert_eq!(sessions.chart_summary, "0");
    }

    #[tokio::test]
    async fn loader_queries_this_and_other_releases() {
        let api = FakeApi::new(|query| {
            Ok(if query.query.as_deref().is_some_and(|q| q.starts_with('!')) {
                other_releases()
            } else {
                this_release()
            })
        });
        let request: ReleaseStatsRequest<_> = Request::new(api);
        assert!(request.update(params(StatsChart::Users)).await);

        let calls = request_calls(&request);
        assert_eq!(calls.len(), 2);
        let queries: Vec<_> = calls.iter().filter_map(|c| c.query.clone()).collect();
        assert!(queries.contains(&"release:\"app@2.0\"".to_string()));
        assert!(queries.contains(&"!release:\"app@2.0\"".to_string()));
        assert!(calls.iter().all(|c| c.fields == [SessionField::Users]));
        assert!(calls.iter().all(|c| c.projects == [11]));
        assert!(calls.iter().all(|c| c.interval == "1h"));

        let stats = request.state().data.unwrap();
        assert_eq!(stats.chart_summary, "47");
    }

    #[tokio::test]
    async fn loader_fails_whole_batch() {
        let api = FakeApi::new(|query| {
            if query.query.as_deref().is_some_and(|q| q.starts_with('!')) {
                Err(ApiError::Api {
                    status: 502,
                    message: "bad gateway".to_string(),
                })
            } else {
                Ok(this_release())
            }
        });
        let notifier = Arc::new(RecordingNotifier::default());
        let request: ReleaseStatsRequest<_> = Request::with_notifier(api, notifier.clone());
        request.update(params(StatsChart::CrashFree)).await;

        let state = request.state();
        assert!(state.errored);
        assert!(state.data.is_none());
        assert_eq!(
            notifier.messages.lock().unwrap().as_slice(),
            ["Error loading chart data"]
        );
    }

    fn request_calls(request: &ReleaseStatsRequest<FakeApi>) -> Vec<SessionsQuery> {
        request.api().calls.lock().unwrap().clone()
    }
}
