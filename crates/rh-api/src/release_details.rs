//! Health of one release compared with the whole project.

use chrono::Utc;
use rh_core::rate::{percent, round};
use rh_core::sessions::{
    adoption_series, count, crash_free_rate, crash_free_rate_series, session_status_rate,
};
use rh_core::{
    DateSelection, GroupBy, ReleaseVersion, SeriesPoint, SessionApiResponse, SessionField,
    SessionStatus, sessions_interval,
};
use serde::Serialize;

use crate::client::{ApiError, SessionsApi};
use crate::query::{SessionsQuery, release_query};
use crate::request::{Loader, Request};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseDetailsParams {
    pub version: ReleaseVersion,
    pub project: u64,
    pub environments: Vec<String>,
    pub selection: DateSelection,
}

/// Headline health numbers of one population of sessions.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseHealthSummary {
    pub session_count: f64,
    pub user_count: f64,
    pub crash_free_sessions: Option<f64>,
    pub crash_free_users: Option<f64>,
    pub errored_session_rate: Option<f64>,
    pub abnormal_session_rate: Option<f64>,
    pub crashed_session_rate: Option<f64>,
    /// Crash-free sessions per interval; intervals without sessions are
    /// omitted.
    pub crash_free_sessions_series: Vec<SeriesPoint>,
}

impl ReleaseHealthSummary {
    pub fn from_response(response: &SessionApiResponse) -> Self {
        let groups = &response.groups;
        let status_rate = |status| session_status_rate(groups, SessionField::Sessions, status);
        Self {
            session_count: count(groups, SessionField::Sessions),
            user_count: count(groups, SessionField::Users),
            crash_free_sessions: crash_free_rate(groups, SessionField::Sessions),
            crash_free_users: crash_free_rate(groups, SessionField::Users),
            errored_session_rate: status_rate(SessionStatus::Errored),
            abnormal_session_rate: status_rate(SessionStatus::Abnormal),
            crashed_session_rate: status_rate(SessionStatus::Crashed),
            crash_free_sessions_series: crash_free_rate_series(
                groups,
                &response.intervals,
                SessionField::Sessions,
            ),
        }
    }
}

/// A release next to every release of its project.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseComparison {
    pub this_release: ReleaseHealthSummary,
    pub all_releases: ReleaseHealthSummary,
    /// Share of all sessions in the window, whole percent.
    pub session_adoption: Option<f64>,
    pub user_adoption: Option<f64>,
    pub session_adoption_series: Vec<SeriesPoint>,
    pub user_adoption_series: Vec<SeriesPoint>,
    pub intervals: Vec<String>,
}

/// Orchestrator for [`ReleaseComparison`].
pub type ReleaseDetailsRequest<A> = Request<A, ReleaseDetailsLoader>;

#[derive(Debug)]
pub struct ReleaseDetailsLoader;

impl Loader for ReleaseDetailsLoader {
    type Params = ReleaseDetailsParams;
    type Output = ReleaseComparison;

    const NAME: &'static str = "release_details";
    const ERROR_MESSAGE: &'static str = "Error loading release health";

    async fn load<A: SessionsApi>(
        api: &A,
        params: &ReleaseDetailsParams,
    ) -> Result<ReleaseComparison, ApiError> {
        let all_query = SessionsQuery::new(
            [SessionField::Sessions, SessionField::Users],
            params.selection,
        )
        .group_by([GroupBy::SessionStatus])
        .projects([params.project])
        .environments(params.environments.clone())
        .interval(sessions_interval(&params.selection, Utc::now()));
        let this_query = all_query.clone().query(release_query(&params.version));

        let (this_release, all_releases) = tokio::try_join!(
            api.fetch_sessions(&this_query),
            api.fetch_sessions(&all_query)
        )?;

        Ok(compare_release(&this_release, &all_releases))
    }
}

fn adoption(release: f64, all: f64) -> Option<f64> {
    (all > 0.0).then(|| round(percent(release, all), 0))
}

/// Compares a release's response with the response for all releases.
///
/// Interval names come from the all-releases response, which always spans
/// the full window.
pub fn compare_release(
    this_release: &SessionApiResponse,
    all_releases: &SessionApiResponse,
) -> ReleaseComparison {
    let this = ReleaseHealthSummary::from_response(this_release);
    let all = ReleaseHealthSummary::from_response(all_releases);
    let intervals = &all_releases.intervals;

    ReleaseComparison {
        session_adoption: adoption(this.session_count, all.session_count),
        user_adoption: adoption(this.user_count, all.user_count),
        session_adoption_series: adoption_series(
            &this_release.groups,
            &all_releases.groups,
            intervals,
            SessionField::Sessions,
        ),
        user_adoption_series: adoption_series(
            &this_release.groups,
            &all_releases.groups,
            intervals,
            SessionField::Users,
        ),
        intervals: intervals.clone(),
        this_release: this,
        all_releases: all,
    }
}

#[cfg(test)]
#[expect(
    clippy::float_cmp,
    reason = "counts and rounded rates are compared exactly"
)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::request::testing::{FakeApi, RecordingNotifier, json};

    fn this_release() -> SessionApiResponse {
        json(
            r#"{"intervals": ["t0", "t1", "t2"],
                "groups": [
                    {"by": {"session.status": "healthy"},
                     "series": {"sum(session)": [6, 4, 0], "count_unique(user)": [3, 2, 0]},
                     "totals": {"sum(session)": 10, "count_unique(user)": 4}},
                    {"by": {"session.status": "errored"},
                     "series": {"sum(session)": [2, 1, 0], "count_unique(user)": [1, 0, 0]},
                     "totals": {"sum(session)": 3, "count_unique(user)": 1}},
                    {"by": {"session.status": "crashed"},
                     "series": {"sum(session)": [2, 0, 0], "count_unique(user)": [1, 0, 0]},
                     "totals": {"sum(session)": 2, "count_unique(user)": 1}}
                ]}"#,
        )
    }

    fn all_releases() -> SessionApiResponse {
        json(
            r#"{"intervals": ["t0", "t1", "t2"],
                "groups": [
                    {"by": {"session.status": "healthy"},
                     "series": {"sum(session)": [30, 15, 10], "count_unique(user)": [10, 5, 5]},
                     "totals": {"sum(session)": 55, "count_unique(user)": 20}},
                    {"by": {"session.status": "crashed"},
                     "series": {"sum(session)": [10, 5, 0], "count_unique(user)": [2, 0, 0]},
                     "totals": {"sum(session)": 15, "count_unique(user)": 2}}
                ]}"#,
        )
    }

    #[test]
    fn summary_reads_counts_and_rates() {
        let summary = ReleaseHealthSummary::from_response(&this_release());
        assert_eq!(summary.session_count, 15.0);
        assert_eq!(summary.user_count, 6.0);
        // 2 of 15 sessions crashed: 86.666..% rounds to a whole percent.
        assert_eq!(summary.crash_free_sessions, Some(87.0));
        assert_eq!(summary.errored_session_rate, Some(20.0));
        assert_eq!(summary.abnormal_session_rate, Some(0.0));
        let series: Vec<_> = summary
            .crash_free_sessions_series
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(series, ["t0", "t1"]);
    }

    #[test]
    fn summary_of_empty_response_has_no_rates() {
        let summary = ReleaseHealthSummary::from_response(&SessionApiResponse::default());
        assert_eq!(summary.session_count, 0.0);
        assert!(summary.crash_free_sessions.is_none());
        assert!(summary.crashed_session_rate.is_none());
        assert!(summary.crash_free_sessions_series.is_empty());
    }

    #[test]
    fn comparison_computes_adoption() {
        let comparison = compare_release(&this_release(), &all_releases());
        assert_eq!(comparison.session_adoption, Some(21.0));
        assert_eq!(comparison.user_adoption, Some(27.0));
        assert_eq!(comparison.intervals, ["t0", "t1", "t2"]);
        let sessions: Vec<_> = comparison
            .session_adoption_series
            .iter()
            .map(|p| p.value)
            .collect();
        assert_eq!(sessions, [Some(25.0), Some(25.0), Some(0.0)]);
    }

    #[test]
    fn comparison_without_project_sessions_has_no_adoption() {
        let comparison =
            compare_release(&SessionApiResponse::default(), &SessionApiResponse::default());
        assert!(comparison.session_adoption.is_none());
        assert!(comparison.user_adoption.is_none());
        assert!(comparison.session_adoption_series.is_empty());
    }

    fn params() -> ReleaseDetailsParams {
        ReleaseDetailsParams {
            version: ReleaseVersion::new("1.0").unwrap(),
            project: 3,
            environments: Vec::new(),
            selection: DateSelection::Period("24h".parse().unwrap()),
        }
    }

    #[tokio::test]
    async fn loader_fetches_release_and_project() {
        let api = FakeApi::new(|query| {
            Ok(if query.query.is_some() {
                this_release()
            } else {
                all_releases()
            })
        });
        let request: ReleaseDetailsRequest<_> = Request::new(api);
        assert!(request.update(params()).await);

        let calls = request.api().calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|c| c.group_by == [GroupBy::SessionStatus]));
        assert!(calls.iter().all(|c| c.interval == "15m"));
        assert_eq!(
            calls.iter().filter_map(|c| c.query.as_deref()).collect::<Vec<_>>(),
            ["release:\"1.0\""]
        );

        let data = request.state().data.unwrap();
        assert_eq!(data.this_release.session_count, 15.0);
        assert_eq!(data.all_releases.session_count, 70.0);
    }

    #[tokio::test]
    async fn loader_failure_notifies() {
        let api = FakeApi::new(|_| {
            Err(ApiError::InvalidResponse("expected value".to_string()))
        });
        let notifier = Arc::new(RecordingNotifier::default());
        let request: ReleaseDetailsRequest<_> = Request::with_notifier(api, notifier.clone());
        request.update(params()).await;

        assert!(request.state().errored);
        assert_eq!(
            notifier.messages.lock().unwrap().as_slice(),
            ["Error loading release health"]
        );
    }
}
