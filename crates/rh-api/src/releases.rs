//! Health columns of the releases list.
//!
//! One batch of three queries covers every listed release: status counts
//! over the selected window, plus release and project totals over the
//! shorter health window that feeds adoption and the sparkline.

use chrono::Utc;
use rh_core::chart::{PROJECT_BUCKET, RELEASE_BUCKET, init_release_vs_project_chart_data};
use rh_core::rate::percent;
use rh_core::sessions::{count, count_series, crash_free_rate};
use rh_core::{
    ChartSeries, DateSelection, DisplayOption, GroupBy, HealthStatsPeriod, ReleaseVersion,
    SessionApiResponse, SessionField, SessionGroup, SessionStatus, sessions_interval,
};

use crate::client::{ApiError, SessionsApi};
use crate::query::{SessionsQuery, releases_query};
use crate::request::{Loader, Request};

const FIELDS: [SessionField; 2] = [SessionField::Sessions, SessionField::Users];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleasesParams {
    pub releases: Vec<ReleaseVersion>,
    pub projects: Vec<u64>,
    pub environments: Vec<String>,
    pub health_stats_period: HealthStatsPeriod,
    pub selection: DateSelection,
}

/// Raw responses of a releases batch with per-release accessors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReleasesHealth {
    status_count_by_release_in_period: SessionApiResponse,
    total_count_by_release_in_health_period: SessionApiResponse,
    total_count_by_project_in_health_period: SessionApiResponse,
}

fn release_groups<'a>(
    response: &'a SessionApiResponse,
    version: &'a ReleaseVersion,
    project: u64,
) -> impl Iterator<Item = &'a SessionGroup> + 'a {
    let project = project.to_string();
    response.groups.iter().filter(move |g| {
        g.is(GroupBy::Release, version.as_str()) && g.is(GroupBy::Project, &project)
    })
}

fn project_groups(
    response: &SessionApiResponse,
    project: u64,
) -> impl Iterator<Item = &SessionGroup> {
    let project = project.to_string();
    response
        .groups
        .iter()
        .filter(move |g| g.is(GroupBy::Project, &project))
}

impl ReleasesHealth {
    pub fn new(
        status_count_by_release_in_period: SessionApiResponse,
        total_count_by_release_in_health_period: SessionApiResponse,
        total_count_by_project_in_health_period: SessionApiResponse,
    ) -> Self {
        Self {
            status_count_by_release_in_period,
            total_count_by_release_in_health_period,
            total_count_by_project_in_health_period,
        }
    }

    fn status_groups(&self, version: &ReleaseVersion, project: u64) -> Vec<SessionGroup> {
        release_groups(&self.status_count_by_release_in_period, version, project)
            .cloned()
            .collect()
    }

    /// Crashed sessions or users of a release in the selected window.
    pub fn crash_count(
        &self,
        version: &ReleaseVersion,
        project: u64,
        display: DisplayOption,
    ) -> f64 {
        release_groups(&self.status_count_by_release_in_period, version, project)
            .filter(|g| g.status() == Some(SessionStatus::Crashed))
            .map(|g| g.total(display.field()).unwrap_or(0.0))
            .sum()
    }

    /// Crash-free rate of a release; `None` without sessions.
    pub fn crash_free_rate(
        &self,
        version: &ReleaseVersion,
        project: u64,
        display: DisplayOption,
    ) -> Option<f64> {
        crash_free_rate(&self.status_groups(version, project), display.field())
    }

    pub fn session_count_in_period(
        &self,
        version: &ReleaseVersion,
        project: u64,
        display: DisplayOption,
    ) -> f64 {
        count(&self.status_groups(version, project), display.field())
    }

    pub fn count_by_release_in_health_period(
        &self,
        version: &ReleaseVersion,
        project: u64,
        display: DisplayOption,
    ) -> f64 {
        release_groups(&self.total_count_by_release_in_health_period, version, project)
            .map(|g| g.total(display.field()).unwrap_or(0.0))
            .sum()
    }

    pub fn count_by_project_in_health_period(&self, project: u64, display: DisplayOption) -> f64 {
        project_groups(&self.total_count_by_project_in_health_period, project)
            .map(|g| g.total(display.field()).unwrap_or(0.0))
            .sum()
    }

    /// Share of the project's sessions or users in the health window that
    /// belong to the release, in percent.
    ///
    /// `None` when the project has no data in the window.
    pub fn adoption(
        &self,
        version: &ReleaseVersion,
        project: u64,
        display: DisplayOption,
    ) -> Option<f64> {
        let project_count = self.count_by_project_in_health_period(project, display);
        if project_count == 0.0 {
            return None;
        }
        Some(percent(
            self.count_by_release_in_health_period(version, project, display),
            project_count,
        ))
    }

    /// Release and project counts per interval of the health window.
    pub fn time_series(
        &self,
        version: &ReleaseVersion,
        project: u64,
        display: DisplayOption,
    ) -> Vec<ChartSeries> {
        let field = display.field();
        let release = &self.total_count_by_release_in_health_period;
        let project_response = &self.total_count_by_project_in_health_period;

        let mut chart_data = init_release_vs_project_chart_data();
        chart_data.series_mut(RELEASE_BUCKET).data = count_series(
            field,
            release_groups(release, version, project).next(),
            &release.intervals,
        );
        chart_data.series_mut(PROJECT_BUCKET).data = count_series(
            field,
            project_groups(project_response, project).next(),
            &project_response.intervals,
        );
        chart_data.into_series()
    }
}

/// Orchestrator for [`ReleasesHealth`].
pub type ReleasesRequest<A> = Request<A, ReleasesLoader>;

#[derive(Debug)]
pub struct ReleasesLoader;

impl Loader for ReleasesLoader {
    type Params = ReleasesParams;
    type Output = ReleasesHealth;

    const NAME: &'static str = "releases";
    const ERROR_MESSAGE: &'static str = "Error loading health data";

    async fn load<A: SessionsApi>(
        api: &A,
        params: &ReleasesParams,
    ) -> Result<ReleasesHealth, ApiError> {
        if params.releases.is_empty() {
            tracing::debug!("no releases listed, skipping health queries");
            return Ok(ReleasesHealth::default());
        }

        let release_filter = releases_query(&params.releases);
        let health_selection = DateSelection::Period(params.health_stats_period.stats_period());
        let health_interval = params.health_stats_period.interval();

        let status_query = SessionsQuery::new(FIELDS, params.selection)
            .group_by([GroupBy::Project, GroupBy::Release, GroupBy::SessionStatus])
            .projects(params.projects.clone())
            .environments(params.environments.clone())
            .interval(sessions_interval(&params.selection, Utc::now()))
            .query(release_filter.clone());
        let release_query = SessionsQuery::new(FIELDS, health_selection)
            .group_by([GroupBy::Project, GroupBy::Release])
            .projects(params.projects.clone())
            .environments(params.environments.clone())
            .interval(health_interval)
            .query(release_filter);
        let project_query = SessionsQuery::new(FIELDS, health_selection)
            .group_by([GroupBy::Project])
            .projects(params.projects.clone())
            .environments(params.environments.clone())
            .interval(health_interval);

        let (status, by_release, by_project) = tokio::try_join!(
            api.fetch_sessions(&status_query),
            api.fetch_sessions(&release_query),
            api.fetch_sessions(&project_query)
        )?;

        Ok(ReleasesHealth::new(status, by_release, by_project))
    }
}

#[cfg(test)]
#[expect(
    clippy::float_cmp,
    reason = "counts and rates are compared exactly"
)]
mod tests {
    use super::*;
    use crate::request::testing::{FakeApi, json};

    fn version(v: &str) -> ReleaseVersion {
        ReleaseVersion::new(v).unwrap()
    }

    fn status_by_release() -> SessionApiResponse {
        json(
            r#"{"intervals": ["d0", "d1"],
                "groups": [
                    {"by": {"project": 1, "release": "1.0", "session.status": "healthy"},
                     "series": {}, "totals": {"sum(session)": 90, "count_unique(user)": 30}},
                    {"by": {"project": 1, "release": "1.0", "session.status": "crashed"},
                     "series": {}, "totals": {"sum(session)": 10, "count_unique(user)": 1}},
                    {"by": {"project": 2, "release": "1.0", "session.status": "crashed"},
                     "series": {}, "totals": {"sum(session)": 50, "count_unique(user)": 5}},
                    {"by": {"project": 1, "release": "2.0", "session.status": "healthy"},
                     "series": {}, "totals": {"sum(session)": 40, "count_unique(user)": 8}}
                ]}"#,
        )
    }

    fn by_release() -> SessionApiResponse {
        json(
            r#"{"intervals": ["h0", "h1", "h2"],
                "groups": [
                    {"by": {"project": 1, "release": "1.0"},
                     "series": {"sum(session)": [5, null, 20]},
                     "totals": {"sum(session)": 25, "count_unique(user)": 4}},
                    {"by": {"project": 1, "release": "2.0"},
                     "series": {"sum(session)": [1, 1, 1]},
                     "totals": {"sum(session)": 3, "count_unique(user)": 1}}
                ]}"#,
        )
    }

    fn by_project() -> SessionApiResponse {
        json(
            r#"{"intervals": ["h0", "h1", "h2"],
                "groups": [
                    {"by": {"project": 1},
                     "series": {"sum(session)": [10, 10, 80]},
                     "totals": {"sum(session)": 100, "count_unique(user)": 16}}
                ]}"#,
        )
    }

    fn health() -> ReleasesHealth {
        ReleasesHealth::new(status_by_release(), by_release(), by_project())
    }

    #[test]
    fn counts_are_scoped_to_release_and_project() {
        let health = health();
        let v1 = version("1.0");
        assert_eq!(health.crash_count(&v1, 1, DisplayOption::Sessions), 10.0);
        assert_eq!(health.crash_count(&v1, 2, DisplayOption::Users), 5.0);
        assert_eq!(health.session_count_in_period(&v1, 1, DisplayOption::Sessions), 100.0);
        assert_eq!(health.crash_free_rate(&v1, 1, DisplayOption::Sessions), Some(90.0));
        assert_eq!(health.crash_free_rate(&v1, 2, DisplayOption::Sessions), Some(0.0));
        assert_eq!(health.crash_free_rate(&version("3.0"), 1, DisplayOption::Sessions), None);
    }

    #[test]
    fn adoption_compares_release_with_project() {
        let health = health();
        assert_eq!(
            health.count_by_release_in_health_period(&version("1.0"), 1, DisplayOption::Sessions),
            25.0
        );
        assert_eq!(health.count_by_project_in_health_period(1, DisplayOption::Users), 16.0);
        assert_eq!(health.adoption(&version("1.0"), 1, DisplayOption::Sessions), Some(25.0));
        assert_eq!(health.adoption(&version("1.0"), 1, DisplayOption::Users), Some(25.0));
        assert_eq!(health.adoption(&version("1.0"), 9, DisplayOption::Sessions), None);
    }

    #[test]
    fn time_series_pairs_release_with_project() {
        let series = health().time_series(&version("1.0"), 1, DisplayOption::Sessions);
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].series_name, "This Release");
        assert_eq!(series[0].values(), vec![Some(5.0), Some(0.0), Some(20.0)]);
        assert_eq!(series[1].series_name, "Total Project");
        assert_eq!(series[1].values(), vec![Some(10.0), Some(10.0), Some(80.0)]);

        let missing = health().time_series(&version("9.9"), 1, DisplayOption::Sessions);
        assert_eq!(missing[0].values(), vec![Some(0.0); 3]);
    }

    fn params(releases: Vec<ReleaseVersion>) -> ReleasesParams {
        ReleasesParams {
            releases,
            projects: vec![1],
            environments: vec!["production".to_string()],
            health_stats_period: HealthStatsPeriod::Day,
            selection: DateSelection::Period("14d".parse().unwrap()),
        }
    }

    #[tokio::test]
    async fn loader_issues_three_queries() {
        let api = FakeApi::new(|query| {
            Ok(match query.group_by.len() {
                3 => status_by_release(),
                2 => by_release(),
                _ => by_project(),
            })
        });
        let request: ReleasesRequest<_> = Request::new(api);
        assert!(request.update(params(vec![version("1.0"), version("2.0")])).await);

        let calls = request.api().calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 3);
        let status = calls.iter().find(|c| c.group_by.len() == 3).unwrap();
        assert_eq!(status.interval, "1h");
        assert_eq!(
            status.query.as_deref(),
            Some("release:\"1.0\" OR release:\"2.0\"")
        );
        let project = calls.iter().find(|c| c.group_by.len() == 1).unwrap();
        assert!(project.query.is_none());
        assert_eq!(project.interval, "1h");
        assert_eq!(
            project.selection,
            DateSelection::Period("24h".parse().unwrap())
        );

        let data = request.state().data.unwrap();
        assert_eq!(data, health());
    }

    #[tokio::test]
    async fn empty_release_list_skips_requests() {
        let api = FakeApi::new(|_| Ok(SessionApiResponse::default()));
        let request: ReleasesRequest<_> = Request::new(api);
        assert!(request.update(params(Vec::new())).await);

        assert_eq!(request.api().call_count(), 0);
        let state = request.state();
        assert!(!state.loading && !state.errored);
        assert_eq!(state.data, Some(ReleasesHealth::default()));
    }
}
