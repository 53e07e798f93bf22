//! Stats command: one release charted against all other releases.

use std::fmt::Write as _;
use std::io::Write;

use anyhow::Result;
use rh_api::{ReleaseStats, ReleaseStatsLoader, ReleaseStatsParams, StatsChart};
use rh_core::ReleaseVersion;

use super::util;
use crate::{Config, WindowArgs};

const NAME_WIDTH: usize = 38;

#[derive(Debug, Clone)]
pub struct StatsArgs {
    pub version: ReleaseVersion,
    pub project: u64,
    pub chart: StatsChart,
    pub window: WindowArgs,
    pub json: bool,
}

pub fn run<W: Write>(writer: &mut W, config: &Config, args: &StatsArgs) -> Result<()> {
    let explicit = util::selection(&args.window)?;
    let client = util::client(config)?;

    let stats = util::runtime()?.block_on(async {
        let selection =
            util::release_selection(&client, &args.version, args.project, explicit).await?;
        let params = ReleaseStatsParams {
            version: args.version.clone(),
            project: args.project,
            environments: config.environments.clone(),
            chart: args.chart,
            selection,
        };
        util::load::<ReleaseStatsLoader>(client.clone(), params).await
    })?;

    if args.json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&stats)?)?;
    } else {
        write!(writer, "{}", format_stats(args.chart, &args.version, &stats))?;
    }
    Ok(())
}

const fn chart_label(chart: StatsChart) -> &'static str {
    match chart {
        StatsChart::Sessions => "Sessions",
        StatsChart::Users => "Users",
        StatsChart::CrashFree => "Crash free sessions",
        StatsChart::SessionDuration => "Session duration",
    }
}

/// Renders the summary line and one row per series with data.
pub fn format_stats(chart: StatsChart, version: &ReleaseVersion, stats: &ReleaseStats) -> String {
    let mut output = format!(
        "{} for {version}: {}\n",
        chart_label(chart),
        stats.chart_summary
    );
    for series in stats.chart_data.iter().filter(|s| !s.data.is_empty()) {
        let _ = writeln!(
            output,
            "{:<NAME_WIDTH$} {}",
            series.series_name,
            util::format_points(&series.data)
        );
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    use insta::assert_snapshot;
    use rh_api::build_release_stats;
    use rh_core::SessionApiResponse;

    fn response(json: &str) -> SessionApiResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn renders_sessions_chart() {
        let this = response(
            r#"{"intervals": ["t0", "t1"],
                "groups": [
                    {"by": {"session.status": "healthy"},
                     "series": {"sum(session)": [8, 2]}, "totals": {"sum(session)": 10}},
                    {"by": {"session.status": "crashed"},
                     "series": {"sum(session)": [1, 0]}, "totals": {"sum(session)": 1}}
                ]}"#,
        );
        let other = response(
            r#"{"intervals": ["t0", "t1"],
                "groups": [
                    {"by": {"session.status": "healthy"},
                     "series": {"sum(session)": [40, 60]}, "totals": {"sum(session)": 100}}
                ]}"#,
        );
        let stats = build_release_stats(StatsChart::Sessions, &this, &other);
        let version = ReleaseVersion::new("1.0").unwrap();

        let output = format_stats(StatsChart::Sessions, &version, &stats);
        assert_snapshot!(output);
    }

    #[test]
    fn renders_missing_crash_free_points() {
        let this = response(
            r#"{"intervals": ["t0", "t1"],
                "groups": [
                    {"by": {"session.status": "healthy"},
                     "series": {"sum(session)": [4, 0], "count_unique(user)": [2, 0]},
                     "totals": {"sum(session)": 4, "count_unique(user)": 2}}
                ]}"#,
        );
        let stats = build_release_stats(
            StatsChart::CrashFree,
            &this,
            &SessionApiResponse::default(),
        );
        let version = ReleaseVersion::new("1.0").unwrap();

        assert_eq!(
            format_stats(StatsChart::CrashFree, &version, &stats),
            format!(
                "Crash free sessions for 1.0: 100%\n{:<38} 100 \u{2014}\n{:<38} 100 \u{2014}\n",
                "Crash Free Users", "Crash Free Sessions"
            )
        );
    }
}
