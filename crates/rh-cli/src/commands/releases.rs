//! Releases command: health columns for a list of releases.

use std::fmt::Write as _;
use std::io::Write;

use anyhow::Result;
use rh_api::{ReleasesHealth, ReleasesLoader, ReleasesParams};
use rh_core::rate::{format_count, round};
use rh_core::{ChartSeries, DisplayOption, HealthStatsPeriod, ReleaseVersion};
use serde::Serialize;

use super::util;
use crate::{Config, WindowArgs};

#[derive(Debug, Clone)]
pub struct ReleasesArgs {
    pub versions: Vec<ReleaseVersion>,
    pub projects: Vec<u64>,
    pub health_stats_period: HealthStatsPeriod,
    pub display: DisplayOption,
    pub window: WindowArgs,
    pub json: bool,
}

/// Health of one release in one project.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseRow {
    pub version: ReleaseVersion,
    pub project: u64,
    pub crash_free_rate: Option<f64>,
    pub crash_count: f64,
    pub count: f64,
    pub adoption: Option<f64>,
    pub time_series: Vec<ChartSeries>,
}

pub fn run<W: Write>(writer: &mut W, config: &Config, args: &ReleasesArgs) -> Result<()> {
    let selection = util::selection(&args.window)?.unwrap_or_default();
    let client = util::client(config)?;
    let params = ReleasesParams {
        releases: args.versions.clone(),
        projects: args.projects.clone(),
        environments: config.environments.clone(),
        health_stats_period: args.health_stats_period,
        selection,
    };
    let health = util::runtime()?.block_on(util::load::<ReleasesLoader>(client, params))?;
    let rows = build_rows(&health, &args.versions, &args.projects, args.display);

    if args.json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&rows)?)?;
    } else {
        write!(writer, "{}", format_releases(&rows, args.display))?;
    }
    Ok(())
}

/// One row per release and project, in argument order.
pub fn build_rows(
    health: &ReleasesHealth,
    versions: &[ReleaseVersion],
    projects: &[u64],
    display: DisplayOption,
) -> Vec<ReleaseRow> {
    versions
        .iter()
        .flat_map(|version| {
            projects.iter().map(move |&project| ReleaseRow {
                version: version.clone(),
                project,
                crash_free_rate: health.crash_free_rate(version, project, display),
                crash_count: health.crash_count(version, project, display),
                count: health.session_count_in_period(version, project, display),
                adoption: health.adoption(version, project, display),
                time_series: health.time_series(version, project, display),
            })
        })
        .collect()
}

fn table_row(output: &mut String, cells: [&str; 6]) {
    let [release, project, crash_free, crashes, count, adoption] = cells;
    let _ = writeln!(
        output,
        "{release:<20}{project:<9}{crash_free:<12}{crashes:<9}{count:<10}{adoption}"
    );
}

pub fn format_releases(rows: &[ReleaseRow], display: DisplayOption) -> String {
    let count_label = match display {
        DisplayOption::Sessions => "SESSIONS",
        DisplayOption::Users => "USERS",
    };
    let mut output = String::new();
    table_row(
        &mut output,
        ["RELEASE", "PROJECT", "CRASH FREE", "CRASHES", count_label, "ADOPTION"],
    );
    for row in rows {
        table_row(
            &mut output,
            [
                row.version.as_str(),
                &row.project.to_string(),
                &util::format_rate(row.crash_free_rate),
                &format_count(row.crash_count),
                &format_count(row.count),
                &util::format_percent(row.adoption.map(|a| round(a, 0))),
            ],
        );
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    use insta::assert_snapshot;
    use rh_core::SessionApiResponse;

    fn response(json: &str) -> SessionApiResponse {
        serde_json::from_str(json).unwrap()
    }

    fn health() -> ReleasesHealth {
        ReleasesHealth::new(
            response(
                r#"{"intervals": [],
                    "groups": [
                        {"by": {"project": 1, "release": "1.0", "session.status": "healthy"},
                         "totals": {"sum(session)": 90, "count_unique(user)": 30}},
                        {"by": {"project": 1, "release": "1.0", "session.status": "crashed"},
                         "totals": {"sum(session)": 10, "count_unique(user)": 1}},
                        {"by": {"project": 1, "release": "2.0", "session.status": "healthy"},
                         "totals": {"sum(session)": 400, "count_unique(user)": 50}}
                    ]}"#,
            ),
            response(
                r#"{"intervals": ["h0", "h1"],
                    "groups": [
                        {"by": {"project": 1, "release": "1.0"},
                         "series": {"sum(session)": [5, 20]}, "totals": {"sum(session)": 25}},
                        {"by": {"project": 1, "release": "2.0"},
                         "series": {"sum(session)": [35, 40]}, "totals": {"sum(session)": 75}}
                    ]}"#,
            ),
            response(
                r#"{"intervals": ["h0", "h1"],
                    "groups": [
                        {"by": {"project": 1},
                         "series": {"sum(session)": [40, 60]}, "totals": {"sum(session)": 100}}
                    ]}"#,
            ),
        )
    }

    fn versions() -> Vec<ReleaseVersion> {
        vec![
            ReleaseVersion::new("1.0").unwrap(),
            ReleaseVersion::new("2.0").unwrap(),
        ]
    }

    #[test]
    fn renders_releases_table() {
        let rows = build_rows(&health(), &versions(), &[1], DisplayOption::Sessions);
        let output = format_releases(&rows, DisplayOption::Sessions);
        assert_snapshot!(output);
    }

    #[test]
    fn rows_carry_time_series() {
        let rows = build_rows(&health(), &versions(), &[1], DisplayOption::Sessions);
        assert_eq!(rows.len(), 2);
        let series = &rows[1].time_series;
        assert_eq!(series[0].values(), vec![Some(35.0), Some(40.0)]);
        assert_eq!(series[1].values(), vec![Some(40.0), Some(60.0)]);
    }

    #[test]
    fn unknown_project_has_no_rates() {
        let rows = build_rows(&health(), &versions()[..1], &[7], DisplayOption::Users);
        assert_eq!(rows[0].crash_free_rate, None);
        assert_eq!(rows[0].adoption, None);
        let output = format_releases(&rows, DisplayOption::Users);
        assert!(output.starts_with("RELEASE"));
        assert!(output.contains("USERS"));
    }
}
