//! Details command: a release's health next to all releases of its project.

use std::fmt::Write as _;
use std::io::Write;

use anyhow::{Context, Result};
use rh_api::{
    Client, Commit, Deploy, ReleaseComparison, ReleaseDetailsLoader, ReleaseDetailsParams,
    ReleaseHealthSummary, ReleaseMeta, resolved_in_release_query,
};
use rh_core::rate::{format_count, round};
use rh_core::{DateSelection, ReleaseVersion};
use serde::Serialize;

use super::util;
use crate::{Config, WindowArgs};

#[derive(Debug, Clone)]
pub struct DetailsArgs {
    pub version: ReleaseVersion,
    pub project: u64,
    pub window: WindowArgs,
    pub json: bool,
}

/// Commits listed under the health table before the rest is summarized.
const MAX_LISTED_COMMITS: usize = 5;

/// Release metadata shown under the health table.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseActivity {
    pub meta: ReleaseMeta,
    pub deploys: Vec<Deploy>,
    pub commits: Vec<Commit>,
    pub resolved_issues: u64,
}

pub fn run<W: Write>(writer: &mut W, config: &Config, args: &DetailsArgs) -> Result<()> {
    let explicit = util::selection(&args.window)?;
    let client = util::client(config)?;

    let (comparison, activity) = util::runtime()?.block_on(async {
        let selection =
            util::release_selection(&client, &args.version, args.project, explicit).await?;
        let params = ReleaseDetailsParams {
            version: args.version.clone(),
            project: args.project,
            environments: config.environments.clone(),
            selection,
        };
        let comparison = util::load::<ReleaseDetailsLoader>(client.clone(), params);
        let activity = fetch_activity(&client, &args.version, args.project, &selection);
        tokio::try_join!(comparison, activity)
    })?;

    if args.json {
        let output = serde_json::json!({
            "version": args.version,
            "health": comparison,
            "activity": activity,
        });
        writeln!(writer, "{}", serde_json::to_string_pretty(&output)?)?;
    } else {
        write!(
            writer,
            "{}",
            format_details(&args.version, &comparison, Some(&activity))
        )?;
    }
    Ok(())
}

async fn fetch_activity(
    client: &Client,
    version: &ReleaseVersion,
    project: u64,
    selection: &DateSelection,
) -> Result<ReleaseActivity> {
    let resolved_query = resolved_in_release_query(version);
    let meta = async {
        client
            .release_meta(version)
            .await
            .context("failed to fetch release meta")
    };
    let deploys = async { client.deploys(version).await.context("failed to fetch deploys") };
    let commits = async { client.commits(version).await.context("failed to fetch commits") };
    let resolved = async {
        client
            .issue_counts(std::slice::from_ref(&resolved_query), Some(project), selection)
            .await
            .context("failed to fetch resolved issue count")
    };
    let (meta, deploys, commits, counts) = tokio::try_join!(meta, deploys, commits, resolved)?;
    Ok(ReleaseActivity {
        meta,
        deploys,
        commits,
        resolved_issues: counts.get(&resolved_query).copied().unwrap_or(0),
    })
}

fn status_rate(rate: Option<f64>) -> String {
    util::format_percent(rate.map(|r| round(r, 2)))
}

fn row(output: &mut String, label: &str, this: &str, all: &str) {
    let _ = writeln!(output, "{label:<22}{this:<14}{all}");
}

fn rows(output: &mut String, this: &ReleaseHealthSummary, all: &ReleaseHealthSummary) {
    let lines: [(&str, fn(&ReleaseHealthSummary) -> String); 7] = [
        ("Sessions", |s| format_count(s.session_count)),
        ("Users", |s| format_count(s.user_count)),
        ("Crash free sessions", |s| util::format_rate(s.crash_free_sessions)),
        ("Crash free users", |s| util::format_rate(s.crash_free_users)),
        ("Errored sessions", |s| status_rate(s.errored_session_rate)),
        ("Abnormal sessions", |s| status_rate(s.abnormal_session_rate)),
        ("Crashed sessions", |s| status_rate(s.crashed_session_rate)),
    ];
    for (label, render) in lines {
        row(output, label, &render(this), &render(all));
    }
}

fn commit_line(output: &mut String, commit: &Commit) {
    let id = commit.id.get(..7).unwrap_or(&commit.id);
    let author = commit
        .author
        .as_ref()
        .and_then(|a| a.name.as_deref().or(a.email.as_deref()))
        .unwrap_or("unknown");
    let _ = writeln!(output, "  {id} {} ({author})", commit.summary());
}

/// Renders the comparison table, adoption and release activity.
pub fn format_details(
    version: &ReleaseVersion,
    comparison: &ReleaseComparison,
    activity: Option<&ReleaseActivity>,
) -> String {
    let mut output = format!("Release {version}\n");
    row(&mut output, "", "This release", "All releases");
    rows(&mut output, &comparison.this_release, &comparison.all_releases);
    let _ = writeln!(
        output,
        "Adoption: {} of sessions, {} of users",
        util::format_percent(comparison.session_adoption),
        util::format_percent(comparison.user_adoption)
    );

    let Some(activity) = activity else {
        return output;
    };
    let meta = &activity.meta;
    let _ = writeln!(
        output,
        "Commits: {}  Deploys: {}  New issues: {}  Resolved issues: {}",
        meta.commit_count, meta.deploy_count, meta.new_groups, activity.resolved_issues
    );
    if !activity.deploys.is_empty() {
        let environments: Vec<_> = activity
            .deploys
            .iter()
            .map(|d| d.environment.as_str())
            .collect();
        let _ = writeln!(output, "Deployed to: {}", environments.join(", "));
    }
    for commit in activity.commits.iter().take(MAX_LISTED_COMMITS) {
        commit_line(&mut output, commit);
    }
    let hidden = activity.commits.len().saturating_sub(MAX_LISTED_COMMITS);
    if hidden > 0 {
        let _ = writeln!(output, "  and {hidden} more commits");
    }
    output
}
