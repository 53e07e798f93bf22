//! Command-line argument definitions.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use rh_api::StatsChart;
use rh_core::{DisplayOption, HealthStatsPeriod, ReleaseVersion, StatsPeriod};

/// Release health from the command line.
///
/// Aggregates session data into crash-free rates, adoption and per-release
/// charts.
#[derive(Debug, Parser)]
#[command(name = "rh", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show the observation window of a release.
    Bounds {
        /// Release version.
        version: ReleaseVersion,

        /// Project the release belongs to.
        #[arg(long)]
        project: Option<u64>,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Chart a release against all other releases.
    Stats {
        /// Release version.
        version: ReleaseVersion,

        /// Project the release belongs to.
        #[arg(long)]
        project: u64,

        /// Which chart to build.
        #[arg(long, value_enum, default_value_t = ChartKind::Sessions)]
        chart: ChartKind,

        #[command(flatten)]
        window: WindowArgs,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Compare a release with every release of its project.
    Details {
        /// Release version.
        version: ReleaseVersion,

        /// Project the release belongs to.
        #[arg(long)]
        project: u64,

        #[command(flatten)]
        window: WindowArgs,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show health columns for a list of releases.
    Releases {
        /// Release versions.
        #[arg(required = true)]
        versions: Vec<ReleaseVersion>,

        /// Projects to include (repeatable).
        #[arg(long = "project", required = true)]
        projects: Vec<u64>,

        /// Window for adoption and the sparkline (24h or 14d).
        #[arg(long, default_value = "24h")]
        health_period: HealthStatsPeriod,

        /// Count sessions or users.
        #[arg(long, default_value = "sessions")]
        display: DisplayOption,

        #[command(flatten)]
        window: WindowArgs,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
}

/// Chart choices for `rh stats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ChartKind {
    Sessions,
    Users,
    CrashFree,
    SessionDuration,
}

impl From<ChartKind> for StatsChart {
    fn from(kind: ChartKind) -> Self {
        match kind {
            ChartKind::Sessions => Self::Sessions,
            ChartKind::Users => Self::Users,
            ChartKind::CrashFree => Self::CrashFree,
            ChartKind::SessionDuration => Self::SessionDuration,
        }
    }
}

/// Time window flags shared by the query commands.
#[derive(Debug, Clone, Default, Args)]
pub struct WindowArgs {
    /// Relative window ending now (e.g., 24h, 14d).
    #[arg(long, conflicts_with_all = ["start", "end"])]
    pub period: Option<StatsPeriod>,

    /// Window start (ISO 8601).
    #[arg(long, requires = "end")]
    pub start: Option<DateTime<Utc>>,

    /// Window end (ISO 8601).
    #[arg(long, requires = "start")]
    pub end: Option<DateTime<Utc>>,
}
