use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use rh_cli::commands::details::DetailsArgs;
use rh_cli::commands::releases::ReleasesArgs;
use rh_cli::commands::stats::StatsArgs;
use rh_cli::commands::{bounds, details, releases, stats};
use rh_cli::{Cli, Commands, Config};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // try_init: tests may have installed a subscriber already
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let Some(command) = cli.command else {
        use clap::CommandFactory;
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let config =
        Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match command {
        Commands::Bounds {
            version,
            project,
            json,
        } => bounds::run(&mut out, &config, &version, project, json)?,
        Commands::Stats {
            version,
            project,
            chart,
            window,
            json,
        } => {
            let args = StatsArgs {
                version,
                project,
                chart: chart.into(),
                window,
                json,
            };
            stats::run(&mut out, &config, &args)?;
        }
        Commands::Details {
            version,
            project,
            window,
            json,
        } => {
            let args = DetailsArgs {
                version,
                project,
                window,
                json,
            };
            details::run(&mut out, &config, &args)?;
        }
        Commands::Releases {
            versions,
            projects,
            health_period,
            display,
            window,
            json,
        } => {
            let args = ReleasesArgs {
                versions,
                projects,
                health_stats_period: health_period,
                display,
                window,
                json,
            };
            releases::run(&mut out, &config, &args)?;
        }
    }

    Ok(())
}
