//! Shared utilities for CLI commands.

use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use rh_api::{ApiError, Client, ErrorNotifier, Loader, Request};
use rh_core::rate::{NO_DATA, display_crash_free_percent};
use rh_core::{DateSelection, OrganizationSlug, ReleaseVersion, SeriesPoint, release_bounds};

use crate::{Config, WindowArgs};

/// Builds an API client from the configured backend and credentials.
pub fn client(config: &Config) -> Result<Client> {
    let organization = config.organization.as_deref().ok_or_else(|| {
        anyhow::anyhow!("missing organization (set RH_ORGANIZATION or config.toml)")
    })?;
    let organization = OrganizationSlug::new(organization).context("invalid organization")?;
    let auth_token = config.auth_token.as_deref().ok_or_else(|| {
        anyhow::anyhow!("missing auth token (set RH_AUTH_TOKEN or config.toml)")
    })?;
    Client::new(&config.base_url, organization, auth_token).context("failed to create API client")
}

pub fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().context("failed to initialize tokio runtime")
}

/// Resolves the window flags; `None` when no window was given.
pub fn selection(window: &WindowArgs) -> Result<Option<DateSelection>> {
    match (window.period, window.start, window.end) {
        (Some(period), None, None) => Ok(Some(DateSelection::Period(period))),
        (None, Some(start), Some(end)) => {
            if end <= start {
                bail!("--end must be after --start");
            }
            Ok(Some(DateSelection::Absolute { start, end }))
        }
        (None, None, None) => Ok(None),
        _ => bail!("use either --period or both --start and --end"),
    }
}

/// Uses the explicit window if given, else the release's own bounds.
pub async fn release_selection(
    client: &Client,
    version: &ReleaseVersion,
    project: u64,
    explicit: Option<DateSelection>,
) -> Result<DateSelection> {
    if let Some(selection) = explicit {
        return Ok(selection);
    }
    let release = client
        .release(version, Some(project))
        .await
        .with_context(|| format!("failed to fetch release {version}"))?;
    let bounds = release_bounds(&release, Utc::now());
    tracing::debug!(?bounds, "using release bounds as window");
    Ok(bounds.selection())
}

/// Keeps the cause of a failed fetch for the command's error report.
#[derive(Debug, Default)]
struct FailureCause(Mutex<Option<String>>);

impl FailureCause {
    fn take(&self) -> Option<String> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

impl ErrorNotifier for FailureCause {
    fn notify(&self, message: &str) {
        tracing::debug!(reason = message, "fetch failed");
    }

    fn notify_failure(&self, _message: &str, error: &ApiError) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = Some(error.to_string());
    }
}

fn fetch_error(message: &'static str, cause: Option<String>) -> anyhow::Error {
    match cause {
        Some(cause) => anyhow::anyhow!(cause).context(message),
        None => anyhow::anyhow!(message),
    }
}

/// Runs a single fetch through a request orchestrator.
pub async fn load<L: Loader>(client: Client, params: L::Params) -> Result<L::Output> {
    let failure = Arc::new(FailureCause::default());
    let request: Request<Client, L> = Request::with_notifier(client, failure.clone());
    request.update(params).await;
    match request.state().data {
        Some(data) => Ok(data),
        None => Err(fetch_error(L::ERROR_MESSAGE, failure.take())),
    }
}

/// Formats an optional crash-free rate, [`NO_DATA`] when absent.
pub fn format_rate(rate: Option<f64>) -> String {
    rate.map_or_else(|| NO_DATA.to_string(), display_crash_free_percent)
}

/// Formats an optional whole percentage, [`NO_DATA`] when absent.
pub fn format_percent(value: Option<f64>) -> String {
    value.map_or_else(|| NO_DATA.to_string(), |v| format!("{v}%"))
}

/// Joins series values with spaces, [`NO_DATA`] for missing points.
pub fn format_points(points: &[SeriesPoint]) -> String {
    points
        .iter()
        .map(|p| p.value.map_or_else(|| NO_DATA.to_string(), |v| v.to_string()))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_prefers_period() {
        let window = WindowArgs {
            period: Some("24h".parse().unwrap()),
            ..WindowArgs::default()
        };
        assert_eq!(
            selection(&window).unwrap(),
            Some(DateSelection::Period("24h".parse().unwrap()))
        );
        assert_eq!(selection(&WindowArgs::default()).unwrap(), None);
    }

    #[test]
    fn selection_rejects_inverted_range() {
        let window = WindowArgs {
            period: None,
            start: Some("2021-06-02T00:00:00Z".parse().unwrap()),
            end: Some("2021-06-01T00:00:00Z".parse().unwrap()),
        };
        assert!(selection(&window).is_err());
    }

    #[test]
    fn client_requires_credentials() {
        let err = client(&Config::default()).unwrap_err();
        assert!(err.to_string().contains("missing organization"));

        let config = Config {
            organization: Some("acme".to_string()),
            ..Config::default()
        };
        let err = client(&config).unwrap_err();
        assert!(err.to_string().contains("missing auth token"));
    }

    #[test]
    fn fetch_errors_carry_the_api_failure() {
        let failure = FailureCause::default();
        failure.notify_failure(
            "Error loading chart data",
            &ApiError::Api {
                status: 502,
                message: "upstream unavailable".to_string(),
            },
        );

        let err = fetch_error("Error loading chart data", failure.take());
        assert_eq!(err.to_string(), "Error loading chart data");
        assert_eq!(
            format!("{err:#}"),
            "Error loading chart data: API error (502): upstream unavailable"
        );
        assert_eq!(failure.take(), None);
        let bare = fetch_error("Error loading health data", None);
        assert_eq!(format!("{bare:#}"), "Error loading health data");
    }

    #[test]
    fn formatters_render_placeholders() {
        assert_eq!(format_rate(None), NO_DATA);
        assert_eq!(format_rate(Some(99.5)), "99.5%");
        assert_eq!(format_percent(Some(25.0)), "25%");
        let points = [
            SeriesPoint {
                name: "t0".to_string(),
                value: Some(1200.0),
            },
            SeriesPoint {
                name: "t1".to_string(),
                value: None,
            },
        ];
        assert_eq!(format_points(&points), "1200 \u{2014}");
    }
}
