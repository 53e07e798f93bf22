//! HTTP client for the monitoring backend's REST API.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use reqwest::Url;
use rh_core::{DateSelection, OrganizationSlug, Release, ReleaseVersion, SessionApiResponse};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::query::SessionsQuery;

/// Default request timeout for API calls.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const API_PREFIX: [&str; 2] = ["api", "0"];

/// API client errors.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The provided auth token was invalid.
    #[error("invalid auth token: {reason}")]
    InvalidToken { reason: &'static str },
    /// The base URL cannot carry API paths.
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),
    /// Failed to build HTTP client.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    /// HTTP request failed.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// API returned an error response.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    /// Failed to parse response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Source of session data for the request orchestrators.
///
/// [`Client`] is the production implementation; tests substitute in-memory
/// fakes.
pub trait SessionsApi: Send + Sync {
    fn fetch_sessions(
        &self,
        query: &SessionsQuery,
    ) -> impl Future<Output = Result<SessionApiResponse, ApiError>> + Send;
}

/// Summary counters of a release (`.../releases/{version}/meta/`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseMeta {
    pub version: String,
    #[serde(default)]
    pub commit_count: u64,
    #[serde(default)]
    pub commit_files_changed: u64,
    #[serde(default)]
    pub deploy_count: u64,
    #[serde(default)]
    pub new_groups: u64,
    #[serde(default)]
    pub released: Option<String>,
}

/// A deploy of a release to an environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deploy {
    pub id: String,
    pub environment: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub date_started: Option<String>,
    #[serde(default)]
    pub date_finished: Option<String>,
}

/// Author of a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitAuthor {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// A commit associated with a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commit {
    pub id: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub date_created: Option<String>,
    #[serde(default)]
    pub author: Option<CommitAuthor>,
}

impl Commit {
    /// First line of the commit message.
    pub fn summary(&self) -> &str {
        self.message
            .as_deref()
            .and_then(|m| m.lines().next())
            .unwrap_or_default()
    }
}

/// Monitoring API client.
///
/// # Thread Safety
///
/// The client is safe to clone and share across threads. Each clone shares
/// the underlying HTTP connection pool.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: Url,
    organization: OrganizationSlug,
    auth_token: String,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.base_url.as_str())
            .field("organization", &self.organization)
            .field("auth_token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Creates a new client for `organization` on the backend at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is empty or whitespace-only, if the base
    /// URL cannot be parsed, or if the HTTP client fails to build.
    pub fn new(
        base_url: &str,
        organization: OrganizationSlug,
        auth_token: impl Into<String>,
    ) -> Result<Self, ApiError> {
        let auth_token = auth_token.into();

        if auth_token.is_empty() {
            return Err(ApiError::InvalidToken {
                reason: "auth token cannot be empty",
            });
        }
        if auth_token.trim().is_empty() {
            return Err(ApiError::InvalidToken {
                reason: "auth token cannot be whitespace-only",
            });
        }

        let base_url =
            Url::parse(base_url).map_err(|err| ApiError::InvalidBaseUrl(err.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidBaseUrl(base_url.to_string()));
        }

        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(ApiError::ClientBuild)?;

        Ok(Self {
            http,
            base_url,
            organization,
            auth_token,
        })
    }

    pub const fn organization(&self) -> &OrganizationSlug {
        &self.organization
    }

    /// Builds `{base}/api/0/organizations/{org}/{segments...}/`.
    ///
    /// Segments are percent-encoded, so versions containing `/` or `+` stay
    /// a single path segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| ApiError::InvalidBaseUrl(self.base_url.to_string()))?;
            path.pop_if_empty()
                .extend(API_PREFIX)
                .push("organizations")
                .push(self.organization.as_str())
                .extend(segments)
                .push("");
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        tracing::debug!(%url, "GET");
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.auth_token)
            .query(query)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(parse_api_error(status.as_u16(), &body).unwrap_or_else(|| {
                ApiError::Api {
                    status: status.as_u16(),
                    message: body,
                }
            }));
        }

        serde_json::from_str(&body).map_err(|err| ApiError::InvalidResponse(err.to_string()))
    }

    /// Fetches aggregated session data.
    pub async fn sessions(&self, query: &SessionsQuery) -> Result<SessionApiResponse, ApiError> {
        let url = self.endpoint(&["sessions"])?;
        self.get_json(url, &query.to_query_pairs()).await
    }

    /// Fetches the release record used to compute release bounds.
    pub async fn release(
        &self,
        version: &ReleaseVersion,
        project: Option<u64>,
    ) -> Result<Release, ApiError> {
        let url = self.endpoint(&["releases", version.as_str()])?;
        let mut query = vec![("health", "0".to_string())];
        if let Some(project) = project {
            query.push(("project", project.to_string()));
        }
        self.get_json(url, &query).await
    }

    pub async fn release_meta(&self, version: &ReleaseVersion) -> Result<ReleaseMeta, ApiError> {
        let url = self.endpoint(&["releases", version.as_str(), "meta"])?;
        self.get_json(url, &[]).await
    }

    pub async fn deploys(&self, version: &ReleaseVersion) -> Result<Vec<Deploy>, ApiError> {
        let url = self.endpoint(&["releases", version.as_str(), "deploys"])?;
        self.get_json(url, &[]).await
    }

    pub async fn commits(&self, version: &ReleaseVersion) -> Result<Vec<Commit>, ApiError> {
        let url = self.endpoint(&["releases", version.as_str(), "commits"])?;
        self.get_json(url, &[]).await
    }

    /// Counts issues matching each search query, keyed by query.
    pub async fn issue_counts(
        &self,
        queries: &[String],
        project: Option<u64>,
        selection: &DateSelection,
    ) -> Result<BTreeMap<String, u64>, ApiError> {
        let url = self.endpoint(&["issues-count"])?;
        self.get_json(url, &issue_count_pairs(queries, project, selection))
            .await
    }
}

impl SessionsApi for Client {
    fn fetch_sessions(
        &self,
        query: &SessionsQuery,
    ) -> impl Future<Output = Result<SessionApiResponse, ApiError>> + Send {
        self.sessions(query)
    }
}

fn issue_count_pairs(
    queries: &[String],
    project: Option<u64>,
    selection: &DateSelection,
) -> Vec<(&'static str, String)> {
    let mut pairs: Vec<_> = queries.iter().map(|q| ("query", q.clone())).collect();
    if let Some(project) = project {
        pairs.push(("project", project.to_string()));
    }
    pairs.extend(selection.query_pairs());
    pairs
}

fn parse_api_error(status: u16, body: &str) -> Option<ApiError> {
    #[derive(Deserialize)]
    struct ErrorPayload {
        detail: String,
    }

    serde_json::from_str::<ErrorPayload>(body)
        .ok()
        .map(|payload| ApiError::Api {
            status,
            message: payload.detail,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn org() -> OrganizationSlug {
        OrganizationSlug::new("acme").unwrap()
    }

    #[test]
    fn client_rejects_empty_token() {
        assert!(matches!(
            Client::new("https://sentry.io", org(), ""),
            Err(ApiError::InvalidToken { .. })
        ));
    }

    #[test]
    fn client_rejects_whitespace_token() {
        assert!(matches!(
            Client::new("https://sentry.io", org(), "   "),
            Err(ApiError::InvalidToken { .. })
        ));
    }

    #[test]
    fn client_rejects_unusable_base_url() {
        assert!(matches!(
            Client::new("not a url", org(), "token"),
            Err(ApiError::InvalidBaseUrl(_))
        ));
        assert!(matches!(
            Client::new("mailto:ops@example.com", org(), "token"),
            Err(ApiError::InvalidBaseUrl(_))
        ));
    }

    #[test]
    fn client_debug_redacts_token() {
        let client = Client::new("https://sentry.io", org(), "secret-token").unwrap();
        let debug = format!("{client:?}");
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn endpoint_builds_organization_paths() {
        let client = Client::new("https://sentry.example.com/", org(), "t").unwrap();
        let url = client.endpoint(&["sessions"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://sentry.example.com/api/0/organizations/acme/sessions/"
        );
    }

    #[test]
    fn endpoint_encodes_release_versions() {
        let client = Client::new("https://sentry.example.com", org(), "t").unwrap();
        let url = client
            .endpoint(&["releases", "app/1.0 beta", "meta"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://sentry.example.com/api/0/organizations/acme/releases/app%2F1.0%20beta/meta/"
        );
    }

    #[test]
    fn endpoint_keeps_base_path_prefix() {
        let client = Client::new("https://example.com/monitoring", org(), "t").unwrap();
        let url = client.endpoint(&["sessions"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://example.com/monitoring/api/0/organizations/acme/sessions/"
        );
    }

    #[test]
    fn parse_api_error_reads_detail() {
        let err = parse_api_error(403, r#"{"detail":"You do not have permission"}"#).unwrap();
        assert!(matches!(
            err,
            ApiError::Api { status: 403, ref message } if message == "You do not have permission"
        ));
        assert!(parse_api_error(500, "<html>").is_none());
    }

    #[test]
    fn release_meta_deserializes() {
        let meta: ReleaseMeta = serde_json::from_str(
            r#"{"version":"1.0","commitCount":4,"commitFilesChanged":9,"deployCount":1,
                "newGroups":2,"released":"2021-05-20T08:30:00Z","projects":[]}"#,
        )
        .unwrap();
        assert_eq!(meta.commit_count, 4);
        assert_eq!(meta.deploy_count, 1);
    }

    #[test]
    fn commits_deserialize_with_optional_author() {
        let commits: Vec<Commit> = serde_json::from_str(
            r#"[{"id":"a1b2c3","message":"Fix crash on launch\n\nDetails",
                 "dateCreated":"2021-05-20T08:00:00Z",
                 "author":{"name":"Jo Doe","email":"jo@example.com","id":"1"}},
                {"id":"d4e5f6"}]"#,
        )
        .unwrap();
        assert_eq!(commits.len(), 2);
        assert_eq!(
            commits[0].author.as_ref().and_then(|a| a.name.as_deref()),
            Some("Jo Doe")
        );
        assert_eq!(commits[0].summary(), "Fix crash on launch");
        assert_eq!(commits[1].author, None);
        assert_eq!(commits[1].summary(), "");
    }

    #[test]
    fn issue_counts_deserialize_by_query() {
        let counts: BTreeMap<String, u64> =
            serde_json::from_str(r#"{"is:resolved release:\"1.0\"": 3}"#).unwrap();
        assert_eq!(counts.get("is:resolved release:\"1.0\""), Some(&3));
    }

    #[test]
    fn issue_count_pairs_scope_project_and_window() {
        let selection = DateSelection::Period("14d".parse().unwrap());
        let queries = ["is:resolved release:\"1.0\"".to_string()];
        assert_eq!(
            issue_count_pairs(&queries, Some(7), &selection),
            vec![
                ("query", "is:resolved release:\"1.0\"".to_string()),
                ("project", "7".to_string()),
                ("statsPeriod", "14d".to_string()),
            ]
        );
        assert_eq!(issue_count_pairs(&[], None, &selection).len(), 1);
    }
}
