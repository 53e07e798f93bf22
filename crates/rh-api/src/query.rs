//! Sessions API query construction.

use rh_core::{DateSelection, GroupBy, ReleaseVersion, SessionField};

/// Parameters of a `GET /organizations/{org}/sessions/` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionsQuery {
    pub fields: Vec<SessionField>,
    pub group_by: Vec<GroupBy>,
    pub projects: Vec<u64>,
    pub environments: Vec<String>,
    pub interval: String,
    pub selection: DateSelection,
    pub query: Option<String>,
}

impl SessionsQuery {
    /// Creates a query for `fields` over `selection` with daily buckets.
    pub fn new(fields: impl Into<Vec<SessionField>>, selection: DateSelection) -> Self {
        Self {
            fields: fields.into(),
            group_by: Vec::new(),
            projects: Vec::new(),
            environments: Vec::new(),
            interval: "1d".to_string(),
            selection,
            query: None,
        }
    }

    #[must_use]
    pub fn group_by(mut self, group_by: impl Into<Vec<GroupBy>>) -> Self {
        self.group_by = group_by.into();
        self
    }

    #[must_use]
    pub fn projects(mut self, projects: impl Into<Vec<u64>>) -> Self {
        self.projects = projects.into();
        self
    }

    #[must_use]
    pub fn environments(mut self, environments: impl Into<Vec<String>>) -> Self {
        self.environments = environments.into();
        self
    }

    #[must_use]
    pub fn interval(mut self, interval: impl Into<String>) -> Self {
        self.interval = interval.into();
        self
    }

    #[must_use]
    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Flattens the query into URL parameters. List parameters repeat.
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        pairs.extend(self.fields.iter().map(|f| ("field", f.as_str().to_string())));
        pairs.extend(self.group_by.iter().map(|g| ("groupBy", g.as_str().to_string())));
        pairs.extend(self.projects.iter().map(|p| ("project", p.to_string())));
        pairs.extend(self.environments.iter().map(|e| ("environment", e.clone())));
        pairs.push(("interval", self.interval.clone()));
        pairs.extend(self.selection.query_pairs());
        if let Some(query) = &self.query {
            pairs.push(("query", query.clone()));
        }
        pairs
    }
}

fn quote(version: &ReleaseVersion) -> String {
    format!("\"{}\"", version.as_str().replace('"', "\\\""))
}

/// Search query matching a single release.
pub fn release_query(version: &ReleaseVersion) -> String {
    format!("release:{}", quote(version))
}

/// Search query matching every release except `version`.
pub fn other_releases_query(version: &ReleaseVersion) -> String {
    format!("!release:{}", quote(version))
}

/// Issue search query for issues resolved in `version`.
pub fn resolved_in_release_query(version: &ReleaseVersion) -> String {
    format!("is:resolved {}", release_query(version))
}

/// Search query matching any of `versions`.
pub fn releases_query(versions: &[ReleaseVersion]) -> String {
    versions
        .iter()
        .map(release_query)
        .collect::<Vec<_>>()
        .join(" OR ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(v: &str) -> ReleaseVersion {
        ReleaseVersion::new(v).unwrap()
    }

    #[test]
    fn to_query_pairs_repeats_lists() {
        let query = SessionsQuery::new(
            [SessionField::Sessions, SessionField::Users],
            DateSelection::Period("24h".parse().unwrap()),
        )
        .group_by([GroupBy::Project, GroupBy::SessionStatus])
        .projects([7_u64])
        .environments(vec!["prod".to_string()])
        .interval("1h")
        .query("release:\"1.0\"");

        assert_eq!(
            query.to_query_pairs(),
            vec![
                ("field", "sum(session)".to_string()),
                ("field", "count_unique(user)".to_string()),
                ("groupBy", "project".to_string()),
                ("groupBy", "session.status".to_string()),
                ("project", "7".to_string()),
                ("environment", "prod".to_string()),
                ("interval", "1h".to_string()),
                ("statsPeriod", "24h".to_string()),
                ("query", "release:\"1.0\"".to_string()),
            ]
        );
    }

    #[test]
    fn release_queries_quote_versions() {
        assert_eq!(release_query(&version("app@1.0")), "release:\"app@1.0\"");
        assert_eq!(other_releases_query(&version("1.0")), "!release:\"1.0\"");
        assert_eq!(release_query(&version("a\"b")), "release:\"a\\\"b\"");
        assert_eq!(
            releases_query(&[version("1.0"), version("2.0")]),
            "release:\"1.0\" OR release:\"2.0\""
        );
        assert_eq!(releases_query(&[]), "");
        assert_eq!(
            resolved_in_release_query(&version("1.0")),
            "is:resolved release:\"1.0\""
        );
    }
}
