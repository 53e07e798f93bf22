//! Core type definitions for the sessions API.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// Unknown session field.
    #[error("invalid session field: {value}")]
    InvalidField { value: String },

    /// Unknown session status.
    #[error("invalid session status: {value}")]
    InvalidStatus { value: String },

    /// Unknown group-by dimension.
    #[error("invalid group-by dimension: {value}")]
    InvalidGroupBy { value: String },

    /// Unknown display option.
    #[error("invalid display option: {value}")]
    InvalidDisplay { value: String },

    /// Stats period did not match `<n><unit>`.
    #[error("invalid stats period: {value} (expected e.g. 24h, 14d)")]
    InvalidStatsPeriod { value: String },
}

/// Generates a validated string ID newtype with common trait implementations.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident, $field_name:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new ID after validation.
            pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
                let id = id.into();
                if id.trim().is_empty() {
                    return Err(ValidationError::Empty { field: $field_name });
                }
                Ok(Self(id))
            }

            /// Returns the ID as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::str::FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }
    };
}

define_string_id!(
    /// A release version string (e.g. `backend@1.2.3+abc`).
    ///
    /// Versions are opaque to the client; only emptiness is rejected.
    ReleaseVersion, "release version"
);

define_string_id!(
    /// An organization slug as used in API paths.
    OrganizationSlug, "organization slug"
);

/// Unit of the values reported for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldUnit {
    Count,
    DurationMs,
}

/// Metric requested from the sessions API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SessionField {
    #[serde(rename = "sum(session)")]
    Sessions,
    #[serde(rename = "count_unique(user)")]
    Users,
    #[serde(rename = "p50(session.duration)")]
    DurationP50,
}

impl SessionField {
    /// The literal field name understood by the API.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sessions => "sum(session)",
            Self::Users => "count_unique(user)",
            Self::DurationP50 => "p50(session.duration)",
        }
    }

    #[must_use]
    pub const fn unit(&self) -> FieldUnit {
        match self {
            Self::Sessions | Self::Users => FieldUnit::Count,
            Self::DurationP50 => FieldUnit::DurationMs,
        }
    }
}

impl fmt::Display for SessionField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SessionField {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sum(session)" => Ok(Self::Sessions),
            "count_unique(user)" => Ok(Self::Users),
            "p50(session.duration)" => Ok(Self::DurationP50),
            _ => Err(ValidationError::InvalidField {
                value: s.to_string(),
            }),
        }
    }
}

/// Outcome of a session, as reported in the `session.status` dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Healthy,
    Errored,
    Abnormal,
    Crashed,
}

impl SessionStatus {
    pub const ALL: [Self; 4] = [Self::Healthy, Self::Errored, Self::Abnormal, Self::Crashed];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Errored => "errored",
            Self::Abnormal => "abnormal",
            Self::Crashed => "crashed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "healthy" => Ok(Self::Healthy),
            "errored" => Ok(Self::Errored),
            "abnormal" => Ok(Self::Abnormal),
            "crashed" => Ok(Self::Crashed),
            _ => Err(ValidationError::InvalidStatus {
                value: s.to_string(),
            }),
        }
    }
}

/// Dimension the sessions API can group by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupBy {
    #[serde(rename = "project")]
    Project,
    #[serde(rename = "release")]
    Release,
    #[serde(rename = "environment")]
    Environment,
    #[serde(rename = "session.status")]
    SessionStatus,
}

impl GroupBy {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Release => "release",
            Self::Environment => "environment",
            Self::SessionStatus => "session.status",
        }
    }
}

impl fmt::Display for GroupBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for GroupBy {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "project" => Ok(Self::Project),
            "release" => Ok(Self::Release),
            "environment" => Ok(Self::Environment),
            "session.status" => Ok(Self::SessionStatus),
            _ => Err(ValidationError::InvalidGroupBy {
                value: s.to_string(),
            }),
        }
    }
}

/// Whether health numbers are shown per session or per user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayOption {
    #[default]
    Sessions,
    Users,
}

impl DisplayOption {
    /// The count field backing this display option.
    #[must_use]
    pub const fn field(self) -> SessionField {
        match self {
            Self::Sessions => SessionField::Sessions,
            Self::Users => SessionField::Users,
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sessions => "sessions",
            Self::Users => "users",
        }
    }
}

impl std::str::FromStr for DisplayOption {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sessions" => Ok(Self::Sessions),
            "users" => Ok(Self::Users),
            _ => Err(ValidationError::InvalidDisplay {
                value: s.to_string(),
            }),
        }
    }
}

/// One group of a sessions API response.
///
/// `by` holds the group-by dimension values; project ids arrive as numbers,
/// everything else as strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionGroup {
    #[serde(default)]
    pub by: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub series: BTreeMap<String, Vec<Option<f64>>>,
    #[serde(default)]
    pub totals: BTreeMap<String, Option<f64>>,
}

impl SessionGroup {
    /// Returns the group-by value for `dimension` rendered as a string.
    pub fn by_value(&self, dimension: GroupBy) -> Option<String> {
        match self.by.get(dimension.as_str())? {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Returns the session status of this group, if grouped by status.
    pub fn status(&self) -> Option<SessionStatus> {
        self.by_value(GroupBy::SessionStatus)?.parse().ok()
    }

    /// Returns `true` if this group's `dimension` equals `value`.
    pub fn is(&self, dimension: GroupBy, value: &str) -> bool {
        self.by_value(dimension).is_some_and(|v| v == value)
    }

    /// Value of `field` at interval `index`, `None` when absent or null.
    pub fn value_at(&self, field: SessionField, index: usize) -> Option<f64> {
        self.series
            .get(field.as_str())
            .and_then(|values| values.get(index).copied().flatten())
    }

    /// Total of `field` across the whole response window.
    pub fn total(&self, field: SessionField) -> Option<f64> {
        self.totals.get(field.as_str()).copied().flatten()
    }

    /// The full series of `field`, empty when absent.
    pub fn series_of(&self, field: SessionField) -> &[Option<f64>] {
        self.series.get(field.as_str()).map_or(&[], Vec::as_slice)
    }
}

/// Response body of `GET /organizations/{org}/sessions/`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionApiResponse {
    #[serde(default)]
    pub intervals: Vec<String>,
    #[serde(default)]
    pub groups: Vec<SessionGroup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_version_rejects_empty() {
        assert!(ReleaseVersion::new("").is_err());
        assert!(ReleaseVersion::new("  ").is_err());
        assert!(ReleaseVersion::new("backend@1.0.0").is_ok());
    }

    #[test]
    fn release_version_serde_rejects_empty() {
        let result: Result<ReleaseVersion, _> = serde_json::from_str("\"\"");
        assert!(result.is_err());
    }

    #[test]
    fn organization_slug_as_ref() {
        let slug = OrganizationSlug::new("acme").unwrap();
        let s: &str = slug.as_ref();
        assert_eq!(s, "acme");
    }

    #[test]
    fn session_field_serializes_to_api_names() {
        assert_eq!(
            serde_json::to_string(&SessionField::Sessions).unwrap(),
            "\"sum(session)\""
        );
        assert_eq!(
            "p50(session.duration)".parse::<SessionField>().unwrap(),
            SessionField::DurationP50
        );
        assert_eq!(SessionField::DurationP50.unit(), FieldUnit::DurationMs);
        assert!("avg(session)".parse::<SessionField>().is_err());
    }

    #[test]
    fn display_option_maps_to_field() {
        assert_eq!(DisplayOption::Sessions.field(), SessionField::Sessions);
        assert_eq!(DisplayOption::Users.field(), SessionField::Users);
        assert!("events".parse::<DisplayOption>().is_err());
    }

    #[test]
    fn group_by_value_renders_numbers_and_strings() {
        let group: SessionGroup = serde_json::from_str(
            r#"{"by":{"project":42,"release":"1.0","session.status":"crashed"},
                "series":{"sum(session)":[1,null,3]},
                "totals":{"sum(session)":4}}"#,
        )
        .unwrap();
        assert_eq!(group.by_value(GroupBy::Project).as_deref(), Some("42"));
        assert_eq!(group.by_value(GroupBy::Release).as_deref(), Some("1.0"));
        assert_eq!(group.by_value(GroupBy::Environment), None);
        assert_eq!(group.status(), Some(SessionStatus::Crashed));
        assert!(group.is(GroupBy::Project, "42"));
    }

    #[test]
    fn group_value_at_handles_nulls_and_missing() {
        let group: SessionGroup = serde_json::from_str(
            r#"{"by":{},"series":{"sum(session)":[1,null]},"totals":{"sum(session)":1}}"#,
        )
        .unwrap();
        assert_eq!(group.value_at(SessionField::Sessions, 0), Some(1.0));
        assert_eq!(group.value_at(SessionField::Sessions, 1), None);
        assert_eq!(group.value_at(SessionField::Sessions, 5), None);
        assert_eq!(group.value_at(SessionField::Users, 0), None);
        assert_eq!(group.total(SessionField::Sessions), Some(1.0));
        assert!(group.series_of(SessionField::Users).is_empty());
    }

    #[test]
    fn response_tolerates_extra_keys() {
        let response: SessionApiResponse = serde_json::from_str(
            r#"{"start":"2021-01-01T00:00:00Z","end":"2021-01-02T00:00:00Z",
                "intervals":["2021-01-01T00:00:00Z"],"groups":[],"query":""}"#,
        )
        .unwrap();
        assert_eq!(response.intervals.len(), 1);
        assert!(response.groups.is_empty());
    }
}
