//! Time windows for session queries.

use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::types::ValidationError;

/// Pre-compiled regex for relative stats periods (`24h`, `14d`, `90m`).
static STATS_PERIOD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)([smhdw])$").unwrap());

/// Longest window a [`StatsPeriod`] may parse to.
pub const MAX_STATS_PERIOD_DAYS: i64 = 3650;

/// Unit of a [`StatsPeriod`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeriodUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
}

impl PeriodUnit {
    const fn suffix(self) -> char {
        match self {
            Self::Seconds => 's',
            Self::Minutes => 'm',
            Self::Hours => 'h',
            Self::Days => 'd',
            Self::Weeks => 'w',
        }
    }
}

/// A relative window ending now, such as `24h` or `14d`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StatsPeriod {
    amount: u32,
    unit: PeriodUnit,
}

impl StatsPeriod {
    pub const fn new(amount: u32, unit: PeriodUnit) -> Self {
        Self { amount, unit }
    }

    pub const fn amount(self) -> u32 {
        self.amount
    }

    pub const fn unit(self) -> PeriodUnit {
        self.unit
    }

    /// Length of the window.
    pub fn duration(self) -> TimeDelta {
        let amount = i64::from(self.amount);
        match self.unit {
            PeriodUnit::Seconds => TimeDelta::seconds(amount),
            PeriodUnit::Minutes => TimeDelta::minutes(amount),
            PeriodUnit::Hours => TimeDelta::hours(amount),
            PeriodUnit::Days => TimeDelta::days(amount),
            PeriodUnit::Weeks => TimeDelta::weeks(amount),
        }
    }
}

impl fmt::Display for StatsPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.unit.suffix())
    }
}

impl std::str::FromStr for StatsPeriod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidStatsPeriod {
            value: s.to_string(),
        };
        let caps = STATS_PERIOD_RE.captures(s.trim()).ok_or_else(invalid)?;
        let amount: u32 = caps[1].parse().map_err(|_| invalid())?;
        if amount == 0 {
            return Err(invalid());
        }
        let unit = match &caps[2] {
            "s" => PeriodUnit::Seconds,
            "m" => PeriodUnit::Minutes,
            "h" => PeriodUnit::Hours,
            "d" => PeriodUnit::Days,
            "w" => PeriodUnit::Weeks,
            _ => return Err(invalid()),
        };
        let period = Self { amount, unit };
        if period.duration() > TimeDelta::days(MAX_STATS_PERIOD_DAYS) {
            return Err(invalid());
        }
        Ok(period)
    }
}

impl TryFrom<String> for StatsPeriod {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<StatsPeriod> for String {
    fn from(period: StatsPeriod) -> Self {
        period.to_string()
    }
}

/// The time window a query covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DateSelection {
    /// Relative window ending now.
    Period(StatsPeriod),
    /// Fixed window.
    Absolute {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl Default for DateSelection {
    fn default() -> Self {
        Self::Period(StatsPeriod::new(14, PeriodUnit::Days))
    }
}

impl DateSelection {
    /// Resolves the selection to concrete bounds.
    ///
    /// A window reaching past the representable range starts at the earliest
    /// representable instant.
    pub fn window(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        match *self {
            Self::Period(period) => {
                let start = now
                    .checked_sub_signed(period.duration())
                    .unwrap_or(DateTime::<Utc>::MIN_UTC);
                (start, now)
            }
            Self::Absolute { start, end } => (start, end),
        }
    }

    /// Query parameters selecting this window.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::Period(period) => vec![("statsPeriod", period.to_string())],
            Self::Absolute { start, end } => vec![
                ("start", start.to_rfc3339_opts(SecondsFormat::Secs, true)),
                ("end", end.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ],
        }
    }
}

/// Window used for the compact per-release health columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum HealthStatsPeriod {
    #[default]
    #[serde(rename = "24h")]
    Day,
    #[serde(rename = "14d")]
    TwoWeeks,
}

impl HealthStatsPeriod {
    pub const fn stats_period(self) -> StatsPeriod {
        match self {
            Self::Day => StatsPeriod::new(24, PeriodUnit::Hours),
            Self::TwoWeeks => StatsPeriod::new(14, PeriodUnit::Days),
        }
    }

    /// Bucket width used for this window.
    pub const fn interval(self) -> &'static str {
        match self {
            Self::Day => "1h",
            Self::TwoWeeks => "1d",
        }
    }
}

impl std::str::FromStr for HealthStatsPeriod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "24h" => Ok(Self::Day),
            "14d" => Ok(Self::TwoWeeks),
            _ => Err(ValidationError::InvalidStatsPeriod {
                value: s.to_string(),
            }),
        }
    }
}

/// Picks the bucket width for a sessions query over `selection`.
///
/// Sub-hour buckets are only available for the last 30 days.
pub fn sessions_interval(selection: &DateSelection, now: DateTime<Utc>) -> &'static str {
    let (start, end) = selection.window(now);
    let span = end - start;
    if span > TimeDelta::days(14) {
        "1d"
    } else if span > TimeDelta::hours(24) || start <= now - TimeDelta::days(30) {
        "1h"
    } else if span > TimeDelta::hours(6) {
        "15m"
    } else if span > TimeDelta::hours(1) {
        "5m"
    } else {
        "1m"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn stats_period_parses_and_displays() {
        let period: StatsPeriod = "24h".parse().unwrap();
        assert_eq!(period, StatsPeriod::new(24, PeriodUnit::Hours));
        assert_eq!(period.to_string(), "24h");
        assert_eq!(period.duration(), TimeDelta::hours(24));
        assert_eq!("2w".parse::<StatsPeriod>().unwrap().duration(), TimeDelta::days(14));
    }

    #[test]
    fn stats_period_rejects_garbage() {
        for input in ["", "h", "24", "0d", "14y", "1.5h", "-1d"] {
            assert!(input.parse::<StatsPeriod>().is_err(), "accepted {input:?}");
        }
    }

    #[test]
    fn stats_period_rejects_windows_beyond_maximum() {
        for input in ["4294967295w", "100000000d", "3651d", "522w"] {
            assert!(input.parse::<StatsPeriod>().is_err(), "accepted {input:?}");
        }
        let longest: StatsPeriod = "3650d".parse().unwrap();
        assert_eq!(sessions_interval(&DateSelection::Period(longest), now()), "1d");
    }

    #[test]
    fn window_saturates_for_unrepresentable_periods() {
        let selection = DateSelection::Period(StatsPeriod::new(u32::MAX, PeriodUnit::Weeks));
        let (start, end) = selection.window(now());
        assert_eq!(start, DateTime::<Utc>::MIN_UTC);
        assert_eq!(end, now());
        assert_eq!(sessions_interval(&selection, now()), "1d");
    }

    #[test]
    fn stats_period_serde_uses_string_form() {
        let json = serde_json::to_string(&StatsPeriod::new(14, PeriodUnit::Days)).unwrap();
        assert_eq!(json, "\"14d\"");
        let parsed: StatsPeriod = serde_json::from_str("\"90m\"").unwrap();
        assert_eq!(parsed, StatsPeriod::new(90, PeriodUnit::Minutes));
    }

    #[test]
    fn date_selection_query_pairs() {
        let relative = DateSelection::Period(StatsPeriod::new(24, PeriodUnit::Hours));
        assert_eq!(relative.query_pairs(), vec![("statsPeriod", "24h".to_string())]);

        let absolute = DateSelection::Absolute {
            start: Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2021, 1, 2, 0, 0, 0).unwrap(),
        };
        assert_eq!(
            absolute.query_pairs(),
            vec![
                ("start", "2021-01-01T00:00:00Z".to_string()),
                ("end", "2021-01-02T00:00:00Z".to_string()),
            ]
        );
    }

    #[test]
    fn sessions_interval_scales_with_window() {
        let period = |s: &str| DateSelection::Period(s.parse().unwrap());
        assert_eq!(sessions_interval(&period("90d"), now()), "1d");
        assert_eq!(sessions_interval(&period("14d"), now()), "1h");
        assert_eq!(sessions_interval(&period("24h"), now()), "15m");
        assert_eq!(sessions_interval(&period("6h"), now()), "5m");
        assert_eq!(sessions_interval(&period("30m"), now()), "1m");
    }

    #[test]
    fn sessions_interval_avoids_fine_buckets_for_old_windows() {
        let start = now() - TimeDelta::days(40);
        let selection = DateSelection::Absolute {
            start,
            end: start + TimeDelta::hours(2),
        };
        assert_eq!(sessions_interval(&selection, now()), "1h");
    }

    #[test]
    fn health_stats_period_intervals() {
        assert_eq!(HealthStatsPeriod::Day.stats_period().to_string(), "24h");
        assert_eq!(HealthStatsPeriod::Day.interval(), "1h");
        assert_eq!(HealthStatsPeriod::TwoWeeks.interval(), "1d");
        assert_eq!("14d".parse::<HealthStatsPeriod>().unwrap(), HealthStatsPeriod::TwoWeeks);
    }
}
