//! Percentages, crash-free rates and their display rounding.
//!
//! High precision only matters close to 100%: rates above
//! [`CRASH_FREE_DECIMAL_THRESHOLD`] keep [`CRASH_FREE_DECIMAL_PLACES`]
//! decimals, everything else is rounded to whole percent.

/// Rates above this keep decimal places.
pub const CRASH_FREE_DECIMAL_THRESHOLD: f64 = 95.0;

/// Decimal places kept for rates above the threshold.
pub const CRASH_FREE_DECIMAL_PLACES: u32 = 3;

/// Placeholder rendered when a rate cannot be computed.
pub const NO_DATA: &str = "\u{2014}";

/// Returns `numerator / denominator * 100`, or 0 when the denominator is 0.
pub fn percent(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        return 0.0;
    }
    numerator / denominator * 100.0
}

/// Largest precision [`round`] honors; finer requests are clamped to it.
pub const MAX_ROUND_DECIMALS: u32 = 292;

/// Rounds `value` to `decimals` places.
///
/// Shifts the decimal exponent through the shortest textual representation
/// instead of multiplying, so `round(1.005, 2)` is `1.01`. Halves round
/// toward positive infinity. Non-finite values are returned unchanged, and
/// `decimals` is clamped to [`MAX_ROUND_DECIMALS`].
pub fn round(value: f64, decimals: u32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let exponent = i32::try_from(decimals.min(MAX_ROUND_DECIMALS)).unwrap_or(0);
    let shifted = shift_exponent(value, exponent);
    if !shifted.is_finite() {
        return value;
    }
    let rounded = (shifted + 0.5).floor();
    shift_exponent(rounded, -exponent)
}

fn shift_exponent(value: f64, exponent: i32) -> f64 {
    format!("{value}e{exponent}").parse().unwrap_or(value)
}

/// Rounds a crash-free percentage with the default threshold and precision.
pub fn crash_free_percent(percent: f64) -> f64 {
    crash_free_percent_with(
        percent,
        CRASH_FREE_DECIMAL_THRESHOLD,
        CRASH_FREE_DECIMAL_PLACES,
    )
}

/// Rounds `percent` to `decimal_places` when above `decimal_threshold`,
/// otherwise to a whole number.
pub fn crash_free_percent_with(percent: f64, decimal_threshold: f64, decimal_places: u32) -> f64 {
    let places = if percent > decimal_threshold {
        decimal_places
    } else {
        0
    };
    round(percent, places)
}

/// Formats a crash-free percentage for display.
///
/// NaN renders as [`NO_DATA`]; nonzero rates below one percent render as
/// `<1%` rather than a misleading `0%`.
pub fn display_crash_free_percent(percent: f64) -> String {
    display_crash_free_percent_with(
        percent,
        CRASH_FREE_DECIMAL_THRESHOLD,
        CRASH_FREE_DECIMAL_PLACES,
    )
}

pub fn display_crash_free_percent_with(
    percent: f64,
    decimal_threshold: f64,
    decimal_places: u32,
) -> String {
    if percent.is_nan() {
        return NO_DATA.to_string();
    }
    if percent > 0.0 && percent < 1.0 {
        return "<1%".to_string();
    }
    let rounded = crash_free_percent_with(percent, decimal_threshold, decimal_places);
    format!("{rounded}%")
}

/// Formats the absolute difference between two crash-free rates.
///
/// The difference keeps decimals only when the reference rate is itself
/// shown with decimals.
pub fn display_crash_free_diff(diff_percent: f64, crash_free_percent: Option<f64>) -> String {
    let places = if crash_free_percent.is_some_and(|p| p > CRASH_FREE_DECIMAL_THRESHOLD) {
        CRASH_FREE_DECIMAL_PLACES
    } else {
        0
    };
    format!("{}%", round(diff_percent.abs(), places))
}

/// Rounds a duration in seconds: whole seconds above a minute, milliseconds
/// below.
pub fn round_duration(seconds: f64) -> f64 {
    round(seconds, if seconds > 60.0 { 0 } else { 3 })
}

/// Formats a count with thousands separators (`12,345`).
#[allow(clippy::cast_possible_truncation)]
pub fn format_count(value: f64) -> String {
    let rounded = round(value, 0) as i64;
    let digits = rounded.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if rounded < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Formats a session duration given in seconds.
///
/// Returns "Ns" below a minute, "Xm Ys" below an hour, "Xh Ym" otherwise.
#[allow(clippy::cast_possible_truncation)]
pub fn format_duration_secs(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return NO_DATA.to_string();
    }
    let rounded = round_duration(seconds);
    if rounded < 60.0 {
        return format!("{rounded}s");
    }
    let total = rounded as i64;
    let (hours, minutes, secs) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours >= 1 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m {secs}s")
    }
}

#[cfg(test)]
#[expect(
    clippy::float_cmp,
    reason = "rounded values are compared exactly on purpose"
)]
mod tests {
    use super::*;

    #[test]
    fn percent_guards_zero_denominator() {
        assert_eq!(percent(5.0, 0.0), 0.0);
        assert_eq!(percent(0.0, 0.0), 0.0);
        assert_eq!(percent(1.0, 4.0), 25.0);
        assert!(percent(7.0, 0.0).is_finite());
    }

    #[test]
    fn round_uses_decimal_exponent_shift() {
        assert_eq!(round(1.005, 2), 1.01);
        assert_eq!(round(4.006, 0), 4.0);
        assert_eq!(round(2.5, 0), 3.0);
        assert_eq!(round(-2.5, 0), -2.0);
        assert_eq!(round(99.12345, 3), 99.123);
        assert!(round(f64::NAN, 2).is_nan());
    }

    #[test]
    fn round_clamps_excessive_precision() {
        assert_eq!(round(99.5, 400), 99.5);
        assert_eq!(round(0.1, u32::MAX), 0.1);
        assert_eq!(round(1e20, MAX_ROUND_DECIMALS), 1e20);
        assert_eq!(crash_free_percent_with(99.5, 95.0, 400), 99.5);
        assert!(crash_free_percent_with(99.5, 95.0, 400).is_finite());
    }

    #[test]
    fn crash_free_percent_rounds_by_threshold() {
        assert_eq!(crash_free_percent(99.12345), 99.123);
        assert_eq!(crash_free_percent(80.4), 80.0);
        assert_eq!(crash_free_percent(95.0), 95.0);
        assert_eq!(crash_free_percent(94.6), 95.0);
        assert_eq!(crash_free_percent(100.0), 100.0);
        assert_eq!(crash_free_percent_with(99.12345, 99.5, 2), 99.0);
        assert_eq!(crash_free_percent_with(99.12345, 90.0, 1), 99.1);
    }

    #[test]
    fn crash_free_percent_is_idempotent() {
        for p in [0.0, 12.5, 50.49, 94.6, 95.0004, 95.5, 99.9996, 99.12345, 100.0] {
            let once = crash_free_percent(p);
            assert_eq!(crash_free_percent(once), once, "not idempotent for {p}");
        }
    }

    #[test]
    fn display_crash_free_percent_formats() {
        assert_eq!(display_crash_free_percent(f64::NAN), "\u{2014}");
        assert_eq!(display_crash_free_percent(0.5), "<1%");
        assert_eq!(display_crash_free_percent(100.0), "100%");
        assert_eq!(display_crash_free_percent(0.0), "0%");
        assert_eq!(display_crash_free_percent(99.12345), "99.123%");
        assert_eq!(display_crash_free_percent(99.5), "99.5%");
        assert_eq!(display_crash_free_percent(42.4), "42%");
    }

    #[test]
    fn display_crash_free_diff_follows_reference_precision() {
        assert_eq!(display_crash_free_diff(-0.12345, Some(99.0)), "0.123%");
        assert_eq!(display_crash_free_diff(3.4, Some(80.0)), "3%");
        assert_eq!(display_crash_free_diff(3.6, None), "4%");
    }

    #[test]
    fn round_duration_splits_at_a_minute() {
        assert_eq!(round_duration(45.0), 45.0);
        assert_eq!(round_duration(45.12345), 45.123);
        assert_eq!(round_duration(60.1234), 60.0);
        assert_eq!(round_duration(125.456), 125.0);
    }

    #[test]
    fn format_count_groups_thousands() {
        assert_eq!(format_count(0.0), "0");
        assert_eq!(format_count(999.0), "999");
        assert_eq!(format_count(1000.0), "1,000");
        assert_eq!(format_count(1_234_567.0), "1,234,567");
        assert_eq!(format_count(-4200.0), "-4,200");
    }

    #[test]
    fn format_duration_secs_renders_units() {
        assert_eq!(format_duration_secs(45.5), "45.5s");
        assert_eq!(format_duration_secs(125.456), "2m 5s");
        assert_eq!(format_duration_secs(3720.0), "1h 2m");
        assert_eq!(format_duration_secs(f64::NAN), "\u{2014}");
    }
}
