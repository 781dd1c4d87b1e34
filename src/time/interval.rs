//! Duration strings
//!
//! Parses bucket and rounding durations such as `10m`, `1h` or `200ms`.

use std::sync::LazyLock;

use regex::Regex;

use crate::query::{QueryError, QueryResult};

/// Longer spellings first so `month` and `ms` win over `m`
static DURATION_SPLIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+)(month|year|ms|s|m|h|d|w|M|y)").expect("duration pattern")
});

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Unit of an [`Interval`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalUnit {
    Millisecond,
    Second,
    Minute,
    Hour,
    Day,
    Week,
    /// Average Gregorian month (30.436875 days)
    Month,
    /// Average Gregorian year (365.2425 days)
    Year,
}

impl IntervalUnit {
    /// Length of one unit in seconds
    pub fn as_seconds(&self) -> f64 {
        match self {
            Self::Millisecond => 0.001,
            Self::Second => 1.0,
            Self::Minute => 60.0,
            Self::Hour => 3_600.0,
            Self::Day => SECONDS_PER_DAY,
            Self::Week => 7.0 * SECONDS_PER_DAY,
            Self::Month => 30.436_875 * SECONDS_PER_DAY,
            Self::Year => 365.242_5 * SECONDS_PER_DAY,
        }
    }
}

/// A duration in `<integer><unit>` form
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub magnitude: u64,
    pub unit: IntervalUnit,
}

impl Interval {
    /// Parse the first `<integer><unit>` found in `input`, e.g. `>10s`
    pub fn parse(input: &str) -> QueryResult<Self> {
        let invalid = || QueryError::InvalidDuration(input.to_string());
        let caps = DURATION_SPLIT.captures(input).ok_or_else(invalid)?;

        let magnitude = caps[1].parse::<u64>().map_err(|_| invalid())?;
        let unit = match &caps[2] {
            "ms" => IntervalUnit::Millisecond,
            "s" => IntervalUnit::Second,
            "m" => IntervalUnit::Minute,
            "h" => IntervalUnit::Hour,
            "d" => IntervalUnit::Day,
            "w" => IntervalUnit::Week,
            "M" | "month" => IntervalUnit::Month,
            "y" | "year" => IntervalUnit::Year,
            _ => return Err(invalid()),
        };
        Ok(Self { magnitude, unit })
    }

    /// Length in (possibly fractional) seconds
    pub fn as_seconds(&self) -> f64 {
        self.magnitude as f64 * self.unit.as_seconds()
    }
}

impl std::str::FromStr for Interval {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Convert a duration string to whole seconds, scaled by `factor`.
///
/// Durations shorter than one second count as one second before scaling.
/// The scaled value is rounded up.
pub fn convert_interval(interval: &str, factor: u32) -> QueryResult<i64> {
    let mut seconds = Interval::parse(interval)?.as_seconds();
    if seconds < 1.0 {
        seconds = 1.0;
    }

    let scaled = (seconds * f64::from(factor)).ceil();
    if !scaled.is_finite() || scaled >= i64::MAX as f64 {
        return Err(QueryError::InvalidDuration(interval.to_string()));
    }
    Ok(scaled as i64)
}
