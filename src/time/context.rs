//! Time context resolution
//!
//! Turns a caller-supplied time range plus the target's rounding and
//! interval settings into the epoch-second values substituted into SQL.

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

use crate::query::{QueryError, QueryResult};
use crate::time::datemath::DateResolver;
use crate::time::interval::convert_interval;

/// Literal upper bound that makes the time filter one-sided
pub const NOW: &str = "now";

/// One bound of a time range
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateInput {
    /// Already resolved instant
    Instant(DateTime<Utc>),
    /// Relative or absolute expression resolved through a [`DateResolver`]
    Expr(String),
}

impl DateInput {
    /// Resolve to an instant, rounding any `/unit` upwards
    pub fn resolve(&self, dates: &dyn DateResolver) -> QueryResult<DateTime<Utc>> {
        match self {
            Self::Instant(instant) => Ok(*instant),
            Self::Expr(text) => dates.parse(text, true),
        }
    }
}

impl From<DateTime<Utc>> for DateInput {
    fn from(instant: DateTime<Utc>) -> Self {
        Self::Instant(instant)
    }
}

impl From<&str> for DateInput {
    fn from(text: &str) -> Self {
        Self::Expr(text.to_string())
    }
}

/// Dashboard time range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeRange {
    pub from: DateInput,
    pub to: DateInput,
    /// The raw upper bound was the literal `now`
    pub to_is_now: bool,
}

impl TimeRange {
    /// Create a range from resolved or unresolved bounds
    pub fn new(from: impl Into<DateInput>, to: impl Into<DateInput>, to_is_now: bool) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            to_is_now,
        }
    }

    /// Create a range from raw expressions such as `now-6h` .. `now`
    pub fn from_raw(from: &str, to: &str) -> Self {
        Self::new(from, to, to.trim() == NOW)
    }
}

/// Resolved time values for one compilation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeContext {
    /// Lower bound, epoch seconds
    pub from: i64,
    /// Upper bound, epoch seconds
    pub to: i64,
    /// Bucket width, seconds
    pub interval: i64,
    pub to_is_now: bool,
}

impl TimeContext {
    /// Resolve a range, rounding only its lower bound
    pub fn resolve(
        range: &TimeRange,
        round_interval: Option<&str>,
        interval: &str,
        interval_factor: u32,
        dates: &dyn DateResolver,
    ) -> QueryResult<Self> {
        let from = convert_timestamp(&round(&range.from, round_interval, dates)?, dates)?;
        let to = convert_timestamp(&range.to, dates)?;
        let interval = convert_interval(interval, interval_factor)?;

        tracing::debug!(from, to, interval, to_is_now = range.to_is_now, "Resolved time context");

        Ok(Self {
            from,
            to,
            interval,
            to_is_now: range.to_is_now,
        })
    }
}

/// Epoch seconds of `date`, rounded up from its millisecond value
pub fn convert_timestamp(date: &DateInput, dates: &dyn DateResolver) -> QueryResult<i64> {
    let millis = date.resolve(dates)?.timestamp_millis();
    let ceil = if millis.rem_euclid(1000) > 0 { 1 } else { 0 };
    Ok(millis.div_euclid(1000) + ceil)
}

/// Floor `date` to a multiple of `round_interval`.
///
/// An unset, empty or `0s` interval leaves the date untouched.
pub fn round(
    date: &DateInput,
    round_interval: Option<&str>,
    dates: &dyn DateResolver,
) -> QueryResult<DateInput> {
    let round_interval = match round_interval {
        None | Some("") | Some("0s") => return Ok(date.clone()),
        Some(round_interval) => round_interval,
    };

    let millis = date.resolve(dates)?.timestamp_millis();
    let coeff = convert_interval(round_interval, 1)?
        .checked_mul(1000)
        .ok_or_else(|| QueryError::InvalidDuration(round_interval.to_string()))?;
    let rounded = millis.div_euclid(coeff) * coeff;

    Utc.timestamp_millis_opt(rounded)
        .single()
        .map(DateInput::Instant)
        .ok_or_else(|| QueryError::InvalidDate(rounded.to_string()))
}
