//! Date expression resolution
//!
//! Resolves the textual bounds of a dashboard time range, relative
//! (`now-6h`, `now/d`) or absolute (`2024-03-01 12:00:00`), into instants.
//!
//! # Supported Syntax
//!
//! ```text
//! now[(+|-)[n]unit]*[/unit]
//! <absolute>[||(+|-)[n]unit ...]
//! unit := s | m | h | d | w | M | y
//! ```

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};
use nom::{
    branch::alt,
    character::complete::{char, digit1, one_of},
    combinator::{all_consuming, map, map_res, opt, value},
    multi::many0,
    sequence::{preceded, tuple},
    IResult,
};

use crate::query::{QueryError, QueryResult};

/// Resolves date expressions into instants.
///
/// `round_up` selects the end rather than the start of a rounded unit,
/// so `now/d` resolves to the last millisecond of today.
pub trait DateResolver {
    fn parse(&self, text: &str, round_up: bool) -> QueryResult<DateTime<Utc>>;
}

/// Calendar unit usable in date math
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateUnit {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DateOp {
    Shift(i64, DateUnit),
    Round(DateUnit),
}

/// Default [`DateResolver`] anchored to a caller-supplied `now`
#[derive(Debug, Clone, Copy)]
pub struct DateMath {
    now: DateTime<Utc>,
}

impl DateMath {
    /// Create a resolver where `now` is the given instant
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now }
    }
}

impl DateResolver for DateMath {
    fn parse(&self, text: &str, round_up: bool) -> QueryResult<DateTime<Utc>> {
        let text = text.trim();
        let invalid = || QueryError::InvalidDate(text.to_string());

        let (anchor, math) = if let Some(rest) = text.strip_prefix("now") {
            (self.now, rest)
        } else {
            match text.split_once("||") {
                Some((absolute, rest)) => (parse_absolute(absolute).ok_or_else(invalid)?, rest),
                None => (parse_absolute(text).ok_or_else(invalid)?, ""),
            }
        };

        let (_, ops) = all_consuming(many0(parse_op))(math).map_err(|_| invalid())?;

        ops.into_iter()
            .try_fold(anchor, |date, op| match op {
                DateOp::Shift(amount, unit) => shift(date, amount, unit),
                DateOp::Round(unit) if round_up => end_of(date, unit),
                DateOp::Round(unit) => start_of(date, unit),
            })
            .ok_or_else(invalid)
    }
}

fn parse_absolute(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();

    if !text.is_empty() && text.chars().all(|c| c.is_ascii_digit()) {
        return Utc.timestamp_millis_opt(text.parse().ok()?).single();
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn parse_op(input: &str) -> IResult<&str, DateOp> {
    alt((
        map(preceded(char('/'), parse_unit), DateOp::Round),
        map(
            tuple((
                one_of("+-"),
                opt(map_res(digit1, |s: &str| s.parse::<i64>())),
                parse_unit,
            )),
            |(sign, amount, unit)| {
                let amount = amount.unwrap_or(1);
                DateOp::Shift(if sign == '-' { -amount } else { amount }, unit)
            },
        ),
    ))(input)
}

fn parse_unit(input: &str) -> IResult<&str, DateUnit> {
    alt((
        value(DateUnit::Second, char('s')),
        value(DateUnit::Minute, char('m')),
        value(DateUnit::Hour, char('h')),
        value(DateUnit::Day, char('d')),
        value(DateUnit::Week, char('w')),
        value(DateUnit::Month, char('M')),
        value(DateUnit::Year, char('y')),
    ))(input)
}

fn shift(date: DateTime<Utc>, amount: i64, unit: DateUnit) -> Option<DateTime<Utc>> {
    let seconds = match unit {
        DateUnit::Second => 1,
        DateUnit::Minute => 60,
        DateUnit::Hour => 3_600,
        DateUnit::Day => 86_400,
        DateUnit::Week => 7 * 86_400,
        DateUnit::Month => return shift_months(date, amount),
        DateUnit::Year => return shift_months(date, amount.checked_mul(12)?),
    };
    date.checked_add_signed(Duration::seconds(amount.checked_mul(seconds)?))
}

fn shift_months(date: DateTime<Utc>, months: i64) -> Option<DateTime<Utc>> {
    let count = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
    if months >= 0 {
        date.checked_add_months(count)
    } else {
        date.checked_sub_months(count)
    }
}

fn start_of(date: DateTime<Utc>, unit: DateUnit) -> Option<DateTime<Utc>> {
    let day = date.date_naive();
    let naive = match unit {
        DateUnit::Second => day.and_hms_opt(date.hour(), date.minute(), date.second())?,
        DateUnit::Minute => day.and_hms_opt(date.hour(), date.minute(), 0)?,
        DateUnit::Hour => day.and_hms_opt(date.hour(), 0, 0)?,
        DateUnit::Day => day.and_hms_opt(0, 0, 0)?,
        DateUnit::Week => {
            let offset = i64::from(day.weekday().num_days_from_monday());
            (day - Duration::days(offset)).and_hms_opt(0, 0, 0)?
        }
        DateUnit::Month => NaiveDate::from_ymd_opt(day.year(), day.month(), 1)?.and_hms_opt(0, 0, 0)?,
        DateUnit::Year => NaiveDate::from_ymd_opt(day.year(), 1, 1)?.and_hms_opt(0, 0, 0)?,
    };
    Some(Utc.from_utc_datetime(&naive))
}

fn end_of(date: DateTime<Utc>, unit: DateUnit) -> Option<DateTime<Utc>> {
    let next = shift(start_of(date, unit)?, 1, unit)?;
    next.checked_sub_signed(Duration::milliseconds(1))
}
