//! Placeholder rendering
//!
//! Resolves reserved placeholders in one pass over the template. Values
//! are taken from a fixed symbol table and substituted text is never
//! scanned again, so a value that happens to contain `$to` stays as is.
//!
//! | Placeholder    | Value                                   |
//! |----------------|-----------------------------------------|
//! | `$timeSeries`  | bucket expression in milliseconds       |
//! | `$timeFilter`  | range predicate on both time columns    |
//! | `$table`       | `<database>.<table>`                    |
//! | `$from`, `$to` | range bounds, epoch seconds             |
//! | `$timeCol`     | date column                             |
//! | `$dateTimeCol` | datetime column                         |
//! | `$interval`    | bucket width, seconds                   |
//!
//! Line breaks collapse to a single space in the same pass.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::time::TimeContext;

/// Reserved names, longest alternative first, plus line breaks
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$(?:timeSeries|timeFilter|dateTimeCol|timeCol|table|from|to|interval)|\r\n|\r|\n")
        .expect("placeholder pattern")
});

/// Bucketing expression behind `$timeSeries`
pub const TIME_SERIES: &str = "(intDiv(toUInt32($dateTimeCol), $interval) * $interval) * 1000";

const TIME_FILTER_TO_NOW: &str = "$timeCol >= toDate($from) AND $dateTimeCol >= toDateTime($from)";
const TIME_FILTER_RANGE: &str = "$timeCol BETWEEN toDate($from) AND toDate($to) \
     AND $dateTimeCol BETWEEN toDateTime($from) AND toDateTime($to)";

/// Template of the `$timeFilter` predicate.
///
/// A range ending at `now` only bounds the lower side.
pub fn time_filter(is_to_now: bool) -> &'static str {
    if is_to_now {
        TIME_FILTER_TO_NOW
    } else {
        TIME_FILTER_RANGE
    }
}

/// Fixed symbol table of placeholder values
#[derive(Debug, Clone)]
pub struct Renderer {
    symbols: Vec<(&'static str, String)>,
}

impl Renderer {
    /// Build the table for one compilation
    pub fn new(ctx: &TimeContext, table: &str, date_col: &str, date_time_col: &str) -> Self {
        let mut renderer = Self {
            symbols: vec![
                ("$table", table.to_string()),
                ("$from", ctx.from.to_string()),
                ("$to", ctx.to.to_string()),
                ("$timeCol", date_col.to_string()),
                ("$dateTimeCol", date_time_col.to_string()),
                ("$interval", ctx.interval.to_string()),
            ],
        };

        let time_series = renderer.render(TIME_SERIES);
        let time_filter = renderer.render(time_filter(ctx.to_is_now));
        renderer.symbols.push(("$timeSeries", time_series));
        renderer.symbols.push(("$timeFilter", time_filter));
        renderer
    }

    /// Resolved value of a placeholder such as `$timeFilter`
    pub fn get(&self, name: &str) -> Option<&str> {
        self.symbols
            .iter()
            .find(|(symbol, _)| *symbol == name)
            .map(|(_, value)| value.as_str())
    }

    /// Substitute every placeholder and collapse line breaks
    pub fn render(&self, template: &str) -> String {
        PLACEHOLDER
            .replace_all(template, |caps: &Captures| {
                let matched = &caps[0];
                if matched.starts_with('$') {
                    // Not in the table yet while the derived values are built
                    self.get(matched).unwrap_or(matched).to_string()
                } else {
                    " ".to_string()
                }
            })
            .into_owned()
    }
}
