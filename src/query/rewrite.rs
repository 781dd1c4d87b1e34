//! Macro rewrite rules
//!
//! Each rule turns a detected macro call into nested SELECT statements.
//! The output still contains placeholders (`$timeSeries`, `$timeFilter`,
//! `$table`) for the renderer to resolve.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::query::ast::MacroCall;
use crate::query::error::{QueryError, QueryResult};
use crate::query::scanner::Keyword;

/// Aggregation used by `$event` when none is given
pub const DEFAULT_EVENT_AGGREGATION: &str = "count()";

static EVENT_COLUMN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"__\w+").expect("event column pattern"));

/// Rewrite a detected macro call.
///
/// Returns `None` when there is nothing to expand. `resolve_event`
/// substitutes template variables in an `$event` name.
pub fn expand<F>(call: &MacroCall, resolve_event: F) -> QueryResult<Option<String>>
where
    F: FnOnce(&str) -> String,
{
    let query = match call {
        MacroCall::None => return Ok(None),
        MacroCall::Columns { key, value, from } => columns(key, value, from)?,
        MacroCall::RateColumns { key, value, from } => rate_columns(key, value, from)?,
        MacroCall::Rate { args, from } => rate(args, from)?,
        MacroCall::Event { event: name, aggregation } => {
            event(&resolve_event(name), aggregation.as_deref())
        }
    };
    Ok(Some(query))
}

/// Pivot key/value pairs into `groupArr`, one array per time bucket.
///
/// A trailing HAVING clause moves into the inner aggregation.
pub fn columns(key: &str, value: &str, from: &str) -> QueryResult<String> {
    let key_alias = alias(key)?;
    let value_alias = alias(value)?;

    let (from, having) = match Keyword::Having.find(from) {
        Some(range) => (&from[..range.start], format!(" {}", from[range.start..].trim())),
        None => (from, String::new()),
    };
    let from = apply_time_filter(from);

    Ok(format!(
        "SELECT t, groupArray(({key_alias}, {value_alias})) AS groupArr \
         FROM (SELECT $timeSeries AS t, {key}, {value} {from} \
         GROUP BY t, {key_alias}{having} ORDER BY t) \
         GROUP BY t ORDER BY t"
    ))
}

/// `$columns` pivot with each value divided by the seconds between buckets
pub fn rate_columns(key: &str, value: &str, from: &str) -> QueryResult<String> {
    Ok(format!(
        "SELECT t, arrayMap(a -> (a.1, a.2 / runningDifference(t/1000)), groupArr) FROM ({})",
        columns(key, value, from)?
    ))
}

/// Per-second rate of every aliased argument, named `<alias>Rate`
pub fn rate(args: &[String], from: &str) -> QueryResult<String> {
    if args.is_empty() {
        return Err(QueryError::EmptyArguments {
            name: "$rate",
            args: Vec::new(),
        });
    }

    let rate_columns = args
        .iter()
        .map(|arg| alias(arg).map(|a| format!("{a} / runningDifference(t/1000) AS {a}Rate")))
        .collect::<QueryResult<Vec<_>>>()?
        .join(", ");

    Ok(format!(
        "SELECT t, {rate_columns} \
         FROM (SELECT $timeSeries AS t, {args} {from} GROUP BY t ORDER BY t)",
        args = args.join(", "),
        from = apply_time_filter(from),
    ))
}

/// Aggregate one event type per time bucket.
///
/// `__name` columns in the aggregation are prefixed with the event name,
/// so `avg(__duration)` for `login` reads `login__duration`.
pub fn event(event: &str, aggregation: Option<&str>) -> String {
    let aggregation = EVENT_COLUMN.replace_all(
        aggregation.unwrap_or(DEFAULT_EVENT_AGGREGATION),
        |caps: &Captures| format!("{}{}", event, &caps[0]),
    );

    format!(
        "SELECT $timeSeries AS t, {aggregation} AS {event} \
         FROM $table WHERE $timeFilter AND event = '{event}' \
         GROUP BY t ORDER BY t"
    )
}

/// Add `$timeFilter` to the first WHERE clause, or append one
pub fn apply_time_filter(query: &str) -> String {
    let query = query.trim_end();
    match Keyword::Where.find(query) {
        Some(range) => format!(
            "{}WHERE $timeFilter AND {}",
            &query[..range.start],
            query[range.end..].trim_start()
        ),
        None => format!("{} WHERE $timeFilter", query),
    }
}

/// Trailing identifier of an aliased expression
fn alias(arg: &str) -> QueryResult<&str> {
    let arg = arg.trim();
    if arg.ends_with(')') {
        return Err(QueryError::MissingAlias(arg.to_string()));
    }
    arg.split_whitespace()
        .next_back()
        .ok_or_else(|| QueryError::MissingAlias(arg.to_string()))
}
