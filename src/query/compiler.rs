//! Query compiler
//!
//! Runs the full pipeline for one query target:
//!
//! ```text
//! template -> macro expansion -> variable substitution -> placeholders -> SQL
//! ```
//!
//! Macro errors are not fatal: the template is used as written and the
//! failure is logged. Invalid durations or dates abort compilation.

use serde::{Deserialize, Serialize};

use crate::query::ast::MacroKind;
use crate::query::error::QueryResult;
use crate::query::render::Renderer;
use crate::query::rewrite;
use crate::query::scanner::Scanner;
use crate::query::template::{interpolate_query_expr, ScopedVars, VariableInterpolator};
use crate::time::{DateResolver, TimeContext, TimeRange};

/// Stored settings of one query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryTarget {
    /// Template text
    #[serde(default)]
    pub query: String,

    #[serde(default = "default_database")]
    pub database: String,

    #[serde(default)]
    pub table: String,

    /// Column behind `$timeCol`
    #[serde(default = "default_date_col")]
    pub date_col: String,

    /// Column behind `$dateTimeCol`
    #[serde(default = "default_date_time_col")]
    pub date_time_col: String,

    /// Bucket interval; falls back to the request's automatic interval
    #[serde(default)]
    pub interval: Option<String>,

    #[serde(default = "default_interval_factor")]
    pub interval_factor: u32,

    /// Rounding applied to the range start
    #[serde(default)]
    pub round: Option<String>,
}

fn default_database() -> String {
    "default".to_string()
}

fn default_date_col() -> String {
    "EventDate".to_string()
}

fn default_date_time_col() -> String {
    "EventTime".to_string()
}

fn default_interval_factor() -> u32 {
    1
}

impl Default for QueryTarget {
    fn default() -> Self {
        Self {
            query: String::new(),
            database: default_database(),
            table: String::new(),
            date_col: default_date_col(),
            date_time_col: default_date_time_col(),
            interval: None,
            interval_factor: default_interval_factor(),
            round: None,
        }
    }
}

impl QueryTarget {
    /// Create a target for `database.table`
    pub fn new(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
            ..Self::default()
        }
    }

    /// Builder method: set the template text
    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    /// Builder method: set the date and datetime columns
    pub fn columns(mut self, date_col: impl Into<String>, date_time_col: impl Into<String>) -> Self {
        self.date_col = date_col.into();
        self.date_time_col = date_time_col.into();
        self
    }

    /// Builder method: set the bucket interval and its factor
    pub fn interval(mut self, interval: impl Into<String>, factor: u32) -> Self {
        self.interval = Some(interval.into());
        self.interval_factor = factor;
        self
    }

    /// Builder method: round the range start
    pub fn round(mut self, round: impl Into<String>) -> Self {
        self.round = Some(round.into());
        self
    }

    /// Value of `$table`
    pub fn qualified_table(&self) -> String {
        format!("{}.{}", self.database, self.table)
    }
}

/// Per-request inputs
#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub range: TimeRange,
    /// Automatic interval picked for the panel, e.g. `30s`
    pub interval: String,
    pub scoped_vars: ScopedVars,
}

impl QueryOptions {
    pub fn new(range: TimeRange, interval: impl Into<String>) -> Self {
        Self {
            range,
            interval: interval.into(),
            scoped_vars: ScopedVars::new(),
        }
    }

    /// Builder method: set the scoped variables
    pub fn scoped_vars(mut self, scoped_vars: ScopedVars) -> Self {
        self.scoped_vars = scoped_vars;
        self
    }
}

/// Outcome of a compilation
#[derive(Debug, Clone, Serialize)]
pub struct CompiledQuery {
    pub sql: String,
    /// Macro that was expanded, `none` when the template was used as written
    #[serde(rename = "macro")]
    pub macro_kind: MacroKind,
    /// Why a macro call was left unexpanded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
    pub time: TimeContext,
}

/// Compiles a [`QueryTarget`] into SQL
pub struct SqlQuery<'a> {
    target: &'a QueryTarget,
    variables: &'a dyn VariableInterpolator,
    dates: &'a dyn DateResolver,
}

impl<'a> SqlQuery<'a> {
    pub fn new(
        target: &'a QueryTarget,
        variables: &'a dyn VariableInterpolator,
        dates: &'a dyn DateResolver,
    ) -> Self {
        Self {
            target,
            variables,
            dates,
        }
    }

    /// Compile the target's template into a single-line SQL statement
    pub fn replace(&self, options: &QueryOptions) -> QueryResult<String> {
        self.compile(options).map(|compiled| compiled.sql)
    }

    /// Compile and report which macro fired
    pub fn compile(&self, options: &QueryOptions) -> QueryResult<CompiledQuery> {
        let time = self.time_context(options)?;

        let (query, macro_kind, fallback) = match self.expand_macro(options) {
            Ok((kind, Some(expanded))) => (expanded, kind, None),
            Ok((_, None)) => (self.target.query.clone(), MacroKind::None, None),
            Err(err) if err.is_recoverable() => {
                tracing::warn!(error = %err, "Macro expansion failed, using query as written");
                (self.target.query.clone(), MacroKind::None, Some(err.to_string()))
            }
            Err(err) => return Err(err),
        };

        let query = self
            .variables
            .replace(&query, &options.scoped_vars, Some(interpolate_query_expr));

        let renderer = Renderer::new(
            &time,
            &self.target.qualified_table(),
            &self.target.date_col,
            &self.target.date_time_col,
        );

        Ok(CompiledQuery {
            sql: renderer.render(&query),
            macro_kind,
            fallback,
            time,
        })
    }

    /// Resolve range bounds and bucket interval for a request
    pub fn time_context(&self, options: &QueryOptions) -> QueryResult<TimeContext> {
        let interval = self
            .target
            .interval
            .as_deref()
            .map(|interval| self.variables.replace(interval, &options.scoped_vars, None))
            .filter(|interval| !interval.trim().is_empty())
            .unwrap_or_else(|| options.interval.clone());

        TimeContext::resolve(
            &options.range,
            self.target.round.as_deref(),
            &interval,
            self.target.interval_factor.max(1),
            self.dates,
        )
    }

    fn expand_macro(&self, options: &QueryOptions) -> QueryResult<(MacroKind, Option<String>)> {
        let call = Scanner::new(&self.target.query).macro_call()?;
        let kind = call.kind();
        tracing::debug!(%kind, "Detected macro");

        let expanded = rewrite::expand(&call, |event| {
            self.variables.replace(event, &options.scoped_vars, None)
        })?;
        Ok((kind, expanded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::error::QueryError;
    use crate::query::template::{TemplateVariable, TemplateVariables};
    use crate::time::DateMath;
    use chrono::{DateTime, TimeZone, Utc};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 13, 15, 0, 0).unwrap()
    }

    fn target(query: &str) -> QueryTarget {
        QueryTarget::new("metrics", "requests").query(query)
    }

    fn options() -> QueryOptions {
        QueryOptions::new(TimeRange::from_raw("now-1h", "now"), "30s")
    }

    fn compile(target: &QueryTarget, variables: &TemplateVariables) -> QueryResult<CompiledQuery> {
        let dates = DateMath::new(now());
        SqlQuery::new(target, variables, &dates).compile(&options())
    }

    const FROM: i64 = 1_710_338_400;
    const TO: i64 = 1_710_342_000;

    #[test]
    fn test_plain_query_only_substitutes_placeholders() {
        let target = target("SELECT $timeSeries AS t, count() FROM $table\nWHERE $timeFilter GROUP BY t");
        let compiled = compile(&target, &TemplateVariables::new()).unwrap();

        assert_eq!(compiled.macro_kind, MacroKind::None);
        assert_eq!(
            compiled.sql,
            format!(
                "SELECT (intDiv(toUInt32(EventTime), 30) * 30) * 1000 AS t, count() FROM metrics.requests \
                 WHERE EventDate >= toDate({FROM}) AND EventTime >= toDateTime({FROM}) GROUP BY t"
            )
        );
        assert_eq!(compiled.time.to, TO);
    }

    #[test]
    fn test_columns_macro() {
        let target = target("$columns(OSName os, count() c) FROM $table WHERE code = 200");
        let compiled = compile(&target, &TemplateVariables::new()).unwrap();

        assert_eq!(compiled.macro_kind, MacroKind::Columns);
        assert!(compiled.sql.contains("groupArray((os, c)) AS groupArr"));
        assert!(compiled.sql.contains(&format!(
            "FROM metrics.requests WHERE EventDate >= toDate({FROM}) AND EventTime >= toDateTime({FROM}) AND code = 200"
        )));
        assert!(!compiled.sql.contains('$'));
    }

    #[test]
    fn test_rate_macro() {
        let target = target("$rate(count() total) FROM $table");
        let sql = compile(&target, &TemplateVariables::new()).unwrap().sql;
        assert!(sql.starts_with("SELECT t, total / runningDifference(t/1000) AS totalRate FROM (SELECT "));
    }

    #[test]
    fn test_malformed_macro_falls_back() {
        let target = target("$rate(count()) FROM $table");
        let compiled = compile(&target, &TemplateVariables::new()).unwrap();

        assert_eq!(compiled.macro_kind, MacroKind::None);
        assert!(compiled.fallback.is_some());
        assert_eq!(compiled.sql, "$rate(count()) FROM metrics.requests");
    }

    #[test]
    fn test_unbalanced_macro_falls_back() {
        let target = target("$columns(a k, count( c) FROM $table");
        let compiled = compile(&target, &TemplateVariables::new()).unwrap();
        assert_eq!(compiled.sql, "$columns(a k, count( c) FROM metrics.requests");
    }

    #[test]
    fn test_event_macro_resolves_variable() {
        let variables = TemplateVariables::new().with(TemplateVariable::new("var", "login"));
        let target = target("$event($var, count())");
        let sql = compile(&target, &variables).unwrap().sql;

        assert!(sql.contains("event = 'login'"));
        assert!(sql.contains("count() AS login"));
        assert!(sql.contains("FROM metrics.requests"));
    }

    #[test]
    fn test_multi_value_variable_is_escaped() {
        let variables = TemplateVariables::new().with(
            TemplateVariable::new("host", vec!["a".to_string(), "o'b".to_string()])
                .multi()
                .options(&["a", "o'b", "c"]),
        );
        let target = target("SELECT count() FROM $table WHERE host IN ($host)");
        let sql = compile(&target, &variables).unwrap().sql;
        assert_eq!(sql, r"SELECT count() FROM metrics.requests WHERE host IN ('a','o\'b')");
    }

    #[test]
    fn test_target_interval_and_factor() {
        let target = target("$interval").interval("$step", 3);
        let variables = TemplateVariables::new().with(TemplateVariable::new("step", "1m"));
        assert_eq!(compile(&target, &variables).unwrap().sql, "180");

        let target = QueryTarget::new("metrics", "requests").query("$interval").interval("", 0);
        assert_eq!(compile(&target, &TemplateVariables::new()).unwrap().sql, "30");
    }

    #[test]
    fn test_invalid_interval_aborts() {
        let target = target("$columns(a k, count() c) FROM $table").interval("fast", 1);
        assert_eq!(
            compile(&target, &TemplateVariables::new()).unwrap_err(),
            QueryError::InvalidDuration("fast".to_string())
        );
    }

    #[test]
    fn test_round_applies_to_from_only() {
        let dates = DateMath::new(now() + chrono::Duration::seconds(17));
        let target = target("$from $to").round("1m");
        let sql = SqlQuery::new(&target, &TemplateVariables::new(), &dates)
            .replace(&options())
            .unwrap();
        assert_eq!(sql, format!("{} {}", FROM, TO + 17));
    }

    #[test]
    fn test_closed_range_filter() {
        let dates = DateMath::new(now());
        let target = target("WHERE $timeFilter");
        let options = QueryOptions::new(TimeRange::from_raw("now-2h", "now-1h"), "30s");
        let sql = SqlQuery::new(&target, &TemplateVariables::new(), &dates)
            .replace(&options)
            .unwrap();
        assert_eq!(
            sql,
            format!(
                "WHERE EventDate BETWEEN toDate({}) AND toDate({FROM}) \
                 AND EventTime BETWEEN toDateTime({}) AND toDateTime({FROM})",
                FROM - 3600,
                FROM - 3600
            )
        );
    }
}
