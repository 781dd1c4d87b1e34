//! Query Templating Engine
//!
//! Compiles backend-agnostic query templates into SQL for a columnar
//! time-series store:
//!
//! - **Scanner**: top-level argument splitting and macro detection
//! - **Rewrite**: `$columns`, `$rateColumns`, `$rate` and `$event` rules
//! - **Template**: template variables and their escaping
//! - **Render**: reserved placeholder substitution
//! - **Compiler**: the full pipeline for one query target
//!
//! # Template Language
//!
//! ```text
//! $columns(key k, value v) FROM ... [WHERE ...] [HAVING ...]
//! $rateColumns(key k, value v) FROM ...
//! $rate(expr a [, expr b ...]) FROM ...
//! $event(event [, aggregation])
//! ```
//!
//! # Example
//!
//! ```rust
//! use tsquery::query::{QueryOptions, QueryTarget, SqlQuery, TemplateVariables};
//! use tsquery::time::{DateMath, TimeRange};
//! use chrono::{TimeZone, Utc};
//!
//! let target = QueryTarget::new("default", "requests")
//!     .query("$rate(count() hits) FROM $table");
//! let variables = TemplateVariables::new();
//! let dates = DateMath::new(Utc.with_ymd_and_hms(2024, 3, 13, 15, 0, 0).unwrap());
//! let options = QueryOptions::new(TimeRange::from_raw("now-1h", "now"), "1m");
//!
//! let sql = SqlQuery::new(&target, &variables, &dates).replace(&options).unwrap();
//! assert!(sql.starts_with("SELECT t, hits / runningDifference(t/1000) AS hitsRate"));
//! ```

mod ast;
mod compiler;
mod error;
mod render;
mod rewrite;
mod scanner;
mod template;

pub use ast::{Ast, MacroCall, MacroKind};
pub use compiler::{CompiledQuery, QueryOptions, QueryTarget, SqlQuery};
pub use error::{QueryError, QueryResult};
pub use render::{time_filter, Renderer, TIME_SERIES};
pub use rewrite::{
    apply_time_filter, columns, event, expand, rate, rate_columns, DEFAULT_EVENT_AGGREGATION,
};
pub use scanner::Scanner;
pub use template::{
    escape_value, interpolate_query_expr, FormatFn, ScopedVars, TemplateVariable,
    TemplateVariables, VariableInterpolator, VariableOption, VariableValue, ALL_VALUE,
};
