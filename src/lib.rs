//! # tsquery
//!
//! Query templating compiler for a columnar time-series store. Turns a
//! templated query, with reserved placeholders and an optional leading
//! macro call, into a literal single-line SQL statement.
//!
//! ## Features
//!
//! - **Macros**: time-bucketed pivots (`$columns`), rates (`$rate`,
//!   `$rateColumns`) and per-event aggregation (`$event`)
//! - **Placeholders**: `$timeSeries`, `$timeFilter`, `$table`, `$from`,
//!   `$to`, `$timeCol`, `$dateTimeCol`, `$interval`
//! - **Template variables**: escaping of multi-valued dashboard variables
//! - **Deterministic**: `now` is always supplied by the caller
//!
//! ## Modules
//!
//! - [`query`]: scanner, rewrite rules, rendering and the compiler
//! - [`time`]: durations, date expressions and time context resolution
//! - [`config`]: TOML configuration with environment overrides

pub mod config;
pub mod query;
pub mod time;

pub use query::{
    CompiledQuery, MacroCall, MacroKind, QueryError, QueryOptions, QueryResult, QueryTarget,
    Scanner, SqlQuery, TemplateVariable, TemplateVariables, VariableInterpolator, VariableValue,
};

pub use time::{
    convert_interval, DateInput, DateMath, DateResolver, Interval, TimeContext, TimeRange,
};

pub use config::{Config, ConfigError, LoggingConfig};
