//! Macro call syntax tree
//!
//! A query template may start with one macro call:
//!
//! ```text
//! $columns(key k, value v) FROM ...
//! $rateColumns(key k, value v) FROM ...
//! $rate(expr a [, expr b ...]) FROM ...
//! $event(event [, aggregation])
//! ```

use serde::Serialize;

/// Top-level arguments of a macro call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ast {
    /// Arguments split at commas outside parentheses, trimmed
    pub root: Vec<String>,
}

/// Which macro governs a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MacroKind {
    None,
    Columns,
    RateColumns,
    Rate,
    Event,
}

impl MacroKind {
    /// Macro name as written in templates
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::Columns => "$columns",
            Self::RateColumns => "$rateColumns",
            Self::Rate => "$rate",
            Self::Event => "$event",
        }
    }
}

impl std::fmt::Display for MacroKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            other => write!(f, "{}", other.name()),
        }
    }
}

/// A detected macro call with its typed arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MacroCall {
    /// Query has no leading macro call
    None,
    /// Pivot `key`/`value` pairs into one array per time bucket
    Columns {
        key: String,
        value: String,
        /// Query text from the FROM keyword on
        from: String,
    },
    /// `$columns` pivot with every value turned into a per-second rate
    RateColumns {
        key: String,
        value: String,
        from: String,
    },
    /// Per-second rate of each aliased expression
    Rate { args: Vec<String>, from: String },
    /// Per-bucket aggregation of a single event type
    Event {
        event: String,
        aggregation: Option<String>,
    },
}

impl MacroCall {
    pub fn kind(&self) -> MacroKind {
        match self {
            Self::None => MacroKind::None,
            Self::Columns { .. } => MacroKind::Columns,
            Self::RateColumns { .. } => MacroKind::RateColumns,
            Self::Rate { .. } => MacroKind::Rate,
            Self::Event { .. } => MacroKind::Event,
        }
    }
}
