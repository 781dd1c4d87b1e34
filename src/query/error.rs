//! Query error types
//!
//! Defines all error conditions that can occur while compiling a query
//! template into SQL.

use thiserror::Error;

/// Errors that can occur during query compilation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// Macro invoked with the wrong number of top-level arguments
    #[error("Amount of arguments must equal {expected} for {name} func. Parsed arguments are: {}", .args.join(", "))]
    ArgumentCount {
        name: &'static str,
        expected: usize,
        args: Vec<String>,
    },

    /// Macro invoked without any arguments
    #[error("Amount of arguments must be > 0 for {name} func. Parsed arguments are: {}", .args.join(", "))]
    EmptyArguments {
        name: &'static str,
        args: Vec<String>,
    },

    /// A macro argument is a bare expression without a trailing alias
    #[error("Argument \"{0}\" cant be used without alias")]
    MissingAlias(String),

    /// Macro body has no FROM keyword to anchor the rewrite
    #[error("Could not find FROM-statement at: {0}")]
    MissingFrom(String),

    /// Structural malformation in a macro call (unbalanced parentheses etc.)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Duration string contains no `<integer><unit>` or is out of range
    #[error("Received duration is invalid: {0}")]
    InvalidDuration(String),

    /// Date expression could not be resolved to an instant
    #[error("Invalid date expression: {0}")]
    InvalidDate(String),
}

impl QueryError {
    /// Whether the error comes from macro detection or expansion.
    ///
    /// Recoverable errors make the compiler fall back to the unexpanded
    /// query text; everything else aborts compilation.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ArgumentCount { .. }
                | Self::EmptyArguments { .. }
                | Self::MissingAlias(_)
                | Self::MissingFrom(_)
                | Self::Parse(_)
        )
    }
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;
