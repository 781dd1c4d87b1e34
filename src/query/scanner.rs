//! Macro Scanner
//!
//! Splits macro arguments at top-level commas and detects which macro,
//! if any, a query template starts with. This is not a SQL parser: only
//! parenthesis nesting and single-quoted literals are tracked.
//!
//! # Examples
//!
//! ```text
//! "key k, max(a, b) v"           -> ["key k", "max(a, b) v"]
//! "$rate(count() c) FROM events" -> MacroCall::Rate
//! ```

use std::ops::Range;
use std::sync::LazyLock;

use nom::{branch::alt, bytes::complete::tag, combinator::value, IResult};
use regex::Regex;

use crate::query::ast::{Ast, MacroCall, MacroKind};
use crate::query::error::{QueryError, QueryResult};

static FROM_KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bfrom\b").expect("FROM keyword pattern"));
static WHERE_KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bwhere\b").expect("WHERE keyword pattern"));
static HAVING_KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bhaving\b").expect("HAVING keyword pattern"));

/// SQL keywords the rewrite rules anchor on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Keyword {
    From,
    Where,
    Having,
}

impl Keyword {
    /// Byte range of the first case-insensitive whole-word occurrence
    pub(crate) fn find(&self, text: &str) -> Option<Range<usize>> {
        let pattern = match self {
            Self::From => &FROM_KEYWORD,
            Self::Where => &WHERE_KEYWORD,
            Self::Having => &HAVING_KEYWORD,
        };
        pattern.find(text).map(|m| m.range())
    }
}

/// Tracks parenthesis depth and string literals character by character
#[derive(Debug, Default)]
struct Nesting {
    depth: usize,
    quoted: bool,
    escaped: bool,
}

impl Nesting {
    /// Returns false on a `)` with nothing open
    fn advance(&mut self, c: char) -> bool {
        if self.quoted {
            match c {
                _ if self.escaped => self.escaped = false,
                '\\' => self.escaped = true,
                '\'' => self.quoted = false,
                _ => {}
            }
            return true;
        }

        match c {
            '\'' => self.quoted = true,
            '(' => self.depth += 1,
            ')' => match self.depth.checked_sub(1) {
                Some(depth) => self.depth = depth,
                None => return false,
            },
            _ => {}
        }
        true
    }

    fn at_top_level(&self) -> bool {
        self.depth == 0 && !self.quoted
    }
}

/// Scanner over a macro argument string or a full query template
pub struct Scanner<'a> {
    input: &'a str,
}

impl<'a> Scanner<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input }
    }

    /// Split the input into top-level arguments
    pub fn to_ast(&self) -> QueryResult<Ast> {
        if self.input.trim().is_empty() {
            return Ok(Ast::default());
        }

        let mut root = Vec::new();
        let mut nesting = Nesting::default();
        let mut start = 0;

        for (pos, c) in self.input.char_indices() {
            if c == ',' && nesting.at_top_level() {
                root.push(self.argument(start..pos)?);
                start = pos + 1;
                continue;
            }
            if !nesting.advance(c) {
                return Err(QueryError::Parse(format!(
                    "unexpected ')' at position {} in: {}",
                    pos, self.input
                )));
            }
        }

        if nesting.quoted {
            return Err(QueryError::Parse(format!(
                "unterminated string literal in: {}",
                self.input
            )));
        }
        if nesting.depth > 0 {
            return Err(QueryError::Parse(format!(
                "unbalanced parentheses in: {}",
                self.input
            )));
        }

        root.push(self.argument(start..self.input.len())?);
        Ok(Ast { root })
    }

    /// Detect the leading macro call of a query template
    pub fn macro_call(&self) -> QueryResult<MacroCall> {
        let query = self.input.trim();
        let Ok((body, kind)) = macro_head(query) else {
            return Ok(MacroCall::None);
        };

        let (inner, rest) = split_call(body).ok_or_else(|| {
            QueryError::Parse(format!("unclosed {} call in: {}", kind.name(), query))
        })?;
        let args = Scanner::new(inner).to_ast()?.root;

        match kind {
            MacroKind::Columns | MacroKind::RateColumns => {
                let [key, value]: [String; 2] =
                    args.try_into()
                        .map_err(|args| QueryError::ArgumentCount {
                            name: kind.name(),
                            expected: 2,
                            args,
                        })?;
                let from = from_clause(query, rest)?;
                Ok(if kind == MacroKind::Columns {
                    MacroCall::Columns { key, value, from }
                } else {
                    MacroCall::RateColumns { key, value, from }
                })
            }
            MacroKind::Rate => {
                if args.is_empty() {
                    return Err(QueryError::EmptyArguments {
                        name: kind.name(),
                        args,
                    });
                }
                let from = from_clause(query, rest)?;
                Ok(MacroCall::Rate { args, from })
            }
            MacroKind::Event => {
                if !only_comments(rest) {
                    return Err(QueryError::Parse(format!(
                        "unexpected input after {} call: {}",
                        kind.name(),
                        rest.trim()
                    )));
                }
                let mut args = args.into_iter();
                let event = args.next().ok_or_else(|| QueryError::EmptyArguments {
                    name: kind.name(),
                    args: Vec::new(),
                })?;
                Ok(MacroCall::Event {
                    event,
                    aggregation: args.next(),
                })
            }
            MacroKind::None => Ok(MacroCall::None),
        }
    }

    fn argument(&self, range: Range<usize>) -> QueryResult<String> {
        let arg = self.input[range].trim();
        if arg.is_empty() {
            return Err(QueryError::Parse(format!(
                "empty argument in: {}",
                self.input
            )));
        }
        Ok(arg.to_string())
    }
}

/// Recognize a macro name and its opening parenthesis
fn macro_head(input: &str) -> IResult<&str, MacroKind> {
    alt((
        value(MacroKind::Columns, tag("$columns(")),
        value(MacroKind::RateColumns, tag("$rateColumns(")),
        value(MacroKind::Rate, tag("$rate(")),
        value(MacroKind::Event, tag("$event(")),
    ))(input)
}

/// Split text following an opening parenthesis at its matching `)`
fn split_call(body: &str) -> Option<(&str, &str)> {
    let mut nesting = Nesting {
        depth: 1,
        ..Nesting::default()
    };

    for (pos, c) in body.char_indices() {
        nesting.advance(c);
        if nesting.at_top_level() {
            return Some((&body[..pos], &body[pos + 1..]));
        }
    }
    None
}

/// Whether `text` holds nothing but whitespace and SQL comments
fn only_comments(mut text: &str) -> bool {
    loop {
        text = text.trim_start();
        if text.is_empty() {
            return true;
        }
        if let Some(comment) = text.strip_prefix("--") {
            text = comment.find('\n').map_or("", |end| &comment[end..]);
        } else if let Some(comment) = text.strip_prefix("/*") {
            match comment.find("*/") {
                Some(end) => text = &comment[end + 2..],
                None => return false,
            }
        } else {
            return false;
        }
    }
}

fn from_clause(query: &str, rest: &str) -> QueryResult<String> {
    Keyword::From
        .find(rest)
        .map(|range| rest[range.start..].to_string())
        .ok_or_else(|| QueryError::MissingFrom(query.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root(input: &str) -> Vec<String> {
        Scanner::new(input).to_ast().unwrap().root
    }

    #[test]
    fn test_split_top_level_commas() {
        assert_eq!(root("a, b ,c"), vec!["a", "b", "c"]);
        assert_eq!(root("single"), vec!["single"]);
        assert!(root("   ").is_empty());
    }

    #[test]
    fn test_nested_commas_do_not_split() {
        assert_eq!(
            root("if(x > 1, 'a', 'b') k, sum(max(a, b)) v"),
            vec!["if(x > 1, 'a', 'b') k", "sum(max(a, b)) v"]
        );
    }

    #[test]
    fn test_quoted_commas_do_not_split() {
        assert_eq!(
            root("concat(name, ', ') k, 'a,b' v"),
            vec!["concat(name, ', ') k", "'a,b' v"]
        );
        assert_eq!(root(r"'it\'s, fine' k, v"), vec![r"'it\'s, fine' k", "v"]);
    }

    #[test]
    fn test_unbalanced_input_fails() {
        assert!(matches!(Scanner::new("count(a").to_ast(), Err(QueryError::Parse(_))));
        assert!(matches!(Scanner::new("a), b").to_ast(), Err(QueryError::Parse(_))));
        assert!(matches!(Scanner::new("'open, b").to_ast(), Err(QueryError::Parse(_))));
        assert!(matches!(Scanner::new("a,,b").to_ast(), Err(QueryError::Parse(_))));
    }

    #[test]
    fn test_no_macro() {
        let call = Scanner::new("SELECT count() FROM $table WHERE $timeFilter").macro_call();
        assert_eq!(call.unwrap(), MacroCall::None);

        // Only a leading call counts
        let call = Scanner::new("SELECT 1 FROM t WHERE $rate(x)").macro_call();
        assert_eq!(call.unwrap(), MacroCall::None);
    }

    #[test]
    fn test_detect_columns() {
        let call = Scanner::new("  $columns(OSName os, count(*) c) FROM requests WHERE x = 1")
            .macro_call()
            .unwrap();
        assert_eq!(
            call,
            MacroCall::Columns {
                key: "OSName os".to_string(),
                value: "count(*) c".to_string(),
                from: "FROM requests WHERE x = 1".to_string(),
            }
        );
    }

    #[test]
    fn test_detect_rate_columns() {
        let call = Scanner::new("$rateColumns(OSName os, count(*) c) from requests")
            .macro_call()
            .unwrap();
        assert_eq!(call.kind(), MacroKind::RateColumns);
    }

    #[test]
    fn test_detect_rate() {
        let call = Scanner::new("$rate(countIf(Type = 200) good, count() total) FROM requests")
            .macro_call()
            .unwrap();
        assert_eq!(
            call,
            MacroCall::Rate {
                args: vec!["countIf(Type = 200) good".to_string(), "count() total".to_string()],
                from: "FROM requests".to_string(),
            }
        );
    }

    #[test]
    fn test_detect_event() {
        let call = Scanner::new("$event($event_name, avg(__duration))").macro_call().unwrap();
        assert_eq!(
            call,
            MacroCall::Event {
                event: "$event_name".to_string(),
                aggregation: Some("avg(__duration)".to_string()),
            }
        );

        let call = Scanner::new("$event(login)").macro_call().unwrap();
        assert_eq!(
            call,
            MacroCall::Event {
                event: "login".to_string(),
                aggregation: None,
            }
        );
    }

    #[test]
    fn test_event_allows_trailing_comments() {
        let login = MacroCall::Event {
            event: "login".to_string(),
            aggregation: None,
        };
        for query in [
            "$event(login)  \n",
            "$event(login) -- logins per bucket",
            "$event(login) /* a */ -- b\n  /* c */",
        ] {
            assert_eq!(Scanner::new(query).macro_call().unwrap(), login, "{}", query);
        }

        for query in [
            "$event(login) WHERE x = 1",
            "$event(login) /* unterminated",
            "$event(login) -- ok\nLIMIT 5",
        ] {
            assert!(
                matches!(Scanner::new(query).macro_call(), Err(QueryError::Parse(_))),
                "{}",
                query
            );
        }
    }

    #[test]
    fn test_from_inside_arguments_is_ignored() {
        let call = Scanner::new("$columns(extract(s from x) k, count() c) FROM t")
            .macro_call()
            .unwrap();
        match call {
            MacroCall::Columns { key, from, .. } => {
                assert_eq!(key, "extract(s from x) k");
                assert_eq!(from, "FROM t");
            }
            other => panic!("unexpected macro call: {:?}", other),
        }
    }

    #[test]
    fn test_argument_errors() {
        assert!(matches!(
            Scanner::new("$columns(a k) FROM t").macro_call(),
            Err(QueryError::ArgumentCount { expected: 2, .. })
        ));
        assert!(matches!(
            Scanner::new("$rate() FROM t").macro_call(),
            Err(QueryError::EmptyArguments { name: "$rate", .. })
        ));
        assert!(matches!(
            Scanner::new("$event()").macro_call(),
            Err(QueryError::EmptyArguments { name: "$event", .. })
        ));
        assert!(matches!(
            Scanner::new("$rate(count() c)").macro_call(),
            Err(QueryError::MissingFrom(_))
        ));
        assert!(matches!(
            Scanner::new("$rate(count(c) FROM t").macro_call(),
            Err(QueryError::Parse(_))
        ));
    }

    #[test]
    fn test_keyword_whole_word() {
        assert_eq!(Keyword::Where.find("FROM somewhere WHERE a"), Some(15..20));
        assert_eq!(Keyword::Having.find("FROM t having x"), Some(7..13));
        assert_eq!(Keyword::From.find("SELECT fromage"), None);
    }
}
