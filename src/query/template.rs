//! Template variables
//!
//! Dashboard variables are substituted into query text before placeholder
//! rendering. Substitution itself is pluggable through
//! [`VariableInterpolator`]; the compiler only supplies the escaping
//! callback [`interpolate_query_expr`].

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

/// Option value meaning "every option"
pub const ALL_VALUE: &str = "$__all";

static VARIABLE_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$(\w+)|\$\{(\w+)\}|\[\[(\w+)\]\]").expect("variable reference pattern")
});

/// Value of a template variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariableValue {
    Single(String),
    Multi(Vec<String>),
}

impl VariableValue {
    fn is_all(&self) -> bool {
        match self {
            Self::Single(value) => value == ALL_VALUE,
            Self::Multi(values) => values.len() == 1 && values[0] == ALL_VALUE,
        }
    }
}

impl Default for VariableValue {
    fn default() -> Self {
        Self::Single(String::new())
    }
}

impl std::fmt::Display for VariableValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single(value) => write!(f, "{}", value),
            Self::Multi(values) => write!(f, "{}", values.join(",")),
        }
    }
}

impl From<&str> for VariableValue {
    fn from(value: &str) -> Self {
        Self::Single(value.to_string())
    }
}

impl From<Vec<String>> for VariableValue {
    fn from(values: Vec<String>) -> Self {
        Self::Multi(values)
    }
}

/// One selectable option of a variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableOption {
    pub value: String,
}

/// A dashboard template variable
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateVariable {
    pub name: String,
    #[serde(default)]
    pub multi: bool,
    #[serde(default)]
    pub include_all: bool,
    #[serde(default)]
    pub options: Vec<VariableOption>,
    #[serde(default)]
    pub current: VariableValue,
}

impl TemplateVariable {
    pub fn new(name: impl Into<String>, current: impl Into<VariableValue>) -> Self {
        Self {
            name: name.into(),
            current: current.into(),
            ..Self::default()
        }
    }

    /// Builder method: allow several values at once
    pub fn multi(mut self) -> Self {
        self.multi = true;
        self
    }

    /// Builder method: offer the select-all option
    pub fn include_all(mut self) -> Self {
        self.include_all = true;
        self
    }

    /// Builder method: set the declared options
    pub fn options(mut self, values: &[&str]) -> Self {
        self.options = values
            .iter()
            .map(|value| VariableOption {
                value: value.to_string(),
            })
            .collect();
        self
    }

    /// Every declared option value except the select-all sentinel
    pub fn option_values(&self) -> Vec<String> {
        self.options
            .iter()
            .filter(|option| option.value != ALL_VALUE)
            .map(|option| option.value.clone())
            .collect()
    }
}

/// Per-request variable overrides
pub type ScopedVars = HashMap<String, VariableValue>;

/// Formats a variable value for insertion into query text
pub type FormatFn = fn(&VariableValue, &TemplateVariable) -> String;

/// Substitutes template variables into text
pub trait VariableInterpolator {
    fn replace(&self, text: &str, scoped_vars: &ScopedVars, format: Option<FormatFn>) -> String;
}

/// Default [`VariableInterpolator`] over a set of named variables.
///
/// Recognises `$name`, `${name}` and `[[name]]`. Unknown names are left as
/// they are so reserved placeholders survive substitution.
#[derive(Debug, Clone, Default)]
pub struct TemplateVariables {
    variables: HashMap<String, TemplateVariable>,
}

impl TemplateVariables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a variable, replacing any previous one with the same name
    pub fn insert(&mut self, variable: TemplateVariable) {
        self.variables.insert(variable.name.clone(), variable);
    }

    /// Builder method: register a variable
    pub fn with(mut self, variable: TemplateVariable) -> Self {
        self.insert(variable);
        self
    }

    pub fn get(&self, name: &str) -> Option<&TemplateVariable> {
        self.variables.get(name)
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    fn substitute(
        &self,
        name: &str,
        scoped_vars: &ScopedVars,
        format: Option<FormatFn>,
    ) -> Option<String> {
        let registered = self.variables.get(name);
        let value = scoped_vars
            .get(name)
            .or_else(|| registered.map(|variable| &variable.current))?;

        let fallback;
        let variable = match registered {
            Some(variable) => variable,
            None => {
                fallback = TemplateVariable::new(name, value.clone());
                &fallback
            }
        };

        let expanded;
        let value = if value.is_all() && !variable.options.is_empty() {
            expanded = VariableValue::Multi(variable.option_values());
            &expanded
        } else {
            value
        };

        Some(match format {
            Some(format) => format(value, variable),
            None => value.to_string(),
        })
    }
}

impl FromIterator<TemplateVariable> for TemplateVariables {
    fn from_iter<I: IntoIterator<Item = TemplateVariable>>(iter: I) -> Self {
        let mut variables = Self::new();
        for variable in iter {
            variables.insert(variable);
        }
        variables
    }
}

impl VariableInterpolator for TemplateVariables {
    fn replace(&self, text: &str, scoped_vars: &ScopedVars, format: Option<FormatFn>) -> String {
        VARIABLE_REF
            .replace_all(text, |caps: &Captures| {
                let name = caps
                    .get(1)
                    .or_else(|| caps.get(2))
                    .or_else(|| caps.get(3))
                    .map(|m| m.as_str())
                    .unwrap_or_default();
                self.substitute(name, scoped_vars, format)
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }
}

/// Escaping callback for variable substitution.
///
/// Values of single-valued variables without a select-all option pass
/// through untouched; otherwise every value is escaped on its own and the
/// results are joined with commas.
pub fn interpolate_query_expr(value: &VariableValue, variable: &TemplateVariable) -> String {
    if !variable.multi && !variable.include_all {
        return value.to_string();
    }

    match value {
        VariableValue::Single(value) => escape_value(value, variable),
        VariableValue::Multi(values) => values
            .iter()
            .map(|value| escape_value(value, variable))
            .collect::<Vec<_>>()
            .join(","),
    }
}

/// Quote `value` unless every declared option of `variable` is numeric
pub fn escape_value(value: &str, variable: &TemplateVariable) -> String {
    let numeric = variable
        .options
        .iter()
        .filter(|option| option.value != ALL_VALUE)
        .all(|option| is_digits(&option.value));

    if numeric {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
    }
}

fn is_digits(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn multi(values: &[&str]) -> VariableValue {
        VariableValue::Multi(values.iter().map(|v| v.to_string()).collect())
    }

    #[test]
    fn test_single_valued_passes_through() {
        let variable = TemplateVariable::new("host", "o'brien").options(&["o'brien"]);
        assert_eq!(
            interpolate_query_expr(&"o'brien".into(), &variable),
            "o'brien"
        );
    }

    #[test]
    fn test_numeric_options_stay_bare() {
        let variable = TemplateVariable::new("code", multi(&["1", "2", "3"]))
            .multi()
            .options(&["1", "2", "3", "404"]);
        assert_eq!(
            interpolate_query_expr(&multi(&["1", "2", "3"]), &variable),
            "1,2,3"
        );
    }

    #[test]
    fn test_all_sentinel_ignored_for_numeric_check() {
        let variable = TemplateVariable::new("code", "1")
            .include_all()
            .options(&[ALL_VALUE, "1", "2"]);
        assert_eq!(interpolate_query_expr(&"2".into(), &variable), "2");
    }

    #[test]
    fn test_non_numeric_options_are_quoted() {
        let variable = TemplateVariable::new("user", "o'brien")
            .multi()
            .options(&["1", "o'brien", r"back\slash"]);
        assert_eq!(
            interpolate_query_expr(&"o'brien".into(), &variable),
            r"'o\'brien'"
        );
        assert_eq!(
            interpolate_query_expr(&multi(&["1", r"back\slash"]), &variable),
            r"'1','back\\slash'"
        );
    }

    #[test]
    fn test_replace_reference_forms() {
        let variables = TemplateVariables::new()
            .with(TemplateVariable::new("db", "metrics"))
            .with(TemplateVariable::new("event", "login"));
        let text = "SELECT * FROM $db.t WHERE e = '${event}' OR e = '[[event]]'";
        assert_eq!(
            variables.replace(text, &ScopedVars::new(), None),
            "SELECT * FROM metrics.t WHERE e = 'login' OR e = 'login'"
        );
    }

    #[test]
    fn test_unknown_names_untouched() {
        let variables = TemplateVariables::new().with(TemplateVariable::new("db", "metrics"));
        let text = "SELECT $timeSeries FROM $table WHERE $timeFilter AND $dbx = 1";
        assert_eq!(variables.replace(text, &ScopedVars::new(), None), text);
    }

    #[test]
    fn test_scoped_vars_override() {
        let variables = TemplateVariables::new().with(TemplateVariable::new("event", "login"));
        let mut scoped = ScopedVars::new();
        scoped.insert("event".to_string(), "logout".into());
        scoped.insert("extra".to_string(), "x".into());
        assert_eq!(
            variables.replace("$event $extra", &scoped, None),
            "logout x"
        );
    }

    #[test]
    fn test_all_value_expands_to_options() {
        let variables = TemplateVariables::new().with(
            TemplateVariable::new("host", ALL_VALUE)
                .multi()
                .include_all()
                .options(&[ALL_VALUE, "a", "b"]),
        );
        assert_eq!(
            variables.replace(
                "host IN ($host)",
                &ScopedVars::new(),
                Some(interpolate_query_expr)
            ),
            "host IN ('a','b')"
        );
    }

    #[test]
    fn test_substitution_is_single_pass() {
        let variables = TemplateVariables::new()
            .with(TemplateVariable::new("a", "$b"))
            .with(TemplateVariable::new("b", "never"));
        assert_eq!(variables.replace("$a", &ScopedVars::new(), None), "$b");
    }
}
